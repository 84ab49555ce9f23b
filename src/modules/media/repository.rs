use super::model::{VideoStatus, VideoStatusRow};
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt status record: {0}")]
    Corrupt(String),
}

/// Persistent record of each job's encode lifecycle, keyed by job name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Inserts the record or overwrites the one with the same name.
    /// `created_at` of an existing record is kept.
    async fn upsert(&self, record: &VideoStatus) -> Result<(), StoreError>;

    async fn find(&self, name: &str) -> Result<Option<VideoStatus>, StoreError>;
}

#[derive(Clone)]
pub struct VideoStatusRepository {
    pool: PgPool,
}

impl VideoStatusRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS video_status (
                name TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StatusStore for VideoStatusRepository {
    async fn upsert(&self, record: &VideoStatus) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO video_status (name, status, message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO UPDATE
            SET status = EXCLUDED.status,
                message = EXCLUDED.message,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.name)
        .bind(record.status.as_str())
        .bind(&record.message)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, name: &str) -> Result<Option<VideoStatus>, StoreError> {
        let row = sqlx::query_as::<_, VideoStatusRow>(
            "SELECT name, status, message, created_at, updated_at FROM video_status WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(VideoStatus::try_from)
            .transpose()
            .map_err(StoreError::Corrupt)
    }
}
