use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Lifecycle of one encode job. Transitions only move forward:
/// `Pending -> Processing -> (Success | Failed)`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncodingStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl EncodingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingStatus::Pending => "PENDING",
            EncodingStatus::Processing => "PROCESSING",
            EncodingStatus::Success => "SUCCESS",
            EncodingStatus::Failed => "FAILED",
        }
    }

    pub fn can_transition_to(&self, next: EncodingStatus) -> bool {
        matches!(
            (self, next),
            (EncodingStatus::Pending, EncodingStatus::Processing)
                | (EncodingStatus::Processing, EncodingStatus::Success)
                | (EncodingStatus::Processing, EncodingStatus::Failed)
        )
    }
}

impl fmt::Display for EncodingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncodingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(EncodingStatus::Pending),
            "PROCESSING" => Ok(EncodingStatus::Processing),
            "SUCCESS" => Ok(EncodingStatus::Success),
            "FAILED" => Ok(EncodingStatus::Failed),
            other => Err(format!("unknown encoding status: {}", other)),
        }
    }
}

/// One row of the status store, keyed by job name.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStatus {
    pub name: String,
    pub status: EncodingStatus,
    pub message: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl VideoStatus {
    #[cfg(test)]
    pub fn new(name: &str, status: EncodingStatus, message: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

// Status is stored as TEXT
#[derive(Debug, FromRow)]
pub struct VideoStatusRow {
    pub name: String,
    pub status: String,
    pub message: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<VideoStatusRow> for VideoStatus {
    type Error = String;

    fn try_from(row: VideoStatusRow) -> Result<Self, Self::Error> {
        Ok(Self {
            name: row.name,
            status: row.status.parse()?,
            message: row.message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A staged video travelling through the encode queue.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub source_path: PathBuf,
    pub output_dir: PathBuf,
    pub status: EncodingStatus,
    pub updated_at: OffsetDateTime,
}

impl Job {
    /// Builds a pending job. The id is the base name of `source_path`, so two
    /// staged files with the same file name share a status record and an
    /// output namespace.
    pub fn new(source_path: impl Into<PathBuf>, output_root: &Path) -> Option<Self> {
        let source_path = source_path.into();
        let id = source_path.file_name()?.to_str()?.to_string();

        Some(Self {
            output_dir: output_root.join(&id),
            id,
            source_path,
            status: EncodingStatus::Pending,
            updated_at: OffsetDateTime::now_utc(),
        })
    }

    pub fn transition(&mut self, next: EncodingStatus) -> Result<(), (EncodingStatus, EncodingStatus)> {
        if !self.status.can_transition_to(next) {
            return Err((self.status, next));
        }
        self.status = next;
        self.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    pub fn status_record(&self, message: impl Into<String>) -> VideoStatus {
        VideoStatus {
            name: self.id.clone(),
            status: self.status,
            message: message.into(),
            created_at: self.updated_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_is_the_base_name_of_the_staged_file() {
        let job = Job::new("/tmp/stage/abc123.mp4", Path::new("/tmp/hls")).unwrap();

        assert_eq!(job.id, "abc123.mp4");
        assert_eq!(job.output_dir, PathBuf::from("/tmp/hls/abc123.mp4"));
        assert_eq!(job.status, EncodingStatus::Pending);
    }

    #[test]
    fn job_requires_a_file_name() {
        assert!(Job::new("/", Path::new("/tmp/hls")).is_none());
    }

    #[test]
    fn transitions_only_move_forward() {
        let mut job = Job::new("/tmp/a.mp4", Path::new("/tmp/hls")).unwrap();
        let created = job.updated_at;

        assert!(job.transition(EncodingStatus::Success).is_err());
        job.transition(EncodingStatus::Processing).unwrap();
        assert!(job.updated_at >= created);
        assert_eq!(
            job.transition(EncodingStatus::Pending),
            Err((EncodingStatus::Processing, EncodingStatus::Pending))
        );
        job.transition(EncodingStatus::Failed).unwrap();
        assert!(job.transition(EncodingStatus::Processing).is_err());
        assert!(job.transition(EncodingStatus::Success).is_err());
    }

    #[test]
    fn status_round_trips_through_its_text_form() {
        for status in [
            EncodingStatus::Pending,
            EncodingStatus::Processing,
            EncodingStatus::Success,
            EncodingStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<EncodingStatus>(), Ok(status));
        }
        assert!("DRAFT".parse::<EncodingStatus>().is_err());
    }
}
