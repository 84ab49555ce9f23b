//! In-memory stand-ins for the encode queue's collaborators.

use crate::infrastructure::storage::s3::{ObjectStorage, StorageError, StoredObject};
use crate::infrastructure::transcoder::ffmpeg::MASTER_PLAYLIST;
use crate::infrastructure::transcoder::{TranscodeError, Transcoder};
use crate::modules::media::model::{EncodingStatus, VideoStatus};
use crate::modules::media::repository::{StatusStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub fn stage(dir: &Path, name: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, b"not really a video").unwrap();
    path
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[derive(Default)]
pub struct InMemoryStatusStore {
    records: Mutex<HashMap<String, VideoStatus>>,
    history: Mutex<Vec<(String, EncodingStatus)>>,
    failing: Mutex<Option<EncodingStatus>>,
}

impl InMemoryStatusStore {
    /// Rejects every write of `status`.
    pub fn fail_on(&self, status: EncodingStatus) {
        *self.failing.lock().unwrap() = Some(status);
    }

    pub fn get(&self, name: &str) -> Option<VideoStatus> {
        self.records.lock().unwrap().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn history_of(&self, name: &str) -> Vec<EncodingStatus> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn processing_order(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, status)| *status == EncodingStatus::Processing)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn upsert(&self, record: &VideoStatus) -> Result<(), StoreError> {
        if *self.failing.lock().unwrap() == Some(record.status) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut records = self.records.lock().unwrap();
        let mut record = record.clone();
        if let Some(existing) = records.get(&record.name) {
            record.created_at = existing.created_at;
        }
        self.history
            .lock()
            .unwrap()
            .push((record.name.clone(), record.status));
        records.insert(record.name.clone(), record);
        Ok(())
    }

    async fn find(&self, name: &str) -> Result<Option<VideoStatus>, StoreError> {
        Ok(self.get(name))
    }
}

#[derive(Clone)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    /// Writes nothing at all.
    Empty,
    Hang,
    /// Succeeds once the gate is notified.
    WaitFor(Arc<Notify>),
}

#[derive(Default)]
pub struct FakeTranscoder {
    behaviors: Mutex<HashMap<String, Behavior>>,
    started: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeTranscoder {
    pub fn set(&self, file_name: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(file_name.to_string(), behavior);
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn run(&self, behavior: Behavior, output_dir: &Path) -> Result<(), TranscodeError> {
        match behavior {
            Behavior::Succeed => write_hls_tree(output_dir).await,
            Behavior::Fail => Err(TranscodeError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "Invalid data found when processing input".to_string(),
            }),
            Behavior::Panic => panic!("transcoder blew up"),
            Behavior::Empty => {
                tokio::fs::create_dir_all(output_dir).await?;
                Ok(())
            }
            Behavior::Hang => std::future::pending().await,
            Behavior::WaitFor(gate) => {
                gate.notified().await;
                write_hls_tree(output_dir).await
            }
        }
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(&self, input: &Path, output_dir: &Path) -> Result<(), TranscodeError> {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or(Behavior::Succeed);
        self.started.lock().unwrap().push(name);

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        self.run(behavior, output_dir).await
    }
}

async fn write_hls_tree(output_dir: &Path) -> Result<(), TranscodeError> {
    let variant = output_dir.join("v0");
    tokio::fs::create_dir_all(&variant).await?;
    tokio::fs::write(
        output_dir.join(MASTER_PLAYLIST),
        "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nv0/prog_index.m3u8\n",
    )
    .await?;
    tokio::fs::write(variant.join("prog_index.m3u8"), "#EXTM3U\nfileSequence0.ts\n").await?;
    tokio::fs::write(variant.join("fileSequence0.ts"), [0x47u8; 188]).await?;
    Ok(())
}

#[derive(Default)]
pub struct FakeStorage {
    uploads: Mutex<Vec<(String, String)>>,
    fail_suffix: Mutex<Option<String>>,
}

impl FakeStorage {
    pub fn fail_on(&self, key_suffix: &str) {
        *self.fail_suffix.lock().unwrap() = Some(key_suffix.to_string());
    }

    /// `(key, content type)` of every successful upload.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let failing = self.fail_suffix.lock().unwrap().clone();
        if failing.is_some_and(|suffix| key.ends_with(&suffix)) {
            return Err(StorageError::UploadFailed(format!("{}: connection reset", key)));
        }
        tokio::fs::metadata(path).await?;

        self.uploads
            .lock()
            .unwrap()
            .push((key.to_string(), content_type.to_string()));
        Ok(StoredObject {
            key: key.to_string(),
            url: format!("https://cdn.test/{}", key),
        })
    }
}
