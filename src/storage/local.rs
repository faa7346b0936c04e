// src/storage/local.rs
//
// Filesystem-backed gateways: a JSON array of run records and a plain
// directory standing in for the bucket. Used for offline runs and tests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use walkdir::WalkDir;

use super::{ObjectStorage, RunRecord, RunRecordStore, StorageError, StorageResult, StoredObject};

// ============================================================================
// RECORD STORE
// ============================================================================

pub struct LocalRecordStore {
    path: PathBuf,
}

impl LocalRecordStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn read_all(&self) -> StorageResult<Vec<RunRecord>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StorageError::io(&self.path, e)),
        }
    }

    async fn write_all(&self, records: &[RunRecord]) -> StorageResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }
        let bytes = serde_json::to_vec_pretty(records)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| StorageError::io(&self.path, e))
    }

    pub async fn records(&self) -> StorageResult<Vec<RunRecord>> {
        self.read_all().await
    }
}

#[async_trait]
impl RunRecordStore for LocalRecordStore {
    async fn most_recent_total(&self) -> StorageResult<i64> {
        Ok(self
            .read_all()
            .await?
            .iter()
            .max_by_key(|r| r.timestamp)
            .map(|r| r.total_count)
            .unwrap_or(0))
    }

    async fn reset_all_totals(&self) -> StorageResult<usize> {
        let mut records = self.read_all().await?;
        for record in records.iter_mut() {
            record.total_count = 0;
        }
        self.write_all(&records).await?;
        Ok(records.len())
    }

    async fn insert_run_record(&self, record: &RunRecord) -> StorageResult<()> {
        let mut records = self.read_all().await?;
        // Same semantics as a document `set`: replace by id
        records.retain(|r| r.run_id != record.run_id);
        records.push(record.clone());
        self.write_all(&records).await
    }

    async fn referenced_sources(&self) -> StorageResult<HashSet<String>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .map(|r| r.video_name)
            .collect())
    }
}

// ============================================================================
// OBJECT STORAGE
// ============================================================================

pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl AsRef<Path>, public_base_url: &str) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn object_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<StoredObject>> {
        let mut objects = Vec::new();
        if !self.root.exists() {
            return Ok(objects);
        }

        for entry in WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !name.starts_with(prefix) {
                continue;
            }
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            objects.push(StoredObject {
                name,
                updated: modified,
            });
        }

        debug!("Listed {} local object(s) under {:?}", objects.len(), prefix);
        Ok(objects)
    }

    async fn download(&self, name: &str, dest: &Path) -> StorageResult<PathBuf> {
        let src = self.object_path(name);
        tokio::fs::copy(&src, dest)
            .await
            .map_err(|e| StorageError::io(&src, e))?;
        Ok(dest.to_path_buf())
    }

    async fn upload(&self, local_path: &Path, dest_name: &str, _content_type: &str) -> StorageResult<String> {
        let dest = self.object_path(dest_name);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }
        tokio::fs::copy(local_path, &dest)
            .await
            .map_err(|e| StorageError::io(local_path, e))?;
        Ok(format!("{}/{}", self.public_base_url, dest_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn record(id: &str, hour: u32, total: i64, video: &str) -> RunRecord {
        let tz = FixedOffset::east_opt(7 * 3600).unwrap();
        RunRecord {
            run_id: id.to_string(),
            timestamp: tz.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap(),
            in_count: 0,
            out_count: 0,
            total_count: total,
            video_name: video.to_string(),
            video_url: String::new(),
        }
    }

    #[tokio::test]
    async fn test_empty_store_baseline_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalRecordStore::new(dir.path().join("records.json"));
        assert_eq!(store.most_recent_total().await.unwrap(), 0);
        assert!(store.referenced_sources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_most_recent_total_uses_latest_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalRecordStore::new(dir.path().join("records.json"));
        store.insert_run_record(&record("late", 10, 7, "videos/b.mp4")).await.unwrap();
        store.insert_run_record(&record("early", 8, 3, "videos/a.mp4")).await.unwrap();

        assert_eq!(store.most_recent_total().await.unwrap(), 7);
        let referenced = store.referenced_sources().await.unwrap();
        assert!(referenced.contains("videos/a.mp4"));
        assert!(referenced.contains("videos/b.mp4"));
    }

    #[tokio::test]
    async fn test_reset_all_totals() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalRecordStore::new(dir.path().join("nested/records.json"));
        store.insert_run_record(&record("r1", 8, 5, "a.mp4")).await.unwrap();
        store.insert_run_record(&record("r2", 9, 6, "b.mp4")).await.unwrap();

        assert_eq!(store.reset_all_totals().await.unwrap(), 2);
        let records = store.records().await.unwrap();
        assert!(records.iter().all(|r| r.total_count == 0));
        assert_eq!(records[0].video_name, "a.mp4", "other fields untouched");
    }

    #[tokio::test]
    async fn test_selects_oldest_unreferenced_source() {
        use std::time::{Duration, SystemTime};

        let dir = tempfile::tempdir().unwrap();
        let bucket = dir.path().join("bucket");
        std::fs::create_dir_all(bucket.join("videos")).unwrap();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        for (name, offset) in [("a.mp4", 0), ("b.mp4", 60), ("c.mp4", 120)] {
            let path = bucket.join("videos").join(name);
            std::fs::write(&path, b"clip").unwrap();
            let file = std::fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(base + Duration::from_secs(offset)).unwrap();
        }

        let records = LocalRecordStore::new(dir.path().join("records.json"));
        records.insert_run_record(&record("r1", 8, 2, "videos/a.mp4")).await.unwrap();
        let objects = LocalObjectStorage::new(&bucket, "http://localhost");

        let picked = super::super::select_unprocessed_source(&records, &objects, "videos/", &["mp4".to_string()])
            .await
            .unwrap();
        assert_eq!(picked.as_deref(), Some("videos/b.mp4"));
    }

    #[tokio::test]
    async fn test_object_roundtrip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = dir.path().join("bucket");
        std::fs::create_dir_all(bucket.join("videos")).unwrap();
        std::fs::write(bucket.join("videos/a.mp4"), b"clip").unwrap();
        std::fs::write(bucket.join("other.txt"), b"x").unwrap();

        let storage = LocalObjectStorage::new(&bucket, "http://localhost:8080/");
        let listed = storage.list_objects("videos/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "videos/a.mp4");

        let local = dir.path().join("latest_video.mp4");
        storage.download("videos/a.mp4", &local).await.unwrap();
        assert_eq!(std::fs::read(&local).unwrap(), b"clip");

        let url = storage
            .upload(&local, "counter_videos/Room901_x.mp4", "video/mp4")
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:8080/counter_videos/Room901_x.mp4");
        assert!(bucket.join("counter_videos/Room901_x.mp4").exists());
    }
}
