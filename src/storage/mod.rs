// src/storage/mod.rs
//
// Persistence and object-storage gateways. Only the run coordinator and
// the scheduled reset talk to these; the counting core never does I/O.

pub mod firebase;
pub mod local;
pub mod record;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

pub use firebase::{FirebaseStorage, FirestoreRecordStore};
pub use local::{LocalObjectStorage, LocalRecordStore};
pub use record::RunRecord;

use crate::types::StorageConfig;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("HTTP request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Malformed remote document: {0}")]
    Malformed(String),

    #[error("Missing credentials: environment variable {0} is not set")]
    MissingCredentials(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

// ============================================================================
// GATEWAYS
// ============================================================================

/// Document store of per-run records.
#[async_trait]
pub trait RunRecordStore: Send + Sync {
    /// `total_count` of the most recent record, 0 if there is none.
    async fn most_recent_total(&self) -> StorageResult<i64>;

    /// Zero `total_count` on every record. Returns how many were touched.
    async fn reset_all_totals(&self) -> StorageResult<usize>;

    async fn insert_run_record(&self, record: &RunRecord) -> StorageResult<()>;

    /// Source names already consumed by a run.
    async fn referenced_sources(&self) -> StorageResult<HashSet<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub name: String,
    pub updated: DateTime<Utc>,
}

/// Blob storage for source clips and published results.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<StoredObject>>;

    async fn download(&self, name: &str, dest: &Path) -> StorageResult<PathBuf>;

    /// Upload and make public. Returns the public URL.
    async fn upload(&self, local_path: &Path, dest_name: &str, content_type: &str)
        -> StorageResult<String>;
}

/// Build both gateways for the configured backend.
pub fn from_config(
    config: &StorageConfig,
) -> StorageResult<(Box<dyn RunRecordStore>, Box<dyn ObjectStorage>)> {
    match config {
        StorageConfig::Firebase(fb) => {
            info!(
                "Storage backend: firebase (project={}, bucket={}, collection={})",
                fb.project_id, fb.bucket, fb.collection
            );
            Ok((
                Box::new(FirestoreRecordStore::new(fb)?),
                Box::new(FirebaseStorage::new(fb)?),
            ))
        }
        StorageConfig::Local(local) => {
            info!(
                "Storage backend: local (records={}, objects={})",
                local.records_path, local.objects_dir
            );
            Ok((
                Box::new(LocalRecordStore::new(&local.records_path)),
                Box::new(LocalObjectStorage::new(
                    &local.objects_dir,
                    &local.public_base_url,
                )),
            ))
        }
    }
}

// ============================================================================
// SOURCE SELECTION
// ============================================================================

/// Names with an accepted extension that no record references yet,
/// oldest modification first.
pub fn unreferenced_sources(
    mut objects: Vec<StoredObject>,
    referenced: &HashSet<String>,
    extensions: &[String],
) -> Vec<String> {
    objects.sort_by(|a, b| a.updated.cmp(&b.updated).then_with(|| a.name.cmp(&b.name)));
    objects
        .into_iter()
        .filter(|o| extensions.iter().any(|ext| o.name.ends_with(&format!(".{}", ext))))
        .filter(|o| !referenced.contains(&o.name))
        .map(|o| o.name)
        .collect()
}

pub async fn list_unreferenced_sources(
    records: &dyn RunRecordStore,
    objects: &dyn ObjectStorage,
    prefix: &str,
    extensions: &[String],
) -> StorageResult<Vec<String>> {
    let referenced = records.referenced_sources().await?;
    let listed = objects.list_objects(prefix).await?;
    debug!(
        "{} object(s) under {:?}, {} already referenced",
        listed.len(),
        prefix,
        referenced.len()
    );
    Ok(unreferenced_sources(listed, &referenced, extensions))
}

/// The next clip to process, if any.
pub async fn select_unprocessed_source(
    records: &dyn RunRecordStore,
    objects: &dyn ObjectStorage,
    prefix: &str,
    extensions: &[String],
) -> StorageResult<Option<String>> {
    Ok(list_unreferenced_sources(records, objects, prefix, extensions)
        .await?
        .into_iter()
        .next())
}
