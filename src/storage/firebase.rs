// src/storage/firebase.rs
//
// Firestore (REST v1) record store and Cloud Storage (JSON API) object
// gateway. Both authenticate with an OAuth2 bearer token read from the
// environment once at construction.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{ObjectStorage, RunRecord, RunRecordStore, StorageError, StorageResult, StoredObject};
use crate::types::FirebaseConfig;

const FIRESTORE_API: &str = "https://firestore.googleapis.com/v1";
const STORAGE_API: &str = "https://storage.googleapis.com/storage/v1";
const STORAGE_UPLOAD_API: &str = "https://storage.googleapis.com/upload/storage/v1";
const STORAGE_PUBLIC: &str = "https://storage.googleapis.com";
const PAGE_SIZE: u32 = 300;

// ============================================================================
// SHARED HTTP
// ============================================================================

struct RestClient {
    http: reqwest::Client,
    token: String,
}

impl RestClient {
    fn new(config: &FirebaseConfig) -> StorageResult<Self> {
        let token = std::env::var(&config.access_token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| StorageError::MissingCredentials(config.access_token_env.clone()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StorageError::Transport {
                url: String::from("<client builder>"),
                source: e,
            })?;

        Ok(Self { http, token })
    }

    /// Send with auth and turn non-2xx into `StorageError::Status`.
    async fn send(&self, url: &str, request: RequestBuilder) -> StorageResult<Response> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| StorageError::Transport {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(StorageError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        request: RequestBuilder,
    ) -> StorageResult<T> {
        let response = self.send(url, request).await?;
        response.json::<T>().await.map_err(|e| StorageError::Transport {
            url: url.to_string(),
            source: e,
        })
    }
}

// ============================================================================
// FIRESTORE
// ============================================================================

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<Document>,
}

/// Firestore encodes 64-bit integers as decimal strings.
fn integer_field(fields: &HashMap<String, Value>, key: &str) -> Option<i64> {
    let value = fields.get(key)?;
    if let Some(v) = value.get("integerValue") {
        return match v {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        };
    }
    // Tolerate documents written by clients that stored a float
    value.get("doubleValue").and_then(Value::as_f64).map(|f| f as i64)
}

fn string_field<'a>(fields: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key)?.get("stringValue")?.as_str()
}

fn integer_value(v: i64) -> Value {
    json!({ "integerValue": v.to_string() })
}

fn string_value(v: &str) -> Value {
    json!({ "stringValue": v })
}

/// `timestamp` stays a string in the site offset: the collection already
/// holds string timestamps, and Firestore orders by type before value, so
/// mixing in `timestampValue`s would break the latest-total query.
fn encode_record(record: &RunRecord) -> Value {
    json!({
        "fields": {
            "timestamp": string_value(&record.timestamp.to_rfc3339()),
            "in": integer_value(record.in_count as i64),
            "out": integer_value(record.out_count as i64),
            "total_count": integer_value(record.total_count),
            "video_name": string_value(&record.video_name),
            "video_url": string_value(&record.video_url),
        }
    })
}

fn latest_total_query(collection: &str) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "orderBy": [{
                "field": { "fieldPath": "timestamp" },
                "direction": "DESCENDING"
            }],
            "limit": 1
        }
    })
}

pub struct FirestoreRecordStore {
    client: RestClient,
    documents_url: String,
    collection: String,
}

impl FirestoreRecordStore {
    pub fn new(config: &FirebaseConfig) -> StorageResult<Self> {
        Ok(Self {
            client: RestClient::new(config)?,
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                FIRESTORE_API, config.project_id
            ),
            collection: config.collection.clone(),
        })
    }

    async fn list_documents(&self) -> StorageResult<Vec<Document>> {
        let url = format!("{}/{}", self.documents_url, self.collection);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }
            let page: ListDocumentsResponse = self
                .client
                .send_json(&url, self.client.http.get(&url).query(&query))
                .await?;
            documents.extend(page.documents);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Listed {} document(s) in {}", documents.len(), self.collection);
        Ok(documents)
    }
}

#[async_trait]
impl RunRecordStore for FirestoreRecordStore {
    async fn most_recent_total(&self) -> StorageResult<i64> {
        let url = format!("{}:runQuery", self.documents_url);
        let items: Vec<RunQueryItem> = self
            .client
            .send_json(
                &url,
                self.client
                    .http
                    .post(&url)
                    .json(&latest_total_query(&self.collection)),
            )
            .await?;

        let total = items
            .into_iter()
            .find_map(|item| item.document)
            .and_then(|doc| integer_field(&doc.fields, "total_count"))
            .unwrap_or(0);
        Ok(total)
    }

    async fn reset_all_totals(&self) -> StorageResult<usize> {
        let documents = self.list_documents().await?;
        let body = json!({ "fields": { "total_count": integer_value(0) } });

        for doc in &documents {
            let url = format!("{}/{}", FIRESTORE_API, doc.name);
            self.client
                .send(
                    &url,
                    self.client
                        .http
                        .patch(&url)
                        .query(&[("updateMask.fieldPaths", "total_count")])
                        .json(&body),
                )
                .await?;
        }
        Ok(documents.len())
    }

    async fn insert_run_record(&self, record: &RunRecord) -> StorageResult<()> {
        let url = format!("{}/{}/{}", self.documents_url, self.collection, record.run_id);
        self.client
            .send(&url, self.client.http.patch(&url).json(&encode_record(record)))
            .await?;
        info!("Stored run record {}/{}", self.collection, record.run_id);
        Ok(())
    }

    async fn referenced_sources(&self) -> StorageResult<HashSet<String>> {
        Ok(self
            .list_documents()
            .await?
            .iter()
            .filter_map(|doc| string_field(&doc.fields, "video_name"))
            .map(str::to_string)
            .collect())
    }
}

// ============================================================================
// CLOUD STORAGE
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectListResponse {
    #[serde(default)]
    items: Vec<GcsObject>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GcsObject {
    name: String,
    updated: DateTime<Utc>,
}

pub struct FirebaseStorage {
    client: RestClient,
    bucket: String,
}

impl FirebaseStorage {
    pub fn new(config: &FirebaseConfig) -> StorageResult<Self> {
        Ok(Self {
            client: RestClient::new(config)?,
            bucket: config.bucket.clone(),
        })
    }

    /// `.../b/{bucket}/o/{name}` with the object name as a single
    /// percent-encoded path segment.
    fn object_url(&self, name: &str) -> StorageResult<Url> {
        let mut url = Url::parse(STORAGE_API)
            .map_err(|e| StorageError::Malformed(format!("bad API base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::Malformed("API base cannot be a base".to_string()))?
            .extend(["b", self.bucket.as_str(), "o", name]);
        Ok(url)
    }

    fn public_url(&self, name: &str) -> String {
        format!("{}/{}/{}", STORAGE_PUBLIC, self.bucket, name)
    }
}

#[async_trait]
impl ObjectStorage for FirebaseStorage {
    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<StoredObject>> {
        let url = format!("{}/b/{}/o", STORAGE_API, self.bucket);
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = vec![("prefix", prefix.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }
            let page: ObjectListResponse = self
                .client
                .send_json(&url, self.client.http.get(&url).query(&query))
                .await?;
            objects.extend(page.items.into_iter().map(|o| StoredObject {
                name: o.name,
                updated: o.updated,
            }));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(objects)
    }

    async fn download(&self, name: &str, dest: &Path) -> StorageResult<PathBuf> {
        let mut url = self.object_url(name)?;
        url.query_pairs_mut().append_pair("alt", "media");
        let url_str = url.to_string();

        let response = self
            .client
            .send(&url_str, self.client.http.get(url))
            .await?;
        let bytes = response.bytes().await.map_err(|e| StorageError::Transport {
            url: url_str,
            source: e,
        })?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| StorageError::io(dest, e))?;

        info!("⬇️  Downloaded gs://{}/{} ({} bytes)", self.bucket, name, bytes.len());
        Ok(dest.to_path_buf())
    }

    async fn upload(&self, local_path: &Path, dest_name: &str, content_type: &str) -> StorageResult<String> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| StorageError::io(local_path, e))?;
        let size = body.len();

        let url = format!("{}/b/{}/o", STORAGE_UPLOAD_API, self.bucket);
        self.client
            .send(
                &url,
                self.client
                    .http
                    .post(&url)
                    .query(&[
                        ("uploadType", "media"),
                        ("name", dest_name),
                        ("predefinedAcl", "publicRead"),
                    ])
                    .header(reqwest::header::CONTENT_TYPE, content_type)
                    .body(body),
            )
            .await?;

        let public = self.public_url(dest_name);
        info!("⬆️  Uploaded {} ({} bytes) -> {}", local_path.display(), size, public);
        Ok(public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn fields(v: Value) -> HashMap<String, Value> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_integer_field_parses_string_encoding() {
        let f = fields(json!({
            "total_count": { "integerValue": "12" },
            "legacy": { "doubleValue": 3.0 },
            "name": { "stringValue": "x" }
        }));
        assert_eq!(integer_field(&f, "total_count"), Some(12));
        assert_eq!(integer_field(&f, "legacy"), Some(3));
        assert_eq!(integer_field(&f, "name"), None);
        assert_eq!(integer_field(&f, "missing"), None);
        assert_eq!(string_field(&f, "name"), Some("x"));
    }

    #[test]
    fn test_run_query_response_with_and_without_document() {
        let empty: Vec<RunQueryItem> =
            serde_json::from_value(json!([{ "readTime": "2025-03-01T00:00:00Z" }])).unwrap();
        assert!(empty.into_iter().find_map(|i| i.document).is_none());

        let hit: Vec<RunQueryItem> = serde_json::from_value(json!([{
            "document": {
                "name": "projects/p/databases/(default)/documents/people_counter/r1",
                "fields": { "total_count": { "integerValue": "5" } }
            },
            "readTime": "2025-03-01T00:00:00Z"
        }]))
        .unwrap();
        let doc = hit.into_iter().find_map(|i| i.document).unwrap();
        assert_eq!(integer_field(&doc.fields, "total_count"), Some(5));
    }

    #[test]
    fn test_encode_record_fields() {
        let tz = FixedOffset::east_opt(7 * 3600).unwrap();
        let record = RunRecord {
            run_id: "2025-03-01_080000".to_string(),
            timestamp: tz.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
            in_count: 2,
            out_count: 1,
            total_count: -1,
            video_name: "videos/a.mp4".to_string(),
            video_url: "https://storage.googleapis.com/b/counter_videos/x.mp4".to_string(),
        };
        let doc = encode_record(&record);
        assert_eq!(doc["fields"]["in"]["integerValue"], "2");
        assert_eq!(doc["fields"]["total_count"]["integerValue"], "-1");
        assert_eq!(doc["fields"]["video_name"]["stringValue"], "videos/a.mp4");
        assert_eq!(doc["fields"]["timestamp"]["stringValue"], "2025-03-01T08:00:00+07:00");
        assert!(doc["fields"]["timestamp"].get("timestampValue").is_none());
    }

    #[test]
    fn test_string_timestamps_sort_chronologically() {
        // The latest-total query orders these as strings; one fixed offset
        // keeps lexical and chronological order the same.
        let tz = FixedOffset::east_opt(7 * 3600).unwrap();
        let encoded = |d: u32, h: u32| {
            let record = RunRecord {
                run_id: String::new(),
                timestamp: tz.with_ymd_and_hms(2025, 3, d, h, 0, 0).unwrap(),
                in_count: 0,
                out_count: 0,
                total_count: 0,
                video_name: String::new(),
                video_url: String::new(),
            };
            encode_record(&record)["fields"]["timestamp"]["stringValue"]
                .as_str()
                .unwrap()
                .to_string()
        };
        let legacy = "2025-03-01T08:00:00+07:00".to_string();
        let mut stamps = vec![encoded(2, 9), legacy.clone(), encoded(1, 23), encoded(2, 10)];
        stamps.sort();
        assert_eq!(stamps.first(), Some(&legacy));
        assert_eq!(stamps.last(), Some(&encoded(2, 10)));
    }

    #[test]
    fn test_object_listing_parses() {
        let page: ObjectListResponse = serde_json::from_value(json!({
            "kind": "storage#objects",
            "items": [
                { "name": "videos/a.mp4", "updated": "2025-03-01T08:00:00.123Z", "size": "10" }
            ],
            "nextPageToken": "abc"
        }))
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "videos/a.mp4");
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));

        let empty: ObjectListResponse = serde_json::from_value(json!({ "kind": "storage#objects" })).unwrap();
        assert!(empty.items.is_empty());
    }
}
