use crate::capture::Recorder;
use crate::models::{BodyPayload, CaptureRecord, RecordUpdate};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

pub const CAPTURE_UPDATE_CAPACITY: usize = 256;

/// A transaction observed by the engine, before it is stored.
#[derive(Debug, Clone, Default)]
pub struct NewCapture {
    pub method: String,
    pub url: String,
    pub status_code: Option<u16>,
    pub mime: Option<String>,
    pub body: Vec<u8>,
}

/// SQLite-backed recorder. Every stored record is broadcast to subscribers.
pub struct CaptureStore {
    db: Arc<Mutex<Connection>>,
    updates: broadcast::Sender<RecordUpdate>,
}

impl CaptureStore {
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(dir) = db_path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating storage directory {:?}", dir))?;
            }
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening database at {:?}", db_path))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS captures (
                id TEXT PRIMARY KEY,
                started_at INTEGER NOT NULL,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                status INTEGER,
                mime TEXT,
                body BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_captures_started_at
                ON captures(started_at DESC);
            ",
        )?;

        let (updates, _) = broadcast::channel(CAPTURE_UPDATE_CAPACITY);
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            updates,
        })
    }

    pub async fn add_record(&self, capture: NewCapture) -> anyhow::Result<CaptureRecord> {
        let record = CaptureRecord {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now().timestamp_millis(),
            method: capture.method,
            url: capture.url,
            status_code: capture.status_code,
            mime: capture.mime,
            body_size: capture.body.len() as u64,
        };

        let db = Arc::clone(&self.db);
        let row = record.clone();
        tokio::task::spawn_blocking(move || {
            let conn = lock(&db)?;
            conn.execute(
                "INSERT INTO captures (id, started_at, method, url, status, mime, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    row.id,
                    row.started_at,
                    row.method,
                    row.url,
                    row.status_code.map(|s| s as i64),
                    row.mime,
                    capture.body
                ],
            )
            .context("inserting capture")
        })
        .await??;

        // No subscribers is fine.
        let _ = self.updates.send(RecordUpdate {
            record: record.clone(),
        });
        Ok(record)
    }
}

fn lock(db: &Mutex<Connection>) -> anyhow::Result<MutexGuard<'_, Connection>> {
    db.lock().map_err(|e| anyhow!("db mutex poisoned: {}", e))
}

/// Content class of a response, derived from its mime type.
pub fn classify_mime(mime: Option<&str>) -> &'static str {
    let Some(mime) = mime else {
        return "binary";
    };
    let essence = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence.starts_with("image/") {
        "image"
    } else if essence == "application/json" || essence.ends_with("+json") {
        "json"
    } else if essence == "text/html" {
        "html"
    } else if essence == "text/css" {
        "css"
    } else if essence.contains("javascript") || essence == "application/ecmascript" {
        "js"
    } else if essence.starts_with("text/") || essence.ends_with("+xml") || essence.ends_with("/xml")
    {
        "text"
    } else {
        "binary"
    }
}

#[async_trait]
impl Recorder for CaptureStore {
    async fn records(&self, limit: u32) -> anyhow::Result<Vec<CaptureRecord>> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = lock(&db)?;
            let mut stmt = conn.prepare(
                "SELECT id, started_at, method, url, status, mime, length(body)
                 FROM captures ORDER BY started_at DESC, rowid DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                Ok(CaptureRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    method: row.get(2)?,
                    url: row.get(3)?,
                    status_code: row.get::<_, Option<i64>>(4)?.map(|s| s as u16),
                    mime: row.get(5)?,
                    body_size: row.get::<_, i64>(6)?.max(0) as u64,
                })
            })?;
            let mut out = Vec::new();
            for record in rows {
                out.push(record?);
            }
            Ok::<_, anyhow::Error>(out)
        })
        .await?
    }

    async fn decoded_body(&self, id: &str) -> anyhow::Result<Option<BodyPayload>> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = lock(&db)?;
            let row = conn
                .query_row(
                    "SELECT mime, body FROM captures WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Vec<u8>>(1)?)),
                )
                .optional()?;
            Ok::<_, anyhow::Error>(row.map(|(mime, content)| BodyPayload {
                kind: classify_mime(mime.as_deref()).to_string(),
                mime,
                content,
            }))
        })
        .await?
    }

    fn subscribe(&self) -> broadcast::Receiver<RecordUpdate> {
        self.updates.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn capture(url: &str, mime: Option<&str>, body: &[u8]) -> NewCapture {
        NewCapture {
            method: "GET".to_string(),
            url: url.to_string(),
            status_code: Some(200),
            mime: mime.map(str::to_string),
            body: body.to_vec(),
        }
    }

    #[tokio::test]
    async fn records_are_listed_newest_first() {
        let dir = tempdir().expect("temp dir");
        let store = CaptureStore::open(&dir.path().join("captures.sqlite")).expect("store opens");

        for i in 0..3 {
            store
                .add_record(capture(&format!("https://example.com/{i}"), None, b"x"))
                .await
                .expect("add ok");
        }

        let records = store.records(2).await.expect("list ok");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].url, "https://example.com/2");
        assert_eq!(records[1].url, "https://example.com/1");
        assert_eq!(records[0].body_size, 1);
    }

    #[tokio::test]
    async fn bodies_are_classified_by_mime() {
        let dir = tempdir().expect("temp dir");
        let store = CaptureStore::open(&dir.path().join("captures.sqlite")).expect("store opens");

        let json = store
            .add_record(capture("https://api.example.com", Some("application/json; charset=utf-8"), b"{}"))
            .await
            .unwrap();
        let body = store.decoded_body(&json.id).await.unwrap().expect("body present");
        assert_eq!(body.kind, "json");
        assert_eq!(body.content, b"{}");

        let png = store
            .add_record(capture("https://cdn.example.com/a.png", Some("image/png"), &[0x89, b'P']))
            .await
            .unwrap();
        let body = store.decoded_body(&png.id).await.unwrap().expect("body present");
        assert_eq!(body.kind, "image");
        assert_eq!(body.mime.as_deref(), Some("image/png"));

        assert!(store.decoded_body("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stored_records_are_broadcast() {
        let dir = tempdir().expect("temp dir");
        let store = CaptureStore::open(&dir.path().join("captures.sqlite")).expect("store opens");
        let mut rx = store.subscribe();

        let stored = store
            .add_record(capture("https://example.com", Some("text/html"), b"<p>"))
            .await
            .unwrap();
        let update = rx.recv().await.expect("update delivered");
        assert_eq!(update.record, stored);
    }

    #[test]
    fn classifies_common_mime_types() {
        assert_eq!(classify_mime(Some("text/html; charset=utf-8")), "html");
        assert_eq!(classify_mime(Some("text/css")), "css");
        assert_eq!(classify_mime(Some("application/javascript")), "js");
        assert_eq!(classify_mime(Some("application/problem+json")), "json");
        assert_eq!(classify_mime(Some("text/plain")), "text");
        assert_eq!(classify_mime(Some("IMAGE/JPEG")), "image");
        assert_eq!(classify_mime(Some("application/octet-stream")), "binary");
        assert_eq!(classify_mime(None), "binary");
    }
}
