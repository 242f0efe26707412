//! Captured transaction models
//!
//! These are owned by the recorder; the control layer only reads them.

use serde::{Deserialize, Serialize};

/// Summary of one captured transaction, as listed in the recent log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub id: String,
    /// Milliseconds since epoch
    pub started_at: i64,
    pub method: String,
    pub url: String,
    pub status_code: Option<u16>,
    /// Response mime type, if the upstream sent one
    pub mime: Option<String>,
    /// Response body size in bytes
    pub body_size: u64,
}

/// Decoded response body as handed back by a recorder.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyPayload {
    /// Content classification such as `image`, `json` or `text`
    pub kind: String,
    pub mime: Option<String>,
    pub content: Vec<u8>,
}

/// Body returned to callers of the capture façade.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum DecodedBody {
    /// Image content, passed through untouched
    Raw { mime: String, content: Vec<u8> },
    /// Everything else, decoded as text
    Text {
        id: String,
        #[serde(rename = "type")]
        kind: String,
        content: String,
    },
}

/// Pushed by the recorder each time a record is stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordUpdate {
    pub record: CaptureRecord,
}
