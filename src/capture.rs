//! Read and subscribe façade over the capture recorder.

use crate::config::MAX_RECENT_RECORDS;
use crate::error::CaptureError;
use crate::models::{BodyPayload, CaptureRecord, DecodedBody, RecordUpdate};
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

const OCTET_STREAM: &str = "application/octet-stream";

/// Storage for observed transactions.
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Most recent records first, at most `limit` of them.
    async fn records(&self, limit: u32) -> anyhow::Result<Vec<CaptureRecord>>;

    async fn decoded_body(&self, id: &str) -> anyhow::Result<Option<BodyPayload>>;

    fn subscribe(&self) -> broadcast::Receiver<RecordUpdate>;
}

#[derive(Default)]
pub struct CaptureFacade {
    recorder: RwLock<Option<Arc<dyn Recorder>>>,
}

impl CaptureFacade {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the recorder, replacing any previous one.
    pub fn attach(&self, recorder: Arc<dyn Recorder>) {
        let mut slot = self
            .recorder
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(recorder);
    }

    pub fn is_attached(&self) -> bool {
        self.recorder
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn recorder(&self) -> Result<Arc<dyn Recorder>, CaptureError> {
        self.recorder
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CaptureError::RecorderUnavailable)
    }

    pub async fn list_recent(&self, limit: u32) -> Result<Vec<CaptureRecord>, CaptureError> {
        let recorder = self.recorder()?;
        recorder
            .records(limit.min(MAX_RECENT_RECORDS))
            .await
            .map_err(|err| CaptureError::Recorder(err.to_string()))
    }

    pub async fn fetch_body(&self, id: &str) -> Result<DecodedBody, CaptureError> {
        let recorder = self.recorder()?;
        let payload = match recorder.decoded_body(id).await {
            Ok(Some(payload)) if !payload.content.is_empty() => payload,
            Ok(_) => return Err(CaptureError::BodyUnavailable),
            Err(err) => {
                tracing::debug!("Decoding body for {} failed: {:#}", id, err);
                return Err(CaptureError::BodyUnavailable);
            }
        };

        match payload {
            BodyPayload {
                kind,
                mime: Some(mime),
                content,
            } if kind == "image" => Ok(DecodedBody::Raw { mime, content }),
            // Binary bytes are never text; hand them back untouched.
            BodyPayload {
                kind,
                mime,
                content,
            } if kind == "binary" => Ok(DecodedBody::Raw {
                mime: mime.unwrap_or_else(|| OCTET_STREAM.to_string()),
                content,
            }),
            BodyPayload { kind, content, .. } => Ok(DecodedBody::Text {
                id: id.to_string(),
                kind,
                content: String::from_utf8_lossy(&content).into_owned(),
            }),
        }
    }

    /// Invoke `callback` once for every update the recorder emits.
    ///
    /// Must be called from within a Tokio runtime. The listener runs until
    /// the recorder's update channel closes.
    pub fn subscribe_updates<F>(&self, callback: F) -> Result<(), CaptureError>
    where
        F: Fn(RecordUpdate) + Send + Sync + 'static,
    {
        let mut rx = self.recorder()?.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(update) => callback(update),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Update listener lagged, skipped {} updates", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Ok(())
    }
}
