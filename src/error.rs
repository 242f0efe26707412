//! Error taxonomy for the control layer.
//!
//! Lifecycle, rule-store, capture and provisioning failures each get their own
//! enum so callers can match on the outcome they care about. Plumbing with no
//! caller-facing meaning stays on `anyhow`.

use thiserror::Error;

/// Errors from starting or stopping the proxy engine.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The engine reported an error, timed out, or went away before it was ready.
    #[error("proxy failed to start: {0}")]
    StartFailed(String),

    /// Another start or stop is still settling.
    #[error("proxy is already starting or stopping")]
    StartInProgress,

    /// Stop was requested with no engine running.
    #[error("proxy is not running")]
    NotRunning,
}

/// Errors from reading or writing persisted rules.
#[derive(Debug, Error)]
pub enum RuleStoreError {
    /// No rule or sample file exists under that name.
    #[error("not found: {0}")]
    NotFound(String),

    /// The identifier would not map to a single file inside the rule directory.
    #[error("invalid rule identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the capture façade.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No recorder has been attached yet.
    #[error("recorder unavailable")]
    RecorderUnavailable,

    /// The record has no decodable body.
    #[error("body unavailable")]
    BodyUnavailable,

    /// The recorder itself failed.
    #[error("recorder error: {0}")]
    Recorder(String),
}

/// Errors from root certificate provisioning.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("root CA generation failed: {0}")]
    GenerationFailed(String),
}

pub type RuleStoreResult<T> = std::result::Result<T, RuleStoreError>;
