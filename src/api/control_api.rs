//! Caller-facing control surface.
//!
//! [`ControlApi`] bundles one controller session with its rule store, capture
//! façade and certificate bridge, and turns their typed outcomes into the
//! message-carrying replies a UI or CLI shows to the user.

use crate::capture::CaptureFacade;
use crate::config::ControllerConfig;
use crate::error::{CaptureError, LifecycleError, RuleStoreResult};
use crate::models::{CaptureRecord, DecodedBody, RecordUpdate, RuleSetDocument};
use crate::platform::{FolderRevealer, SystemRevealer};
use crate::provisioning::{CertificateBridge, RootCaManager};
use crate::proxy::cert_manager::CertManager;
use crate::proxy::controller::{ProxyController, ProxyStatus, StartOptions};
use crate::proxy::engine::{EngineFactory, ListenerEngineFactory};
use crate::rules::{RuleRegistry, RuleResolver, RuleStore};
use crate::storage::CaptureStore;
use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub const MSG_ALREADY_RUNNING: &str = "Proxy is already running";
pub const MSG_START_SUCCESS: &str = "Proxy started";
pub const MSG_START_FAILED: &str = "Failed to start proxy";
pub const MSG_START_IN_PROGRESS: &str = "Proxy is starting or stopping, try again shortly";
pub const MSG_NOT_RUNNING: &str = "Proxy is not running";
pub const MSG_STOP_SUCCESS: &str = "Proxy stopped";
pub const MSG_CA_FAILED: &str = "Failed to generate root certificate";

/// Install the global `tracing` subscriber.
///
/// Debug builds write to stderr. Release builds write a daily-rolling file
/// under `<storage_path>/logs` (or `./logs` without a storage path). The level
/// comes from `RUST_LOG`. Later calls leave the first subscriber in place.
pub fn init_core(storage_path: Option<&Path>) -> anyhow::Result<()> {
    let level = log_level(std::env::var("RUST_LOG").ok().as_deref());

    #[cfg(debug_assertions)]
    let installed = {
        let _ = storage_path;
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(level)
            .try_init()
            .is_ok()
    };
    #[cfg(not(debug_assertions))]
    let installed = install_file_logging(storage_path, level)?;

    if installed {
        tracing::info!("proxyctl v{} logging at {}", crate::VERSION, level);
    }
    Ok(())
}

#[cfg(not(debug_assertions))]
fn install_file_logging(storage_path: Option<&Path>, level: LevelFilter) -> anyhow::Result<bool> {
    use crate::config::LOG_DIR_NAME;

    let log_dir = match storage_path {
        Some(root) => root.join(LOG_DIR_NAME),
        None => std::path::PathBuf::from(LOG_DIR_NAME),
    };
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let (writer, flush_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "proxyctl"));
    let installed = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(writer)
        .with_max_level(level)
        .try_init()
        .is_ok();
    if installed {
        // The writer flushes on drop; keep it for the life of the process.
        std::mem::forget(flush_guard);
    }
    Ok(installed)
}

/// Level named by a `RUST_LOG` value; unset or unrecognised means `info`.
fn log_level(raw: Option<&str>) -> LevelFilter {
    match raw.map(str::trim) {
        Some(name) if name.eq_ignore_ascii_case("warning") => LevelFilter::WARN,
        Some(name) => name.parse().unwrap_or(LevelFilter::INFO),
        None => LevelFilter::INFO,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartReply {
    pub msg: String,
    pub open: bool,
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub msg: String,
}

impl Reply {
    fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

/// A refused request. `msg` is empty when the operation reports no detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{msg}")]
pub struct Rejection {
    pub msg: String,
}

impl Rejection {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }

    pub fn silent() -> Self {
        Self { msg: String::new() }
    }
}

impl From<LifecycleError> for Rejection {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::StartFailed(reason) => {
                tracing::error!("Proxy start failed: {}", reason);
                Rejection::new(MSG_START_FAILED)
            }
            LifecycleError::StartInProgress => Rejection::new(MSG_START_IN_PROGRESS),
            LifecycleError::NotRunning => Rejection::new(MSG_NOT_RUNNING),
        }
    }
}

/// One control session: the engine slot plus everything it is configured from.
pub struct ControlApi {
    controller: ProxyController,
    store: RuleStore,
    registry: Arc<RuleRegistry>,
    capture: CaptureFacade,
    certificates: CertificateBridge,
    recent_log_limit: u32,
}

impl ControlApi {
    /// Session wired to the listener engine, the on-disk CA, the SQLite
    /// recorder and the platform folder revealer.
    pub fn open(config: ControllerConfig) -> anyhow::Result<Self> {
        let store = RuleStore::from_config(&config);
        store
            .install_bundled_samples()
            .context("installing sample rules")?;
        let recorder = CaptureStore::open(&config.capture_db())?;
        let cert_manager = CertManager::new(config.cert_dir());

        let api = Self::new(
            config,
            Arc::new(ListenerEngineFactory),
            Arc::new(cert_manager),
            Arc::new(SystemRevealer),
        );
        api.capture.attach(Arc::new(recorder));
        Ok(api)
    }

    /// Session with caller-supplied collaborators and no recorder attached.
    pub fn new(
        config: ControllerConfig,
        engines: Arc<dyn EngineFactory>,
        ca: Arc<dyn RootCaManager>,
        revealer: Arc<dyn FolderRevealer>,
    ) -> Self {
        let store = RuleStore::from_config(&config);
        let registry = Arc::new(RuleRegistry::with_builtins());
        let resolver = RuleResolver::new(store.clone(), Arc::clone(&registry));
        let recent_log_limit = config.recent_log_limit;

        Self {
            controller: ProxyController::new(config, resolver, engines),
            store,
            registry,
            capture: CaptureFacade::new(),
            certificates: CertificateBridge::new(ca, revealer),
            recent_log_limit,
        }
    }

    pub fn capture(&self) -> &CaptureFacade {
        &self.capture
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    pub fn rules(&self) -> &RuleStore {
        &self.store
    }

    pub fn config(&self) -> &ControllerConfig {
        self.controller.config()
    }

    // Proxy lifecycle

    pub async fn start_proxy(&self, options: StartOptions) -> Result<StartReply, Rejection> {
        let outcome = self.controller.start(options).await?;
        let msg = if outcome.already_running {
            MSG_ALREADY_RUNNING
        } else {
            MSG_START_SUCCESS
        };
        Ok(StartReply {
            msg: msg.to_string(),
            open: true,
            address: outcome.address,
            port: outcome.port,
        })
    }

    pub fn stop_proxy(&self) -> Result<Reply, Rejection> {
        self.controller.stop()?;
        Ok(Reply::new(MSG_STOP_SUCCESS))
    }

    pub fn status(&self) -> ProxyStatus {
        self.controller.status()
    }

    // Rules

    pub fn read_rules(&self) -> RuleStoreResult<RuleSetDocument> {
        self.store.read_rule_set()
    }

    pub fn save_rules(&self, doc: &RuleSetDocument) -> RuleStoreResult<()> {
        self.store.write_rule_set(doc)
    }

    pub fn fetch_custom_rule(&self, id: &str) -> Result<String, Rejection> {
        self.store.read_custom_rule(id).map_err(|err| {
            tracing::debug!("Custom rule {} unavailable: {}", id, err);
            Rejection::silent()
        })
    }

    pub fn save_custom_rule(&self, id: &str, source: &str) -> RuleStoreResult<()> {
        if let Err(err) = self.registry.build(source) {
            tracing::warn!("Custom rule {} will not load as saved: {:#}", id, err);
        }
        self.store.write_custom_rule(id, source)
    }

    pub fn delete_custom_rule(&self, id: &str) -> RuleStoreResult<()> {
        self.store.delete_custom_rule(id)
    }

    pub fn list_custom_rules(&self) -> RuleStoreResult<Vec<String>> {
        self.store.list_custom_rules()
    }

    pub fn fetch_sample_rule(&self, name: &str) -> Result<String, Rejection> {
        self.store.read_sample_rule(name).map_err(|err| {
            tracing::debug!("Sample rule {} unavailable: {}", name, err);
            Rejection::silent()
        })
    }

    pub fn list_sample_rules(&self) -> RuleStoreResult<Vec<String>> {
        self.store.list_sample_rules()
    }

    // Certificates

    pub async fn generate_root_ca(&self) -> Result<Reply, Rejection> {
        match self.certificates.ensure_root_ca().await {
            Ok(outcome) => Ok(Reply::new(outcome.message())),
            Err(_) => Err(Rejection::new(MSG_CA_FAILED)),
        }
    }

    // Captures

    pub async fn latest_log(&self) -> Result<Vec<CaptureRecord>, Rejection> {
        self.capture
            .list_recent(self.recent_log_limit)
            .await
            .map_err(|err| match err {
                CaptureError::RecorderUnavailable => Rejection::silent(),
                other => Rejection::new(other.to_string()),
            })
    }

    pub async fn fetch_body(&self, id: &str) -> Result<DecodedBody, Rejection> {
        self.capture
            .fetch_body(id)
            .await
            .map_err(|_| Rejection::silent())
    }

    pub fn on_update<F>(&self, callback: F) -> Result<(), CaptureError>
    where
        F: Fn(RecordUpdate) + Send + Sync + 'static,
    {
        self.capture.subscribe_updates(callback)
    }
}
