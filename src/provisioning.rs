//! Root certificate provisioning
//!
//! [`CertificateBridge`] makes sure a root CA exists, generating one when it
//! is missing, and opens the certificate folder so the user can install it.
//! Opening the folder is best effort: it runs detached, is not awaited, and
//! never changes the reported outcome.

use crate::error::ProvisionError;
use crate::platform::FolderRevealer;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Certificate authority operations the bridge consumes.
#[async_trait]
pub trait RootCaManager: Send + Sync {
    fn root_ca_exists(&self) -> bool;

    /// Directory holding the root CA files.
    fn certificate_dir(&self) -> PathBuf;

    /// Generate a root CA and return the path of its key file.
    async fn generate_root_ca(&self) -> anyhow::Result<PathBuf>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateOutcome {
    AlreadyPresent { dir: PathBuf },
    Generated { dir: PathBuf },
}

impl CertificateOutcome {
    pub fn dir(&self) -> &Path {
        match self {
            CertificateOutcome::AlreadyPresent { dir } | CertificateOutcome::Generated { dir } => {
                dir
            }
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            CertificateOutcome::AlreadyPresent { .. } => "Root certificate already exists",
            CertificateOutcome::Generated { .. } => {
                "Root certificate generated, open it to install and trust it"
            }
        }
    }
}

pub struct CertificateBridge {
    manager: Arc<dyn RootCaManager>,
    revealer: Arc<dyn FolderRevealer>,
    // Serializes check-then-generate so two callers never both generate.
    lock: Mutex<()>,
}

impl CertificateBridge {
    pub fn new(manager: Arc<dyn RootCaManager>, revealer: Arc<dyn FolderRevealer>) -> Self {
        Self {
            manager,
            revealer,
            lock: Mutex::new(()),
        }
    }

    pub async fn ensure_root_ca(&self) -> Result<CertificateOutcome, ProvisionError> {
        let _guard = self.lock.lock().await;

        let outcome = if self.manager.root_ca_exists() {
            CertificateOutcome::AlreadyPresent {
                dir: self.manager.certificate_dir(),
            }
        } else {
            let key_path = self.manager.generate_root_ca().await.map_err(|err| {
                tracing::error!("Failed to generate root CA: {:#}", err);
                ProvisionError::GenerationFailed(err.to_string())
            })?;
            let dir = key_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.manager.certificate_dir());
            tracing::info!("Root CA generated at {}", dir.display());
            CertificateOutcome::Generated { dir }
        };

        self.reveal(outcome.dir());
        Ok(outcome)
    }

    fn reveal(&self, dir: &Path) {
        let revealer = Arc::clone(&self.revealer);
        let dir = dir.to_path_buf();
        // Detached: a slow file browser must not hold the provisioning lock.
        tokio::task::spawn_blocking(move || {
            if let Err(err) = revealer.reveal(&dir) {
                tracing::warn!("Failed to reveal certificate folder: {:#}", err);
            }
        });
    }
}
