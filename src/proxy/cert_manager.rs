use crate::provisioning::RootCaManager;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};
use std::fs;
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};

pub const CA_CERT_FILE_NAME: &str = "proxyctl_ca.pem";
pub const CA_KEY_FILE_NAME: &str = "proxyctl_ca.key";

/// Root CA stored as a PEM certificate and key pair in one directory.
#[derive(Debug, Clone)]
pub struct CertManager {
    cert_dir: PathBuf,
}

impl CertManager {
    pub fn new(cert_dir: impl Into<PathBuf>) -> Self {
        Self {
            cert_dir: cert_dir.into(),
        }
    }

    pub fn ca_cert_path(&self) -> PathBuf {
        self.cert_dir.join(CA_CERT_FILE_NAME)
    }

    pub fn ca_key_path(&self) -> PathBuf {
        self.cert_dir.join(CA_KEY_FILE_NAME)
    }

    pub fn exists(&self) -> bool {
        self.ca_cert_path().exists() && self.ca_key_path().exists()
    }

    /// Read the stored CA certificate, checking that it still parses as a CA.
    pub fn root_ca_pem(&self) -> anyhow::Result<String> {
        let ca_cert_pem = fs::read_to_string(self.ca_cert_path())
            .context("Failed to read CA certificate file")?;
        let ca_key_pem =
            fs::read_to_string(self.ca_key_path()).context("Failed to read CA key file")?;
        KeyPair::from_pem(&ca_key_pem).context("Failed to parse CA key")?;
        CertificateParams::from_ca_cert_pem(&ca_cert_pem).context("Invalid CA PEM")?;
        Ok(ca_cert_pem)
    }

    /// Generate a fresh root CA, overwriting any previous one, and return the
    /// path of the new key file.
    pub fn generate(&self) -> anyhow::Result<PathBuf> {
        let (ca_cert, ca_key) = Self::generate_root()?;

        if !self.cert_dir.exists() {
            fs::create_dir_all(&self.cert_dir)
                .context("Failed to create cert storage directory")?;
        }

        let key_path = self.ca_key_path();
        fs::write(self.ca_cert_path(), ca_cert.pem()).context("Failed to write CA certificate")?;
        write_private(&key_path, &ca_key.serialize_pem()).context("Failed to write CA key")?;

        tracing::info!("Root CA generated in {}", self.cert_dir.display());
        Ok(key_path)
    }

    fn generate_root() -> anyhow::Result<(Certificate, KeyPair)> {
        // Hostname and date make the CA recognisable in a trust store
        let hostname = gethostname::gethostname().to_string_lossy().to_string();
        let now = OffsetDateTime::now_utc();
        let date_str = format!(
            "{:04}-{:02}-{:02}",
            now.year(),
            now.month() as u8,
            now.day()
        );
        let common_name = format!("proxyctl CA ({}, {})", hostname, date_str);

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        dn.push(DnType::OrganizationName, "proxyctl");

        let mut params = CertificateParams::default();
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.not_before = now.checked_sub(Duration::hours(1)).unwrap_or(now);
        params.not_after = now.checked_add(Duration::days(365 * 10)).unwrap_or(now);

        let key_pair = KeyPair::generate().context("Failed to generate CA key")?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| anyhow!("Failed to self-sign CA certificate: {e}"))?;
        Ok((cert, key_pair))
    }
}

fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[async_trait]
impl RootCaManager for CertManager {
    fn root_ca_exists(&self) -> bool {
        self.exists()
    }

    fn certificate_dir(&self) -> PathBuf {
        self.cert_dir.clone()
    }

    async fn generate_root_ca(&self) -> anyhow::Result<PathBuf> {
        let manager = self.clone();
        tokio::task::spawn_blocking(move || manager.generate())
            .await
            .context("CA generation task failed")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generates_ca_files_that_read_back() {
        let dir = tempdir().unwrap();
        let manager = CertManager::new(dir.path().join("certificates"));
        assert!(!manager.exists());

        let key_path = manager.generate().expect("generate CA");
        assert_eq!(key_path, manager.ca_key_path());
        assert!(manager.exists());

        let pem = manager.root_ca_pem().expect("stored CA parses");
        assert!(pem.contains("BEGIN CERTIFICATE"));
    }

    #[tokio::test]
    async fn async_generation_goes_through_the_trait() {
        let dir = tempdir().unwrap();
        let manager = CertManager::new(dir.path());
        let key_path = manager.generate_root_ca().await.expect("generate CA");
        assert_eq!(key_path.parent(), Some(dir.path()));
        assert!(manager.root_ca_exists());
    }

    #[test]
    fn half_written_ca_does_not_count_as_existing() {
        let dir = tempdir().unwrap();
        let manager = CertManager::new(dir.path());
        fs::write(manager.ca_cert_path(), "pem").unwrap();
        assert!(!manager.exists());
        assert!(manager.root_ca_pem().is_err());
    }
}
