//! On-disk rule persistence
//!
//! Layout under the data directory:
//!
//! ```text
//! rules.json                      rule-set document (JSON array)
//! rule_custom/custom_<id>.json    one custom rule source per identifier
//! rule_sample/sample_<name>.json  bundled samples, installed if missing
//! ```
//!
//! Writes overwrite in place. A crash mid-write can leave a truncated file;
//! rules are developer-edited config, so nothing here is transactional.

use crate::config::ControllerConfig;
use crate::error::{RuleStoreError, RuleStoreResult};
use crate::models::RuleSetDocument;
use crate::rules::samples::BUNDLED_SAMPLES;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const CUSTOM_PREFIX: &str = "custom_";
const SAMPLE_PREFIX: &str = "sample_";
const RULE_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct RuleStore {
    rules_file: PathBuf,
    custom_dir: PathBuf,
    sample_dir: PathBuf,
}

impl RuleStore {
    pub fn new(rules_file: PathBuf, custom_dir: PathBuf, sample_dir: PathBuf) -> Self {
        Self {
            rules_file,
            custom_dir,
            sample_dir,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.rules_file(),
            config.custom_rule_dir(),
            config.sample_rule_dir(),
        )
    }

    /// Stored rule-set document, or an empty one on first run.
    pub fn read_rule_set(&self) -> RuleStoreResult<RuleSetDocument> {
        match fs::read_to_string(&self.rules_file) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuleSetDocument::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn write_rule_set(&self, doc: &RuleSetDocument) -> RuleStoreResult<()> {
        let payload = serde_json::to_string(doc)?;
        if let Some(parent) = self.rules_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.rules_file, payload)?;
        tracing::debug!(
            "Saved rule set ({} descriptors) to {}",
            doc.len(),
            self.rules_file.display()
        );
        Ok(())
    }

    pub fn custom_rule_path(&self, id: &str) -> RuleStoreResult<PathBuf> {
        validate_identifier(id)?;
        Ok(self.custom_dir.join(rule_file_name(CUSTOM_PREFIX, id)))
    }

    pub fn custom_rule_exists(&self, id: &str) -> bool {
        self.custom_rule_path(id)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    pub fn read_custom_rule(&self, id: &str) -> RuleStoreResult<String> {
        let path = self.custom_rule_path(id)?;
        read_named(&path, || format!("custom rule {id}"))
    }

    pub fn write_custom_rule(&self, id: &str, source: &str) -> RuleStoreResult<()> {
        let path = self.custom_rule_path(id)?;
        fs::create_dir_all(&self.custom_dir)?;
        fs::write(&path, source)?;
        tracing::info!("Saved custom rule {} to {}", id, path.display());
        Ok(())
    }

    /// Remove a custom rule. Removing one that does not exist is not an error.
    pub fn delete_custom_rule(&self, id: &str) -> RuleStoreResult<()> {
        let path = self.custom_rule_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Deleted custom rule {}", id);
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn list_custom_rules(&self) -> RuleStoreResult<Vec<String>> {
        list_names(&self.custom_dir, CUSTOM_PREFIX)
    }

    pub fn read_sample_rule(&self, name: &str) -> RuleStoreResult<String> {
        validate_identifier(name)?;
        let path = self.sample_dir.join(rule_file_name(SAMPLE_PREFIX, name));
        read_named(&path, || format!("sample rule {name}"))
    }

    pub fn list_sample_rules(&self) -> RuleStoreResult<Vec<String>> {
        list_names(&self.sample_dir, SAMPLE_PREFIX)
    }

    /// Write any bundled sample missing from the sample directory. Samples the
    /// user already has are left untouched. Returns how many were written.
    pub fn install_bundled_samples(&self) -> RuleStoreResult<usize> {
        let mut installed = 0;
        for (name, source) in BUNDLED_SAMPLES {
            let path = self.sample_dir.join(rule_file_name(SAMPLE_PREFIX, name));
            if path.exists() {
                continue;
            }
            fs::create_dir_all(&self.sample_dir)?;
            fs::write(&path, source)?;
            installed += 1;
        }
        if installed > 0 {
            tracing::debug!("Installed {} sample rules", installed);
        }
        Ok(installed)
    }
}

fn rule_file_name(prefix: &str, id: &str) -> String {
    format!("{prefix}{id}.{RULE_EXTENSION}")
}

fn validate_identifier(id: &str) -> RuleStoreResult<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RuleStoreError::InvalidIdentifier(id.to_string()))
    }
}

fn read_named(path: &Path, what: impl FnOnce() -> String) -> RuleStoreResult<String> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(RuleStoreError::NotFound(what())),
        Err(err) => Err(err.into()),
    }
}

fn list_names(dir: &Path, prefix: &str) -> RuleStoreResult<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let suffix = format!(".{RULE_EXTENSION}");
    let mut names = Vec::new();
    for entry in entries {
        let file_name = entry?.file_name();
        let file_name = file_name.to_string_lossy();
        if let Some(name) = file_name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix.as_str()))
        {
            if validate_identifier(name).is_ok() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> RuleStore {
        RuleStore::from_config(&ControllerConfig::with_data_dir(dir))
    }

    #[test]
    fn missing_rule_set_reads_as_empty() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.read_rule_set().unwrap().is_empty());
    }

    #[test]
    fn rule_set_round_trips() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        let empty = RuleSetDocument::default();
        store.write_rule_set(&empty).unwrap();
        assert_eq!(store.read_rule_set().unwrap(), empty);

        let doc = RuleSetDocument::new(vec![
            json!({ "id": 1, "name": "block ads", "enabled": true }),
            json!({ "id": 2, "name": "cors", "extra": { "nested": [1, 2, 3] } }),
        ]);
        store.write_rule_set(&doc).unwrap();
        assert_eq!(store.read_rule_set().unwrap(), doc);
    }

    #[test]
    fn custom_rule_lifecycle() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        store.write_custom_rule("1", "text").unwrap();
        assert_eq!(store.read_custom_rule("1").unwrap(), "text");
        assert!(store.custom_rule_exists("1"));

        store.delete_custom_rule("1").unwrap();
        assert!(matches!(
            store.read_custom_rule("1"),
            Err(RuleStoreError::NotFound(_))
        ));
        store.delete_custom_rule("1").expect("second delete is a no-op");
    }

    #[test]
    fn custom_rule_writes_overwrite() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        store.write_custom_rule("7", "first").unwrap();
        store.write_custom_rule("7", "second").unwrap();
        assert_eq!(store.read_custom_rule("7").unwrap(), "second");
        assert!(dir.path().join("rule_custom").join("custom_7.json").exists());
    }

    #[test]
    fn identifiers_cannot_escape_rule_directory() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());

        for bad in ["", "../etc", "a/b", "x.y"] {
            assert!(matches!(
                store.write_custom_rule(bad, "nope"),
                Err(RuleStoreError::InvalidIdentifier(_))
            ));
        }
        assert!(!store.custom_rule_exists("../etc"));
    }

    #[test]
    fn samples_are_read_and_listed() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let sample_dir = dir.path().join("rule_sample");
        fs::create_dir_all(&sample_dir).unwrap();
        fs::write(sample_dir.join("sample_block_ads.json"), "{}").unwrap();
        fs::write(sample_dir.join("README.md"), "ignored").unwrap();

        assert_eq!(store.read_sample_rule("block_ads").unwrap(), "{}");
        assert!(matches!(
            store.read_sample_rule("missing"),
            Err(RuleStoreError::NotFound(_))
        ));
        assert_eq!(store.list_sample_rules().unwrap(), vec!["block_ads"]);
    }

    #[test]
    fn custom_rules_are_listed_sorted() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.list_custom_rules().unwrap().is_empty());

        store.write_custom_rule("b", "{}").unwrap();
        store.write_custom_rule("a", "{}").unwrap();
        assert_eq!(store.list_custom_rules().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn bundled_samples_install_without_clobbering() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let edited = dir.path().join("rule_sample").join("sample_block_ads.json");
        fs::create_dir_all(edited.parent().unwrap()).unwrap();
        fs::write(&edited, "{\"kind\":\"block_hosts\",\"hosts\":[]}").unwrap();

        assert_eq!(store.install_bundled_samples().unwrap(), BUNDLED_SAMPLES.len() - 1);
        assert_eq!(store.install_bundled_samples().unwrap(), 0);
        assert_eq!(
            store.list_sample_rules().unwrap(),
            vec!["block_ads", "rewrite_headers"]
        );
        assert!(store.read_sample_rule("block_ads").unwrap().contains("\"hosts\":[]"));
    }
}
