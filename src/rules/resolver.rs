//! Rule identifier resolution
//!
//! Resolution never fails: a stale or broken rule identifier must not keep
//! the proxy from starting, so every problem degrades to [`RuleHandle::None`]
//! with a warning. The source is re-read on every call, so edits apply on the
//! next start.

use super::{RuleHandle, RuleRegistry, RuleStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct RuleResolver {
    store: RuleStore,
    registry: Arc<RuleRegistry>,
}

impl RuleResolver {
    pub fn new(store: RuleStore, registry: Arc<RuleRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    pub fn resolve(&self, rule_id: Option<&str>) -> RuleHandle {
        let id = match rule_id.map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => return RuleHandle::None,
        };

        if !self.store.custom_rule_exists(id) {
            tracing::warn!("Custom rule {} not found; using default behaviour", id);
            return RuleHandle::None;
        }

        let source = match self.store.read_custom_rule(id) {
            Ok(source) => source,
            Err(err) => {
                tracing::warn!("Failed to read custom rule {}: {}", id, err);
                return RuleHandle::None;
            }
        };

        match self.registry.build(&source) {
            Ok(rule) => {
                tracing::info!("Resolved custom rule {} ({})", id, rule.kind());
                RuleHandle::Custom {
                    id: id.to_string(),
                    rule,
                }
            }
            Err(err) => {
                tracing::warn!("Custom rule {} could not be built: {:#}", id, err);
                RuleHandle::None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::rules::registry::{RequestView, RuleVerdict};
    use tempfile::tempdir;

    fn resolver_in(dir: &std::path::Path) -> (RuleResolver, RuleStore) {
        let store = RuleStore::from_config(&ControllerConfig::with_data_dir(dir));
        let resolver = RuleResolver::new(store.clone(), Arc::new(RuleRegistry::with_builtins()));
        (resolver, store)
    }

    #[test]
    fn absent_or_empty_identifier_is_default() {
        let dir = tempdir().unwrap();
        let (resolver, _) = resolver_in(dir.path());
        assert!(!resolver.resolve(None).is_custom());
        assert!(!resolver.resolve(Some("")).is_custom());
        assert!(!resolver.resolve(Some("  ")).is_custom());
    }

    #[test]
    fn missing_rule_file_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let (resolver, _) = resolver_in(dir.path());
        assert!(matches!(resolver.resolve(Some("42")), RuleHandle::None));
    }

    #[test]
    fn unbuildable_rule_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let (resolver, store) = resolver_in(dir.path());
        store
            .write_custom_rule("3", r#"{ "kind": "does_not_exist" }"#)
            .unwrap();
        assert!(matches!(resolver.resolve(Some("3")), RuleHandle::None));
    }

    #[test]
    fn existing_rule_resolves_and_picks_up_edits() {
        let dir = tempdir().unwrap();
        let (resolver, store) = resolver_in(dir.path());
        let request = RequestView::new("GET", "tracker.test", "/pixel");

        store
            .write_custom_rule("1", r#"{ "kind": "block_hosts", "hosts": ["tracker"] }"#)
            .unwrap();
        let handle = resolver.resolve(Some("1"));
        assert_eq!(handle.id(), Some("1"));
        let rule = handle.rule().expect("custom rule");
        assert!(matches!(rule.on_request(&request), RuleVerdict::Block { .. }));

        store
            .write_custom_rule("1", r#"{ "kind": "block_hosts", "hosts": ["ads"] }"#)
            .unwrap();
        let edited = resolver.resolve(Some("1"));
        let rule = edited.rule().expect("custom rule");
        assert_eq!(rule.on_request(&request), RuleVerdict::Continue);
    }
}
