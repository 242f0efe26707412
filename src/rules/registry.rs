//! Rule implementations keyed by kind
//!
//! A custom rule on disk is a JSON declaration:
//!
//! ```json
//! { "kind": "block_hosts", "hosts": ["ads.example.com"], "status": 403 }
//! ```
//!
//! The registry maps `kind` to a [`RuleFactory`] that turns the remaining
//! fields into a live [`InterceptRule`]. Factories are registered at startup
//! (see [`RuleRegistry::with_builtins`]) or later through
//! [`RuleRegistry::register`].

use anyhow::{anyhow, Context};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

pub type HeaderMap = HashMap<String, String>;

/// The parts of a request a rule may inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestView {
    pub method: String,
    pub host: String,
    pub path: String,
}

impl RequestView {
    pub fn new(method: &str, host: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            host: host.to_string(),
            path: path.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleVerdict {
    /// Forward the request unchanged
    Continue,
    /// Answer locally without contacting the upstream
    Block { status: u16, body: String },
}

/// Interception behaviour handed to the engine.
pub trait InterceptRule: Send + Sync {
    fn kind(&self) -> &str;

    fn on_request(&self, _request: &RequestView) -> RuleVerdict {
        RuleVerdict::Continue
    }

    fn on_response_headers(&self, _request: &RequestView, _headers: &mut HeaderMap) {}
}

impl fmt::Debug for dyn InterceptRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptRule")
            .field("kind", &self.kind())
            .finish()
    }
}

/// Builds a rule from the parameters of a custom rule declaration.
pub trait RuleFactory: Send + Sync {
    fn build(&self, params: Value) -> anyhow::Result<Arc<dyn InterceptRule>>;
}

impl<F> RuleFactory for F
where
    F: Fn(Value) -> anyhow::Result<Arc<dyn InterceptRule>> + Send + Sync,
{
    fn build(&self, params: Value) -> anyhow::Result<Arc<dyn InterceptRule>> {
        self(params)
    }
}

#[derive(Debug, Deserialize)]
struct RuleSource {
    kind: String,
    #[serde(flatten)]
    params: Map<String, Value>,
}

#[derive(Default)]
pub struct RuleRegistry {
    factories: RwLock<HashMap<String, Arc<dyn RuleFactory>>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the rule kinds that ship with the crate.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(BLOCK_HOSTS, build_block_hosts);
        registry.register(REWRITE_HEADERS, build_rewrite_headers);
        registry
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register<F>(&self, kind: &str, factory: F)
    where
        F: RuleFactory + 'static,
    {
        let mut factories = self
            .factories
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if factories
            .insert(kind.to_string(), Arc::new(factory))
            .is_some()
        {
            tracing::debug!("Replaced rule factory for kind {}", kind);
        }
    }

    pub fn kinds(&self) -> Vec<String> {
        let factories = self
            .factories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut kinds: Vec<String> = factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Parse a custom rule declaration and build it with the matching factory.
    pub fn build(&self, source: &str) -> anyhow::Result<Arc<dyn InterceptRule>> {
        let parsed: RuleSource =
            serde_json::from_str(source).context("rule source is not a valid declaration")?;
        let factory = {
            let factories = self
                .factories
                .read()
                .map_err(|_| anyhow!("rule registry lock poisoned"))?;
            factories
                .get(&parsed.kind)
                .cloned()
                .ok_or_else(|| anyhow!("no rule implementation registered for {:?}", parsed.kind))?
        };
        factory.build(Value::Object(parsed.params))
    }
}

pub const BLOCK_HOSTS: &str = "block_hosts";
pub const REWRITE_HEADERS: &str = "rewrite_headers";

fn build_block_hosts(params: Value) -> anyhow::Result<Arc<dyn InterceptRule>> {
    let rule: BlockHostsRule =
        serde_json::from_value(params).context("invalid block_hosts parameters")?;
    Ok(Arc::new(rule))
}

fn build_rewrite_headers(params: Value) -> anyhow::Result<Arc<dyn InterceptRule>> {
    let rule: RewriteHeadersRule =
        serde_json::from_value(params).context("invalid rewrite_headers parameters")?;
    Ok(Arc::new(rule))
}

fn default_block_status() -> u16 {
    403
}

/// Answers requests to matching hosts locally.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockHostsRule {
    hosts: Vec<String>,
    #[serde(default = "default_block_status")]
    status: u16,
}

impl InterceptRule for BlockHostsRule {
    fn kind(&self) -> &str {
        BLOCK_HOSTS
    }

    fn on_request(&self, request: &RequestView) -> RuleVerdict {
        if self
            .hosts
            .iter()
            .any(|fragment| contains_ignore_case(&request.host, fragment))
        {
            RuleVerdict::Block {
                status: self.status,
                body: format!("blocked by rule: {}", request.host),
            }
        } else {
            RuleVerdict::Continue
        }
    }
}

/// Sets response headers on matching hosts.
#[derive(Debug, Clone, Deserialize)]
pub struct RewriteHeadersRule {
    #[serde(default)]
    host_contains: Option<String>,
    #[serde(default)]
    response: HeaderMap,
}

impl InterceptRule for RewriteHeadersRule {
    fn kind(&self) -> &str {
        REWRITE_HEADERS
    }

    fn on_response_headers(&self, request: &RequestView, headers: &mut HeaderMap) {
        if let Some(fragment) = &self.host_contains {
            if !contains_ignore_case(&request.host, fragment) {
                return;
            }
        }
        for (name, value) in &self.response {
            headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
            headers.insert(name.clone(), value.clone());
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}
