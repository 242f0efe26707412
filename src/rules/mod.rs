//! Interception rules: persistence, implementations and resolution.

pub mod registry;
pub mod resolver;
pub mod samples;
pub mod store;

pub use registry::{InterceptRule, RuleFactory, RuleRegistry};
pub use resolver::RuleResolver;
pub use store::RuleStore;

use std::sync::Arc;

/// Rule behaviour handed to the engine for one session.
#[derive(Debug, Clone, Default)]
pub enum RuleHandle {
    /// Engine default behaviour
    #[default]
    None,
    /// A custom rule resolved from its identifier
    Custom {
        id: String,
        rule: Arc<dyn InterceptRule>,
    },
}

impl RuleHandle {
    pub fn id(&self) -> Option<&str> {
        match self {
            RuleHandle::None => None,
            RuleHandle::Custom { id, .. } => Some(id),
        }
    }

    pub fn rule(&self) -> Option<&Arc<dyn InterceptRule>> {
        match self {
            RuleHandle::None => None,
            RuleHandle::Custom { rule, .. } => Some(rule),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, RuleHandle::Custom { .. })
    }
}
