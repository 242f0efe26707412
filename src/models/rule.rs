//! Persisted rule-set document

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered list of rule descriptors as the UI saved them.
///
/// Descriptors are kept as raw JSON values: the store round-trips them and
/// never looks inside.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSetDocument(pub Vec<Value>);

impl RuleSetDocument {
    pub fn new(descriptors: Vec<Value>) -> Self {
        Self(descriptors)
    }

    pub fn descriptors(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Value>> for RuleSetDocument {
    fn from(value: Vec<Value>) -> Self {
        Self(value)
    }
}
