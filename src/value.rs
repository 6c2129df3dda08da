use serde::{Deserialize, Serialize};

use crate::dom::NodeHandle;

/// Any-typed value crossing the engine boundary.
///
/// Engine payloads (seeded roots, listener handlers) arrive as one of these
/// variants and are decoded by matching, never by guessing at runtime types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BoundaryValue {
    Text(String),
    Number(f64),
    Bool(bool),
    /// Opaque host reference, here a node id in the live document.
    Handle(u64),
    #[default]
    Null,
}

impl BoundaryValue {
    pub fn kind(&self) -> &'static str {
        match self {
            BoundaryValue::Text(_) => "text",
            BoundaryValue::Number(_) => "number",
            BoundaryValue::Bool(_) => "bool",
            BoundaryValue::Handle(_) => "handle",
            BoundaryValue::Null => "null",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BoundaryValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<NodeHandle> {
        match self {
            BoundaryValue::Handle(raw) => usize::try_from(*raw).ok().map(NodeHandle),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BoundaryValue::Null)
    }
}

impl From<&str> for BoundaryValue {
    fn from(value: &str) -> Self {
        BoundaryValue::Text(value.to_string())
    }
}

impl From<NodeHandle> for BoundaryValue {
    fn from(value: NodeHandle) -> Self {
        BoundaryValue::Handle(value.0 as u64)
    }
}
