use thiserror::Error;

use super::node_table::NodeId;
use crate::dom::{DomError, NodeHandle};

/// Failure of a single edit instruction.
///
/// Every variant except [`EditError::Dom`] signals that the engine and the
/// interpreter disagree about state; the batch is aborted and the engine is
/// expected to resynchronise.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EditError {
    #[error("unknown node id {0}")]
    UnknownNode(NodeId),
    #[error("node id {0} is already bound")]
    DuplicateBinding(NodeId),
    #[error("node id 0 is reserved")]
    ReservedNodeId,
    #[error("operand stack underflow: needed {requested}, had {available}")]
    StackUnderflow { requested: usize, available: usize },
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
    #[error("template '{0}' was already registered with a different structure")]
    TemplateRedefinition(String),
    #[error("template '{name}' has no root at index {index}")]
    TemplateRootOutOfRange { name: String, index: usize },
    #[error("expected a node handle or element id, got {0}")]
    InvalidBoundaryValue(&'static str),
    #[error("node {0} belongs to a registered template")]
    TemplateNode(NodeHandle),
    #[error("no node at path {0:?}")]
    InvalidPath(Vec<usize>),
    #[error("operand stack holds {depth} node(s) at the end of the batch")]
    ResidualStack { depth: usize },
    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Diagnostic for an aborted batch.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("edit #{index} ({opcode}) failed: {source}")]
pub struct BatchError {
    /// Position of the failing edit; equals the batch length for end-of-batch checks.
    pub index: usize,
    pub opcode: &'static str,
    #[source]
    pub source: EditError,
}
