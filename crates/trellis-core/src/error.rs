use thiserror::Error;

use crate::dom::NodeId;

/// Faults raised while lexing, parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },
    #[error("unexpected token {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        offset: usize,
    },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("cannot read property '{property}' of {receiver}")]
    PropertyOfNothing { property: String, receiver: &'static str },
    #[error("{receiver}.{method} is not a function")]
    NotCallable { receiver: &'static str, method: String },
    #[error("invalid arguments to {method}: {details}")]
    InvalidArguments { method: String, details: String },
}

/// Faults raised by document arena operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("node {id} missing")]
    Missing { id: NodeId },
    #[error("node {id} is not an element")]
    NotElement { id: NodeId },
    #[error("node {child} is not a child of {parent}")]
    NotChild { parent: NodeId, child: NodeId },
}

/// Faults raised by store actions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("store '{store}' has no action '{action}'")]
    UnknownAction { store: String, action: String },
    #[error("store '{0}' is not registered")]
    UnknownStore(String),
    #[error("action failed: {0}")]
    Action(String),
}
