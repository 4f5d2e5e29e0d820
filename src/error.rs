use thiserror::Error;

use crate::model::{InsertMode, NodeKey};

/// Result type alias for nested-set operations.
pub type Result<T> = std::result::Result<T, NestedSetError>;

/// Error type shared by every nested-set component.
#[derive(Debug, Error)]
pub enum NestedSetError {
    /// Invalid table, column or prefix name supplied at setup time.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A key the operation requires does not exist.
    #[error("node {0} not found")]
    NotFound(NodeKey),
    /// The requested mutation is not allowed on the current tree.
    #[error("invalid operation: {0}")]
    InvalidOperation(#[from] InvalidOperation),
    /// A payload references a column the schema does not declare.
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    /// The backing store rejected a statement or the connection failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),
}

/// Structural rule violated by an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidOperation {
    /// A root insert was requested but the table already holds nodes.
    #[error("there can be only one root node")]
    RootExists,
    /// A child insert targeted a node that already has a child.
    #[error("node {0} already has a child; place new nodes beside it")]
    ChildExists(NodeKey),
    /// A sibling insert targeted the root.
    #[error("node {0} is the root and cannot have siblings")]
    RootSibling(NodeKey),
    /// A non-root insert was requested without a target key.
    #[error("{0} insert requires a target key")]
    MissingTarget(InsertMode),
}

impl NestedSetError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        NestedSetError::Configuration(message.into())
    }

    /// Returns `true` when the error reports an absent key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, NestedSetError::NotFound(_))
    }

    /// Returns `true` when the store reported the database as busy or locked.
    pub fn is_busy(&self) -> bool {
        match self {
            NestedSetError::Persistence(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
