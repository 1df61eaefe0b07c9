//! Error types.
//!
//! Plumbing code (configuration, files, backups and command handlers) uses `anyhow` through the
//! crate-level [`Result`]. The graph engine, codec, record stores and sync adapter return
//! [`GraphResult`] so that callers can match on the kind of failure.

use crate::model::NodeIndex;
use std::fmt::{Display, Formatter};

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Result type of the graph engine, codec, record stores and sync adapter.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// What kind of node an operation expected to find.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NodeKind {
    Leaf,
    Category,
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Leaf => f.write_str("Transaction"),
            NodeKind::Category => f.write_str("Category"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The index does not exist, or does not refer to the expected kind of node.
    #[error("{kind} not found: {index}")]
    NotFound { kind: NodeKind, index: NodeIndex },

    /// The operation would break an invariant of the tree. Nothing was changed.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The record store failed. Callers must not assume any part of the write succeeded.
    #[error("Storage failure: {0:#}")]
    StorageFailure(#[source] anyhow::Error),

    /// The stored records of a scope cannot be reconciled into a tree.
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

impl GraphError {
    pub(crate) fn not_found(kind: NodeKind, index: NodeIndex) -> Self {
        GraphError::NotFound { kind, index }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        GraphError::InvalidOperation(message.into())
    }

    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        GraphError::CorruptSnapshot(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GraphError::NotFound { .. })
    }

    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, GraphError::InvalidOperation(_))
    }

    pub fn is_storage_failure(&self) -> bool {
        matches!(self, GraphError::StorageFailure(_))
    }
}

/// Converts plumbing errors raised inside a record store into [`GraphError::StorageFailure`].
pub(crate) trait IntoStorage<T> {
    fn storage(self) -> GraphResult<T>;
}

impl<T, E> IntoStorage<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn storage(self) -> GraphResult<T> {
        self.map_err(|e| GraphError::StorageFailure(e.into()))
    }
}
