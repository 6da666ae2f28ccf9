//! Error type shared by the repository and the mutation facade.

use tasklist_proto::{TaskId, ValidationError};

/// Errors surfaced by task operations.
///
/// Operations scoped to an `(id, user)` pair that match no row are not
/// errors: they complete as silent no-ops, so a caller cannot tell a
/// missing task from someone else's. Blob cleanup failures are logged and
/// never reach this type either.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// No authenticated user could be resolved.
    #[error("unauthorized")]
    Unauthorized,
    /// An input value failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The requested parent is not one of the caller's tasks or would
    /// create a cycle.
    #[error("invalid parent task: {0}")]
    InvalidParent(TaskId),
    /// A bulk input exceeded the configured item limit.
    #[error("batch too large: {len} items (max {max})")]
    BatchTooLarge {
        /// Number of items supplied.
        len: usize,
        /// Configured maximum.
        max: usize,
    },
    /// A stored row failed validation when read back.
    #[error("stored task {id} is corrupt: {reason}")]
    CorruptRow {
        /// Offending task.
        id: TaskId,
        /// What failed to decode.
        reason: String,
    },
    /// The store rejected a statement. Inside a batch this aborts and
    /// rolls back the whole transaction.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl TaskError {
    /// Returns `true` for errors caused by the caller's input rather than
    /// the store.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::InvalidParent(_) | Self::BatchTooLarge { .. }
        )
    }
}
