//! Shared data model for `Tasklist`.
//!
//! Pure types and functions with no I/O: task records, attachment
//! references and their diff, ordering helpers, and the change signal
//! emitted after every successful mutation.

pub mod attachment;
pub mod change;
pub mod ordering;
pub mod task;

pub use attachment::{Attachments, FileRef, ImageRef};
pub use change::{DataChanged, MutationKind, ViewScope};
pub use task::{
    MAX_TASK_TEXT_LENGTH, Relationship, SequenceUpdate, Task, TaskDetailsPatch, TaskId, TaskLink,
    TaskLinks, TextUpdate, UserId, ValidationError, validate_text,
};
