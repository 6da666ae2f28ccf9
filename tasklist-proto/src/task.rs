//! Task records, identifiers and the input shapes accepted by mutations.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::attachment::{FileRef, ImageRef};

/// Maximum allowed task text length in characters.
pub const MAX_TASK_TEXT_LENGTH: usize = 2000;

/// Errors raised when an input value fails validation at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Task text is empty after trimming.
    #[error("task text cannot be empty")]
    TextEmpty,
    /// Task text exceeds [`MAX_TASK_TEXT_LENGTH`].
    #[error("task text too long (max {MAX_TASK_TEXT_LENGTH} characters)")]
    TextTooLong,
    /// An image or file reference has an empty URL.
    #[error("attachment url cannot be empty")]
    EmptyAttachmentUrl,
    /// A file reference has an empty display name.
    #[error("file name cannot be empty")]
    EmptyFileName,
    /// A task was given itself as parent.
    #[error("task {0} cannot be its own parent")]
    SelfParent(TaskId),
    /// A relationship was requested between a task and itself.
    #[error("task {0} cannot be linked to itself")]
    SelfLink(TaskId),
}

/// Trims task text and checks it is non-empty and within the length limit.
///
/// # Errors
///
/// Returns [`ValidationError::TextEmpty`] or [`ValidationError::TextTooLong`].
pub fn validate_text(text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::TextEmpty);
    }
    if trimmed.chars().count() > MAX_TASK_TEXT_LENGTH {
        return Err(ValidationError::TextTooLong);
    }
    Ok(trimmed.to_string())
}

/// System-assigned task identifier, allocated monotonically by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(i64);

impl TaskId {
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the user owning a task, as supplied by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a random user id. Mostly useful in tests and demos.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A to-do item owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    /// Display title, never empty.
    pub text: String,
    /// Opaque rich-text body.
    pub description: Option<String>,
    pub done: bool,
    pub images: Vec<ImageRef>,
    pub files: Vec<FileRef>,
    /// Hierarchy pointer to another task of the same owner.
    pub parent_id: Option<TaskId>,
    pub user_id: UserId,
    /// Display order among the owner's tasks; lower sorts first.
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
}

/// Many-to-many association between two tasks of the same owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub parent_id: TaskId,
    pub child_id: TaskId,
    pub user_id: UserId,
}

/// A `(parent, child)` pair naming a relationship to create or remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLink {
    pub parent_id: TaskId,
    pub child_id: TaskId,
}

impl TaskLink {
    /// Rejects a link from a task to itself.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::SelfLink`] when both ends are the same task.
    pub const fn validate(self) -> Result<Self, ValidationError> {
        if self.parent_id.0 == self.child_id.0 {
            return Err(ValidationError::SelfLink(self.parent_id));
        }
        Ok(self)
    }
}

/// Tasks linked to a given task through relationship rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLinks {
    /// Tasks that list this one as a child.
    pub parents: Vec<TaskId>,
    /// Tasks this one lists as children.
    pub children: Vec<TaskId>,
}

/// New display position for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceUpdate {
    pub id: TaskId,
    pub sequence: i64,
}

/// New title for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUpdate {
    pub id: TaskId,
    pub text: String,
}

/// Partial update of a task's details. Absent fields are left untouched.
///
/// `description` and `parent_id` distinguish "absent" (`None`) from
/// "clear" (`Some(None)`), matching a JSON body where the key is missing
/// versus explicitly `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetailsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileRef>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<Option<TaskId>>,
}

impl TaskDetailsPatch {
    /// Returns `true` when the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.description.is_none()
            && self.images.is_none()
            && self.files.is_none()
            && self.parent_id.is_none()
    }

    /// Returns `true` when the patch replaces images or files.
    #[must_use]
    pub const fn touches_attachments(&self) -> bool {
        self.images.is_some() || self.files.is_some()
    }

    /// Validates the fields that can be checked without the store and
    /// normalises the text.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for empty/oversized text or a task
    /// naming itself as its parent.
    pub fn validated(mut self, id: TaskId) -> Result<Self, ValidationError> {
        if let Some(text) = self.text.as_deref() {
            self.text = Some(validate_text(text)?);
        }
        if self.parent_id == Some(Some(id)) {
            return Err(ValidationError::SelfParent(id));
        }
        Ok(self)
    }
}

/// Deserializes a field that is present in the input, keeping an explicit
/// `null` as `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
