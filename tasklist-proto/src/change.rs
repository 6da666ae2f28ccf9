//! The "data changed" signal emitted after a successful mutation.
//!
//! This is a cache invalidation contract: a consumer holding a rendered
//! copy of the task list for `user_id` must re-read it. The signal carries
//! no task data.

use serde::{Deserialize, Serialize};

use crate::task::UserId;

/// The view whose data a mutation invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewScope {
    /// The ordered task list page.
    TaskList,
}

/// Which operation produced the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    Created,
    Deleted,
    Reordered,
    TextsUpdated,
    DoneToggled,
    DetailsUpdated,
    Linked,
    Unlinked,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Deleted => "deleted",
            Self::Reordered => "reordered",
            Self::TextsUpdated => "texts_updated",
            Self::DoneToggled => "done_toggled",
            Self::DetailsUpdated => "details_updated",
            Self::Linked => "linked",
            Self::Unlinked => "unlinked",
        };
        f.write_str(name)
    }
}

/// Notification that `user_id`'s data for `view` changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataChanged {
    pub user_id: UserId,
    pub view: ViewScope,
    pub kind: MutationKind,
    /// Monotonically increasing per notifier; later signals carry larger values.
    pub revision: u64,
}
