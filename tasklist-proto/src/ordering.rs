//! Ordering helpers shared by the repository and client sessions.
//!
//! Tasks display in ascending `sequence`, ties broken by creation time and
//! then id. Sequences need not be contiguous: new tasks take one less than
//! the current minimum, so existing rows are only renumbered once that
//! minimum reaches `i64::MIN`.

use crate::task::{SequenceUpdate, Task, TaskId};

/// Sequence for a task placed above every existing one, given the current
/// minimum (`None` for an empty list, which yields `0`).
///
/// Returns `None` when nothing fits below `current_min`; the existing rows
/// must be renumbered first.
#[must_use]
pub fn top_sequence(current_min: Option<i64>) -> Option<i64> {
    current_min.map_or(Some(0), |min| min.checked_sub(1))
}

/// Sorts tasks into display order: `(sequence, created_at, id)`.
pub fn sort_for_display(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.sequence
            .cmp(&b.sequence)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Moves the element at `from` to index `to`, shifting the ones between.
///
/// Out-of-range indices leave the slice untouched.
pub fn move_item<T>(items: &mut [T], from: usize, to: usize) {
    if from >= items.len() || to >= items.len() || from == to {
        return;
    }
    if from < to {
        items[from..=to].rotate_left(1);
    } else {
        items[to..=from].rotate_right(1);
    }
}

/// Assigns `sequence = position` to each id in the given display order.
#[must_use]
pub fn sequences_from_order(ids: impl IntoIterator<Item = TaskId>) -> Vec<SequenceUpdate> {
    ids.into_iter()
        .enumerate()
        .map(|(index, id)| SequenceUpdate {
            id,
            sequence: i64::try_from(index).unwrap_or(i64::MAX),
        })
        .collect()
}
