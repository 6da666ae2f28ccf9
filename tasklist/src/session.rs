//! Client-side interaction state for one rendered task list.
//!
//! A [`ListSession`] holds the last authoritative snapshot and a local copy
//! the user edits in one [`Mode`] at a time. Saving turns the local edit
//! into the smallest [`PendingMutation`] that persists it, applies that
//! mutation to the local copy right away, and marks the session in flight.
//! Snapshots are tagged with the [`ChangeNotifier`] revision read before
//! they were fetched. A snapshot older than the state the session already
//! holds is dropped. One that arrives while in flight is held back until
//! the mutation completes, and then applies only if it was read after the
//! mutation was confirmed.
//!
//! [`ChangeNotifier`]: crate::notify::ChangeNotifier
//!
//! ```text
//! Idle ──enter──▶ Creating | Editing | Reordering | SelectingDone | SelectingDelete
//!   ▲                                   │
//!   ├──────────── discard ──────────────┤
//!   └── complete ◀── in flight ◀── save ┘
//! ```

use tasklist_proto::ordering::{move_item, sequences_from_order, sort_for_display};
use tasklist_proto::{SequenceUpdate, Task, TaskId, TextUpdate};

use crate::actions::TaskActions;
use crate::blob::BlobStore;
use crate::error::TaskError;
use crate::identity::IdentityProvider;

/// What the user is currently doing with the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Idle,
    Creating,
    Editing,
    Reordering,
    SelectingDone,
    SelectingDelete,
}

impl Mode {
    const fn is_selecting(self) -> bool {
        matches!(self, Self::SelectingDone | Self::SelectingDelete)
    }
}

/// Rejected session transitions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot enter {requested:?} while {current:?} is active")]
    ModeActive { current: Mode, requested: Mode },
    #[error("{operation} is not available in {mode:?} mode")]
    WrongMode {
        operation: &'static str,
        mode: Mode,
    },
    #[error("a save is already in flight")]
    SaveInFlight,
    #[error("task {0} is not in the list")]
    UnknownTask(TaskId),
    /// A facade call made by [`ListSession::save_with`] or
    /// [`ListSession::refresh_with`] failed.
    #[error(transparent)]
    Mutation(#[from] TaskError),
}

/// The facade call that persists one saved edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingMutation {
    Create { text: String },
    UpdateTexts(Vec<TextUpdate>),
    Reorder(Vec<SequenceUpdate>),
    ToggleDone(Vec<TaskId>),
    BulkDelete(Vec<TaskId>),
}

impl PendingMutation {
    /// Issues the mutation through `actions`. Returns the new task for
    /// [`PendingMutation::Create`].
    ///
    /// # Errors
    ///
    /// Returns whatever the facade operation returns.
    pub async fn run<B: BlobStore, I: IdentityProvider>(
        &self,
        actions: &TaskActions<B, I>,
    ) -> Result<Option<Task>, TaskError> {
        match self {
            Self::Create { text } => actions.create_task(text).await.map(Some),
            Self::UpdateTexts(items) => actions.update_task_texts(items).await.map(|()| None),
            Self::Reorder(items) => actions.update_tasks_sequence(items).await.map(|()| None),
            Self::ToggleDone(ids) => actions.toggle_tasks_done(ids).await.map(|()| None),
            Self::BulkDelete(ids) => actions.bulk_delete_tasks(ids).await.map(|()| None),
        }
    }
}

/// Local editing state over an authoritative task list.
#[derive(Debug, Clone, Default)]
pub struct ListSession {
    mode: Mode,
    authoritative: Vec<Task>,
    local: Vec<Task>,
    draft: String,
    selected: Vec<TaskId>,
    in_flight: bool,
    /// Revision the authoritative snapshot is known to include.
    revision: u64,
    deferred: Option<(u64, Vec<Task>)>,
}

impl ListSession {
    /// Starts idle over `tasks`, sorted into display order.
    #[must_use]
    pub fn new(mut tasks: Vec<Task>) -> Self {
        sort_for_display(&mut tasks);
        Self {
            local: tasks.clone(),
            authoritative: tasks,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Tasks as the user currently sees them.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.local
    }

    /// Last snapshot applied from the store.
    #[must_use]
    pub fn authoritative(&self) -> &[Task] {
        &self.authoritative
    }

    #[must_use]
    pub fn selected(&self) -> &[TaskId] {
        &self.selected
    }

    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    #[must_use]
    pub const fn is_saving(&self) -> bool {
        self.in_flight
    }

    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Enters `mode`. Only valid from [`Mode::Idle`] with nothing in flight.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SaveInFlight`] or [`SessionError::ModeActive`].
    pub fn enter(&mut self, mode: Mode) -> Result<(), SessionError> {
        if self.in_flight {
            return Err(SessionError::SaveInFlight);
        }
        if self.mode != Mode::Idle && self.mode != mode {
            return Err(SessionError::ModeActive {
                current: self.mode,
                requested: mode,
            });
        }
        self.mode = mode;
        Ok(())
    }

    /// Abandons the current edit and returns to idle without any mutation.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SaveInFlight`] while a save is pending.
    pub fn discard(&mut self) -> Result<(), SessionError> {
        if self.in_flight {
            return Err(SessionError::SaveInFlight);
        }
        self.reset_to_authoritative();
        Ok(())
    }

    /// Builds the mutation for the current edit and applies it locally.
    ///
    /// Returns `None`, and goes straight back to idle, when the edit
    /// changes nothing. Otherwise the session stays in its mode, in
    /// flight, until [`ListSession::complete`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SaveInFlight`] or, from idle,
    /// [`SessionError::WrongMode`].
    pub fn save(&mut self) -> Result<Option<PendingMutation>, SessionError> {
        if self.in_flight {
            return Err(SessionError::SaveInFlight);
        }
        let mutation = match self.mode {
            Mode::Idle => {
                return Err(SessionError::WrongMode {
                    operation: "save",
                    mode: self.mode,
                });
            }
            Mode::Creating => {
                let text = self.draft.trim();
                (!text.is_empty()).then(|| PendingMutation::Create {
                    text: text.to_string(),
                })
            }
            Mode::Editing => {
                let items = self.changed_texts();
                (!items.is_empty()).then_some(PendingMutation::UpdateTexts(items))
            }
            Mode::Reordering => {
                let items = sequences_from_order(self.local.iter().map(|task| task.id));
                (!items.is_empty()).then_some(PendingMutation::Reorder(items))
            }
            Mode::SelectingDone => (!self.selected.is_empty())
                .then(|| PendingMutation::ToggleDone(self.selected.clone())),
            Mode::SelectingDelete => (!self.selected.is_empty())
                .then(|| PendingMutation::BulkDelete(self.selected.clone())),
        };

        match &mutation {
            Some(mutation) => {
                self.apply_locally(mutation);
                self.in_flight = true;
            }
            None => self.finish_idle(),
        }
        Ok(mutation)
    }

    /// Ends the in-flight save.
    ///
    /// `revision` is the notifier revision read after the mutation
    /// returned. On success the optimistic local copy, plus the created task
    /// if any, becomes authoritative at that revision. On failure the local
    /// copy reverts to the authoritative snapshot. Either way a snapshot
    /// deferred during the save then applies if it is not older.
    pub fn complete<E>(&mut self, result: &Result<Option<Task>, E>, revision: u64) {
        if !self.in_flight {
            return;
        }
        self.in_flight = false;
        match result {
            Ok(created) => {
                if let Some(task) = created {
                    self.local.insert(0, task.clone());
                }
                self.authoritative = self.local.clone();
                self.revision = self.revision.max(revision);
            }
            Err(_) => {
                self.local = self.authoritative.clone();
                tracing::debug!(mode = ?self.mode, "save failed, local edits reverted");
            }
        }
        let current = self.revision;
        if let Some((revision, tasks)) = self
            .deferred
            .take()
            .filter(|(revision, _)| *revision >= current)
        {
            self.revision = revision;
            self.authoritative = tasks;
            self.local = self.authoritative.clone();
        }
        self.finish_idle();
    }

    /// Offers a snapshot read at notifier `revision`.
    ///
    /// Snapshots older than [`ListSession::revision`] are dropped. While a
    /// save is in flight the newest snapshot is held back. In both cases
    /// `false` is returned. Otherwise it becomes authoritative; the local
    /// copy follows it only when idle, so an edit in progress is kept.
    pub fn apply_authoritative(&mut self, revision: u64, mut tasks: Vec<Task>) -> bool {
        if revision < self.revision {
            tracing::debug!(revision, current = self.revision, "stale snapshot dropped");
            return false;
        }
        sort_for_display(&mut tasks);
        if self.in_flight {
            if self
                .deferred
                .as_ref()
                .is_none_or(|(deferred, _)| revision >= *deferred)
            {
                self.deferred = Some((revision, tasks));
            }
            return false;
        }
        self.revision = revision;
        self.authoritative = tasks;
        if self.mode == Mode::Idle {
            self.local = self.authoritative.clone();
        }
        true
    }

    /// Reads the list through `actions` and offers it as a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Mutation`] if the read fails.
    pub async fn refresh_with<B: BlobStore, I: IdentityProvider>(
        &mut self,
        actions: &TaskActions<B, I>,
    ) -> Result<bool, SessionError> {
        let revision = actions.notifier().revision();
        let tasks = actions.list_tasks().await?;
        Ok(self.apply_authoritative(revision, tasks))
    }

    /// Saves through `actions` and completes with the outcome.
    ///
    /// Returns the created task when saving from [`Mode::Creating`].
    ///
    /// # Errors
    ///
    /// Returns session transition errors, or [`SessionError::Mutation`]
    /// after reverting local state.
    pub async fn save_with<B: BlobStore, I: IdentityProvider>(
        &mut self,
        actions: &TaskActions<B, I>,
    ) -> Result<Option<Task>, SessionError> {
        let Some(mutation) = self.save()? else {
            return Ok(None);
        };
        let result = mutation.run(actions).await;
        self.complete(&result, actions.notifier().revision());
        result.map_err(SessionError::from)
    }

    // -----------------------------------------------------------------------
    // Local edits
    // -----------------------------------------------------------------------

    /// Replaces the draft text of a task being created.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WrongMode`] outside [`Mode::Creating`].
    pub fn set_draft(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        self.require("set_draft", |mode| mode == Mode::Creating)?;
        self.draft = text.into();
        Ok(())
    }

    /// Changes the local text of one task.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WrongMode`] outside [`Mode::Editing`] or
    /// [`SessionError::UnknownTask`].
    pub fn edit_text(&mut self, id: TaskId, text: impl Into<String>) -> Result<(), SessionError> {
        self.require("edit_text", |mode| mode == Mode::Editing)?;
        let task = self
            .local
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or(SessionError::UnknownTask(id))?;
        task.text = text.into();
        Ok(())
    }

    /// Moves the task at index `from` to index `to`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WrongMode`] outside [`Mode::Reordering`].
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<(), SessionError> {
        self.require("move_item", |mode| mode == Mode::Reordering)?;
        move_item(&mut self.local, from, to);
        Ok(())
    }

    /// Drops task `active` onto the position held by task `over`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WrongMode`] outside [`Mode::Reordering`] or
    /// [`SessionError::UnknownTask`].
    pub fn move_task(&mut self, active: TaskId, over: TaskId) -> Result<(), SessionError> {
        self.require("move_task", |mode| mode == Mode::Reordering)?;
        let from = self.index_of(active)?;
        let to = self.index_of(over)?;
        move_item(&mut self.local, from, to);
        Ok(())
    }

    /// Adds `id` to the selection, or removes it if already selected.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WrongMode`] outside the selecting modes or
    /// [`SessionError::UnknownTask`].
    pub fn toggle_selected(&mut self, id: TaskId) -> Result<(), SessionError> {
        self.require("toggle_selected", Mode::is_selecting)?;
        self.index_of(id)?;
        if let Some(pos) = self.selected.iter().position(|selected| *selected == id) {
            self.selected.remove(pos);
        } else {
            self.selected.push(id);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn require(
        &self,
        operation: &'static str,
        allowed: impl FnOnce(Mode) -> bool,
    ) -> Result<(), SessionError> {
        if self.in_flight {
            return Err(SessionError::SaveInFlight);
        }
        if !allowed(self.mode) {
            return Err(SessionError::WrongMode {
                operation,
                mode: self.mode,
            });
        }
        Ok(())
    }

    fn index_of(&self, id: TaskId) -> Result<usize, SessionError> {
        self.local
            .iter()
            .position(|task| task.id == id)
            .ok_or(SessionError::UnknownTask(id))
    }

    /// Local texts that differ from the authoritative snapshot. Tasks
    /// missing from the snapshot are skipped.
    fn changed_texts(&self) -> Vec<TextUpdate> {
        self.local
            .iter()
            .filter(|task| {
                self.authoritative
                    .iter()
                    .any(|known| known.id == task.id && known.text != task.text)
            })
            .map(|task| TextUpdate {
                id: task.id,
                text: task.text.clone(),
            })
            .collect()
    }

    fn apply_locally(&mut self, mutation: &PendingMutation) {
        match mutation {
            PendingMutation::Create { .. } => {}
            PendingMutation::UpdateTexts(items) => {
                for item in items {
                    if let Some(task) = self.local.iter_mut().find(|task| task.id == item.id) {
                        task.text = item.text.trim().to_string();
                    }
                }
            }
            PendingMutation::Reorder(items) => {
                for (task, item) in self.local.iter_mut().zip(items) {
                    task.sequence = item.sequence;
                }
            }
            PendingMutation::ToggleDone(ids) => {
                for task in self.local.iter_mut().filter(|task| ids.contains(&task.id)) {
                    task.done = !task.done;
                }
            }
            PendingMutation::BulkDelete(ids) => {
                self.local.retain(|task| !ids.contains(&task.id));
            }
        }
    }

    fn reset_to_authoritative(&mut self) {
        self.local = self.authoritative.clone();
        self.finish_idle();
    }

    fn finish_idle(&mut self) {
        self.mode = Mode::Idle;
        self.draft.clear();
        self.selected.clear();
    }
}
