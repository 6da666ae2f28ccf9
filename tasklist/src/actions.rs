//! Mutation facade: identity resolution, delegation, change signal.
//!
//! Callers never pass a user id. Each operation resolves the current user
//! through the [`IdentityProvider`], fails with [`TaskError::Unauthorized`]
//! before touching the store if there is none, delegates to the
//! [`TaskRepository`], and on success emits a [`DataChanged`] signal for
//! the task list view. Repository errors propagate unchanged.
//!
//! [`DataChanged`]: tasklist_proto::DataChanged

use std::sync::Arc;

use tasklist_proto::{
    MutationKind, SequenceUpdate, Task, TaskDetailsPatch, TaskId, TaskLink, TaskLinks, TextUpdate,
    UserId,
};

use crate::blob::BlobStore;
use crate::error::TaskError;
use crate::identity::IdentityProvider;
use crate::notify::ChangeNotifier;
use crate::repository::TaskRepository;

/// Task operations on behalf of whoever `I` says is signed in.
#[derive(Debug)]
pub struct TaskActions<B, I> {
    repo: Arc<TaskRepository<B>>,
    identity: I,
    notifier: ChangeNotifier,
}

impl<B, I: Clone> Clone for TaskActions<B, I> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            identity: self.identity.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<B: BlobStore, I: IdentityProvider> TaskActions<B, I> {
    #[must_use]
    pub const fn new(repo: Arc<TaskRepository<B>>, identity: I, notifier: ChangeNotifier) -> Self {
        Self {
            repo,
            identity,
            notifier,
        }
    }

    /// Same repository and notifier, different identity. Used to bind a
    /// shared facade to the caller of one request.
    #[must_use]
    pub fn for_identity<J: IdentityProvider>(&self, identity: J) -> TaskActions<B, J> {
        TaskActions {
            repo: Arc::clone(&self.repo),
            identity,
            notifier: self.notifier.clone(),
        }
    }

    #[must_use]
    pub const fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    #[must_use]
    pub fn repository(&self) -> &TaskRepository<B> {
        &self.repo
    }

    async fn current_user(&self) -> Result<UserId, TaskError> {
        self.identity.current_user().await.ok_or_else(|| {
            tracing::debug!("no current user");
            TaskError::Unauthorized
        })
    }

    fn changed(&self, user: UserId, kind: MutationKind) {
        self.notifier.data_changed(user, kind);
    }

    // -----------------------------------------------------------------------
    // Reads (no signal)
    // -----------------------------------------------------------------------

    /// The current user's tasks in display order.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Unauthorized`] or any repository error.
    pub async fn list_tasks(&self) -> Result<Vec<Task>, TaskError> {
        let user = self.current_user().await?;
        self.repo.list(user).await
    }

    /// One of the current user's tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Unauthorized`] or any repository error.
    pub async fn get_task(&self, id: TaskId) -> Result<Option<Task>, TaskError> {
        let user = self.current_user().await?;
        self.repo.get(user, id).await
    }

    /// Parents and children linked to `id`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Unauthorized`] or any repository error.
    pub async fn task_links(&self, id: TaskId) -> Result<TaskLinks, TaskError> {
        let user = self.current_user().await?;
        self.repo.links(user, id).await
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Creates a task at the top of the list and returns it with its id.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Unauthorized`], [`TaskError::Validation`] or
    /// [`TaskError::Database`].
    pub async fn create_task(&self, text: &str) -> Result<Task, TaskError> {
        let user = self.current_user().await?;
        let task = self.repo.create(user, text).await?;
        self.changed(user, MutationKind::Created);
        Ok(task)
    }

    /// # Errors
    ///
    /// Returns [`TaskError::Unauthorized`] or [`TaskError::Database`].
    pub async fn delete_task(&self, id: TaskId) -> Result<(), TaskError> {
        let user = self.current_user().await?;
        self.repo.delete(user, id).await?;
        self.changed(user, MutationKind::Deleted);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`TaskError::Unauthorized`], [`TaskError::BatchTooLarge`] or
    /// [`TaskError::Database`].
    pub async fn bulk_delete_tasks(&self, ids: &[TaskId]) -> Result<(), TaskError> {
        let user = self.current_user().await?;
        self.repo.bulk_delete(user, ids).await?;
        self.changed(user, MutationKind::Deleted);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`TaskError::Unauthorized`], [`TaskError::BatchTooLarge`] or
    /// [`TaskError::Database`]; a database error leaves every sequence as
    /// it was.
    pub async fn update_tasks_sequence(&self, items: &[SequenceUpdate]) -> Result<(), TaskError> {
        let user = self.current_user().await?;
        self.repo.update_sequence(user, items).await?;
        self.changed(user, MutationKind::Reordered);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`TaskError::Unauthorized`], [`TaskError::Validation`],
    /// [`TaskError::BatchTooLarge`] or [`TaskError::Database`].
    pub async fn update_task_texts(&self, items: &[TextUpdate]) -> Result<(), TaskError> {
        let user = self.current_user().await?;
        self.repo.update_texts(user, items).await?;
        self.changed(user, MutationKind::TextsUpdated);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`TaskError::Unauthorized`], [`TaskError::BatchTooLarge`] or
    /// [`TaskError::Database`].
    pub async fn toggle_tasks_done(&self, ids: &[TaskId]) -> Result<(), TaskError> {
        let user = self.current_user().await?;
        self.repo.toggle_done(user, ids).await?;
        self.changed(user, MutationKind::DoneToggled);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`TaskError::Unauthorized`], [`TaskError::Validation`],
    /// [`TaskError::InvalidParent`] or [`TaskError::Database`].
    pub async fn update_task_details(
        &self,
        id: TaskId,
        patch: TaskDetailsPatch,
    ) -> Result<(), TaskError> {
        let user = self.current_user().await?;
        self.repo.update_details(user, id, patch).await?;
        self.changed(user, MutationKind::DetailsUpdated);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`TaskError::Unauthorized`], [`TaskError::Validation`] or
    /// [`TaskError::Database`].
    pub async fn link_tasks(&self, link: TaskLink) -> Result<(), TaskError> {
        let user = self.current_user().await?;
        self.repo.link(user, link).await?;
        self.changed(user, MutationKind::Linked);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`TaskError::Unauthorized`] or [`TaskError::Database`].
    pub async fn unlink_tasks(&self, link: TaskLink) -> Result<(), TaskError> {
        let user = self.current_user().await?;
        self.repo.unlink(user, link).await?;
        self.changed(user, MutationKind::Unlinked);
        Ok(())
    }
}
