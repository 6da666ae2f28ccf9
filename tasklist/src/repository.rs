//! Persisted tasks and relationships, filtered by owner on every path.
//!
//! Every statement carries a `user_id` predicate, so an id belonging to
//! another user simply matches nothing. Statements that match nothing
//! complete without error.
//!
//! Bulk per-item updates run inside one transaction; `IN`-list operations
//! are a single statement. Blob cleanup happens before the row mutation
//! and is best-effort: a failed removal is logged and the mutation
//! proceeds.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tasklist_proto::ordering::{sequences_from_order, top_sequence};
use tasklist_proto::{
    Attachments, Relationship, SequenceUpdate, Task, TaskDetailsPatch, TaskId, TaskLink,
    TaskLinks, TextUpdate, UserId, validate_text,
};

use crate::blob::{BlobLocator, BlobStore};
use crate::db::Database;
use crate::error::TaskError;

/// Default upper bound on items in one bulk call.
pub const DEFAULT_MAX_BATCH_ITEMS: usize = 1000;

const TASK_COLUMNS: &str =
    "id, text, description, done, images, files, parent_id, user_id, sequence, created_at";

#[derive(FromRow)]
struct TaskRow {
    id: i64,
    text: String,
    description: Option<String>,
    done: bool,
    images: String,
    files: String,
    parent_id: Option<i64>,
    user_id: String,
    sequence: i64,
    created_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_task(self) -> Result<Task, TaskError> {
        let id = TaskId::new(self.id);
        let attachments = decode_attachments(id, &self.images, &self.files)?;
        let user_id = self.user_id.parse().map_err(|e| TaskError::CorruptRow {
            id,
            reason: format!("user_id: {e}"),
        })?;
        Ok(Task {
            id,
            text: self.text,
            description: self.description,
            done: self.done,
            images: attachments.images,
            files: attachments.files,
            parent_id: self.parent_id.map(TaskId::new),
            user_id,
            sequence: self.sequence,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct AttachmentRow {
    id: i64,
    images: String,
    files: String,
}

impl AttachmentRow {
    /// Decoded attachments, or `None` (logged) if the stored JSON is
    /// unreadable. Cleanup is best-effort, so a corrupt column must not
    /// block the mutation that would replace or remove it.
    fn attachments(&self) -> Option<Attachments> {
        let id = TaskId::new(self.id);
        match decode_attachments(id, &self.images, &self.files) {
            Ok(attachments) => Some(attachments),
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "skipping cleanup of unreadable attachments");
                None
            }
        }
    }
}

fn decode_attachments(id: TaskId, images: &str, files: &str) -> Result<Attachments, TaskError> {
    let corrupt = |column: &str, e: serde_json::Error| TaskError::CorruptRow {
        id,
        reason: format!("{column}: {e}"),
    };
    Ok(Attachments::new(
        serde_json::from_str(images).map_err(|e| corrupt("images", e))?,
        serde_json::from_str(files).map_err(|e| corrupt("files", e))?,
    ))
}

fn encode_json<T: Serialize>(id: TaskId, column: &str, value: &T) -> Result<String, TaskError> {
    serde_json::to_string(value).map_err(|e| TaskError::CorruptRow {
        id,
        reason: format!("{column}: {e}"),
    })
}

fn push_id_list(builder: &mut QueryBuilder<'_, Sqlite>, ids: &[TaskId]) {
    builder.push(" AND id IN (");
    let mut list = builder.separated(", ");
    for id in ids {
        list.push_bind(id.get());
    }
    list.push_unseparated(")");
}

/// Owner-scoped access to tasks and relationships.
#[derive(Debug, Clone)]
pub struct TaskRepository<B> {
    pool: SqlitePool,
    blobs: B,
    locator: BlobLocator,
    max_batch_items: usize,
}

impl<B: BlobStore> TaskRepository<B> {
    /// Creates a repository over the shared pool, removing attachments
    /// from `blobs`.
    #[must_use]
    pub fn new(db: &Database, blobs: B) -> Self {
        Self {
            pool: db.pool().clone(),
            blobs,
            locator: BlobLocator::default(),
            max_batch_items: DEFAULT_MAX_BATCH_ITEMS,
        }
    }

    /// Uses `locator` to map attachment URLs to blob paths.
    #[must_use]
    pub fn with_locator(mut self, locator: BlobLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Caps the number of items accepted by one bulk call.
    #[must_use]
    pub fn with_max_batch_items(mut self, max: usize) -> Self {
        self.max_batch_items = max.max(1);
        self
    }

    #[must_use]
    pub const fn blobs(&self) -> &B {
        &self.blobs
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// All of `user`'s tasks in display order.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Database`] or [`TaskError::CorruptRow`].
    pub async fn list(&self, user: UserId) -> Result<Vec<Task>, TaskError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ? ORDER BY sequence, created_at, id"
        ))
        .bind(user.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// One of `user`'s tasks, or `None` if missing or owned by someone else.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Database`] or [`TaskError::CorruptRow`].
    pub async fn get(&self, user: UserId, id: TaskId) -> Result<Option<Task>, TaskError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND user_id = ?"
        ))
        .bind(id.get())
        .bind(user.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TaskRow::into_task).transpose()
    }

    /// Relationship rows where `id` is the parent or the child.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Database`].
    pub async fn links(&self, user: UserId, id: TaskId) -> Result<TaskLinks, TaskError> {
        let pairs: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT parent_id, child_id FROM task_relationships \
             WHERE user_id = ?1 AND (parent_id = ?2 OR child_id = ?2) \
             ORDER BY parent_id, child_id",
        )
        .bind(user.to_string())
        .bind(id.get())
        .fetch_all(&self.pool)
        .await?;

        let mut links = TaskLinks::default();
        for (parent, child) in pairs {
            if child == id.get() {
                links.parents.push(TaskId::new(parent));
            } else {
                links.children.push(TaskId::new(child));
            }
        }
        Ok(links)
    }

    /// Every relationship row owned by `user`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Database`].
    pub async fn relationships(&self, user: UserId) -> Result<Vec<Relationship>, TaskError> {
        let pairs: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT parent_id, child_id FROM task_relationships \
             WHERE user_id = ? ORDER BY parent_id, child_id",
        )
        .bind(user.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(pairs
            .into_iter()
            .map(|(parent, child)| Relationship {
                parent_id: TaskId::new(parent),
                child_id: TaskId::new(child),
                user_id: user,
            })
            .collect())
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Inserts a task above all of `user`'s existing tasks.
    ///
    /// The new sequence is one less than the current minimum (or `0` for a
    /// first task). When the minimum is already `i64::MIN` the existing
    /// tasks are first renumbered `0..n` in display order, and the new task
    /// takes `-1`. Everything runs in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Validation`] for empty or oversized text, or
    /// [`TaskError::Database`].
    pub async fn create(&self, user: UserId, text: &str) -> Result<Task, TaskError> {
        let text = validate_text(text)?;
        let user_key = user.to_string();

        // Insert first so the transaction holds the write lock before the
        // minimum is read.
        let mut tx = self.pool.begin().await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO tasks (text, user_id, sequence, created_at) VALUES (?, ?, 0, ?) RETURNING id",
        )
        .bind(text)
        .bind(&user_key)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let current_min: Option<i64> =
            sqlx::query_scalar("SELECT MIN(sequence) FROM tasks WHERE user_id = ? AND id <> ?")
                .bind(&user_key)
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        let sequence = if let Some(sequence) = top_sequence(current_min) {
            sequence
        } else {
            let ids: Vec<i64> = sqlx::query_scalar(
                "SELECT id FROM tasks WHERE user_id = ? AND id <> ? \
                 ORDER BY sequence, created_at, id",
            )
            .bind(&user_key)
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
            let renumbered = sequences_from_order(ids.into_iter().map(TaskId::new));
            for item in &renumbered {
                sqlx::query("UPDATE tasks SET sequence = ? WHERE id = ?")
                    .bind(item.sequence)
                    .bind(item.id.get())
                    .execute(&mut *tx)
                    .await?;
            }
            tracing::info!(
                user_id = %user,
                renumbered = renumbered.len(),
                "sequence floor reached, task list renumbered"
            );
            -1
        };

        let row: TaskRow = sqlx::query_as(&format!(
            "UPDATE tasks SET sequence = ? WHERE id = ? RETURNING {TASK_COLUMNS}"
        ))
        .bind(sequence)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let task = row.into_task()?;
        tracing::debug!(user_id = %user, task_id = %task.id, sequence = task.sequence, "task created");
        Ok(task)
    }

    /// Deletes one task and its attachments.
    ///
    /// Returns `false` without touching anything when no task with `id`
    /// belongs to `user`. Relationship rows cascade with the task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Database`].
    pub async fn delete(&self, user: UserId, id: TaskId) -> Result<bool, TaskError> {
        let user_key = user.to_string();
        let row: Option<AttachmentRow> =
            sqlx::query_as("SELECT id, images, files FROM tasks WHERE id = ? AND user_id = ?")
                .bind(id.get())
                .bind(&user_key)
                .fetch_optional(&self.pool)
                .await?;
        let Some(row) = row else {
            tracing::debug!(user_id = %user, task_id = %id, "delete matched no owned task");
            return Ok(false);
        };

        if let Some(attachments) = row.attachments() {
            self.remove_blobs(&attachments.urls()).await;
        }

        let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND user_id = ?")
            .bind(id.get())
            .bind(&user_key)
            .execute(&self.pool)
            .await?;
        tracing::debug!(user_id = %user, task_id = %id, "task deleted");
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every owned task in `ids` and the union of their attachments.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::BatchTooLarge`] or [`TaskError::Database`].
    pub async fn bulk_delete(&self, user: UserId, ids: &[TaskId]) -> Result<u64, TaskError> {
        let ids = self.unique_ids(ids)?;
        if ids.is_empty() {
            return Ok(0);
        }
        let user_key = user.to_string();

        let mut select = QueryBuilder::<Sqlite>::new("SELECT id, images, files FROM tasks WHERE user_id = ");
        select.push_bind(user_key.clone());
        push_id_list(&mut select, &ids);
        let rows: Vec<AttachmentRow> = select.build_query_as().fetch_all(&self.pool).await?;

        let attachments: Vec<Attachments> =
            rows.iter().filter_map(AttachmentRow::attachments).collect();
        let urls: Vec<&str> = attachments.iter().flat_map(Attachments::urls).collect();
        self.remove_blobs(&urls).await;

        let mut delete = QueryBuilder::<Sqlite>::new("DELETE FROM tasks WHERE user_id = ");
        delete.push_bind(user_key);
        push_id_list(&mut delete, &ids);
        let deleted = delete.build().execute(&self.pool).await?.rows_affected();

        tracing::debug!(user_id = %user, requested = ids.len(), deleted, "tasks bulk deleted");
        Ok(deleted)
    }

    /// Sets `sequence` for each item in one transaction.
    ///
    /// Items naming tasks `user` does not own update nothing; the rest
    /// still apply. Any store error rolls back the whole batch. Returns
    /// the number of rows updated.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::BatchTooLarge`] or [`TaskError::Database`].
    pub async fn update_sequence(
        &self,
        user: UserId,
        items: &[SequenceUpdate],
    ) -> Result<u64, TaskError> {
        self.check_batch(items.len())?;
        if items.is_empty() {
            return Ok(0);
        }
        let user_key = user.to_string();

        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for item in items {
            updated += sqlx::query("UPDATE tasks SET sequence = ? WHERE id = ? AND user_id = ?")
                .bind(item.sequence)
                .bind(item.id.get())
                .bind(&user_key)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        tracing::debug!(user_id = %user, requested = items.len(), updated, "sequences updated");
        Ok(updated)
    }

    /// Sets `text` for each item in one transaction.
    ///
    /// Texts are validated before the transaction opens, so one bad text
    /// rejects the whole batch without touching the store.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Validation`], [`TaskError::BatchTooLarge`] or
    /// [`TaskError::Database`].
    pub async fn update_texts(&self, user: UserId, items: &[TextUpdate]) -> Result<u64, TaskError> {
        self.check_batch(items.len())?;
        let items = items
            .iter()
            .map(|item| Ok((item.id, validate_text(&item.text)?)))
            .collect::<Result<Vec<_>, TaskError>>()?;
        if items.is_empty() {
            return Ok(0);
        }
        let user_key = user.to_string();

        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for (id, text) in &items {
            updated += sqlx::query("UPDATE tasks SET text = ? WHERE id = ? AND user_id = ?")
                .bind(text)
                .bind(id.get())
                .bind(&user_key)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        tracing::debug!(user_id = %user, requested = items.len(), updated, "texts updated");
        Ok(updated)
    }

    /// Flips `done` on every owned task in `ids` in a single statement.
    ///
    /// Duplicate ids flip once.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::BatchTooLarge`] or [`TaskError::Database`].
    pub async fn toggle_done(&self, user: UserId, ids: &[TaskId]) -> Result<u64, TaskError> {
        let ids = self.unique_ids(ids)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let mut update = QueryBuilder::<Sqlite>::new("UPDATE tasks SET done = NOT done WHERE user_id = ");
        update.push_bind(user.to_string());
        push_id_list(&mut update, &ids);
        let toggled = update.build().execute(&self.pool).await?.rows_affected();

        tracing::debug!(user_id = %user, requested = ids.len(), toggled, "done toggled");
        Ok(toggled)
    }

    /// Applies the fields present in `patch` to one owned task.
    ///
    /// When images or files are replaced, blobs referenced before but not
    /// after the update are removed first. Returns `false` when the patch
    /// is empty or no owned task matched.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Validation`], [`TaskError::InvalidParent`] or
    /// [`TaskError::Database`].
    pub async fn update_details(
        &self,
        user: UserId,
        id: TaskId,
        patch: TaskDetailsPatch,
    ) -> Result<bool, TaskError> {
        let patch = patch.validated(id)?;
        if patch.is_empty() {
            return Ok(false);
        }
        let user_key = user.to_string();

        if let Some(Some(parent)) = patch.parent_id {
            self.check_parent(&user_key, id, parent).await?;
        }

        if patch.touches_attachments() {
            let row: Option<AttachmentRow> =
                sqlx::query_as("SELECT id, images, files FROM tasks WHERE id = ? AND user_id = ?")
                    .bind(id.get())
                    .bind(&user_key)
                    .fetch_optional(&self.pool)
                    .await?;
            let Some(row) = row else {
                tracing::debug!(user_id = %user, task_id = %id, "details update matched no owned task");
                return Ok(false);
            };
            if let Some(current) = row.attachments() {
                let removed = current.removed_urls(patch.images.as_deref(), patch.files.as_deref());
                let removed: Vec<&str> = removed.iter().map(String::as_str).collect();
                self.remove_blobs(&removed).await;
            }
        }

        let mut update = QueryBuilder::<Sqlite>::new("UPDATE tasks SET ");
        {
            let mut fields = update.separated(", ");
            if let Some(text) = patch.text {
                fields.push("text = ").push_bind_unseparated(text);
            }
            if let Some(description) = patch.description {
                fields.push("description = ").push_bind_unseparated(description);
            }
            if let Some(images) = &patch.images {
                fields
                    .push("images = ")
                    .push_bind_unseparated(encode_json(id, "images", images)?);
            }
            if let Some(files) = &patch.files {
                fields
                    .push("files = ")
                    .push_bind_unseparated(encode_json(id, "files", files)?);
            }
            if let Some(parent) = patch.parent_id {
                fields
                    .push("parent_id = ")
                    .push_bind_unseparated(parent.map(TaskId::get));
            }
        }
        update.push(" WHERE id = ").push_bind(id.get());
        update.push(" AND user_id = ").push_bind(user_key);

        let updated = update.build().execute(&self.pool).await?.rows_affected() > 0;
        tracing::debug!(user_id = %user, task_id = %id, updated, "details updated");
        Ok(updated)
    }

    /// Records `link.parent_id -> link.child_id`.
    ///
    /// Returns `false` when either task is not owned by `user` or the link
    /// already exists.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Validation`] for a self-link or
    /// [`TaskError::Database`].
    pub async fn link(&self, user: UserId, link: TaskLink) -> Result<bool, TaskError> {
        let link = link.validate()?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO task_relationships (parent_id, child_id, user_id) \
             SELECT ?1, ?2, ?3 \
             WHERE (SELECT COUNT(*) FROM tasks WHERE user_id = ?3 AND id IN (?1, ?2)) = 2",
        )
        .bind(link.parent_id.get())
        .bind(link.child_id.get())
        .bind(user.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;
        tracing::debug!(
            user_id = %user,
            parent_id = %link.parent_id,
            child_id = %link.child_id,
            inserted,
            "tasks linked"
        );
        Ok(inserted)
    }

    /// Removes the `link.parent_id -> link.child_id` row if `user` owns it.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Database`].
    pub async fn unlink(&self, user: UserId, link: TaskLink) -> Result<bool, TaskError> {
        let removed = sqlx::query(
            "DELETE FROM task_relationships WHERE parent_id = ? AND child_id = ? AND user_id = ?",
        )
        .bind(link.parent_id.get())
        .bind(link.child_id.get())
        .bind(user.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;
        tracing::debug!(
            user_id = %user,
            parent_id = %link.parent_id,
            child_id = %link.child_id,
            removed,
            "tasks unlinked"
        );
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn check_batch(&self, len: usize) -> Result<(), TaskError> {
        if len > self.max_batch_items {
            return Err(TaskError::BatchTooLarge {
                len,
                max: self.max_batch_items,
            });
        }
        Ok(())
    }

    fn unique_ids(&self, ids: &[TaskId]) -> Result<Vec<TaskId>, TaskError> {
        self.check_batch(ids.len())?;
        let mut seen = HashSet::with_capacity(ids.len());
        Ok(ids.iter().copied().filter(|id| seen.insert(*id)).collect())
    }

    /// Rejects a parent that `user` does not own or whose ancestor chain
    /// already contains `id`.
    async fn check_parent(&self, user_key: &str, id: TaskId, parent: TaskId) -> Result<(), TaskError> {
        let ancestors: Vec<i64> = sqlx::query_scalar(
            "WITH RECURSIVE ancestors(id, parent_id) AS ( \
                 SELECT id, parent_id FROM tasks WHERE id = ?1 AND user_id = ?2 \
                 UNION \
                 SELECT t.id, t.parent_id FROM tasks t \
                 JOIN ancestors a ON t.id = a.parent_id WHERE t.user_id = ?2 \
             ) \
             SELECT id FROM ancestors",
        )
        .bind(parent.get())
        .bind(user_key)
        .fetch_all(&self.pool)
        .await?;

        if ancestors.is_empty() || ancestors.contains(&id.get()) {
            return Err(TaskError::InvalidParent(parent));
        }
        Ok(())
    }

    async fn remove_blobs(&self, urls: &[&str]) {
        let paths = self.locator.paths_of(urls.iter().copied());
        if paths.is_empty() {
            return;
        }
        match self.blobs.remove(&paths).await {
            Ok(()) => tracing::debug!(count = paths.len(), "attachment blobs removed"),
            Err(e) => tracing::warn!(
                count = paths.len(),
                error = %e,
                "attachment cleanup failed, continuing"
            ),
        }
    }
}
