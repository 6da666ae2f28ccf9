//! Integration tests driving a `ListSession` against the real facade.
//!
//! Each test plays one interaction: enter a mode, edit locally, save
//! through the facade, then reconcile with a fresh read.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use tasklist::{
    ChangeNotifier, Database, ListSession, MemoryBlobStore, Mode, SessionError, StaticIdentity,
    TaskActions, TaskError, TaskRepository,
};
use tasklist_proto::{TaskId, UserId};
use tempfile::TempDir;

type Actions = TaskActions<MemoryBlobStore, StaticIdentity>;

async fn setup(texts: &[&str]) -> (TempDir, Actions, ListSession) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("tasks.db")).await.unwrap();
    let repo = Arc::new(TaskRepository::new(&db, MemoryBlobStore::new()));
    let actions = TaskActions::new(
        repo,
        StaticIdentity::signed_in(UserId::random()),
        ChangeNotifier::new(),
    );
    for text in texts.iter().rev() {
        actions.create_task(text).await.unwrap();
    }
    let mut session = ListSession::default();
    assert!(session.refresh_with(&actions).await.unwrap());
    (dir, actions, session)
}

fn texts(session: &ListSession) -> Vec<&str> {
    session.tasks().iter().map(|task| task.text.as_str()).collect()
}

async fn refresh(session: &mut ListSession, actions: &Actions) {
    assert!(session.refresh_with(actions).await.unwrap());
}

#[tokio::test]
async fn reorder_round_trip() {
    let (_dir, actions, mut session) = setup(&["a", "b", "c"]).await;
    assert_eq!(texts(&session), vec!["a", "b", "c"]);

    session.enter(Mode::Reordering).unwrap();
    session.move_item(2, 0).unwrap();
    session.save_with(&actions).await.unwrap();
    assert_eq!(session.mode(), Mode::Idle);
    assert_eq!(texts(&session), vec!["c", "a", "b"]);

    refresh(&mut session, &actions).await;
    assert_eq!(texts(&session), vec!["c", "a", "b"]);
    let sequences: Vec<i64> = session.tasks().iter().map(|task| task.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2]);
}

#[tokio::test]
async fn create_puts_new_task_on_top() {
    let (_dir, actions, mut session) = setup(&["old"]).await;

    session.enter(Mode::Creating).unwrap();
    session.set_draft("  new  ").unwrap();
    let created = session.save_with(&actions).await.unwrap().unwrap();
    assert_eq!(created.text, "new");
    assert_eq!(texts(&session), vec!["new", "old"]);
    assert!(session.draft().is_empty());

    refresh(&mut session, &actions).await;
    assert_eq!(texts(&session), vec!["new", "old"]);
}

#[tokio::test]
async fn editing_sends_only_changed_rows() {
    let (_dir, actions, mut session) = setup(&["a", "b"]).await;
    let before = actions.notifier().revision();

    session.enter(Mode::Editing).unwrap();
    let b = session.tasks()[1].id;
    session.edit_text(b, "bee").unwrap();
    session.save_with(&actions).await.unwrap();
    assert_eq!(actions.notifier().revision(), before + 1);

    refresh(&mut session, &actions).await;
    assert_eq!(texts(&session), vec!["a", "bee"]);

    // Nothing changed: no facade call at all.
    session.enter(Mode::Editing).unwrap();
    assert!(session.save_with(&actions).await.unwrap().is_none());
    assert_eq!(actions.notifier().revision(), before + 1);
}

#[tokio::test]
async fn selection_modes_toggle_and_delete() {
    let (_dir, actions, mut session) = setup(&["a", "b", "c"]).await;
    let ids: Vec<TaskId> = session.tasks().iter().map(|task| task.id).collect();

    session.enter(Mode::SelectingDone).unwrap();
    session.toggle_selected(ids[0]).unwrap();
    session.toggle_selected(ids[2]).unwrap();
    session.save_with(&actions).await.unwrap();
    refresh(&mut session, &actions).await;
    let done: Vec<bool> = session.tasks().iter().map(|task| task.done).collect();
    assert_eq!(done, vec![true, false, true]);

    session.enter(Mode::SelectingDelete).unwrap();
    session.toggle_selected(ids[1]).unwrap();
    session.save_with(&actions).await.unwrap();
    refresh(&mut session, &actions).await;
    assert_eq!(texts(&session), vec!["a", "c"]);
}

#[tokio::test]
async fn failed_save_reverts_local_state() {
    let (_dir, actions, mut session) = setup(&["a", "b"]).await;
    let signed_out = actions.for_identity(StaticIdentity::anonymous());

    session.enter(Mode::SelectingDelete).unwrap();
    session.toggle_selected(session.tasks()[0].id).unwrap();
    let err = session.save_with(&signed_out).await.unwrap_err();

    assert!(matches!(err, SessionError::Mutation(TaskError::Unauthorized)));
    assert_eq!(texts(&session), vec!["a", "b"]);
    assert_eq!(session.mode(), Mode::Idle);
    assert!(!session.is_saving());
    assert_eq!(actions.list_tasks().await.unwrap().len(), 2);
}

#[tokio::test]
async fn discard_makes_no_facade_call() {
    let (_dir, actions, mut session) = setup(&["a", "b"]).await;
    let before = actions.notifier().revision();

    session.enter(Mode::Reordering).unwrap();
    session.move_item(0, 1).unwrap();
    session.discard().unwrap();

    assert_eq!(texts(&session), vec!["a", "b"]);
    assert_eq!(actions.notifier().revision(), before);
}

#[tokio::test]
async fn discard_after_saved_delete_keeps_it_deleted() {
    let (_dir, actions, mut session) = setup(&["a", "b"]).await;

    session.enter(Mode::SelectingDelete).unwrap();
    session.toggle_selected(session.tasks()[0].id).unwrap();
    session.save_with(&actions).await.unwrap();
    assert_eq!(texts(&session), vec!["b"]);

    session.enter(Mode::Reordering).unwrap();
    session.discard().unwrap();
    assert_eq!(texts(&session), vec!["b"]);
    assert_eq!(actions.list_tasks().await.unwrap().len(), 1);
}

#[tokio::test]
async fn snapshot_read_before_save_is_dropped_on_completion() {
    let (_dir, actions, mut session) = setup(&["a", "b"]).await;
    let stale_revision = actions.notifier().revision();
    let stale = actions.list_tasks().await.unwrap();

    session.enter(Mode::SelectingDelete).unwrap();
    session.toggle_selected(session.tasks()[0].id).unwrap();
    let mutation = session.save().unwrap().unwrap();
    assert_eq!(texts(&session), vec!["b"]);

    // Delivered while the delete is in flight.
    assert!(!session.apply_authoritative(stale_revision, stale));
    assert_eq!(texts(&session), vec!["b"]);

    let result = mutation.run(&actions).await;
    session.complete(&result, actions.notifier().revision());

    assert_eq!(texts(&session), vec!["b"]);
    assert_eq!(session.mode(), Mode::Idle);
}

#[tokio::test]
async fn snapshot_read_after_save_applies_on_completion() {
    let (_dir, actions, mut session) = setup(&["a", "b"]).await;

    session.enter(Mode::SelectingDelete).unwrap();
    session.toggle_selected(session.tasks()[0].id).unwrap();
    let mutation = session.save().unwrap().unwrap();
    let result = mutation.run(&actions).await;
    let confirmed = actions.notifier().revision();

    // Another client adds a task before the completion is processed.
    actions.create_task("elsewhere").await.unwrap();
    assert!(!session.refresh_with(&actions).await.unwrap());
    session.complete(&result, confirmed);

    assert_eq!(texts(&session), vec!["elsewhere", "b"]);
    assert_eq!(session.revision(), actions.notifier().revision());
}
