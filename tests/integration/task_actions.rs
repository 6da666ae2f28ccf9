//! Integration tests for the mutation facade.
//!
//! Checks identity resolution, the change signal emitted after each
//! successful mutation, and that repository errors pass through unchanged.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use tasklist::{
    ChangeNotifier, Database, MemoryBlobStore, StaticIdentity, TaskActions, TaskError,
    TaskRepository,
};
use tasklist_proto::{
    DataChanged, ImageRef, MutationKind, SequenceUpdate, TaskDetailsPatch, TaskLink, TextUpdate,
    UserId, ViewScope,
};
use tempfile::TempDir;
use tokio::sync::broadcast;

type Actions = TaskActions<Arc<MemoryBlobStore>, StaticIdentity>;

struct Fixture {
    _dir: TempDir,
    blobs: Arc<MemoryBlobStore>,
    anonymous: Actions,
}

impl Fixture {
    fn as_user(&self, user: UserId) -> Actions {
        self.anonymous.for_identity(StaticIdentity::signed_in(user))
    }
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("tasks.db")).await.unwrap();
    let blobs = Arc::new(MemoryBlobStore::new());
    let repo = Arc::new(TaskRepository::new(&db, Arc::clone(&blobs)).with_max_batch_items(10));
    Fixture {
        _dir: dir,
        blobs,
        anonymous: TaskActions::new(repo, StaticIdentity::anonymous(), ChangeNotifier::new()),
    }
}

fn drain(rx: &mut broadcast::Receiver<DataChanged>) -> Vec<DataChanged> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

#[tokio::test]
async fn create_returns_task_and_signals() {
    let f = fixture().await;
    let user = UserId::random();
    let actions = f.as_user(user);
    let mut rx = actions.notifier().subscribe();

    let task = actions.create_task("  write tests ").await.unwrap();
    assert_eq!(task.text, "write tests");
    assert_eq!(task.user_id, user);
    assert_eq!(actions.get_task(task.id).await.unwrap(), Some(task));

    let signals = drain(&mut rx);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].user_id, user);
    assert_eq!(signals[0].kind, MutationKind::Created);
    assert_eq!(signals[0].view, ViewScope::TaskList);
    assert_eq!(signals[0].revision, 1);
}

#[tokio::test]
async fn every_mutation_signals_once_and_reads_do_not() {
    let f = fixture().await;
    let user = UserId::random();
    let actions = f.as_user(user);
    let a = actions.create_task("a").await.unwrap();
    let b = actions.create_task("b").await.unwrap();
    let mut rx = actions.notifier().subscribe();

    let link = TaskLink {
        parent_id: a.id,
        child_id: b.id,
    };
    actions
        .update_tasks_sequence(&[SequenceUpdate {
            id: a.id,
            sequence: -10,
        }])
        .await
        .unwrap();
    actions
        .update_task_texts(&[TextUpdate {
            id: b.id,
            text: "bee".to_string(),
        }])
        .await
        .unwrap();
    actions.toggle_tasks_done(&[a.id]).await.unwrap();
    actions
        .update_task_details(
            a.id,
            TaskDetailsPatch {
                description: Some(Some("details".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    actions.link_tasks(link).await.unwrap();
    actions.list_tasks().await.unwrap();
    actions.task_links(a.id).await.unwrap();
    actions.unlink_tasks(link).await.unwrap();
    actions.delete_task(a.id).await.unwrap();
    actions.bulk_delete_tasks(&[b.id]).await.unwrap();

    let kinds: Vec<MutationKind> = drain(&mut rx).iter().map(|signal| signal.kind).collect();
    assert_eq!(
        kinds,
        vec![
            MutationKind::Reordered,
            MutationKind::TextsUpdated,
            MutationKind::DoneToggled,
            MutationKind::DetailsUpdated,
            MutationKind::Linked,
            MutationKind::Unlinked,
            MutationKind::Deleted,
            MutationKind::Deleted,
        ]
    );
    assert!(actions.list_tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn unauthorized_fails_before_any_access() {
    let f = fixture().await;
    let user = UserId::random();
    let task = f.as_user(user).create_task("mine").await.unwrap();
    f.as_user(user)
        .update_task_details(
            task.id,
            TaskDetailsPatch {
                images: Some(vec![ImageRef::new("u1").unwrap()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let revision = f.anonymous.notifier().revision();

    let anonymous = &f.anonymous;
    assert!(matches!(
        anonymous.create_task("sneaky").await,
        Err(TaskError::Unauthorized)
    ));
    assert!(matches!(
        anonymous.delete_task(task.id).await,
        Err(TaskError::Unauthorized)
    ));
    assert!(matches!(
        anonymous.bulk_delete_tasks(&[task.id]).await,
        Err(TaskError::Unauthorized)
    ));
    assert!(matches!(
        anonymous.list_tasks().await,
        Err(TaskError::Unauthorized)
    ));

    assert_eq!(f.anonymous.notifier().revision(), revision);
    assert!(f.blobs.removals().is_empty());
    assert_eq!(f.as_user(user).list_tasks().await.unwrap().len(), 1);
}

#[tokio::test]
async fn repository_errors_propagate_unchanged() {
    let f = fixture().await;
    let actions = f.as_user(UserId::random());
    let ids: Vec<_> = (0..11).map(tasklist_proto::TaskId::new).collect();

    let err = actions.toggle_tasks_done(&ids).await.unwrap_err();
    assert!(matches!(err, TaskError::BatchTooLarge { len: 11, max: 10 }));
    assert_eq!(actions.notifier().revision(), 0);
}

#[tokio::test]
async fn created_id_can_be_linked_immediately() {
    let f = fixture().await;
    let actions = f.as_user(UserId::random());
    let parent = actions.create_task("epic").await.unwrap();

    let child = actions.create_task("subtask").await.unwrap();
    actions
        .link_tasks(TaskLink {
            parent_id: parent.id,
            child_id: child.id,
        })
        .await
        .unwrap();

    let links = actions.task_links(parent.id).await.unwrap();
    assert_eq!(links.children, vec![child.id]);
}

#[tokio::test]
async fn signals_carry_the_acting_user() {
    let f = fixture().await;
    let (alice, bob) = (UserId::random(), UserId::random());
    let mut rx = f.anonymous.notifier().subscribe();

    f.as_user(alice).create_task("a").await.unwrap();
    f.as_user(bob).create_task("b").await.unwrap();

    let users: Vec<UserId> = drain(&mut rx).iter().map(|signal| signal.user_id).collect();
    assert_eq!(users, vec![alice, bob]);
    assert_eq!(f.as_user(bob).list_tasks().await.unwrap().len(), 1);
}
