//! HTTP JSON surface over [`TaskActions`].
//!
//! Each request carries the caller's id in the `x-user-id` header, set by
//! an upstream authenticator. The header becomes a per-request
//! [`StaticIdentity`]; a missing or malformed header yields an anonymous
//! identity, which the facade rejects as unauthorized.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use serde::{Deserialize, Serialize};
use tasklist::{BlobStore, ChangeNotifier, StaticIdentity, TaskActions, TaskError, TaskRepository};
use tasklist_proto::{
    SequenceUpdate, Task, TaskDetailsPatch, TaskId, TaskLink, TaskLinks, TextUpdate, UserId,
};

/// Header naming the authenticated caller.
pub const USER_HEADER: &str = "x-user-id";

/// Shared state behind every route.
pub struct AppState<B> {
    actions: TaskActions<B, StaticIdentity>,
}

impl<B: BlobStore> AppState<B> {
    #[must_use]
    pub const fn new(repo: Arc<TaskRepository<B>>, notifier: ChangeNotifier) -> Self {
        Self {
            actions: TaskActions::new(repo, StaticIdentity::anonymous(), notifier),
        }
    }

    #[must_use]
    pub const fn notifier(&self) -> &ChangeNotifier {
        self.actions.notifier()
    }

    fn actions(&self, identity: StaticIdentity) -> TaskActions<B, StaticIdentity> {
        self.actions.for_identity(identity)
    }
}

// ---------------------------------------------------------------------------
// Identity extraction
// ---------------------------------------------------------------------------

/// Caller identity read from [`USER_HEADER`].
#[derive(Debug, Clone, Copy)]
pub struct RequestIdentity(pub StaticIdentity);

impl<S: Send + Sync> FromRequestParts<S> for RequestIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| match value.trim().parse::<UserId>() {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::debug!(error = %e, "malformed user header");
                    None
                }
            });
        Ok(Self(StaticIdentity::from(user)))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// A [`TaskError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub TaskError);

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        Self(err)
    }
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match &self.0 {
            TaskError::Unauthorized => StatusCode::UNAUTHORIZED,
            TaskError::Validation(_) => StatusCode::BAD_REQUEST,
            TaskError::InvalidParent(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TaskError::BatchTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            TaskError::CorruptRow { .. } | TaskError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
            "internal error".to_string()
        } else {
            if self.0.is_client_error() {
                tracing::debug!(status = %status, error = %self.0, "request rejected");
            }
            self.0.to_string()
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateTaskBody {
    text: String,
}

#[derive(Debug, Deserialize)]
struct IdsBody {
    ids: Vec<TaskId>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

type AppResult<T> = Result<T, ApiError>;

async fn health() -> &'static str {
    "ok"
}

async fn list_tasks<B: BlobStore + 'static>(
    State(state): State<Arc<AppState<B>>>,
    RequestIdentity(identity): RequestIdentity,
) -> AppResult<Json<Vec<Task>>> {
    Ok(Json(state.actions(identity).list_tasks().await?))
}

async fn create_task<B: BlobStore + 'static>(
    State(state): State<Arc<AppState<B>>>,
    RequestIdentity(identity): RequestIdentity,
    Json(body): Json<CreateTaskBody>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let task = state.actions(identity).create_task(&body.text).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn delete_task<B: BlobStore + 'static>(
    State(state): State<Arc<AppState<B>>>,
    RequestIdentity(identity): RequestIdentity,
    Path(id): Path<TaskId>,
) -> AppResult<StatusCode> {
    state.actions(identity).delete_task(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_details<B: BlobStore + 'static>(
    State(state): State<Arc<AppState<B>>>,
    RequestIdentity(identity): RequestIdentity,
    Path(id): Path<TaskId>,
    Json(patch): Json<TaskDetailsPatch>,
) -> AppResult<StatusCode> {
    state.actions(identity).update_task_details(id, patch).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn task_links<B: BlobStore + 'static>(
    State(state): State<Arc<AppState<B>>>,
    RequestIdentity(identity): RequestIdentity,
    Path(id): Path<TaskId>,
) -> AppResult<Json<TaskLinks>> {
    Ok(Json(state.actions(identity).task_links(id).await?))
}

async fn bulk_delete<B: BlobStore + 'static>(
    State(state): State<Arc<AppState<B>>>,
    RequestIdentity(identity): RequestIdentity,
    Json(body): Json<IdsBody>,
) -> AppResult<StatusCode> {
    state.actions(identity).bulk_delete_tasks(&body.ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_done<B: BlobStore + 'static>(
    State(state): State<Arc<AppState<B>>>,
    RequestIdentity(identity): RequestIdentity,
    Json(body): Json<IdsBody>,
) -> AppResult<StatusCode> {
    state.actions(identity).toggle_tasks_done(&body.ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_sequence<B: BlobStore + 'static>(
    State(state): State<Arc<AppState<B>>>,
    RequestIdentity(identity): RequestIdentity,
    Json(items): Json<Vec<SequenceUpdate>>,
) -> AppResult<StatusCode> {
    state.actions(identity).update_tasks_sequence(&items).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_texts<B: BlobStore + 'static>(
    State(state): State<Arc<AppState<B>>>,
    RequestIdentity(identity): RequestIdentity,
    Json(items): Json<Vec<TextUpdate>>,
) -> AppResult<StatusCode> {
    state.actions(identity).update_task_texts(&items).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn link<B: BlobStore + 'static>(
    State(state): State<Arc<AppState<B>>>,
    RequestIdentity(identity): RequestIdentity,
    Json(link): Json<TaskLink>,
) -> AppResult<StatusCode> {
    state.actions(identity).link_tasks(link).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unlink<B: BlobStore + 'static>(
    State(state): State<Arc<AppState<B>>>,
    RequestIdentity(identity): RequestIdentity,
    Json(link): Json<TaskLink>,
) -> AppResult<StatusCode> {
    state.actions(identity).unlink_tasks(link).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Builds the application router.
pub fn router<B: BlobStore + 'static>(state: Arc<AppState<B>>) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/api/tasks", get(list_tasks::<B>).post(create_task::<B>))
        .route("/api/tasks/bulk-delete", post(bulk_delete::<B>))
        .route("/api/tasks/toggle-done", post(toggle_done::<B>))
        .route("/api/tasks/sequence", put(update_sequence::<B>))
        .route("/api/tasks/texts", put(update_texts::<B>))
        .route(
            "/api/tasks/{id}",
            axum::routing::delete(delete_task::<B>).patch(update_details::<B>),
        )
        .route("/api/tasks/{id}/links", get(task_links::<B>))
        .route("/api/relationships", post(link::<B>).delete(unlink::<B>))
        .with_state(state)
}

/// Starts the server on `addr` and returns the bound address and a join
/// handle. The server stops accepting connections once `shutdown`
/// resolves and finishes in-flight requests before the handle completes.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state<B: BlobStore + 'static>(
    addr: &str,
    state: Arc<AppState<B>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(error = %e, "api server error");
        }
    });

    Ok((bound_addr, handle))
}
