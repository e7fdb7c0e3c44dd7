//! HTTP server core: shared state, routing, and helpers common to the task
//! and user handlers.
//!
//! All routes live under `/api`. Every response, including errors and
//! unknown routes, is a `{ message, data }` envelope.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query};
use axum::Router;
use axum::routing::get;
use serde_json::{Value, json};
use taskboard_proto::envelope::Envelope;
use taskboard_proto::model::DocumentId;
use taskboard_proto::query::{DEFAULT_TASK_LIMIT, ListQuery, Projection, QueryParams};

use crate::error::{ApiError, Resource};
use crate::store::{Collection, DocumentStore, StoreError, Stored};
use crate::{tasks, users};

/// Default maximum accepted request body size in bytes (1 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Shared server state: the document store and query defaults.
///
/// Handed to every handler explicitly through axum's `State`; there is no
/// process-wide store.
pub struct AppState {
    /// Task and user collections.
    pub store: DocumentStore,
    /// `limit` applied to task listings when the request omits it.
    pub task_default_limit: usize,
    /// Maximum accepted request body size in bytes.
    max_body_size: usize,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Creates state with an empty store and default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DocumentStore::new(), DEFAULT_TASK_LIMIT, DEFAULT_MAX_BODY_SIZE)
    }

    /// Creates state around a pre-built store with custom limits.
    #[must_use]
    pub const fn with_config(
        store: DocumentStore,
        task_default_limit: usize,
        max_body_size: usize,
    ) -> Self {
        Self {
            store,
            task_default_limit,
            max_body_size,
        }
    }
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let max_body_size = state.max_body_size;
    let api = Router::new()
        .route("/", get(api_root))
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/tasks/{id}",
            get(tasks::get_task)
                .put(tasks::replace_task)
                .delete(tasks::delete_task),
        )
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/{id}",
            get(users::get_user)
                .put(users::replace_user)
                .delete(users::delete_user),
        );

    Router::new()
        .nest("/api", api)
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(state)
}

/// Starts the server on the given address and returns the bound address and
/// a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(AppState::new())).await
}

/// Starts the server with a pre-configured [`AppState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<AppState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

async fn api_root() -> Json<Envelope<Value>> {
    Json(Envelope::ok(json!({ "resources": ["tasks", "users"] })))
}

async fn route_not_found() -> ApiError {
    ApiError::NotFound(Resource::Route)
}

// ---------------------------------------------------------------------------
// Helpers shared by the resource handlers
// ---------------------------------------------------------------------------

/// Parses a path identifier. Bad syntax is reported as not-found, the same
/// as a well-formed id with no record behind it.
pub(crate) fn parse_id(raw: &str, resource: Resource) -> Result<DocumentId, ApiError> {
    DocumentId::parse(raw).ok_or(ApiError::NotFound(resource))
}

/// Unwraps a JSON body, turning framework rejections into envelopes.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::Malformed(e.body_text()))
}

/// Unwraps query-string parameters, turning framework rejections into
/// envelopes.
pub(crate) fn query_params(
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Result<QueryParams, ApiError> {
    params
        .map(|Query(p)| p)
        .map_err(|e| ApiError::Malformed(e.body_text()))
}

/// Envelope messages for store failures while listing one collection.
pub(crate) struct ListMessages {
    pub retrieving: &'static str,
    pub counting: &'static str,
}

/// Runs a list query in fetch or count mode.
pub(crate) async fn list_documents<D: Stored>(
    collection: &Collection<D>,
    query: &ListQuery,
    messages: &ListMessages,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let data = if query.count {
        let count = collection
            .count(query)
            .await
            .map_err(ApiError::store(messages.counting))?;
        json!(count)
    } else {
        let rows = collection
            .find(query)
            .await
            .map_err(ApiError::store(messages.retrieving))?;
        Value::Array(rows)
    };
    Ok(Json(Envelope::ok(data)))
}

/// Serializes one document and applies an optional projection.
pub(crate) fn project_one<D: Stored>(
    doc: &D,
    projection: Option<&Projection>,
    context: &'static str,
) -> Result<Value, ApiError> {
    let value = serde_json::to_value(doc)
        .map_err(|e| ApiError::store(context)(StoreError::Encoding(e.to_string())))?;
    Ok(match (value, projection) {
        (Value::Object(map), Some(p)) => Value::Object(p.apply(map)),
        (value, _) => value,
    })
}
