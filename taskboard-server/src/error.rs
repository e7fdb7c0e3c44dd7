//! Handler error taxonomy and its mapping onto the JSON envelope.
//!
//! Every handler returns `Result<_, ApiError>`; nothing escapes the handler
//! boundary as a panic or a bare framework error.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use taskboard_proto::body::ValidationError;
use taskboard_proto::envelope::Envelope;
use taskboard_proto::model::DocumentId;
use taskboard_proto::query::QueryError;

use crate::store::StoreError;

/// Resource named in a not-found response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Task,
    User,
    /// The user named by a task's `assignedUser`.
    AssignedUser,
    Route,
}

impl Resource {
    const fn not_found_message(self) -> &'static str {
        match self {
            Self::Task => "Task not found.",
            Self::User => "User not found.",
            Self::AssignedUser => "Assigned user not found.",
            Self::Route => "Route not found.",
        }
    }
}

/// What went wrong while handling a request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// `where`, `sort`, `select`, `skip` or `limit` was malformed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The request body or query string could not be decoded.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// A required field was missing or unusable.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Bad identifier syntax or no matching record; the two are not
    /// distinguished.
    #[error("{}", .0.not_found_message())]
    NotFound(Resource),

    /// `pendingTasks` named tasks that do not exist.
    #[error("unknown tasks in pendingTasks: {0:?}")]
    MissingTasks(Vec<String>),

    /// Claiming these tasks would take them from another user.
    #[error("tasks already assigned to another user: {0:?}")]
    Conflict(Vec<DocumentId>),

    /// The email is already used by another user.
    #[error("a user with this email already exists")]
    DuplicateEmail,

    /// The store rejected a write.
    #[error("{context}: {source}")]
    Store {
        /// Message returned to the caller.
        context: &'static str,
        source: StoreError,
    },
}

impl ApiError {
    /// Wraps a store error, promoting an email uniqueness violation to
    /// [`ApiError::DuplicateEmail`].
    pub fn store(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| match source {
            StoreError::DuplicateKey { field: "email", .. } => Self::DuplicateEmail,
            source => Self::Store { context, source },
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Query(_)
            | Self::Malformed(_)
            | Self::Validation(_)
            | Self::Conflict(_)
            | Self::DuplicateEmail => StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::MissingTasks(_) => StatusCode::NOT_FOUND,
            Self::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn envelope(&self) -> Envelope<Value> {
        match self {
            Self::Query(e) => {
                Envelope::new(format!("Invalid '{}' parameter.", e.param), json!(e.detail))
            }
            Self::Malformed(detail) => Envelope::new("Malformed request.", json!(detail)),
            Self::Validation(e) => Envelope::new(format!("Validation Error: {e}."), json!({})),
            Self::NotFound(resource) => Envelope::new(resource.not_found_message(), json!({})),
            Self::MissingTasks(ids) => Envelope::new("Task not found.", json!(ids)),
            Self::Conflict(ids) => Envelope::new(
                "Conflict: One or more tasks are already assigned to another user.",
                json!(ids),
            ),
            Self::DuplicateEmail => {
                Envelope::new("A user with this email already exists.", json!({}))
            }
            Self::Store { context, source } => {
                Envelope::new(*context, json!({ "error": source.to_string() }))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, Json(self.envelope())).into_response()
    }
}
