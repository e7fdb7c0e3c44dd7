//! `/api/tasks` handlers.
//!
//! Every write that changes a task's `(assignedUser, completed)` pair is
//! followed by the matching `pendingTasks` writes from [`crate::sync`].

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use serde_json::Value;
use taskboard_proto::body::{TaskBody, TaskDraft};
use taskboard_proto::envelope::Envelope;
use taskboard_proto::model::{DocumentId, Task, Timestamp, UNASSIGNED_NAME};
use taskboard_proto::query::{ListQuery, QueryParams, parse_select};
use taskboard_proto::schema::TASK_SCHEMA;

use crate::error::{ApiError, Resource};
use crate::server::{
    AppState, ListMessages, json_body, list_documents, parse_id, project_one, query_params,
};
use crate::sync::{self, Assignment};

const LIST_MESSAGES: ListMessages = ListMessages {
    retrieving: "Error retrieving tasks.",
    counting: "Error counting tasks.",
};

/// `GET /api/tasks`
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let params = query_params(params)?;
    let query = ListQuery::parse(&params, &TASK_SCHEMA, Some(state.task_default_limit))?;
    list_documents(&state.store.tasks, &query, &LIST_MESSAGES).await
}

/// `POST /api/tasks`
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TaskBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Task>>), ApiError> {
    let draft = json_body(payload)?.validate()?;
    let (assigned_user, assigned_user_name) = resolve_assignee(&state, &draft).await?;

    let task = Task {
        id: DocumentId::new(),
        name: draft.name,
        description: draft.description,
        deadline: draft.deadline,
        completed: draft.completed,
        assigned_user,
        assigned_user_name,
        date_created: Timestamp::now(),
    };
    let task = state
        .store
        .tasks
        .insert(task)
        .await
        .map_err(ApiError::store("Error saving task."))?;

    sync::apply_pending_ops(&state.store, &sync::on_task_created(&task)).await;
    tracing::info!(task_id = %task.id, assigned = ?task.assigned_user, "task created");

    Ok((
        StatusCode::CREATED,
        Json(Envelope::new("New task created successfully.", task)),
    ))
}

/// `GET /api/tasks/{id}`
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let id = parse_id(&id, Resource::Task)?;
    let params = query_params(params)?;
    let projection = parse_select(params.select.as_deref(), &TASK_SCHEMA)?;

    let task = state
        .store
        .tasks
        .get(id)
        .await
        .ok_or(ApiError::NotFound(Resource::Task))?;
    let data = project_one(&task, projection.as_ref(), "Error retrieving task.")?;
    Ok(Json(Envelope::ok(data)))
}

/// `PUT /api/tasks/{id}`
///
/// Full replacement: optional fields absent from the body fall back to their
/// defaults, not to the stored values. `dateCreated` is kept.
pub async fn replace_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<TaskBody>, JsonRejection>,
) -> Result<Json<Envelope<Task>>, ApiError> {
    let id = parse_id(&id, Resource::Task)?;
    let draft = json_body(payload)?.validate()?;

    let current = state
        .store
        .tasks
        .get(id)
        .await
        .ok_or(ApiError::NotFound(Resource::Task))?;
    let (assigned_user, assigned_user_name) = resolve_assignee(&state, &draft).await?;

    let replacement = Task {
        id,
        name: draft.name,
        description: draft.description,
        deadline: draft.deadline,
        completed: draft.completed,
        assigned_user,
        assigned_user_name,
        date_created: current.date_created,
    };
    let ops = sync::on_task_replaced(
        id,
        Assignment::of(&current),
        Assignment::of(&replacement),
    );

    sync::apply_pending_ops(&state.store, &ops).await;
    let task = match state.store.tasks.replace(replacement).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            tracing::warn!(task_id = %id, writes = ops.len(), "task deleted while being replaced");
            return Err(ApiError::NotFound(Resource::Task));
        }
        Err(e) => {
            if !ops.is_empty() {
                tracing::error!(
                    task_id = %id,
                    writes = ops.len(),
                    error = %e,
                    "task write failed after pendingTasks writes; assignments need reconciliation"
                );
            }
            return Err(ApiError::store("Error updating task.")(e));
        }
    };
    tracing::info!(task_id = %id, writes = ops.len(), "task replaced");

    Ok(Json(Envelope::new("Task updated successfully.", task)))
}

/// `DELETE /api/tasks/{id}`
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Task>>, ApiError> {
    let id = parse_id(&id, Resource::Task)?;
    let task = state
        .store
        .tasks
        .delete(id)
        .await
        .ok_or(ApiError::NotFound(Resource::Task))?;

    sync::apply_pending_ops(&state.store, &sync::on_task_deleted(&task)).await;
    tracing::info!(task_id = %id, "task deleted");

    Ok(Json(Envelope::new("Task deleted successfully.", task)))
}

/// Resolves the draft's assignee against the user collection.
///
/// An empty assignee means unassigned and always carries the placeholder
/// name. An assigned task without an explicit name takes the user's current
/// name.
async fn resolve_assignee(
    state: &AppState,
    draft: &TaskDraft,
) -> Result<(Option<DocumentId>, String), ApiError> {
    if draft.assigned_user.is_empty() {
        return Ok((None, UNASSIGNED_NAME.to_string()));
    }
    let user_id = parse_id(&draft.assigned_user, Resource::AssignedUser)?;
    let user = state
        .store
        .users
        .get(user_id)
        .await
        .ok_or(ApiError::NotFound(Resource::AssignedUser))?;
    let name = draft.assigned_user_name.clone().unwrap_or(user.name);
    Ok((Some(user_id), name))
}
