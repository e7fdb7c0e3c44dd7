//! `/api/users` handlers.
//!
//! Changes to `pendingTasks` go through the claim/release protocol in
//! [`crate::sync`]. All checks (email, unknown tasks, conflicts) run before
//! the first write.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use serde_json::Value;
use taskboard_proto::body::UserBody;
use taskboard_proto::envelope::Envelope;
use taskboard_proto::model::{DocumentId, Timestamp, User};
use taskboard_proto::query::{ListQuery, QueryParams, parse_select};
use taskboard_proto::schema::USER_SCHEMA;

use crate::error::{ApiError, Resource};
use crate::server::{
    AppState, ListMessages, json_body, list_documents, parse_id, project_one, query_params,
};
use crate::sync;

const LIST_MESSAGES: ListMessages = ListMessages {
    retrieving: "Error retrieving users.",
    counting: "Error counting users.",
};

/// `GET /api/users`
///
/// Unlike tasks, user listings have no default `limit`.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let params = query_params(params)?;
    let query = ListQuery::parse(&params, &USER_SCHEMA, None)?;
    list_documents(&state.store.users, &query, &LIST_MESSAGES).await
}

/// `POST /api/users`
///
/// Tasks listed in `pendingTasks` are claimed for the new user once it is
/// stored.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UserBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<User>>), ApiError> {
    let draft = json_body(payload)?.validate()?;
    if state.store.users.is_taken("email", &draft.email, None).await {
        return Err(ApiError::DuplicateEmail);
    }

    let id = DocumentId::new();
    let pending = parse_task_ids(draft.pending_tasks.unwrap_or_default())?;
    check_claimable(&state, id, &pending).await?;

    let user = User {
        id,
        name: draft.name,
        email: draft.email,
        pending_tasks: pending,
        date_created: Timestamp::now(),
    };
    let user = state
        .store
        .users
        .insert(user)
        .await
        .map_err(ApiError::store("Error saving user."))?;

    let claimed = sync::claim_tasks(&state.store, id, &user.name, &user.pending_tasks).await;
    tracing::info!(user_id = %id, claimed, "user created");

    Ok((
        StatusCode::CREATED,
        Json(Envelope::new("New user created successfully.", user)),
    ))
}

/// `GET /api/users/{id}`
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    let id = parse_id(&id, Resource::User)?;
    let params = query_params(params)?;
    let projection = parse_select(params.select.as_deref(), &USER_SCHEMA)?;

    let user = state
        .store
        .users
        .get(id)
        .await
        .ok_or(ApiError::NotFound(Resource::User))?;
    let data = project_one(&user, projection.as_ref(), "Error retrieving user.")?;
    Ok(Json(Envelope::ok(data)))
}

/// `PUT /api/users/{id}`
///
/// Diffs the stored and supplied `pendingTasks`: removed tasks still
/// assigned to this user are released, added tasks are claimed. Omitting
/// `pendingTasks` keeps the stored list.
pub async fn replace_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<UserBody>, JsonRejection>,
) -> Result<Json<Envelope<User>>, ApiError> {
    let id = parse_id(&id, Resource::User)?;
    let draft = json_body(payload)?.validate()?;

    let current = state
        .store
        .users
        .get(id)
        .await
        .ok_or(ApiError::NotFound(Resource::User))?;
    if state
        .store
        .users
        .is_taken("email", &draft.email, Some(id))
        .await
    {
        return Err(ApiError::DuplicateEmail);
    }

    let pending = match draft.pending_tasks {
        Some(raw) => parse_task_ids(raw)?,
        None => current.pending_tasks.clone(),
    };
    let diff = sync::diff_pending(&current.pending_tasks, &pending);
    check_claimable(&state, id, &diff.added).await?;

    let released = sync::release_tasks(&state.store, id, &diff.removed).await;
    let claimed = sync::claim_tasks(&state.store, id, &draft.name, &diff.added).await;

    let replacement = User {
        id,
        name: draft.name,
        email: draft.email,
        pending_tasks: pending,
        date_created: current.date_created,
    };
    let user = match state.store.users.replace(replacement).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!(user_id = %id, "user deleted while being replaced");
            return Err(ApiError::NotFound(Resource::User));
        }
        Err(e) => {
            if !diff.is_empty() {
                tracing::error!(
                    user_id = %id,
                    released,
                    claimed,
                    error = %e,
                    "user write failed after task writes; assignments need reconciliation"
                );
            }
            return Err(ApiError::store("Error updating user.")(e));
        }
    };

    if user.name != current.name {
        let renamed = sync::rename_assignee(&state.store, id, &user.name).await;
        tracing::debug!(user_id = %id, renamed, "refreshed assignee name on tasks");
    }
    tracing::info!(user_id = %id, released, claimed, "user replaced");

    Ok(Json(Envelope::new("User updated successfully.", user)))
}

/// `DELETE /api/users/{id}`
///
/// Every task assigned to the user becomes unassigned, completed or not.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<User>>, ApiError> {
    let id = parse_id(&id, Resource::User)?;
    let user = state
        .store
        .users
        .delete(id)
        .await
        .ok_or(ApiError::NotFound(Resource::User))?;

    let released = sync::release_all(&state.store, id).await;
    tracing::info!(user_id = %id, released, "user deleted");

    Ok(Json(Envelope::new("User deleted successfully.", user)))
}

/// Parses `pendingTasks` entries. Entries that are not identifiers cannot
/// name a task and are reported as missing. Entries naming the same task
/// (in any spelling) collapse to the first occurrence.
fn parse_task_ids(raw: Vec<String>) -> Result<Vec<DocumentId>, ApiError> {
    let mut ids: Vec<DocumentId> = Vec::with_capacity(raw.len());
    let mut invalid = Vec::new();
    for text in raw {
        match DocumentId::parse(&text) {
            Some(id) if ids.contains(&id) => {}
            Some(id) => ids.push(id),
            None => invalid.push(text),
        }
    }
    if invalid.is_empty() {
        Ok(ids)
    } else {
        Err(ApiError::MissingTasks(invalid))
    }
}

/// Verifies every task in `added` exists and is free for `user` to claim.
async fn check_claimable(
    state: &AppState,
    user: DocumentId,
    added: &[DocumentId],
) -> Result<(), ApiError> {
    if added.is_empty() {
        return Ok(());
    }
    let missing = sync::find_missing_tasks(&state.store, added).await;
    if !missing.is_empty() {
        return Err(ApiError::MissingTasks(
            missing.iter().map(ToString::to_string).collect(),
        ));
    }
    let conflicts = sync::find_conflicts(&state.store, user, added).await;
    if !conflicts.is_empty() {
        tracing::debug!(user_id = %user, conflicts = conflicts.len(), "claim blocked");
        return Err(ApiError::Conflict(conflicts));
    }
    Ok(())
}
