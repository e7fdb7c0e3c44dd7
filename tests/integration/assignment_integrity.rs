//! Integration tests for keeping `Task.assignedUser` and
//! `User.pendingTasks` consistent across both resources.
//!
//! Verification command: `cargo test --test assignment_integrity`

mod common;

use reqwest::StatusCode;
use serde_json::json;

use common::start_api;

fn task_body(name: &str, user: &str, completed: bool) -> serde_json::Value {
    json!({
        "name": name,
        "deadline": "2030-01-01",
        "assignedUser": user,
        "completed": completed,
    })
}

// =============================================================================
// Task-driven writes
// =============================================================================

#[tokio::test]
async fn assigned_incomplete_task_is_pending_for_assignee() {
    let api = start_api().await;
    let user = api.create_user("A", "a@example.com").await;
    let task = api.create_assigned_task("t", &user, false).await;

    assert_eq!(api.pending_tasks(&user).await, vec![task]);
}

#[tokio::test]
async fn completed_task_is_not_pending() {
    let api = start_api().await;
    let user = api.create_user("A", "a@example.com").await;
    api.create_assigned_task("done", &user, true).await;

    assert!(api.pending_tasks(&user).await.is_empty());
}

#[tokio::test]
async fn completing_then_reopening_task_toggles_pending() {
    let api = start_api().await;
    let user = api.create_user("A", "a@example.com").await;
    let task = api.create_assigned_task("t", &user, false).await;
    assert_eq!(api.pending_tasks(&user).await, vec![task.clone()]);

    let (status, _) = api
        .put(&format!("/tasks/{task}"), &task_body("t", &user, true))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(api.pending_tasks(&user).await.is_empty());

    api.put(&format!("/tasks/{task}"), &task_body("t", &user, false))
        .await;
    assert_eq!(api.pending_tasks(&user).await, vec![task]);
}

#[tokio::test]
async fn reassigning_task_moves_it_between_users() {
    let api = start_api().await;
    let a = api.create_user("A", "a@example.com").await;
    let b = api.create_user("B", "b@example.com").await;
    let task = api.create_assigned_task("t", &a, false).await;

    api.put(&format!("/tasks/{task}"), &task_body("t", &b, false))
        .await;

    assert!(api.pending_tasks(&a).await.is_empty());
    assert_eq!(api.pending_tasks(&b).await, vec![task.clone()]);
    assert_eq!(api.task(&task).await["assignedUserName"], "B");
}

#[tokio::test]
async fn reassigning_as_completed_only_pulls_from_previous_assignee() {
    let api = start_api().await;
    let a = api.create_user("A", "a@example.com").await;
    let b = api.create_user("B", "b@example.com").await;
    let task = api.create_assigned_task("t", &a, false).await;

    let (status, body) = api
        .put(&format!("/tasks/{task}"), &task_body("t", &b, true))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["assignedUser"], b.as_str());

    assert!(api.pending_tasks(&a).await.is_empty());
    assert!(api.pending_tasks(&b).await.is_empty());
    let stored = api.task(&task).await;
    assert_eq!(stored["assignedUser"], b.as_str());
    assert_eq!(stored["completed"], true);
}

#[tokio::test]
async fn unassigning_task_pulls_it_from_previous_assignee() {
    let api = start_api().await;
    let user = api.create_user("A", "a@example.com").await;
    let task = api.create_assigned_task("t", &user, false).await;

    // Replacement without assignedUser means unassigned.
    api.put(
        &format!("/tasks/{task}"),
        &json!({ "name": "t", "deadline": "2030-01-01" }),
    )
    .await;

    assert!(api.pending_tasks(&user).await.is_empty());
    let stored = api.task(&task).await;
    assert_eq!(stored["assignedUser"], "");
    assert_eq!(stored["assignedUserName"], "unassigned");
}

#[tokio::test]
async fn deleting_pending_task_pulls_it() {
    let api = start_api().await;
    let user = api.create_user("A", "a@example.com").await;
    let keep = api.create_assigned_task("keep", &user, false).await;
    let dropped = api.create_assigned_task("drop", &user, false).await;

    api.delete(&format!("/tasks/{dropped}")).await;

    assert_eq!(api.pending_tasks(&user).await, vec![keep]);
}

// =============================================================================
// User-driven writes
// =============================================================================

#[tokio::test]
async fn claim_conflict_rejects_whole_update() {
    let api = start_api().await;
    let a = api.create_user("A", "a@example.com").await;
    let b = api.create_user("B", "b@example.com").await;
    let task = api.create_assigned_task("t", &a, false).await;
    let free = api
        .create_task(&json!({ "name": "free", "deadline": "2030-01-01" }))
        .await;

    let (status, body) = api
        .put(
            &format!("/users/{b}"),
            &json!({ "name": "B2", "email": "b@example.com", "pendingTasks": [free, task] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Conflict: One or more tasks are already assigned to another user."
    );
    assert_eq!(body["data"], json!([task]));

    // Nothing moved: the free task was not half-claimed and B is unchanged.
    assert_eq!(api.task(&task).await["assignedUser"], a.as_str());
    assert_eq!(api.task(&free).await["assignedUser"], "");
    let b_doc = api.user(&b).await;
    assert_eq!(b_doc["name"], "B");
    assert_eq!(b_doc["pendingTasks"], json!([]));
    assert_eq!(api.pending_tasks(&a).await, vec![task]);
}

#[tokio::test]
async fn completed_task_of_other_user_still_conflicts() {
    let api = start_api().await;
    let a = api.create_user("A", "a@example.com").await;
    let b = api.create_user("B", "b@example.com").await;
    let task = api.create_assigned_task("t", &a, true).await;

    let (status, _) = api
        .put(
            &format!("/users/{b}"),
            &json!({ "name": "B", "email": "b@example.com", "pendingTasks": [task] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn claiming_task_assigns_it_and_clears_completed() {
    let api = start_api().await;
    let user = api.create_user("Claimer", "c@example.com").await;
    let task = api
        .create_task(&json!({ "name": "t", "deadline": "2030-01-01", "completed": true }))
        .await;

    let (status, body) = api
        .put(
            &format!("/users/{user}"),
            &json!({ "name": "Claimer", "email": "c@example.com", "pendingTasks": [task] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let stored = api.task(&task).await;
    assert_eq!(stored["assignedUser"], user.as_str());
    assert_eq!(stored["assignedUserName"], "Claimer");
    assert_eq!(stored["completed"], false);
    assert_eq!(api.pending_tasks(&user).await, vec![task]);
}

#[tokio::test]
async fn removing_task_from_pending_unassigns_it() {
    let api = start_api().await;
    let user = api.create_user("A", "a@example.com").await;
    let kept = api.create_assigned_task("kept", &user, false).await;
    let removed = api.create_assigned_task("removed", &user, false).await;

    let (status, _) = api
        .put(
            &format!("/users/{user}"),
            &json!({ "name": "A", "email": "a@example.com", "pendingTasks": [kept] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let stored = api.task(&removed).await;
    assert_eq!(stored["assignedUser"], "");
    assert_eq!(stored["assignedUserName"], "unassigned");
    assert_eq!(api.task(&kept).await["assignedUser"], user.as_str());
    assert_eq!(api.pending_tasks(&user).await, vec![kept]);
}

#[tokio::test]
async fn unknown_pending_task_is_not_found() {
    let api = start_api().await;
    let user = api.create_user("A", "a@example.com").await;

    for bogus in ["01890a5d-ac96-774b-bcce-b302099a8057", "nope"] {
        let (status, body) = api
            .put(
                &format!("/users/{user}"),
                &json!({ "name": "A", "email": "a@example.com", "pendingTasks": [bogus] }),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["data"], json!([bogus]));
    }
    assert!(api.pending_tasks(&user).await.is_empty());
}

#[tokio::test]
async fn duplicate_pending_ids_are_collapsed() {
    let api = start_api().await;
    let user = api.create_user("A", "a@example.com").await;
    let task = api
        .create_task(&json!({ "name": "t", "deadline": "2030-01-01" }))
        .await;

    api.put(
        &format!("/users/{user}"),
        &json!({ "name": "A", "email": "a@example.com", "pendingTasks": [task, task] }),
    )
    .await;
    assert_eq!(api.pending_tasks(&user).await, vec![task]);
}

#[tokio::test]
async fn differently_cased_pending_ids_name_one_task() {
    let api = start_api().await;
    let user = api.create_user("A", "a@example.com").await;
    let task = api
        .create_task(&json!({ "name": "t", "deadline": "2030-01-01" }))
        .await;

    let (status, _) = api
        .put(
            &format!("/users/{user}"),
            &json!({
                "name": "A",
                "email": "a@example.com",
                "pendingTasks": [task, task.to_uppercase()],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(api.pending_tasks(&user).await, vec![task.clone()]);

    // Dropping the id in either spelling releases the only stored entry.
    api.put(
        &format!("/users/{user}"),
        &json!({ "name": "A", "email": "a@example.com", "pendingTasks": [] }),
    )
    .await;
    assert!(api.pending_tasks(&user).await.is_empty());
    assert_eq!(api.task(&task).await["assignedUser"], "");
}

#[tokio::test]
async fn create_user_with_pending_tasks_claims_them() {
    let api = start_api().await;
    let task = api
        .create_task(&json!({ "name": "t", "deadline": "2030-01-01" }))
        .await;

    let (status, body) = api
        .post(
            "/users",
            &json!({ "name": "New", "email": "new@example.com", "pendingTasks": [task] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let user = common::id_of(&body["data"]);

    assert_eq!(api.task(&task).await["assignedUser"], user.as_str());
    assert_eq!(api.pending_tasks(&user).await, vec![task]);
}

#[tokio::test]
async fn create_user_with_conflicting_task_is_not_saved() {
    let api = start_api().await;
    let owner = api.create_user("Owner", "owner@example.com").await;
    let task = api.create_assigned_task("t", &owner, false).await;

    let (status, _) = api
        .post(
            "/users",
            &json!({ "name": "Thief", "email": "thief@example.com", "pendingTasks": [task] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, count) = api.get_with("/users", &[("count", "true")]).await;
    assert_eq!(count["data"], 1);
}

#[tokio::test]
async fn deleting_user_unassigns_all_their_tasks() {
    let api = start_api().await;
    let user = api.create_user("A", "a@example.com").await;
    let open = api.create_assigned_task("open", &user, false).await;
    let done = api.create_assigned_task("done", &user, true).await;

    let (status, _) = api.delete(&format!("/users/{user}")).await;
    assert_eq!(status, StatusCode::OK);

    for task in [open, done] {
        let stored = api.task(&task).await;
        assert_eq!(stored["assignedUser"], "");
        assert_eq!(stored["assignedUserName"], "unassigned");
    }
}

#[tokio::test]
async fn concurrent_task_creation_keeps_every_pending_id() {
    let api = start_api().await;
    let user = api.create_user("Busy", "busy@example.com").await;

    let creates = (0..16).map(|i| {
        let body = task_body(&format!("t{i}"), &user, false);
        let api = &api;
        async move { api.create_task(&body).await }
    });
    let mut created = futures_util::future::join_all(creates).await;
    created.sort();

    let mut pending = api.pending_tasks(&user).await;
    pending.sort();
    assert_eq!(pending, created);
}
