//! Integration tests for the `/api/users` routes.
//!
//! Covers creation, email uniqueness, lookup, replacement without
//! `pendingTasks`, and deletion.
//!
//! Verification command: `cargo test --test user_routes`

mod common;

use reqwest::StatusCode;
use serde_json::json;

use common::start_api;

#[tokio::test]
async fn create_and_fetch_user() {
    let api = start_api().await;
    let (status, body) = api
        .post("/users", &json!({ "name": "Grace", "email": "grace@example.com" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "New user created successfully.");

    let id = common::id_of(&body["data"]);
    let user = api.user(&id).await;
    assert_eq!(user["name"], "Grace");
    assert_eq!(user["email"], "grace@example.com");
    assert_eq!(user["pendingTasks"], json!([]));
    assert!(user["dateCreated"].is_string());
}

#[tokio::test]
async fn name_and_email_are_required() {
    let api = start_api().await;
    for body in [
        json!({ "name": "no email" }),
        json!({ "email": "no-name@example.com" }),
        json!({ "name": "", "email": "blank@example.com" }),
    ] {
        let (status, _) = api.post("/users", &body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
    }
}

#[tokio::test]
async fn duplicate_email_on_create_is_rejected() {
    let api = start_api().await;
    api.create_user("First", "same@example.com").await;

    let (status, body) = api
        .post("/users", &json!({ "name": "Second", "email": "same@example.com" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "A user with this email already exists.");

    let (_, count) = api.get_with("/users", &[("count", "true")]).await;
    assert_eq!(count["data"], 1);
}

#[tokio::test]
async fn duplicate_email_on_replace_is_rejected() {
    let api = start_api().await;
    api.create_user("Taken", "taken@example.com").await;
    let id = api.create_user("Mover", "mover@example.com").await;

    let (status, body) = api
        .put(
            &format!("/users/{id}"),
            &json!({ "name": "Mover", "email": "taken@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "A user with this email already exists.");
    assert_eq!(api.user(&id).await["email"], "mover@example.com");
}

#[tokio::test]
async fn replace_may_keep_own_email() {
    let api = start_api().await;
    let id = api.create_user("Old Name", "me@example.com").await;

    let (status, body) = api
        .put(
            &format!("/users/{id}"),
            &json!({ "name": "New Name", "email": "me@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User updated successfully.");
    assert_eq!(api.user(&id).await["name"], "New Name");
}

#[tokio::test]
async fn replace_without_pending_tasks_keeps_list() {
    let api = start_api().await;
    let id = api.create_user("Keeper", "keeper@example.com").await;
    let task = api.create_assigned_task("kept", &id, false).await;

    let (status, _) = api
        .put(
            &format!("/users/{id}"),
            &json!({ "name": "Keeper", "email": "keeper2@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(api.pending_tasks(&id).await, vec![task.clone()]);
    assert_eq!(api.task(&task).await["assignedUser"], id.as_str());
}

#[tokio::test]
async fn rename_refreshes_assignee_name_on_tasks() {
    let api = start_api().await;
    let id = api.create_user("Before", "rename@example.com").await;
    let task = api.create_assigned_task("t", &id, false).await;
    assert_eq!(api.task(&task).await["assignedUserName"], "Before");

    api.put(
        &format!("/users/{id}"),
        &json!({ "name": "After", "email": "rename@example.com" }),
    )
    .await;
    assert_eq!(api.task(&task).await["assignedUserName"], "After");
}

#[tokio::test]
async fn get_user_select_excludes_fields() {
    let api = start_api().await;
    let id = api.create_user("Hidden", "hidden@example.com").await;

    let (status, body) = api
        .get_with(&format!("/users/{id}"), &[("select", r#"{"email":0}"#)])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].get("email").is_none());
    assert_eq!(body["data"]["name"], "Hidden");
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let api = start_api().await;
    for id in ["01890a5d-ac96-774b-bcce-b302099a8057", "bogus"] {
        let (status, body) = api.get(&format!("/users/{id}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "User not found.");

        let (status, _) = api
            .put(
                &format!("/users/{id}"),
                &json!({ "name": "x", "email": "x@example.com" }),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn delete_returns_removed_user() {
    let api = start_api().await;
    let id = api.create_user("Gone", "gone@example.com").await;

    let (status, body) = api.delete(&format!("/users/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User deleted successfully.");
    assert_eq!(body["data"]["email"], "gone@example.com");

    let (status, _) = api.delete(&format!("/users/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The email is free again.
    api.create_user("Again", "gone@example.com").await;
}
