//! Integration tests for the `/api/tasks` routes.
//!
//! Covers creation defaults, validation, lookup by id, full replacement,
//! deletion, and the envelope returned for malformed requests.
//!
//! Verification command: `cargo test --test task_routes`

mod common;

use reqwest::StatusCode;
use serde_json::json;

use common::{id_of, start_api};

const MISSING_ID: &str = "01890a5d-ac96-774b-bcce-b302099a8057";

#[tokio::test]
async fn api_root_is_ok() {
    let api = start_api().await;
    let (status, body) = api.get("").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "OK");
}

#[tokio::test]
async fn unassigned_task_round_trips_with_defaults() {
    let api = start_api().await;
    let (status, body) = api
        .post("/tasks", &json!({ "name": "write docs", "deadline": "2030-05-01" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "New task created successfully.");
    let id = id_of(&body["data"]);

    let task = api.task(&id).await;
    assert_eq!(task["name"], "write docs");
    assert_eq!(task["description"], "");
    assert_eq!(task["completed"], false);
    assert_eq!(task["assignedUser"], "");
    assert_eq!(task["assignedUserName"], "unassigned");
    assert_eq!(task["deadline"], "2030-05-01T00:00:00.000Z");
    assert!(task["dateCreated"].is_string());
}

#[tokio::test]
async fn deadline_accepts_epoch_millis() {
    let api = start_api().await;
    let id = api
        .create_task(&json!({ "name": "ms", "deadline": 1_000 }))
        .await;
    assert_eq!(api.task(&id).await["deadline"], "1970-01-01T00:00:01.000Z");
}

#[tokio::test]
async fn missing_required_fields_are_rejected() {
    let api = start_api().await;
    for body in [
        json!({ "deadline": "2030-01-01" }),
        json!({ "name": "no deadline" }),
        json!({ "name": "", "deadline": "2030-01-01" }),
    ] {
        let (status, resp) = api.post("/tasks", &body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
        assert!(
            resp["message"]
                .as_str()
                .unwrap()
                .starts_with("Validation Error"),
            "unexpected message: {resp}"
        );
    }

    let (_, list) = api.get("/tasks").await;
    assert_eq!(list["data"], json!([]));
}

#[tokio::test]
async fn unparseable_deadline_is_rejected() {
    let api = start_api().await;
    let (status, _) = api
        .post("/tasks", &json!({ "name": "x", "deadline": "next tuesday" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deadline_past_year_9999_is_rejected() {
    let api = start_api().await;
    for deadline in [json!(253_402_300_800_000_i64), json!("+10000-01-01T00:00:00Z")] {
        let (status, _) = api
            .post("/tasks", &json!({ "name": "far", "deadline": deadline }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{deadline}");
    }

    // Nothing was stored, so a date filter cannot be fooled by text order.
    let (_, body) = api
        .get_with("/tasks", &[("where", r#"{"deadline":{"$gt":"2024-01-01"}}"#)])
        .await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn unknown_assignee_is_not_found() {
    let api = start_api().await;
    for assignee in [MISSING_ID, "not-an-id"] {
        let (status, body) = api
            .post(
                "/tasks",
                &json!({ "name": "x", "deadline": "2030-01-01", "assignedUser": assignee }),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Assigned user not found.");
    }
    let (_, count) = api.get_with("/tasks", &[("count", "true")]).await;
    assert_eq!(count["data"], 0);
}

#[tokio::test]
async fn assignee_name_defaults_to_user_name() {
    let api = start_api().await;
    let user = api.create_user("Ada", "ada@example.com").await;

    let implicit = api.create_assigned_task("a", &user, false).await;
    assert_eq!(api.task(&implicit).await["assignedUserName"], "Ada");

    let explicit = api
        .create_task(&json!({
            "name": "b",
            "deadline": "2030-01-01",
            "assignedUser": user,
            "assignedUserName": "Countess",
        }))
        .await;
    assert_eq!(api.task(&explicit).await["assignedUserName"], "Countess");
}

#[tokio::test]
async fn get_by_id_applies_select() {
    let api = start_api().await;
    let id = api
        .create_task(&json!({ "name": "pick me", "deadline": "2030-01-01" }))
        .await;

    let (status, body) = api
        .get_with(&format!("/tasks/{id}"), &[("select", r#"{"name":1}"#)])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "_id": id, "name": "pick me" }));

    let (status, body) = api
        .get_with(&format!("/tasks/{id}"), &[("select", "{name")])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid 'select' parameter.");
}

#[tokio::test]
async fn bad_and_missing_ids_are_both_not_found() {
    let api = start_api().await;
    for id in [MISSING_ID, "12345"] {
        let (status, body) = api.get(&format!("/tasks/{id}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Task not found.");

        let (status, _) = api.delete(&format!("/tasks/{id}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = api
            .put(
                &format!("/tasks/{id}"),
                &json!({ "name": "x", "deadline": "2030-01-01" }),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn replace_resets_omitted_fields_and_keeps_date_created() {
    let api = start_api().await;
    let id = api
        .create_task(&json!({
            "name": "original",
            "description": "details",
            "deadline": "2030-01-01",
            "completed": true,
        }))
        .await;
    let before = api.task(&id).await;

    let (status, body) = api
        .put(
            &format!("/tasks/{id}"),
            &json!({ "name": "renamed", "deadline": "2031-01-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Task updated successfully.");

    let after = api.task(&id).await;
    assert_eq!(after["name"], "renamed");
    assert_eq!(after["description"], "");
    assert_eq!(after["completed"], false);
    assert_eq!(after["dateCreated"], before["dateCreated"]);
}

#[tokio::test]
async fn replace_requires_name_and_deadline() {
    let api = start_api().await;
    let id = api
        .create_task(&json!({ "name": "keep", "deadline": "2030-01-01" }))
        .await;
    let (status, _) = api
        .put(&format!("/tasks/{id}"), &json!({ "name": "no deadline" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(api.task(&id).await["name"], "keep");
}

#[tokio::test]
async fn delete_returns_removed_task() {
    let api = start_api().await;
    let id = api
        .create_task(&json!({ "name": "doomed", "deadline": "2030-01-01" }))
        .await;

    let (status, body) = api.delete(&format!("/tasks/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Task deleted successfully.");
    assert_eq!(body["data"]["name"], "doomed");

    let (status, _) = api.get(&format!("/tasks/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_json_body_gets_envelope() {
    let api = start_api().await;
    let request = reqwest::Client::new()
        .post(api.url("/tasks"))
        .header("content-type", "application/json")
        .body("{\"name\": ");
    let (status, body) = api.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Malformed request.");
}

#[tokio::test]
async fn unknown_route_gets_envelope() {
    let api = start_api().await;
    let (status, body) = api.get("/projects").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Route not found.");
}
