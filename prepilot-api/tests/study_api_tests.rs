//! End-to-end tests against PostgreSQL
//!
//! Run with `DATABASE_URL=... cargo test -p prepilot-api -- --ignored`.

mod common;

use axum::http::StatusCode;
use common::*;
use prepilot_shared::models::user::User;
use serde_json::{json, Value};

fn plan_body(title: &str) -> Value {
    json!({
        "title": title,
        "subject": "Mathematics",
        "description": "Limits and derivatives",
        "exam_date": "2026-06-15T09:00:00Z",
        "start_date": "2026-05-01T00:00:00Z",
        "end_date": "2026-06-14T00:00:00Z"
    })
}

async fn create_plan(ctx: &TestContext, clerk_id: &str, title: &str) -> String {
    let (status, body) = ctx
        .send_json(authed("POST", "/v1/study-plans", clerk_id, Some(plan_body(title))))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_first_request_provisions_user() {
    let ctx = TestContext::new().await.unwrap();

    let (status, body) = ctx
        .send_json(authed("POST", "/v1/user/initialize", "user_new", None))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["clerk_id"], "user_new");
    assert_eq!(body["message"], "User initialized successfully");
    assert!(body["email"].as_str().unwrap().ends_with("@users.prepilot.invalid"));

    // Second request reuses the row
    let (status, profile) = ctx
        .send_json(authed("GET", "/v1/user/profile", "user_new", None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["id"], body["id"]);
    assert!(profile.get("message").is_none());

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_provisioning_uses_token_email() {
    let ctx = TestContext::new().await.unwrap();

    let (status, body) = ctx
        .send_json(authed("GET", "/v1/user/profile", "user_mail:mail@example.com", None))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["clerk_id"], "user_mail");
    assert_eq!(body["email"], "mail@example.com");

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_study_plan_lifecycle() {
    let ctx = TestContext::new().await.unwrap();

    let first = create_plan(&ctx, "user_a", "Calculus").await;
    let second = create_plan(&ctx, "user_a", "Algebra").await;

    let (status, body) = ctx.send_json(authed("GET", "/v1/study-plans", "user_a", None)).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![second.as_str(), first.as_str()]);

    let uri = format!("/v1/study-plans/{}", first);
    let mut update = plan_body("Calculus II");
    update["description"] = Value::Null;
    let (status, body) = ctx.send_json(authed("PUT", &uri, "user_a", Some(update))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Calculus II");
    assert_eq!(body["data"]["user_id"], "user_a");

    let (status, body) = ctx.send_json(authed("DELETE", &uri, "user_a", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "Study plan deleted successfully");

    let (status, body) = ctx.send_json(authed("GET", &uri, "user_a", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Study plan not found");

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_study_plan_validation() {
    let ctx = TestContext::new().await.unwrap();

    let mut reversed = plan_body("Calculus");
    reversed["start_date"] = json!("2026-07-01T00:00:00Z");
    let (status, body) = ctx
        .send_json(authed("POST", "/v1/study-plans", "user_a", Some(reversed)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "start_date must not be after end_date");

    let mut extra = plan_body("Calculus");
    extra["user_id"] = json!("user_b");
    let (status, _) = ctx
        .send_json(authed("POST", "/v1/study-plans", "user_a", Some(extra)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .send_json(authed("POST", "/v1/study-plans", "user_a", Some(plan_body(""))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_ownership_is_enforced() {
    let ctx = TestContext::new().await.unwrap();

    let plan_id = create_plan(&ctx, "user_a", "Calculus").await;
    let plan_uri = format!("/v1/study-plans/{}", plan_id);

    for (method, uri, body) in [
        ("GET", plan_uri.clone(), None),
        ("PUT", plan_uri.clone(), Some(plan_body("Stolen"))),
        ("DELETE", plan_uri.clone(), None),
        ("GET", format!("{}/tasks", plan_uri), None),
        ("GET", format!("/v1/study-tasks?plan_id={}", plan_id), None),
    ] {
        let (status, json) = ctx.send_json(authed(method, &uri, "user_b", body)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{} {}", method, uri);
        assert_eq!(json["error"], "Access denied");
    }

    // Creating a task under someone else's plan
    let (status, _) = ctx
        .send_json(authed(
            "POST",
            "/v1/study-tasks",
            "user_b",
            Some(json!({ "plan_id": plan_id, "title": "Sneaky", "due_date": "2026-05-02T00:00:00Z" })),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let missing = format!("/v1/study-plans/{}", uuid::Uuid::new_v4());
    let (status, _) = ctx.send_json(authed("GET", &missing, "user_b", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx
        .send_json(authed("GET", "/v1/study-plans/not-a-uuid", "user_b", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The plan is untouched
    let (status, body) = ctx.send_json(authed("GET", &plan_uri, "user_a", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Calculus");

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_study_task_flow() {
    let ctx = TestContext::new().await.unwrap();
    let plan_id = create_plan(&ctx, "user_a", "Calculus").await;

    let (status, body) = ctx
        .send_json(authed(
            "POST",
            "/v1/study-tasks",
            "user_a",
            Some(json!({
                "plan_id": plan_id,
                "title": "Limits",
                "due_date": "2020-01-01T00:00:00Z",
                "priority": 2
            })),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["is_completed"], false);
    let task_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = ctx
        .send_json(authed(
            "POST",
            "/v1/study-tasks",
            "user_a",
            Some(json!({ "title": "Flashcards", "due_date": "2099-01-01T00:00:00Z" })),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = ctx.send_json(authed("GET", "/v1/study-tasks", "user_a", None)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let uri = format!("/v1/study-tasks?plan_id={}&priority=2", plan_id);
    let (_, body) = ctx.send_json(authed("GET", &uri, "user_a", None)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let uri = format!("/v1/study-tasks?plan_id={}&status=true", plan_id);
    let (_, body) = ctx.send_json(authed("GET", &uri, "user_a", None)).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (_, body) = ctx
        .send_json(authed("GET", "/v1/study-tasks/overdue", "user_a", None))
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], task_id.as_str());

    let status_uri = format!("/v1/study-tasks/{}/status", task_id);
    let (status, body) = ctx
        .send_json(authed("PATCH", &status_uri, "user_a", Some(json!({ "is_completed": true }))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "Task status updated successfully");

    let (_, body) = ctx
        .send_json(authed("GET", "/v1/study-tasks/overdue", "user_a", None))
        .await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = ctx
        .send_json(authed("PATCH", &status_uri, "user_a", Some(json!({}))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .send_json(authed("PATCH", &status_uri, "user_b", Some(json!({ "is_completed": false }))))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Deleting the plan takes its tasks along
    let plan_uri = format!("/v1/study-plans/{}", plan_id);
    ctx.send_json(authed("DELETE", &plan_uri, "user_a", None)).await;
    let (status, _) = ctx
        .send_json(authed("GET", &format!("/v1/study-tasks/{}", task_id), "user_a", None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_webhook_user_lifecycle() {
    let ctx = TestContext::new().await.unwrap();

    let created = json!({ "type": "user.created", "data": clerk_user("user_hook", "ada@example.com") });
    let (status, body) = ctx.send_json(signed_webhook(&created)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User created successfully");
    assert_eq!(body["clerk_id"], "user_hook");

    // Redelivery keeps a single row
    let (status, replay) = ctx.send_json(signed_webhook(&created)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["user_id"], body["user_id"]);

    let user = User::find_by_clerk_id(&ctx.db, "user_hook").await.unwrap().unwrap();
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(user.name.as_deref(), Some("Ada Lovelace"));
    assert!(user.email_verified);

    let mut data = clerk_user("user_hook", "countess@example.com");
    data["banned"] = json!(true);
    let (status, _) = ctx
        .send_json(signed_webhook(&json!({ "type": "user.updated", "data": data })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let user = User::find_by_clerk_id(&ctx.db, "user_hook").await.unwrap().unwrap();
    assert_eq!(user.email, "countess@example.com");
    assert!(user.banned);

    let (status, body) = ctx
        .send_json(signed_webhook(&json!({
            "type": "user.updated",
            "data": clerk_user("user_ghost", "ghost@example.com")
        })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");

    let deleted = json!({ "type": "user.deleted", "data": { "id": "user_hook", "deleted": true } });
    let (status, _) = ctx.send_json(signed_webhook(&deleted)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(User::find_by_clerk_id(&ctx.db, "user_hook").await.unwrap().is_none());

    // Deleting again is still acknowledged
    let (status, _) = ctx.send_json(signed_webhook(&deleted)).await;
    assert_eq!(status, StatusCode::OK);

    ctx.cleanup().await.unwrap();
}
