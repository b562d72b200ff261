//! Integration tests for the outreach-api HTTP surface
//!
//! Covers the approval session lifecycle, the optimizer endpoints, webhook
//! intake, and the orphan recovery job trigger, all against an in-memory
//! database.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::util::ServiceExt; // for `oneshot`

use outreach_api::{build_router, AppState};
use outreach_common::db::init_memory_database;
use outreach_common::token::{generate_token, hash_token};
use outreach_common::webhook;

const CRON_SECRET: &str = "test-cron-secret";

async fn setup_db() -> SqlitePool {
    let pool = init_memory_database().await.expect("init db");

    sqlx::query("INSERT INTO organizations (id, name) VALUES ('org-1', 'Org One')")
        .execute(&pool)
        .await
        .unwrap();
    for ws in ["ws-a", "ws-b"] {
        sqlx::query("INSERT INTO workspaces (id, organization_id, name) VALUES (?, 'org-1', ?)")
            .bind(ws)
            .bind(ws)
            .execute(&pool)
            .await
            .unwrap();
    }
    sqlx::query(
        "INSERT INTO users (id, email, current_workspace_id) VALUES ('user-a', 'a@example.com', 'ws-a')",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO workspace_members (workspace_id, user_id, role) VALUES ('ws-a', 'user-a', 'member')",
    )
    .execute(&pool)
    .await
    .unwrap();

    pool
}

fn setup_app(db: SqlitePool) -> axum::Router {
    build_router(AppState::new(db, CRON_SECRET.to_string()))
}

/// Issue a session token for a user directly against the database
async fn issue_token(db: &SqlitePool, user_id: &str) -> String {
    let token = generate_token();
    sqlx::query(
        "INSERT INTO auth_sessions (token_hash, user_id, expires_at) VALUES (?, ?, datetime('now', '+1 day'))",
    )
    .bind(hash_token(&token))
    .bind(user_id)
    .execute(db)
    .await
    .unwrap();
    token
}

fn json_request(method: &str, uri: &str, token: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.expect("read body");
    serde_json::from_slice(&bytes).expect("parse JSON")
}

#[tokio::test]
async fn test_health_endpoint() {
    let db = setup_db().await;
    let app = setup_app(db);

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_login_issues_usable_token() {
    let db = setup_db().await;
    let app = setup_app(db.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"email":"a@example.com"}"#))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(body["user_id"], "user-a");

    // The issued token authenticates a protected endpoint
    let request = Request::builder()
        .uri("/api/optimize/stats")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_unknown_email_rejected() {
    let db = setup_db().await;
    let app = setup_app(db);

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"email":"nobody@example.com"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

fn candidate_json(i: usize) -> Value {
    json!({
        "prospect_id": format!("src-{}", i),
        "name": format!("Person {}", i),
        "email": format!("person{}@example.com", i),
        "company_size": "11-50",
    })
}

#[tokio::test]
async fn test_approval_session_lifecycle() {
    let db = setup_db().await;
    let app = setup_app(db.clone());
    let token = issue_token(&db, "user-a").await;

    // Create a 10-candidate session
    let candidates: Vec<Value> = (0..10).map(candidate_json).collect();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/approval/sessions",
            &token,
            &json!({ "candidates": candidates }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let session = extract_json(response.into_body()).await;
    let session_id = session["id"].as_str().unwrap().to_string();
    assert_eq!(session["status"], "active");
    assert_eq!(session["total_count"], 10);

    let candidate_ids: Vec<(String,)> = sqlx::query_as(
        "SELECT id FROM approval_candidates WHERE session_id = ? ORDER BY created_at, id",
    )
    .bind(&session_id)
    .fetch_all(&db)
    .await
    .unwrap();

    // Approve 6, reject 4
    let mut last = Value::Null;
    for (i, (candidate_id,)) in candidate_ids.iter().enumerate() {
        let decision = if i < 6 { "approved" } else { "rejected" };
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/approval/sessions/{}/decide", session_id),
                &token,
                &json!({ "candidate_id": candidate_id, "decision": decision }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        last = extract_json(response.into_body()).await;
    }

    // The final decision auto-completes the session with exact counts
    assert_eq!(last["approved_count"], 6);
    assert_eq!(last["rejected_count"], 4);
    assert_eq!(last["pending_count"], 0);
    assert_eq!(last["session_completed"], true);

    let status: String = sqlx::query_scalar("SELECT status FROM approval_sessions WHERE id = ?")
        .bind(&session_id)
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(status, "completed");

    // Completion trained a model for this user/workspace
    let models: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM learning_models WHERE user_id = 'user-a' AND workspace_id = 'ws-a'",
    )
    .fetch_one(&db)
    .await
    .unwrap();
    assert_eq!(models, 1);
}

#[tokio::test]
async fn test_double_decision_rejected() {
    let db = setup_db().await;
    let app = setup_app(db.clone());
    let token = issue_token(&db, "user-a").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/approval/sessions",
            &token,
            &json!({ "candidates": [candidate_json(0), candidate_json(1)] }),
        ))
        .await
        .unwrap();
    let session = extract_json(response.into_body()).await;
    let session_id = session["id"].as_str().unwrap();

    let (candidate_id,): (String,) =
        sqlx::query_as("SELECT id FROM approval_candidates WHERE session_id = ? LIMIT 1")
            .bind(session_id)
            .fetch_one(&db)
            .await
            .unwrap();

    let decide = |decision: &str| {
        json_request(
            "POST",
            &format!("/api/approval/sessions/{}/decide", session_id),
            &token,
            &json!({ "candidate_id": candidate_id, "decision": decision }),
        )
    };

    let response = app.clone().oneshot(decide("approved")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(decide("rejected")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The first decision stands
    let status: String =
        sqlx::query_scalar("SELECT approval_status FROM approval_candidates WHERE id = ?")
            .bind(&candidate_id)
            .fetch_one(&db)
            .await
            .unwrap();
    assert_eq!(status, "approved");
}

#[tokio::test]
async fn test_optimize_without_model_is_passthrough() {
    let db = setup_db().await;
    let app = setup_app(db.clone());
    let token = issue_token(&db, "user-a").await;

    let candidates = json!([
        { "id": "c-1", "name": "One", "company_size": "11-50" },
        { "id": "c-2", "name": "Two" },
    ]);
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/optimize",
            &token,
            &json!({ "candidates": candidates, "mode": "filter" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["optimization_applied"], false);
    assert_eq!(body["input_count"], 2);
    assert_eq!(body["output_count"], 2);
    // Passthrough candidates carry no score field
    assert!(body["candidates"][0].get("score").is_none());
    assert_eq!(body["candidates"][0]["id"], "c-1");
    assert_eq!(body["candidates"][1]["id"], "c-2");
}

#[tokio::test]
async fn test_optimize_stats_without_model() {
    let db = setup_db().await;
    let app = setup_app(db.clone());
    let token = issue_token(&db, "user-a").await;

    let request = Request::builder()
        .uri("/api/optimize/stats")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert!(body["model"].is_null());
}

fn webhook_request(source: &str, body: &[u8], signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/api/webhooks/{}", source))
        .header("content-type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header("x-webhook-signature", sig);
    }
    builder.body(Body::from(body.to_vec())).unwrap()
}

#[tokio::test]
async fn test_webhook_valid_signature_accepted() {
    let db = setup_db().await;
    sqlx::query("UPDATE settings SET value = 'partner-secret' WHERE key = 'webhook_secret_partner'")
        .execute(&db)
        .await
        .unwrap();
    let app = setup_app(db);

    let body = br#"{"event":"prospect_replied","prospect_id":"p-1"}"#;
    let signature = webhook::sign(body, "partner-secret");

    let response = app
        .oneshot(webhook_request("partner", body, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = extract_json(response.into_body()).await;
    assert_eq!(json["received"], true);
    assert_eq!(json["source"], "partner");
    assert_eq!(json["event"], "prospect_replied");
}

#[tokio::test]
async fn test_webhook_tampered_body_rejected() {
    let db = setup_db().await;
    sqlx::query("UPDATE settings SET value = 'partner-secret' WHERE key = 'webhook_secret_partner'")
        .execute(&db)
        .await
        .unwrap();
    let app = setup_app(db);

    let body = br#"{"event":"prospect_replied"}"#.to_vec();
    let signature = webhook::sign(&body, "partner-secret");

    let mut tampered = body.clone();
    tampered[10] ^= 0x01;

    let response = app
        .oneshot(webhook_request("partner", &tampered, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let json = extract_json(response.into_body()).await;
    assert_eq!(json["code"], "WEBHOOK_SIGNATURE_INVALID");
}

#[tokio::test]
async fn test_webhook_verified_but_malformed_json_is_400() {
    let db = setup_db().await;
    sqlx::query("UPDATE settings SET value = 'partner-secret' WHERE key = 'webhook_secret_partner'")
        .execute(&db)
        .await
        .unwrap();
    let app = setup_app(db);

    let body = b"not json at all";
    let signature = webhook::sign(body, "partner-secret");

    let response = app
        .oneshot(webhook_request("partner", body, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_unknown_source_is_404() {
    let db = setup_db().await;
    let app = setup_app(db);

    let response = app
        .oneshot(webhook_request("mystery", br#"{}"#, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

async fn seed_recoverable_session(db: &SqlitePool) {
    sqlx::query(
        r#"
        INSERT INTO campaigns (id, workspace_id, name, status, outbound_channel, connection_template)
        VALUES ('camp-1', 'ws-a', 'Campaign', 'active', 'linkedin', 'Hi {first_name}')
        "#,
    )
    .execute(db)
    .await
    .unwrap();
    sqlx::query(
        r#"
        INSERT INTO approval_sessions
            (id, workspace_id, created_by, campaign_id, status, total_count,
             approved_count, completed_at)
        VALUES ('sess-1', 'ws-a', 'user-a', 'camp-1', 'completed', 1, 1, CURRENT_TIMESTAMP)
        "#,
    )
    .execute(db)
    .await
    .unwrap();
    sqlx::query(
        r#"
        INSERT INTO approval_candidates
            (id, session_id, prospect_id, name, linkedin_url, approval_status)
        VALUES ('cand-1', 'sess-1', 'src-1', 'Ada Lovelace',
                'https://LinkedIn.com/in/Ada', 'approved')
        "#,
    )
    .execute(db)
    .await
    .unwrap();
}

fn job_request(secret: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/jobs/recover-orphans");
    if let Some(secret) = secret {
        builder = builder.header("x-cron-secret", secret);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_recovery_job_recovers_and_reruns_clean() {
    let db = setup_db().await;
    seed_recoverable_session(&db).await;
    let app = setup_app(db.clone());

    let response = app.clone().oneshot(job_request(Some(CRON_SECRET))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary = extract_json(response.into_body()).await;
    assert_eq!(summary["orphans_found"], 1);
    assert_eq!(summary["recovered"], 1);
    assert_eq!(summary["queued"], 1);

    // URL is stored normalized with recovery provenance
    let (url, source): (String, String) =
        sqlx::query_as("SELECT linkedin_url, source FROM campaign_prospects")
            .fetch_one(&db)
            .await
            .unwrap();
    assert_eq!(url, "https://linkedin.com/in/ada");
    assert_eq!(source, "orphan_recovery");

    // Second run over the same window changes nothing
    let response = app.oneshot(job_request(Some(CRON_SECRET))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary = extract_json(response.into_body()).await;
    assert_eq!(summary["orphans_found"], 0);
    assert_eq!(summary["recovered"], 0);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM campaign_prospects")
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(count, 1);
}
