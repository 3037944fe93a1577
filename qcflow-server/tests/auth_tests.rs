//! Session and permission gate tests

mod helpers;

use axum::http::{Method, StatusCode};
use helpers::{TestApp, PASSWORD};
use qcflow_server::db;
use serde_json::json;

#[tokio::test]
async fn test_health_needs_no_session() {
    let t = TestApp::new().await;

    let (status, body) = t.request(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "qcflow-server");
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let t = TestApp::new().await;

    let (status, body) = t.request(Method::GET, "/api/processes", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = t.get("/api/processes", "not-a-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t.get("/api/processes", &uuid::Uuid::new_v4().to_string()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_rejects_wrong_password_and_inactive_user() {
    let t = TestApp::new().await;

    let (status, _) = t
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "lab1", "password": "nope" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "lab3", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_reports_role_permissions() {
    let t = TestApp::new().await;
    let token = t.login("lab1").await;

    let (status, body) = t.get("/api/auth/me", &token).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "lab-analyst");
    let permissions: Vec<&str> = body["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap())
        .collect();
    assert!(permissions.contains(&"lab-data:write"));
    assert!(!permissions.contains(&"production-data:write"));
    assert!(body["user"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_permission_gate_is_forbidden_not_unauthorized() {
    let t = TestApp::new().await;
    t.add_process("AB12").await;
    let lab = t.login("lab1").await;
    let prod = t.login("prod1").await;
    let admin = t.login("admin1").await;

    // Analysts may read root causes but not trigger an analysis
    let (status, _) = t.post("/api/root-cause/AB12/analyze", &lab, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(t.predictor.calls(), 0);

    let (status, _) = t
        .post(
            "/api/production-data",
            &lab,
            json!({ "batchNumber": "AB12", "measurements": { "temperature": 21.5 } }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .post(
            "/api/lab-data",
            &prod,
            json!({ "batchNumber": "AB12", "measurements": { "pH": 7.1 } }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.get("/api/users", &lab).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Administrators manage users but do not train models
    let (status, _) = t.get("/api/users", &admin).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t.post("/api/model/retraining", &admin, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let t = TestApp::new().await;
    let token = t.login("manager1").await;

    let (status, _) = t
        .request(Method::POST, "/api/auth/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = t.get("/api/auth/me", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_session_is_rejected_and_removed() {
    let t = TestApp::new().await;
    let record = db::sessions::create_session(
        &t.pool,
        t.users.manager.id,
        t.users.manager.role,
        chrono::Duration::seconds(-1),
    )
    .await
    .unwrap();

    let (status, _) = t.get("/api/auth/me", &record.token.to_string()).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(db::sessions::get_session(&t.pool, record.token)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_role_change_ends_sessions() {
    let t = TestApp::new().await;
    let admin = t.login("admin1").await;
    let lab = t.login("lab1").await;

    let (status, body) = t
        .request(
            Method::PUT,
            &format!("/api/users/{}", t.users.lab1.id),
            Some(&admin),
            Some(json!({ "role": "production-analyst" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["role"], "production-analyst");

    let (status, _) = t.get("/api/auth/me", &lab).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let relogged = t.login("lab1").await;
    let (_, me) = t.get("/api/auth/me", &relogged).await;
    assert_eq!(me["role"], "production-analyst");
}

#[tokio::test]
async fn test_admin_cannot_demote_self() {
    let t = TestApp::new().await;
    let admin = t.login("admin1").await;

    let (status, _) = t
        .request(
            Method::PUT,
            &format!("/api/users/{}", t.users.admin.id),
            Some(&admin),
            Some(json!({ "role": "manager" })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_user_validates_and_rejects_duplicates() {
    let t = TestApp::new().await;
    let admin = t.login("admin1").await;

    let (status, _) = t
        .post(
            "/api/users",
            &admin,
            json!({ "username": "qa1", "email": "qa1@plant.example", "role": "manager", "password": "short" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({
        "username": "qa1",
        "email": "qa1@plant.example",
        "role": "manager",
        "password": "long-enough-password",
    });
    let (status, created) = t.post("/api/users", &admin, body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "active");

    let (status, _) = t.post("/api/users", &admin, body).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_admin_bootstrap_only_on_empty_database() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let pool = qcflow_common::db::init_database(&temp_dir.path().join("fresh.db"))
        .await
        .unwrap();
    let settings = qcflow_server::config::ServerSettings {
        admin_username: "root".to_string(),
        admin_password: Some("bootstrap-secret".to_string()),
        ..Default::default()
    };

    let created = qcflow_server::bootstrap::ensure_admin_account(&pool, &settings)
        .await
        .unwrap();
    assert_eq!(created.as_deref(), Some("root"));

    let admin = db::users::find_by_username(&pool, "root").await.unwrap().unwrap();
    assert_eq!(admin.role, qcflow_common::Role::Administrator);
    assert!(admin.password_hash.starts_with("$argon2id$"));
    assert!(qcflow_common::password::verify_password(
        "bootstrap-secret",
        &admin.password_hash
    ));

    let again = qcflow_server::bootstrap::ensure_admin_account(&pool, &settings)
        .await
        .unwrap();
    assert!(again.is_none());
    assert_eq!(db::users::count_users(&pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_update_rejects_blank_email() {
    let t = TestApp::new().await;
    let admin = t.login("admin1").await;
    let uri = format!("/api/users/{}", t.users.lab1.id);

    let (status, _) = t
        .request(Method::PUT, &uri, Some(&admin), Some(json!({ "email": "   " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let stored = db::users::get_user(&t.pool, t.users.lab1.id).await.unwrap().unwrap();
    assert_eq!(stored.email, "lab1@plant.example");

    let (status, body) = t
        .request(
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!({ "email": " lab1@qc.example " })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["email"], "lab1@qc.example");
}
