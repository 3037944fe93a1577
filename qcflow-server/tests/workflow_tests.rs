//! Batch registration, data capture and notification inbox tests

mod helpers;

use axum::http::StatusCode;
use helpers::TestApp;
use qcflow_server::db;
use serde_json::json;

#[tokio::test]
async fn test_register_and_filter_processes() {
    let t = TestApp::new().await;
    let manager = t.login("manager1").await;

    let (status, body) = t
        .post(
            "/api/processes",
            &manager,
            json!({ "batchNumber": " AB12 ", "productName": "Ibuprofen 200mg", "productType": "tablet" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["batchNumber"], "AB12");
    assert_eq!(body["isFabricated"], false);
    assert_eq!(body["isLabTested"], false);
    assert_eq!(body["isAnalyzed"], false);

    let (status, _) = t
        .post(
            "/api/processes",
            &manager,
            json!({ "batchNumber": "AB12", "productName": "Ibuprofen 200mg" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = t
        .post("/api/processes", &manager, json!({ "batchNumber": "", "productName": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    t.add_process("CD34").await;
    t.post("/api/root-cause/CD34/analyze", &manager, json!({})).await;

    let (_, pending) = t.get("/api/processes?analyzed=false", &manager).await;
    let pending = pending.as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["batchNumber"], "AB12");

    let (status, _) = t.get("/api/processes/NOPE", &manager).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_lab_submission_flags_batch_and_notifies_production() {
    let t = TestApp::new().await;
    t.add_process("AB12").await;
    let lab = t.login("lab1").await;

    let (status, body) = t
        .post(
            "/api/lab-data",
            &lab,
            json!({
                "batchNumber": "AB12",
                "measurements": { "pH": "7.2", "assay": 99.1, " dissolution ": 85 },
                "notes": "  ",
            }),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["process"]["isLabTested"], true);
    assert_eq!(body["process"]["isFabricated"], false);
    assert_eq!(body["record"]["measurements"]["pH"], 7.2);
    assert_eq!(body["record"]["measurements"]["dissolution"], 85.0);
    assert!(body["record"]["notes"].is_null());
    assert_eq!(body["notifications"].as_array().unwrap().len(), 1);

    let prod = t.login("prod1").await;
    let (_, inbox) = t.get("/api/notifications", &prod).await;
    let inbox = inbox.as_array().unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0]["relatedData"]["type"], "lab-data");
    assert_eq!(inbox[0]["read"], false);

    let (_, record) = t.get("/api/lab-data/AB12", &prod).await;
    assert_eq!(record["batchNumber"], "AB12");
}

#[tokio::test]
async fn test_second_submission_of_same_kind_conflicts() {
    let t = TestApp::new().await;
    t.add_process("AB12").await;
    let prod = t.login("prod1").await;
    let body = json!({ "batchNumber": "AB12", "measurements": { "granulationTime": 14 } });

    let (status, _) = t.post("/api/production-data", &prod, body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = t.post("/api/production-data", &prod, body).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_submission_rejects_non_numeric_values_and_unknown_batch() {
    let t = TestApp::new().await;
    t.add_process("AB12").await;
    let lab = t.login("lab1").await;

    let (status, _) = t
        .post(
            "/api/lab-data",
            &lab,
            json!({ "batchNumber": "AB12", "measurements": { "pH": "seven" } }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = t
        .post(
            "/api/lab-data",
            &lab,
            json!({ "batchNumber": "AB12", "measurements": { "pH": 7.1, " pH ": 9.4 } }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("more than once"));

    let process = db::processes::get_by_batch(&t.pool, "AB12").await.unwrap().unwrap();
    assert!(!process.is_lab_tested);

    let (status, _) = t
        .post(
            "/api/lab-data",
            &lab,
            json!({ "batchNumber": "ZZ99", "measurements": { "pH": 7.0 } }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_managers_told_when_both_kinds_are_in() {
    let t = TestApp::new().await;
    t.add_process("AB12").await;
    let lab = t.login("lab1").await;
    let prod = t.login("prod1").await;
    let manager = t.login("manager1").await;

    t.post(
        "/api/lab-data",
        &lab,
        json!({ "batchNumber": "AB12", "measurements": { "pH": 7.0 } }),
    )
    .await;
    let (_, count) = t.get("/api/notifications/unread-count", &manager).await;
    assert_eq!(count["count"], 0);

    let (status, body) = t
        .post(
            "/api/production-data",
            &prod,
            json!({ "batchNumber": "AB12", "measurements": { "temperature": 22 } }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["notifications"].as_array().unwrap().len(), 2);

    let (_, inbox) = t.get("/api/notifications", &manager).await;
    let inbox = inbox.as_array().unwrap();
    assert_eq!(inbox.len(), 1);
    assert!(inbox[0]["subject"].as_str().unwrap().contains("ready"));
}

#[tokio::test]
async fn test_read_state_is_per_recipient() {
    let t = TestApp::new().await;
    t.add_process("AB12").await;
    let manager = t.login("manager1").await;
    t.post("/api/root-cause/AB12/analyze", &manager, json!({})).await;

    let lab1 = t.login("lab1").await;
    let lab2 = t.login("lab2").await;
    let id = helpers::notification_ids(&t.pool, "AB12").await[0];

    let (status, _) = t
        .post(&format!("/api/notifications/{}/read", id), &lab1, json!({}))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, inbox1) = t.get("/api/notifications", &lab1).await;
    assert_eq!(inbox1[0]["read"], true);
    assert!(!inbox1[0]["readAt"].is_null());

    let (_, inbox2) = t.get("/api/notifications?unreadOnly=true", &lab2).await;
    assert_eq!(inbox2.as_array().unwrap().len(), 1);
    assert_eq!(inbox2[0]["read"], false);

    // Not addressed to the production analyst
    let prod = t.login("prod1").await;
    let (status, _) = t
        .post(&format!("/api/notifications/{}/read", id), &prod, json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, updated) = t.post("/api/notifications/read-all", &lab2, json!({})).await;
    assert_eq!(updated["updated"], 1);
    let (_, count) = t.get("/api/notifications/unread-count", &lab2).await;
    assert_eq!(count["count"], 0);
}

#[tokio::test]
async fn test_manager_broadcast_skips_inactive_users() {
    let t = TestApp::new().await;
    let manager = t.login("manager1").await;

    let (status, body) = t
        .post(
            "/api/notifications",
            &manager,
            json!({ "role": "lab-analyst", "subject": "Audit", "message": "Audit on Friday" }),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["notification"]["priority"], "medium");
    let recipients = body["notification"]["recipients"].as_array().unwrap();
    assert_eq!(recipients.len(), 2);
    assert!(!recipients.contains(&json!(t.users.lab_inactive.id)));

    let lab = t.login("lab1").await;
    let (status, _) = t
        .post(
            "/api/notifications",
            &lab,
            json!({ "role": "manager", "subject": "Hi", "message": "Hello" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
