//! Shared test harness
//!
//! Builds the full router over a temp-file database with stub prediction and
//! training services, and seeds one account per role.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use qcflow_common::config::FeedbackCountMode;
use qcflow_common::db::init_database;
use qcflow_common::events::EventBus;
use qcflow_common::Role;
use qcflow_server::config::ServerSettings;
use qcflow_server::db;
use qcflow_server::models::{
    Evidence, FabricationProcess, NewProcess, NewUser, PredictionResult, User,
};
use qcflow_server::services::retraining::{TrainingError, TrainingRequest};
use qcflow_server::services::{
    spawn_retraining_worker, InsightKind, PredictionError, PredictionService, TrainingService,
};
use qcflow_server::{build_router, AppState};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

pub const PASSWORD: &str = "correct-horse";

/// What the stub prediction service answers
#[derive(Debug, Clone)]
pub enum StubReply {
    Prediction(PredictionResult),
    Fail,
}

/// Prediction service double that counts calls
pub struct StubPredictor {
    reply: Mutex<StubReply>,
    insight: Mutex<Option<Value>>,
    calls: AtomicUsize,
}

impl StubPredictor {
    pub fn new(reply: StubReply) -> Self {
        Self {
            reply: Mutex::new(reply),
            insight: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_reply(&self, reply: StubReply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn set_insight(&self, body: Option<Value>) {
        *self.insight.lock().unwrap() = body;
    }
}

#[async_trait]
impl PredictionService for StubPredictor {
    async fn predict(&self, _batch_number: &str) -> Result<PredictionResult, PredictionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.reply.lock().unwrap().clone() {
            StubReply::Prediction(result) => Ok(result),
            StubReply::Fail => Err(PredictionError::Network("connection refused".to_string())),
        }
    }

    async fn insight(&self, _kind: InsightKind) -> Result<Value, PredictionError> {
        self.insight
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PredictionError::Api(503, "unavailable".to_string()))
    }
}

/// Training service double
pub struct StubTrainer {
    pub fail: bool,
    submissions: AtomicUsize,
}

impl StubTrainer {
    pub fn new(fail: bool) -> Self {
        Self {
            fail,
            submissions: AtomicUsize::new(0),
        }
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrainingService for StubTrainer {
    async fn submit(&self, _request: &TrainingRequest) -> Result<Option<String>, TrainingError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(TrainingError::Api(500, "trainer exploded".to_string()))
        } else {
            Ok(Some("accepted".to_string()))
        }
    }
}

/// Seeded accounts
pub struct Users {
    pub lab1: User,
    pub lab2: User,
    pub lab_inactive: User,
    pub prod1: User,
    pub manager: User,
    pub admin: User,
}

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub event_bus: EventBus,
    pub predictor: Arc<StubPredictor>,
    pub trainer: Arc<StubTrainer>,
    pub users: Users,
    pub cancel: CancellationToken,
    _temp_dir: TempDir,
}

/// Prediction the stub answers with unless a test says otherwise
pub fn sample_prediction(batch_number: &str, root_cause: &str) -> PredictionResult {
    PredictionResult {
        batch_number: batch_number.to_string(),
        product: "Augmentin 60ml".to_string(),
        confidence: 0.87,
        loss: 0.12,
        root_cause: root_cause.to_string(),
        evidence: vec![Evidence {
            name: "pH".to_string(),
            value: 7.9,
            min: Some(6.5),
            max: Some(7.5),
            status: "out-of-range".to_string(),
        }],
        capa: vec![
            "Recalibrate pH meter".to_string(),
            "Prepare fresh buffer".to_string(),
        ],
    }
}

/// Knobs for building a [`TestApp`]
pub struct TestOptions {
    pub trainer: StubTrainer,
    /// Replaces the stub predictor in the router when set
    pub prediction: Option<Arc<dyn PredictionService>>,
    pub count_mode: FeedbackCountMode,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            trainer: StubTrainer::new(false),
            prediction: None,
            count_mode: FeedbackCountMode::Incorrect,
        }
    }
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_options(TestOptions::default()).await
    }

    pub async fn with_trainer(trainer: StubTrainer) -> Self {
        Self::with_options(TestOptions {
            trainer,
            ..TestOptions::default()
        })
        .await
    }

    pub async fn with_options(options: TestOptions) -> Self {
        let TestOptions {
            trainer,
            prediction,
            count_mode,
        } = options;

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let pool = init_database(&temp_dir.path().join("qcflow.db"))
            .await
            .expect("Failed to initialize database");

        let users = seed_users(&pool).await;

        let event_bus = EventBus::new(256);
        let predictor = Arc::new(StubPredictor::new(StubReply::Prediction(
            sample_prediction("AB12", "Lab Error-buffer"),
        )));
        let trainer = Arc::new(trainer);

        let cancel = CancellationToken::new();
        let (queue, _worker) = spawn_retraining_worker(
            pool.clone(),
            event_bus.clone(),
            trainer.clone(),
            cancel.clone(),
        );

        let settings = ServerSettings {
            data_folder: temp_dir.path().to_path_buf(),
            retraining_threshold: 10,
            count_mode,
            ..ServerSettings::default()
        };

        let prediction: Arc<dyn PredictionService> = match prediction {
            Some(service) => service,
            None => predictor.clone(),
        };
        let state = AppState::new(
            pool.clone(),
            event_bus.clone(),
            prediction,
            queue,
            settings,
        );

        Self {
            app: build_router(state),
            pool,
            event_bus,
            predictor,
            trainer,
            users,
            cancel,
            _temp_dir: temp_dir,
        }
    }

    /// Register a batch directly in the database
    pub async fn add_process(&self, batch_number: &str) -> FabricationProcess {
        db::processes::create_process(
            &self.pool,
            &NewProcess {
                batch_number: batch_number.to_string(),
                product_name: "Augmentin 60ml".to_string(),
                product_type: "suspension".to_string(),
                date_time: None,
            },
            self.users.manager.id,
        )
        .await
        .expect("Failed to create process")
    }

    /// Log in over HTTP and return the bearer token
    pub async fn login(&self, username: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(serde_json::json!({ "username": username, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed for {}: {}", username, body);
        body["token"].as_str().expect("token").to_string()
    }

    /// Send a request and decode the JSON body (`Null` when empty)
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    /// Poll a retraining job until it leaves the queued/running states
    pub async fn wait_for_job(&self, id: uuid::Uuid) -> qcflow_server::models::RetrainingJob {
        for _ in 0..200 {
            let job = db::retraining::get_job(&self.pool, id)
                .await
                .unwrap()
                .expect("job exists");
            if !job.status.is_active() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("retraining job {} did not finish", id);
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Predictions stored for a batch
pub async fn prediction_count(pool: &SqlitePool, batch_number: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM predictions WHERE batch_number = ?")
        .bind(batch_number)
        .fetch_one(pool)
        .await
        .expect("Failed to count predictions")
}

/// Ids of notifications linked to a batch, newest first
pub async fn notification_ids(pool: &SqlitePool, batch_number: &str) -> Vec<uuid::Uuid> {
    sqlx::query_scalar(
        "SELECT id FROM notifications WHERE related_batch_number = ? ORDER BY created_at DESC",
    )
    .bind(batch_number)
    .fetch_all(pool)
    .await
    .expect("Failed to list notifications")
}

pub async fn recipients_of(pool: &SqlitePool, notification_id: uuid::Uuid) -> Vec<uuid::Uuid> {
    sqlx::query_scalar("SELECT recipient_id FROM notification_recipients WHERE notification_id = ?")
        .bind(notification_id)
        .fetch_all(pool)
        .await
        .expect("Failed to list recipients")
}

async fn seed_users(pool: &SqlitePool) -> Users {
    async fn user(pool: &SqlitePool, username: &str, role: Role) -> User {
        db::users::create_user(
            pool,
            &NewUser {
                username: username.to_string(),
                email: format!("{}@plant.example", username),
                role,
                department: "QC".to_string(),
                password: PASSWORD.to_string(),
            },
        )
        .await
        .expect("Failed to seed user")
    }

    let lab_inactive = user(pool, "lab3", Role::LabAnalyst).await;
    let lab_inactive = db::users::update_user(
        pool,
        lab_inactive.id,
        &qcflow_server::models::UserUpdate {
            status: Some(qcflow_server::models::UserStatus::Inactive),
            ..Default::default()
        },
    )
    .await
    .expect("Failed to deactivate user");

    Users {
        lab1: user(pool, "lab1", Role::LabAnalyst).await,
        lab2: user(pool, "lab2", Role::LabAnalyst).await,
        lab_inactive,
        prod1: user(pool, "prod1", Role::ProductionAnalyst).await,
        manager: user(pool, "manager1", Role::Manager).await,
        admin: user(pool, "admin1", Role::Administrator).await,
    }
}
