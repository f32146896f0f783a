//! End-to-end tests against an in-process fake job-server.
//!
//! The fake speaks just enough of the spark-jobserver REST API for the
//! client: context create/list/delete, job submission and status polling,
//! plus switches for slow and garbled responses.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{Value, json};

use spark_contexts::{
    ContextDescriptor, ContextSpec, ContextState, ContextType, HttpJobserverClient, JobRequest,
    JobStatus, JobserverApi, JobserverConfig, RemoteError, SparkContextService,
};

#[derive(Default)]
struct ServerState {
    contexts: Mutex<HashSet<String>>,
    /// Remaining status polls before each job reports FINISHED.
    jobs: Mutex<HashMap<String, u32>>,
    create_count: AtomicUsize,
    create_delay_ms: AtomicU64,
    garble_contexts: AtomicBool,
    next_job: AtomicUsize,
}

async fn create_context(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    state.create_count.fetch_add(1, Ordering::SeqCst);

    let delay = state.create_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if !params.contains_key("num-cpu-cores") || !params.contains_key("memory-per-node") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "ERROR", "result": "missing sizing parameters"})),
        );
    }

    let mut contexts = state.contexts.lock().unwrap();
    if !contexts.insert(name.clone()) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "ERROR", "result": format!("context {} exists", name)})),
        );
    }

    (
        StatusCode::OK,
        Json(json!({"status": "SUCCESS", "result": format!("context {} created", name)})),
    )
}

async fn list_contexts(State(state): State<Arc<ServerState>>) -> (StatusCode, Json<Value>) {
    if state.garble_contexts.load(Ordering::SeqCst) {
        return (StatusCode::OK, Json(json!({"unexpected": "shape"})));
    }
    let names: Vec<String> = state.contexts.lock().unwrap().iter().cloned().collect();
    (StatusCode::OK, Json(json!(names)))
}

async fn delete_context(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> (StatusCode, Json<Value>) {
    if state.contexts.lock().unwrap().remove(&name) {
        (StatusCode::OK, Json(json!({"status": "SUCCESS"})))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "ERROR", "result": format!("context {} not found", name)})),
        )
    }
}

async fn submit_job(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<HashMap<String, String>>,
    _body: String,
) -> (StatusCode, Json<Value>) {
    let context = params.get("context").cloned().unwrap_or_default();
    if !state.contexts.lock().unwrap().contains(&context) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "ERROR", "result": format!("context {} not found", context)})),
        );
    }

    let id = format!("job-{}", state.next_job.fetch_add(1, Ordering::SeqCst) + 1);
    state.jobs.lock().unwrap().insert(id.clone(), 1);

    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "STARTED", "result": {"jobId": id, "context": context}})),
    )
}

async fn job_status(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let mut jobs = state.jobs.lock().unwrap();
    match jobs.get_mut(&id) {
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "ERROR", "result": format!("job {} not found", id)})),
        ),
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            (StatusCode::OK, Json(json!({"status": "RUNNING"})))
        }
        Some(_) => (
            StatusCode::OK,
            Json(json!({"status": "FINISHED", "result": {"a": 2, "b": 2, "c": 1, "see": 1}})),
        ),
    }
}

async fn spawn_jobserver() -> (Arc<ServerState>, String) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let state = Arc::new(ServerState::default());
    let app = Router::new()
        .route("/contexts", get(list_contexts))
        .route("/contexts/{name}", post(create_context).delete(delete_context))
        .route("/jobs", post(submit_job))
        .route("/jobs/{id}", get(job_status))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (state, format!("http://{}", addr))
}

fn descriptor(name: &str) -> ContextDescriptor {
    ContextDescriptor {
        name: name.to_string(),
        executor_count: 1,
        memory_per_node: "512m".to_string(),
        cores_per_executor: 2,
        context_type: ContextType::SparkContext,
        timeout_seconds: 0,
        created_at: Utc::now(),
        state: ContextState::Creating,
    }
}

#[tokio::test]
async fn creates_runs_and_deletes_a_context_end_to_end() {
    let (state, url) = spawn_jobserver().await;
    let config = JobserverConfig::new(&url, 30)
        .unwrap()
        .with_poll_interval(Duration::from_millis(50));
    let service = SparkContextService::new(config);

    let spec = ContextSpec::new("c1")
        .executors(1)
        .memory_per_node("512m")
        .cores_per_executor(2)
        .context_type(ContextType::SparkContext)
        .timeout_seconds(0);
    assert!(service.create_context(spec, false).await.unwrap());
    assert!(service.context_exists("c1").await.unwrap());

    let result = service
        .execute_job(&JobRequest::new("app", "pkg.Main", "c1", "k=v", false))
        .await
        .unwrap();
    assert!(result.success);
    assert!(result.output.is_some());

    assert!(service.delete_context("c1").await.unwrap());
    assert!(!service.context_exists("c1").await.unwrap());
    assert_eq!(state.create_count.load(Ordering::SeqCst), 1);

    service.shutdown();
}

#[tokio::test]
async fn duplicate_create_issues_a_single_http_call() {
    let (state, url) = spawn_jobserver().await;
    state.create_delay_ms.store(200, Ordering::SeqCst);
    let service = Arc::new(SparkContextService::new(
        JobserverConfig::new(&url, 30).unwrap(),
    ));

    let first = tokio::spawn({
        let service = Arc::clone(&service);
        async move { service.create_context(ContextSpec::new("dup"), false).await }
    });
    let second = tokio::spawn({
        let service = Arc::clone(&service);
        async move { service.create_context(ContextSpec::new("dup"), false).await }
    });

    assert!(first.await.unwrap().unwrap());
    assert!(second.await.unwrap().unwrap());
    assert_eq!(state.create_count.load(Ordering::SeqCst), 1);
    assert!(service.context_exists("dup").await.unwrap());
}

#[tokio::test]
async fn context_with_timeout_is_deleted_from_the_server() {
    let (state, url) = spawn_jobserver().await;
    let service = SparkContextService::new(JobserverConfig::new(&url, 30).unwrap());

    service
        .create_context(ContextSpec::new("short").timeout_seconds(1), false)
        .await
        .unwrap();
    assert!(service.context_exists("short").await.unwrap());

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert!(!service.context_exists("short").await.unwrap());
    assert!(!state.contexts.lock().unwrap().contains("short"));
}

#[tokio::test]
async fn asynchronous_submission_yields_a_pollable_job_id() {
    let (_state, url) = spawn_jobserver().await;
    let config = JobserverConfig::new(&url, 30).unwrap();
    let client = HttpJobserverClient::new(&config);
    let service = SparkContextService::new(config);

    service
        .create_context(ContextSpec::new("c1"), false)
        .await
        .unwrap();

    let pending = service
        .execute_job(&JobRequest::new("app", "pkg.Main", "c1", "", true))
        .await
        .unwrap();
    assert!(!pending.success);
    let job_id = pending.job_id.expect("async submission carries a job id");

    let mut report = client.job_status(&job_id).await.unwrap();
    while !report.status.is_terminal() {
        tokio::time::sleep(Duration::from_millis(50)).await;
        report = client.job_status(&job_id).await.unwrap();
    }
    assert_eq!(report.status, JobStatus::Finished);
}

#[tokio::test]
async fn deleting_unknown_context_is_a_noop_success() {
    let (_state, url) = spawn_jobserver().await;
    let service = SparkContextService::new(JobserverConfig::new(&url, 30).unwrap());

    assert!(service.delete_context("ghost").await.unwrap());
}

#[tokio::test]
async fn unreachable_server_maps_to_unreachable() {
    // Bind then drop a listener so the port is known-closed.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = JobserverConfig::new(&format!("http://{}", addr), 30).unwrap();
    let client = HttpJobserverClient::new(&config);

    let err = client.context_exists("c1").await.unwrap_err();
    assert!(matches!(err, RemoteError::Unreachable { .. }));
}

#[tokio::test]
async fn duplicate_name_on_the_server_maps_to_rejected() {
    let (_state, url) = spawn_jobserver().await;
    let client = HttpJobserverClient::new(&JobserverConfig::new(&url, 30).unwrap());

    client.create_context(&descriptor("dup")).await.unwrap();
    let err = client.create_context(&descriptor("dup")).await.unwrap_err();

    assert!(matches!(err, RemoteError::Rejected { status: 400, .. }));
}

#[tokio::test]
async fn slow_server_maps_to_timeout() {
    let (state, url) = spawn_jobserver().await;
    state.create_delay_ms.store(500, Ordering::SeqCst);

    let config = JobserverConfig::new(&url, 30)
        .unwrap()
        .with_request_timeout(Duration::from_millis(100));
    let client = HttpJobserverClient::new(&config);

    let err = client.create_context(&descriptor("slow")).await.unwrap_err();
    assert!(matches!(err, RemoteError::Timeout(_)));
}

#[tokio::test]
async fn garbled_response_maps_to_malformed() {
    let (state, url) = spawn_jobserver().await;
    state.garble_contexts.store(true, Ordering::SeqCst);

    let client = HttpJobserverClient::new(&JobserverConfig::new(&url, 30).unwrap());
    let err = client.context_exists("c1").await.unwrap_err();

    assert!(matches!(err, RemoteError::Malformed { .. }));
}
