//! Control surface routes, exercised over HTTP through `ControlClient`.

use flowq::api::{self, AppState, ControlClient};
use flowq::engine::{
    InMemoryReplicaStateStore, ProcessorState, ReplicaStateStore, ScopeManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const REPLICA: &str = "replica-a";

struct TestServer {
    base_url: String,
    manager: Arc<ScopeManager>,
    store: Arc<InMemoryReplicaStateStore>,
    cancel: CancellationToken,
    task: Option<JoinHandle<flowq::error::Result<()>>>,
}

impl TestServer {
    async fn spawn(work_on_startup: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let manager = Arc::new(ScopeManager::new(REPLICA, work_on_startup));
        let store = Arc::new(InMemoryReplicaStateStore::new());
        let cancel = CancellationToken::new();

        let state = AppState {
            scope_manager: Arc::clone(&manager),
            state_store: store.clone(),
            stop_check_interval: Duration::from_millis(10),
            shutdown: cancel.clone(),
        };
        let task = tokio::spawn(api::serve(listener, state, cancel.clone()));

        Self {
            base_url,
            manager,
            store,
            cancel,
            task: Some(task),
        }
    }

    /// Cancel the server and wait for graceful shutdown to finish.
    async fn shut_down(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .expect("server must shut down")
                .unwrap()
                .unwrap();
        }
    }

    fn client(&self) -> ControlClient {
        ControlClient::new(&self.base_url)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[tokio::test]
async fn start_then_status_reports_working() {
    let server = TestServer::spawn(false).await;
    let client = server.client();

    let states = client.status().await.unwrap();
    assert_eq!(states.get(REPLICA), Some(&ProcessorState::Stopped));

    let states = client.start().await.unwrap();
    assert_eq!(states.get(REPLICA), Some(&ProcessorState::Working));
    assert_eq!(server.manager.state(), ProcessorState::Working);

    // Idempotent
    let states = client.start().await.unwrap();
    assert_eq!(states.get(REPLICA), Some(&ProcessorState::Working));
}

#[tokio::test]
async fn stop_without_work_in_flight_returns_stopped() {
    let server = TestServer::spawn(true).await;

    // No consumer is running; the stop must still answer
    let states = tokio::time::timeout(Duration::from_secs(5), server.client().stop())
        .await
        .expect("stop must not wait for a consumer")
        .unwrap();
    assert_eq!(states.get(REPLICA), Some(&ProcessorState::Stopped));
    assert_eq!(server.manager.state(), ProcessorState::Stopped);

    // Stopping a stopped processor answers right away
    let states = server.client().stop().await.unwrap();
    assert_eq!(states.get(REPLICA), Some(&ProcessorState::Stopped));
}

#[tokio::test]
async fn shutdown_during_a_pending_stop_answers_unavailable() {
    let mut server = TestServer::spawn(true).await;

    // A job that outlives the server
    let cancel = CancellationToken::new();
    let permit = server
        .manager
        .begin_scope_when_ready(&cancel)
        .await
        .unwrap();

    let url = format!("{}/processor/stop", server.base_url);
    let http = reqwest::Client::new();
    let stopper = tokio::spawn(async move { http.put(url).send().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!stopper.is_finished());
    assert_eq!(server.manager.state(), ProcessorState::Stopping);

    server.shut_down().await;

    let response = tokio::time::timeout(Duration::from_secs(5), stopper)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Stopping"));

    drop(permit);
    assert_eq!(server.manager.state(), ProcessorState::Stopped);
}

#[tokio::test]
async fn stop_blocks_until_the_in_flight_job_finishes() {
    let server = TestServer::spawn(true).await;

    let (entered_tx, entered_rx) = oneshot::channel();
    let (finish_tx, finish_rx) = oneshot::channel::<()>();
    let manager = Arc::clone(&server.manager);
    let job = tokio::spawn(async move {
        let cancel = CancellationToken::new();
        let _permit = manager.begin_scope_when_ready(&cancel).await.unwrap();
        entered_tx.send(()).ok();
        finish_rx.await.ok();
    });
    entered_rx.await.unwrap();

    let client = server.client();
    let stopper = tokio::spawn(async move { client.stop().await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!stopper.is_finished(), "stop must wait for the job");
    assert_eq!(server.manager.state(), ProcessorState::Stopping);

    // Status still answers while a stop is pending
    let states = server.client().status().await.unwrap();
    assert_eq!(states.get(REPLICA), Some(&ProcessorState::Stopping));

    finish_tx.send(()).unwrap();
    job.await.unwrap();

    let states = tokio::time::timeout(Duration::from_secs(5), stopper)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(states.get(REPLICA), Some(&ProcessorState::Stopped));
}

#[tokio::test]
async fn status_includes_other_replicas_from_the_store() {
    let server = TestServer::spawn(false).await;
    server
        .store
        .set_state("replica-b", ProcessorState::Working)
        .await
        .unwrap();
    // A stale record for this replica is overridden by its live state
    server
        .store
        .set_state(REPLICA, ProcessorState::Working)
        .await
        .unwrap();

    let states = server.client().status().await.unwrap();
    assert_eq!(states.len(), 2);
    assert_eq!(states.get("replica-b"), Some(&ProcessorState::Working));
    assert_eq!(states.get(REPLICA), Some(&ProcessorState::Stopped));
}

#[tokio::test]
async fn health_reports_ok() {
    let server = TestServer::spawn(false).await;

    let body: serde_json::Value = reqwest::get(format!("{}/health", server.base_url))
        .await
        .unwrap()
        .error_for_status()
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn wrong_method_is_rejected() {
    let server = TestServer::spawn(false).await;

    let response = reqwest::get(format!("{}/processor/stop", server.base_url))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(server.manager.state(), ProcessorState::Stopped);
}
