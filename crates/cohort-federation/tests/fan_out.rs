//! Fan-out against real loopback peers.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use cohort_federation::{Dispatcher, MergeMode, Outbound, PeerRegistry};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Clone, Default)]
struct Seen {
    headers: Arc<Mutex<Vec<(Option<String>, Option<String>)>>>,
}

async fn search(State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    seen.headers
        .lock()
        .unwrap()
        .push((header("federation"), header("authorization")));
    assert_eq!(body["datasetId"], json!("D1"));
    Json(json!({
        "status": {},
        "results": {"patients": [{"id": "remote"}], "nextPageToken": "7"}
    }))
}

async fn lookup() -> impl IntoResponse {
    Json(json!({"status": {}, "results": {"id": "x", "name": "from-peer"}}))
}

async fn slow() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(5)).await;
    StatusCode::OK
}

async fn missing() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found", "httpStatus": 404})))
}

async fn spawn(app: Router) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });
    (addr, tx)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_post_fan_out_merges_and_records_status() {
    let seen = Seen::default();
    let good = Router::new()
        .route("/patients/search", post(search))
        .with_state(seen.clone());
    let (good_addr, good_stop) = spawn(good).await;
    let (slow_addr, slow_stop) = spawn(Router::new().route("/patients/search", post(slow))).await;
    let (missing_addr, missing_stop) = spawn(Router::new().route("/patients/search", post(missing))).await;

    let registry = PeerRegistry::new([
        format!("http://{good_addr}"),
        format!("http://{slow_addr}"),
        format!("http://{missing_addr}"),
    ])
    .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry), Duration::from_millis(300), 10).unwrap();
    let request = Outbound::post("/patients/search", json!({"datasetId": "D1"}))
        .with_authorization(Some("Bearer abc".into()));

    let response = dispatcher
        .dispatch(
            Ok(json!({"patients": [{"id": "local"}]})),
            &request,
            true,
            MergeMode::Records,
        )
        .await
        .unwrap();

    assert_eq!(response.status.known_peers, 4);
    assert_eq!(response.status.queried_peers, 3);
    assert_eq!(response.status.successful_communications, 2);
    assert!(!response.status.valid_response);
    assert_eq!(
        response.results,
        json!({
            "patients": [{"id": "local"}, {"id": "remote"}],
            "nextPageToken": "7",
            "total": 2
        })
    );

    let headers = seen.headers.lock().unwrap().clone();
    assert_eq!(headers, vec![(Some("False".to_string()), Some("Bearer abc".to_string()))]);

    for stop in [good_stop, slow_stop, missing_stop] {
        let _ = stop.send(());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_get_falls_back_to_peer() {
    let (addr, stop) = spawn(Router::new().route("/patients/{id}", get(lookup))).await;
    let registry = PeerRegistry::new([format!("http://{addr}")]).unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry), Duration::from_secs(2), 10).unwrap();

    let response = dispatcher
        .dispatch(
            Err(cohort_query::QueryError::NotFound("x".into())),
            &Outbound::get("/patients/x"),
            true,
            MergeMode::Lookup,
        )
        .await
        .unwrap();

    assert_eq!(response.results["name"], json!("from-peer"));
    assert_eq!(response.status.successful_communications, 1);
    assert_eq!(response.status.queried_peers, 2);
    assert!(response.status.valid_response);
    let _ = stop.send(());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_not_found_everywhere() {
    let (addr, stop) = spawn(Router::new().route("/patients/{id}", get(missing))).await;
    let registry = PeerRegistry::new([format!("http://{addr}")]).unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry), Duration::from_secs(2), 10).unwrap();

    let err = dispatcher
        .dispatch(
            Err(cohort_query::QueryError::NotFound("patient 'x'".into())),
            &Outbound::get("/patients/x"),
            true,
            MergeMode::Lookup,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NotFound");
    let _ = stop.send(());
}
