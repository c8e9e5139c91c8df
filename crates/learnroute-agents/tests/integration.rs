//! Gateway integration tests against mock agents served by a real axum server.
//!
//! Run with: `cargo test -p learnroute-agents --test integration`

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::json;

use learnroute_agents::{AgentGateway, GatewaySettings, HttpAgentGateway, RetryPolicy};
use learnroute_core::agent::AgentId;

#[derive(Clone, Copy)]
enum Behavior {
    /// Fail with 503 for the first `n` calls, then answer.
    FailFirst(u32),
    AlwaysStatus(u16),
    NotJson,
    Slow(Duration),
}

#[derive(Clone)]
struct MockAgent {
    behavior: Behavior,
    hits: Arc<AtomicU32>,
    seen_at: Arc<std::sync::Mutex<Vec<Instant>>>,
}

async fn handle(State(mock): State<MockAgent>, Json(body): Json<serde_json::Value>) -> Response {
    let hit = mock.hits.fetch_add(1, Ordering::SeqCst) + 1;
    mock.seen_at.lock().unwrap().push(Instant::now());
    let ok = Json(json!({"solution": "sorted", "confidence": 0.8, "echo": body})).into_response();

    match mock.behavior {
        Behavior::FailFirst(n) if hit <= n => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Behavior::FailFirst(_) => ok,
        Behavior::AlwaysStatus(code) => {
            (StatusCode::from_u16(code).unwrap(), "upstream exploded").into_response()
        }
        Behavior::NotJson => (StatusCode::OK, "<html>workflow error</html>").into_response(),
        Behavior::Slow(delay) => {
            tokio::time::sleep(delay).await;
            ok
        }
    }
}

/// Start a mock agent on a free port and return its base URL.
async fn start_mock(behavior: Behavior) -> (String, MockAgent) {
    let mock = MockAgent {
        behavior,
        hits: Arc::new(AtomicU32::new(0)),
        seen_at: Arc::new(std::sync::Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route(AgentId::DoubtResolver.default_path(), post(handle))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://127.0.0.1:{port}"), mock)
}

fn gateway(base: &str, timeout: Duration, max_attempts: u32) -> HttpAgentGateway {
    HttpAgentGateway::new(GatewaySettings::with_base_url(
        base,
        timeout,
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(80),
            jitter: true,
        },
    ))
}

#[tokio::test]
async fn test_success_first_attempt() {
    let (base, mock) = start_mock(Behavior::FailFirst(0)).await;
    let gw = gateway(&base, Duration::from_secs(2), 3);

    let result = gw
        .invoke(AgentId::DoubtResolver, json!({"user_id": "u1"}))
        .await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.attempts, 1);
    assert_eq!(result.payload.unwrap()["echo"]["user_id"], "u1");
    assert_eq!(mock.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retries_until_success() {
    let (base, mock) = start_mock(Behavior::FailFirst(2)).await;
    let gw = gateway(&base, Duration::from_secs(2), 3);

    let result = gw.invoke(AgentId::DoubtResolver, json!({})).await;

    assert!(result.success);
    assert_eq!(result.attempts, 3);
    assert_eq!(mock.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_never_exceeds_max_attempts() {
    let (base, mock) = start_mock(Behavior::AlwaysStatus(500)).await;
    let gw = gateway(&base, Duration::from_secs(2), 4);

    let result = gw.invoke(AgentId::DoubtResolver, json!({})).await;

    assert!(!result.success);
    assert_eq!(result.attempts, 4);
    assert_eq!(mock.hits.load(Ordering::SeqCst), 4);
    let err = serde_json::to_value(result.error.unwrap()).unwrap();
    assert_eq!(err["kind"], "bad_status");
    assert_eq!(err["status"], 500);
    assert_eq!(err["body"], "upstream exploded");
}

#[tokio::test]
async fn test_backoff_gaps_non_decreasing() {
    let (base, mock) = start_mock(Behavior::AlwaysStatus(502)).await;
    let gw = gateway(&base, Duration::from_secs(2), 4);

    gw.invoke(AgentId::DoubtResolver, json!({})).await;

    let seen = mock.seen_at.lock().unwrap().clone();
    assert_eq!(seen.len(), 4);
    let gaps: Vec<Duration> = seen.windows(2).map(|w| w[1] - w[0]).collect();
    // First backoff is at least the base delay.
    assert!(gaps[0] >= Duration::from_millis(20), "{gaps:?}");
    // Later gaps include at least the doubled delay.
    assert!(gaps[2] >= Duration::from_millis(80), "{gaps:?}");
}

#[tokio::test]
async fn test_malformed_body_not_retried() {
    let (base, mock) = start_mock(Behavior::NotJson).await;
    let gw = gateway(&base, Duration::from_secs(2), 3);

    let result = gw.invoke(AgentId::DoubtResolver, json!({})).await;

    assert!(!result.success);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.error.unwrap().kind(), "malformed_response");
    assert_eq!(mock.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeout_is_retried_and_reported() {
    let (base, mock) = start_mock(Behavior::Slow(Duration::from_millis(400))).await;
    let gw = gateway(&base, Duration::from_millis(50), 2);

    let result = gw.invoke(AgentId::DoubtResolver, json!({})).await;

    assert!(!result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.error.unwrap().kind(), "timeout");
    assert_eq!(mock.hits.load(Ordering::SeqCst), 2);
}
