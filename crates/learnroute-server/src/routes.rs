//! Request handlers. Feature endpoints force their own intent onto the body.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use learnroute_core::types::{InteractionEvent, InteractionIntent, MAX_HINT_LEVEL, ResponseEnvelope};
use learnroute_engine::RouteOptions;

use crate::error::ApiError;
use crate::state::AppState;

type Body = Result<Json<Map<String, Value>>, JsonRejection>;
type Envelope = Result<Json<ResponseEnvelope>, ApiError>;

/// Run one cycle on its own task.
///
/// The task outlives this handler; if the client goes away the drop guard
/// cancels the cycle, which still gets recorded as cancelled.
async fn run_cycle(state: &AppState, event: InteractionEvent, include_history: bool) -> Envelope {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let engine = state.engine.clone();
    let options = RouteOptions {
        cancel,
        include_history,
    };

    debug!(intent = %event.intent, user_id = %event.user_id, "Dispatching interaction");
    match tokio::spawn(async move { engine.route_with(event, options).await }).await {
        Ok(result) => Ok(Json(result?)),
        Err(e) => {
            error!(error = %e, "Routing task aborted");
            Err(ApiError::internal(e.to_string()))
        }
    }
}

fn event_with_intent(
    mut body: Map<String, Value>,
    intent: InteractionIntent,
) -> Result<InteractionEvent, ApiError> {
    body.insert("intent".into(), json!(intent));
    serde_json::from_value(Value::Object(body)).map_err(|e| ApiError::malformed(e.to_string()))
}

pub async fn interactions(
    State(state): State<Arc<AppState>>,
    body: Result<Json<InteractionEvent>, JsonRejection>,
) -> Envelope {
    let Json(event) = body?;
    run_cycle(&state, event, false).await
}

pub async fn doubt(State(state): State<Arc<AppState>>, body: Body) -> Envelope {
    let Json(body) = body?;
    let event = event_with_intent(body, InteractionIntent::DirectSolution)?;
    run_cycle(&state, event, false).await
}

/// `/api/problem/solve` and `/api/problem/progress`.
pub async fn guided(State(state): State<Arc<AppState>>, body: Body) -> Envelope {
    let Json(body) = body?;
    let event = event_with_intent(body, InteractionIntent::Guided)?;
    run_cycle(&state, event, false).await
}

/// Next rung of the hint ladder: the cycle runs at `current_hint_level + 1`.
pub async fn hint(State(state): State<Arc<AppState>>, body: Body) -> Envelope {
    let Json(mut body) = body?;
    let current = match body.remove("current_hint_level") {
        None | Some(Value::Null) => 0,
        Some(value) => value.as_u64().ok_or_else(|| {
            ApiError::malformed("current_hint_level must be a non-negative integer")
        })?,
    };
    let next = current.saturating_add(1).min(u64::from(MAX_HINT_LEVEL));
    body.insert("hint_level".into(), json!(next));

    let event = event_with_intent(body, InteractionIntent::Guided)?;
    run_cycle(&state, event, false).await
}

pub async fn video(State(state): State<Arc<AppState>>, body: Body) -> Envelope {
    let Json(body) = body?;
    let event = event_with_intent(body, InteractionIntent::Video)?;
    run_cycle(&state, event, false).await
}

/// Progress with flashcards; `time_range` is the lookback in days.
pub async fn progress(State(state): State<Arc<AppState>>, body: Body) -> Envelope {
    let Json(mut body) = body?;
    if let Some(days) = body.remove("time_range") {
        body.insert("time_range_days".into(), days);
    }
    body.insert("include_flashcards".into(), Value::Bool(true));

    let event = event_with_intent(body, InteractionIntent::ProgressQuery)?;
    run_cycle(&state, event, false).await
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub user_id: String,
    #[serde(default)]
    pub topic: Option<String>,
}

async fn dashboard(state: &AppState, query: DashboardQuery) -> Envelope {
    let mut event = InteractionEvent::new(query.user_id, InteractionIntent::ProgressQuery);
    event.topic = query.topic.unwrap_or_default();
    event.time_range_days = Some(state.engine.settings().dashboard_time_range_days);
    event.include_flashcards = true;
    run_cycle(state, event, true).await
}

pub async fn dashboard_get(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DashboardQuery>, QueryRejection>,
) -> Envelope {
    let Query(query) = query?;
    dashboard(&state, query).await
}

pub async fn dashboard_post(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DashboardQuery>, JsonRejection>,
) -> Envelope {
    let Json(query) = body?;
    dashboard(&state, query).await
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let uptime = chrono::Utc::now() - state.started_at;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime.num_seconds(),
    }))
}

pub async fn index() -> Json<Value> {
    Json(json!({
        "name": "learnroute",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "POST /api/interactions",
            "POST /api/doubt",
            "POST /api/problem/solve",
            "POST /api/problem/progress",
            "POST /api/problem/hint",
            "POST /api/video/assist",
            "POST /api/progress",
            "GET /api/dashboard",
            "POST /api/dashboard",
            "GET /health",
        ],
    }))
}

#[cfg(feature = "metrics")]
pub async fn metrics(State(state): State<Arc<AppState>>) -> axum::response::Response {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
