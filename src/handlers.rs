use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::agent::ProxyOutcome;
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /api/agents/evaluate`: forward the idea as-is and relay the answer.
pub async fn evaluate(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<ProxyOutcome, ApiError> {
    let Json(body) = payload?;
    Ok(state.evaluator.evaluate(&body).await)
}

/// `GET /api/agents/health`: configuration sanity, never the access key.
pub async fn agents_health(State(state): State<AppState>) -> Json<Value> {
    let agents = &state.config.agents;
    Json(json!({
        "ok": true,
        "baseUrl": agents.base_url,
        "path": agents.evaluate_path,
        "auth": agents.has_access_key(),
    }))
}

/// `GET /api/health`: process liveness.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "ok": true,
        "time": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
