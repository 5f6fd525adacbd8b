use async_trait::async_trait;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

/// Result of forwarding one idea submission to the agent service.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyOutcome {
    /// The agent service answered with a JSON body; status and body pass through.
    Relayed { status: StatusCode, body: Value },
    /// The exchange could not be completed. `status` is set when the agent
    /// service did answer but the body was unusable.
    Failed {
        status: Option<StatusCode>,
        message: String,
    },
}

impl ProxyOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyOutcome::Relayed { status, .. } => *status,
            ProxyOutcome::Failed { status, .. } => {
                status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    pub fn into_parts(self) -> (StatusCode, Value) {
        let status = self.status();
        match self {
            ProxyOutcome::Relayed { body, .. } => (status, body),
            ProxyOutcome::Failed { message, .. } => (status, json!({ "error": message })),
        }
    }
}

impl IntoResponse for ProxyOutcome {
    fn into_response(self) -> Response {
        let (status, body) = self.into_parts();
        (status, Json(body)).into_response()
    }
}

/// Anything that can evaluate an idea submission.
#[async_trait]
pub trait AgentEvaluator: Send + Sync {
    /// Forward `body` untouched and report what came back. Never fails;
    /// every failure is folded into [`ProxyOutcome::Failed`].
    async fn evaluate(&self, body: &Value) -> ProxyOutcome;
}
