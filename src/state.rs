use std::sync::Arc;

use crate::agent::{AgentEvaluator, HttpAgentClient};
use crate::config::Config;

/// Shared per-process state. Everything inside is immutable after startup,
/// so handlers never coordinate with each other.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub evaluator: Arc<dyn AgentEvaluator>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let evaluator = Arc::new(HttpAgentClient::new(&config.agents)?);
        Ok(Self::with_evaluator(config, evaluator))
    }

    pub fn with_evaluator(config: Config, evaluator: Arc<dyn AgentEvaluator>) -> Self {
        Self {
            config: Arc::new(config),
            evaluator,
        }
    }
}
