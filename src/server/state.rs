use crate::orchestrator::Orchestrator;
use std::time::Instant;

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            started_at: Instant::now(),
        }
    }
}
