use crate::monitor::MonitorRunner;
use crate::storage::Pool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub runner: Arc<MonitorRunner>,
    /// Shared secret expected in the x-trigger-secret header for mutating
    /// endpoints. None means triggers are refused outright.
    pub trigger_secret: Option<String>,
}
