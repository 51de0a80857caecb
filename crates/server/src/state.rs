use std::sync::Arc;

use scriberr_adapters::AdapterRegistry;
use scriberr_domain::config::Config;
use scriberr_engine::{ProgressBroadcaster, TaskQueue};
use scriberr_storage::Repositories;

use crate::auth::service::AuthService;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repos: Repositories,
    pub auth: Arc<AuthService>,
    pub registry: Arc<AdapterRegistry>,
    pub queue: TaskQueue,
    pub broadcaster: Arc<ProgressBroadcaster>,
}
