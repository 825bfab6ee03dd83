use std::sync::Arc;

use crate::{
    config::Config, llm::GenerationBackend, middleware::RateLimiter, services::MessageStore,
};

pub type DbPool = deadpool_diesel::postgres::Pool;

/// Shared handles threaded through every handler. Cheap to clone; all
/// fields are reference counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn MessageStore>,
    pub generation: Arc<dyn GenerationBackend>,
    pub rate_limiter: Arc<RateLimiter>,
}
