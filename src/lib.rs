pub mod config;
pub mod errors;
pub mod llm;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod state;
pub mod test_helpers;

pub use state::AppState;
