use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

/// Installs the global subscriber. Debug mode logs human-readable console
/// output; otherwise JSON for log aggregation. Log level comes from
/// RUST_LOG, defaulting to INFO for this crate and tower_http.
pub fn init_subscriber(debug: bool) {
    try_init_subscriber(debug).expect("a global tracing subscriber is already installed");
    tracing::info!("Tracing subscriber initialized.");
}

fn try_init_subscriber(debug: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "relay_backend=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if debug {
        registry.with(fmt::layer()).try_init()
    } else {
        registry.with(fmt::layer().json()).try_init()
    }
}
