use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::{errors::AppError, state::AppState};

/// Request timestamps for one client within the current window.
#[derive(Debug, Clone)]
struct ClientWindow {
    requests: Vec<Instant>,
    last_request: Instant,
}

/// Sliding-window request limiter keyed by client address.
///
/// Counters live in process memory; nothing survives a restart. The
/// increment-and-compare runs under a single write guard, so concurrent
/// requests from the same client cannot slip past the limit.
#[derive(Debug)]
pub struct RateLimiter {
    client_windows: RwLock<HashMap<String, ClientWindow>>,
    max_requests: u32,
    window: Duration,
    cleanup_interval: Duration,
    last_cleanup: RwLock<Instant>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            client_windows: RwLock::new(HashMap::new()),
            max_requests,
            window,
            cleanup_interval: Duration::from_secs(300),
            last_cleanup: RwLock::new(Instant::now()),
        }
    }

    /// Check whether the client may make another request, recording it if
    /// allowed.
    pub fn check_rate_limit(&self, client_key: &str) -> Result<(), RateLimitError> {
        let now = Instant::now();

        self.cleanup_stale_entries(now);

        let mut windows = self
            .client_windows
            .write()
            .map_err(|_| RateLimitError::InternalError)?;

        let client = windows
            .entry(client_key.to_string())
            .or_insert_with(|| ClientWindow {
                requests: Vec::new(),
                last_request: now,
            });

        client
            .requests
            .retain(|&timestamp| now.duration_since(timestamp) < self.window);

        let current = client.requests.len() as u32;
        if current >= self.max_requests {
            return Err(RateLimitError::LimitExceeded {
                limit: self.max_requests,
                current,
                retry_after_secs: self.window.as_secs(),
            });
        }

        client.requests.push(now);
        client.last_request = now;

        debug!(
            client_key,
            "Rate limit check passed: {}/{} in window",
            current + 1,
            self.max_requests
        );

        Ok(())
    }

    /// Drops clients idle for a full window so the map does not grow
    /// without bound.
    fn cleanup_stale_entries(&self, now: Instant) {
        if let Ok(mut last_cleanup) = self.last_cleanup.write() {
            if now.duration_since(*last_cleanup) > self.cleanup_interval {
                if let Ok(mut windows) = self.client_windows.write() {
                    let window = self.window;
                    windows.retain(|_, client| now.duration_since(client.last_request) < window);
                    debug!(
                        "Cleaned up stale rate limit entries, {} clients remaining",
                        windows.len()
                    );
                }
                *last_cleanup = now;
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded: {current}/{limit}")]
    LimitExceeded {
        limit: u32,
        current: u32,
        retry_after_secs: u64,
    },

    #[error("Internal error in rate limiter")]
    InternalError,
}

impl From<RateLimitError> for AppError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::LimitExceeded {
                retry_after_secs, ..
            } => AppError::RateLimited { retry_after_secs },
            RateLimitError::InternalError => AppError::InternalServerError(err.to_string()),
        }
    }
}

/// Gate applied to the stream route. Rejects with 429 before the handler
/// runs, so a limited request causes no store write and no backend call.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|connect_info| connect_info.0);
    let client_key = client_key(request.headers(), peer);

    if let Err(e) = state.rate_limiter.check_rate_limit(&client_key) {
        warn!(client_key, error = %e, "Rejecting rate-limited request");
        return Err(e.into());
    }

    Ok(next.run(request).await)
}

/// Resolves the client key: forwarded headers first (the service usually
/// sits behind a proxy), then the peer address.
fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .map(String::from)
        })
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
