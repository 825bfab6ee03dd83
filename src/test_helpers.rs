//! In-memory doubles and router scaffolding shared by unit and
//! integration tests. No Postgres or network access required.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;

use crate::{
    config::Config,
    errors::AppError,
    llm::{FragmentStream, GenerationBackend},
    middleware::RateLimiter,
    models::chat::{ChatMessage, NewChatMessage, StreamChatChunk},
    routes::app_router,
    services::MessageStore,
    state::AppState,
};

/// Generation backend that replays a fixed fragment sequence.
pub struct MockGenerationBackend {
    fragments: Vec<String>,
    calls: AtomicUsize,
}

impl MockGenerationBackend {
    pub fn new(fragments: Vec<impl Into<String>>) -> Self {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn stream_generate(
        &self,
        _prompt: &str,
        _temperature: f32,
        _max_tokens: i32,
    ) -> FragmentStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(futures::stream::iter(self.fragments.clone()))
    }
}

/// Message store backed by a Vec, with switchable failure injection.
pub struct MockMessageStore {
    messages: Mutex<Vec<ChatMessage>>,
    save_calls: AtomicUsize,
    fail_from_call: Mutex<Option<usize>>,
    ping_ok: AtomicBool,
}

impl MockMessageStore {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            save_calls: AtomicUsize::new(0),
            fail_from_call: Mutex::new(None),
            ping_ok: AtomicBool::new(true),
        }
    }

    /// Makes saves with zero-based call index `n` and later fail.
    pub fn fail_saves_from(&self, n: usize) {
        *self.fail_from_call.lock().unwrap() = Some(n);
    }

    pub fn set_ping_ok(&self, ok: bool) {
        self.ping_ok.store(ok, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn save_call_count(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MockMessageStore {
    async fn save_message(&self, message: NewChatMessage) -> Result<ChatMessage, AppError> {
        let call = self.save_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fail_from) = *self.fail_from_call.lock().unwrap() {
            if call >= fail_from {
                return Err(AppError::DatabaseQueryError(
                    "simulated store failure".to_string(),
                ));
            }
        }

        let mut messages = self.messages.lock().unwrap();
        let saved = ChatMessage {
            id: messages.len() as i32 + 1,
            session_id: message.session_id,
            message_id: message.message_id,
            role: message.role,
            content: message.content,
            created_at: Utc::now(),
        };
        messages.push(saved.clone());
        Ok(saved)
    }

    async fn ping(&self) -> Result<(), AppError> {
        if self.ping_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::DatabaseQueryError(
                "simulated connectivity failure".to_string(),
            ))
        }
    }
}

/// Builds an [`AppState`] over the provided doubles.
pub fn test_state(
    store: Arc<MockMessageStore>,
    generation: Arc<MockGenerationBackend>,
    rate_limit: u32,
) -> AppState {
    AppState {
        config: Arc::new(Config::default()),
        store,
        generation,
        rate_limiter: Arc::new(RateLimiter::new(rate_limit, Duration::from_secs(60))),
    }
}

/// A fully wired router plus handles to its doubles for assertions.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MockMessageStore>,
    pub generation: Arc<MockGenerationBackend>,
}

/// App with a permissive rate limit and a two-fragment reply.
pub fn spawn_app() -> TestApp {
    spawn_app_with(vec!["Hello", " world"], 1000)
}

pub fn spawn_app_with(fragments: Vec<impl Into<String>>, rate_limit: u32) -> TestApp {
    let store = Arc::new(MockMessageStore::new());
    let generation = Arc::new(MockGenerationBackend::new(fragments));
    let state = test_state(store.clone(), generation.clone(), rate_limit);
    TestApp {
        router: app_router(state),
        store,
        generation,
    }
}

/// Decodes a full SSE body into its JSON chunks.
pub fn parse_sse_chunks(body: &str) -> Vec<StreamChatChunk> {
    body.split("\n\n")
        .filter_map(|frame| {
            frame
                .lines()
                .find_map(|line| line.strip_prefix("data: "))
                .or_else(|| frame.lines().find_map(|line| line.strip_prefix("data:")))
        })
        .map(|data| serde_json::from_str(data).expect("SSE data line should be valid JSON"))
        .collect()
}
