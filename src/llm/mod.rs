use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

pub mod gemini_client;

pub use gemini_client::GeminiBackend;

/// A finite, non-restartable sequence of text fragments, produced
/// incrementally as the backend emits them.
pub type FragmentStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Interface to the text-generation service.
///
/// Failures do not surface as errors past this boundary: an implementation
/// logs the failure and ends the stream with a single human-readable
/// `Error: ...` fragment. The caller forwards fragments as-is and must not
/// apply further error handling.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn stream_generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: i32,
    ) -> FragmentStream;
}
