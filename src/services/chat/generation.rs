use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::{
    models::chat::{MessageRole, NewChatMessage, StreamChatChunk},
    state::AppState,
};

/// Bound on fragments buffered between the producer task and the SSE
/// consumer; a slow client applies backpressure to the backend pull
/// instead of growing an unbounded buffer.
const FRAGMENT_CHANNEL_CAPACITY: usize = 32;

/// Identifiers and sampling parameters for one streamed turn.
pub struct StreamParams {
    pub session_id: String,
    pub message_id: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: i32,
}

/// Drives one assistant turn: pulls fragments from the generation backend
/// in a producer task, forwards each one as a chunk while accumulating the
/// full text, persists the assistant message once the sequence ends, and
/// always closes with a terminal chunk.
///
/// If the client disconnects the consumer is dropped, the channel receiver
/// with it, and the producer stops pulling from the backend; no partial
/// assistant message is persisted in that case.
pub fn stream_and_persist(
    state: AppState,
    params: StreamParams,
) -> impl Stream<Item = StreamChatChunk> {
    let StreamParams {
        session_id,
        message_id,
        prompt,
        temperature,
        max_tokens,
    } = params;

    let (tx, mut rx) = mpsc::channel::<String>(FRAGMENT_CHANNEL_CAPACITY);

    let backend = state.generation.clone();
    let producer_session_id = session_id.clone();
    tokio::spawn(async move {
        let mut fragments = backend.stream_generate(&prompt, temperature, max_tokens).await;
        while let Some(fragment) = fragments.next().await {
            if tx.send(fragment).await.is_err() {
                debug!(
                    session_id = %producer_session_id,
                    "Client disconnected, dropping generation stream"
                );
                break;
            }
        }
    });

    async_stream::stream! {
        let mut full_response = String::new();

        while let Some(fragment) = rx.recv().await {
            full_response.push_str(&fragment);
            yield StreamChatChunk::content(fragment, &session_id, &message_id);
        }

        let assistant_message = NewChatMessage {
            session_id: session_id.clone(),
            message_id: message_id.clone(),
            role: MessageRole::Assistant,
            content: full_response,
        };
        match state.store.save_message(assistant_message).await {
            Ok(saved) => {
                info!(
                    session_id = %session_id,
                    message_id = %saved.message_id,
                    content_len = saved.content.len(),
                    "Assistant message persisted"
                );
            }
            Err(e) => {
                // Best-effort: the response already streamed, so the client
                // still gets its terminal frame. The loss is surfaced here.
                error!(
                    error = %e,
                    session_id = %session_id,
                    message_id = %message_id,
                    "Failed to persist assistant message; completing stream anyway"
                );
            }
        }

        yield StreamChatChunk::terminal(&session_id, &message_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::MessageRole;
    use crate::test_helpers::{test_state, MockGenerationBackend, MockMessageStore};
    use std::sync::Arc;

    fn params() -> StreamParams {
        StreamParams {
            session_id: "sess-1".to_string(),
            message_id: "msg-1".to_string(),
            prompt: "hello".to_string(),
            temperature: 0.7,
            max_tokens: 100,
        }
    }

    #[tokio::test]
    async fn test_fragments_forwarded_and_aggregated() {
        let store = Arc::new(MockMessageStore::new());
        let backend = Arc::new(MockGenerationBackend::new(vec!["Hel", "lo", " world"]));
        let state = test_state(store.clone(), backend, 10);

        let chunks: Vec<StreamChatChunk> =
            stream_and_persist(state, params()).collect().await;

        assert_eq!(chunks.len(), 4);
        let contents: Vec<&str> = chunks[..3].iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["Hel", "lo", " world"]);
        assert!(chunks[..3].iter().all(|c| !c.is_complete));
        let terminal = &chunks[3];
        assert!(terminal.is_complete);
        assert!(terminal.content.is_empty());
        assert!(chunks.iter().all(|c| c.session_id == "sess-1"));
        assert!(chunks.iter().all(|c| c.message_id == "msg-1"));

        let messages = store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::Assistant);
        assert_eq!(messages[0].content, "Hello world");
        assert_eq!(messages[0].message_id, "msg-1");
    }

    #[tokio::test]
    async fn test_empty_fragment_sequence_still_terminates() {
        let store = Arc::new(MockMessageStore::new());
        let backend = Arc::new(MockGenerationBackend::new(Vec::<String>::new()));
        let state = test_state(store.clone(), backend, 10);

        let chunks: Vec<StreamChatChunk> =
            stream_and_persist(state, params()).collect().await;

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_complete);
        assert_eq!(store.messages()[0].content, "");
    }

    #[tokio::test]
    async fn test_persist_failure_still_emits_terminal_chunk() {
        let store = Arc::new(MockMessageStore::new());
        store.fail_saves_from(0);
        let backend = Arc::new(MockGenerationBackend::new(vec!["Hi"]));
        let state = test_state(store.clone(), backend, 10);

        let chunks: Vec<StreamChatChunk> =
            stream_and_persist(state, params()).collect().await;

        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].is_complete);
        assert!(store.messages().is_empty());
    }
}
