pub mod chat;

pub use chat::{
    ChatMessage, ChatSession, HealthCheck, MessageRole, NewChatMessage, StreamChatChunk,
    StreamChatRequest,
};
