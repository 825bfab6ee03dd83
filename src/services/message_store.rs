use async_trait::async_trait;
use diesel::prelude::*;
use tracing::{info, instrument};

use crate::{
    errors::AppError,
    models::chat::{ChatMessage, NewChatMessage},
    schema::chat_messages,
    state::DbPool,
};

/// Persistence seam for chat turns. The production implementation writes
/// to Postgres; tests substitute an in-memory store.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Inserts one turn and returns the stored row.
    async fn save_message(&self, message: NewChatMessage) -> Result<ChatMessage, AppError>;

    /// Liveness probe against the underlying connection.
    async fn ping(&self) -> Result<(), AppError>;
}

pub struct PgMessageStore {
    pool: DbPool,
}

impl PgMessageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    #[instrument(
        skip(self, message),
        fields(session_id = %message.session_id, role = %message.role),
        err
    )]
    async fn save_message(&self, message: NewChatMessage) -> Result<ChatMessage, AppError> {
        let conn = self.pool.get().await?;
        let inserted = conn
            .interact(move |conn| {
                diesel::insert_into(chat_messages::table)
                    .values(&message)
                    .returning(ChatMessage::as_select())
                    .get_result::<ChatMessage>(conn)
                    .map_err(AppError::from)
            })
            .await??;

        info!(
            message_id = %inserted.message_id,
            session_id = %inserted.session_id,
            "Chat message successfully inserted"
        );
        Ok(inserted)
    }

    #[instrument(skip(self), err)]
    async fn ping(&self) -> Result<(), AppError> {
        let conn = self.pool.get().await?;
        conn.interact(|conn| {
            diesel::sql_query("SELECT 1")
                .execute(conn)
                .map(|_| ())
                .map_err(AppError::from)
        })
        .await??;
        Ok(())
    }
}
