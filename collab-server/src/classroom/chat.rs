use collab_shared::api::MessageDto;
use collab_shared::domain::{CHAT_HISTORY_LIMIT, RoomKey};
use tracing::debug;

use super::{ClassroomError, ClassroomResult, require_name, store_failure};
use crate::storage::Store;

/// Append-only chat, one room per session plus the general room.
#[derive(Clone)]
pub struct ChatLog {
    store: Store,
    max_len: usize,
}

impl ChatLog {
    pub fn new(store: Store, max_len: usize) -> Self {
        Self { store, max_len }
    }

    pub async fn post(
        &self,
        room: &RoomKey,
        text: &str,
        sender_name: &str,
    ) -> ClassroomResult<MessageDto> {
        let sender_name = require_name(sender_name, "sender name")?;
        if text.trim().is_empty() {
            return Err(ClassroomError::validation("message text is required"));
        }
        if text.chars().count() > self.max_len {
            return Err(ClassroomError::validation(format!(
                "message exceeds {} characters",
                self.max_len
            )));
        }
        let row = self
            .store
            .insert_message(room.as_str(), text, sender_name)
            .await
            .map_err(store_failure("post message"))?;
        debug!(room = %room, id = row.id, "message posted");
        Ok(row.into())
    }

    /// Newest messages of the room, oldest first. `limit` is clamped to 1..=50.
    pub async fn recent(
        &self,
        room: &RoomKey,
        limit: Option<i64>,
    ) -> ClassroomResult<Vec<MessageDto>> {
        let limit = limit
            .unwrap_or(CHAT_HISTORY_LIMIT)
            .clamp(1, CHAT_HISTORY_LIMIT);
        let rows = self
            .store
            .recent_messages(room.as_str(), limit)
            .await
            .map_err(store_failure("read messages"))?;
        Ok(rows.into_iter().map(MessageDto::from).collect())
    }
}
