//! Classroom components on top of the injected [`Store`].
//!
//! Every public operation returns a [`ClassroomResult`]; store failures are
//! logged where they happen and surface as [`ClassroomError::StoreUnavailable`].

mod access;
mod chat;
mod content;
mod identity;
mod leaderboard;
mod rewards;

pub use access::AccessGate;
pub use chat::ChatLog;
pub use content::ContentStore;
pub use identity::IdentityLedger;
pub use leaderboard::{Leaderboard, rank};
pub use rewards::RewardLedger;

use chrono::{DateTime, NaiveDateTime, Utc};
use collab_shared::api::{ContentDto, MessageDto, SessionStateDto, UserDto};
use collab_shared::auth::Role;
use collab_shared::domain::{ContentKind, DEFAULT_ACCESS_CODE, RoomKey};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::storage::{StorageError, Store, models};

#[derive(Debug, thiserror::Error)]
pub enum ClassroomError {
    #[error("invalid access code")]
    InvalidCode,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    StoreUnavailable(String),
}

pub type ClassroomResult<T> = Result<T, ClassroomError>;

impl ClassroomError {
    pub(crate) fn validation<T: Into<String>>(msg: T) -> Self {
        Self::Validation(msg.into())
    }
    pub(crate) fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
}

/// Logs a store failure and hides its detail behind an operation-specific message.
pub(crate) fn store_failure(op: &'static str) -> impl FnOnce(StorageError) -> ClassroomError {
    move |e| {
        error!(op, error = %e, "store operation failed");
        ClassroomError::StoreUnavailable(format!("failed to {}", op.replace('_', " ")))
    }
}

/// How record creation reports back to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Wait for the insert; the id is readable once returned.
    #[default]
    Confirmed,
    /// Submit the insert in the background and return the id at once.
    FireAndForget,
}

#[derive(Debug, Clone)]
pub struct ClassroomOptions {
    pub default_access_code: String,
    pub chat_max_len: usize,
    pub session_writes: WriteMode,
}

impl Default for ClassroomOptions {
    fn default() -> Self {
        Self {
            default_access_code: DEFAULT_ACCESS_CODE.to_string(),
            chat_max_len: 2000,
            session_writes: WriteMode::Confirmed,
        }
    }
}

#[derive(Clone)]
pub struct Classroom {
    pub access: AccessGate,
    pub identity: IdentityLedger,
    pub content: ContentStore,
    pub chat: ChatLog,
    pub rewards: RewardLedger,
    pub leaderboard: Leaderboard,
    store: Store,
}

impl Classroom {
    pub fn new(store: Store, opts: ClassroomOptions) -> Self {
        let identity = IdentityLedger::new(store.clone());
        Self {
            access: AccessGate::new(store.clone(), identity.clone(), opts.default_access_code),
            content: ContentStore::new(store.clone(), opts.session_writes),
            chat: ChatLog::new(store.clone(), opts.chat_max_len),
            rewards: RewardLedger::new(store.clone()),
            leaderboard: Leaderboard::new(store.clone()),
            identity,
            store,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Session content plus its recent chat. A student viewer's activity stamp is refreshed.
    pub async fn session_state(
        &self,
        session_id: &str,
        viewer: Option<(&str, Role)>,
    ) -> ClassroomResult<SessionStateDto> {
        let content = self.content.get_content(session_id).await?;
        let messages = self
            .chat
            .recent(&RoomKey::Session(session_id.to_string()), None)
            .await?;
        if let Some((name, Role::Student)) = viewer {
            self.identity.touch(name).await?;
        }
        Ok(SessionStateDto { content, messages })
    }

    /// Deletes all content, chat and reward records.
    pub async fn purge_activity(&self) -> ClassroomResult<collab_shared::api::PurgeCounts> {
        self.store
            .purge_activity()
            .await
            .map_err(store_failure("purge activity"))
    }
}

pub(crate) fn rfc3339(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

impl From<models::User> for UserDto {
    fn from(u: models::User) -> Self {
        UserDto {
            id: u.id,
            name: u.name,
            // CHECK constraint limits the column to known roles
            role: u.role.parse().unwrap_or(Role::Student),
            points: u.points,
            created_at: rfc3339(u.created_at),
        }
    }
}

impl From<models::Content> for ContentDto {
    fn from(c: models::Content) -> Self {
        ContentDto {
            id: c.id,
            kind: c.kind.parse().unwrap_or(ContentKind::Text),
            content: c.body,
            filename: c.filename,
            mimetype: c.mimetype,
            language: c.language,
            sender_name: c.sender_name,
            created_at: rfc3339(c.created_at),
            updated_at: rfc3339(c.updated_at),
        }
    }
}

impl From<models::Message> for MessageDto {
    fn from(m: models::Message) -> Self {
        MessageDto {
            id: m.id,
            room: m.room,
            text: m.text,
            sender_name: m.sender_name,
            timestamp: rfc3339(m.created_at),
        }
    }
}

pub(crate) fn require_name<'a>(name: &'a str, what: &str) -> ClassroomResult<&'a str> {
    if name.trim().is_empty() {
        Err(ClassroomError::validation(format!("{what} is required")))
    } else {
        Ok(name)
    }
}
