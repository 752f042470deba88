use chrono::Utc;
use collab_shared::api::{ContentDto, CreateSessionResp, ShareReq};
use collab_shared::domain::{CONTENT_ID_LEN, ContentKind};
use rand::Rng;
use tracing::{debug, error, info, warn};

use super::{ClassroomError, ClassroomResult, WriteMode, require_name, store_failure};
use crate::storage::{Store, TextUpdate, models::NewContent};

const ID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
const MAX_ID_ATTEMPTS: usize = 5;

/// Random URL-safe id for sessions and one-shot shares.
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..CONTENT_ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

fn new_record(
    id: String,
    kind: ContentKind,
    body: String,
    sender_name: &str,
    filename: Option<String>,
    mimetype: Option<String>,
    language: Option<String>,
) -> NewContent {
    let now = Utc::now().naive_utc();
    NewContent {
        id,
        kind: kind.as_str().to_string(),
        body,
        filename,
        mimetype,
        language,
        sender_name: sender_name.to_string(),
        created_at: now,
        updated_at: now,
    }
}

/// Sessions and one-shot shares live in the same content table.
#[derive(Clone)]
pub struct ContentStore {
    store: Store,
    write_mode: WriteMode,
}

impl ContentStore {
    pub fn new(store: Store, write_mode: WriteMode) -> Self {
        Self { store, write_mode }
    }

    pub async fn create_session(&self, teacher_name: &str) -> ClassroomResult<CreateSessionResp> {
        let teacher_name = require_name(teacher_name, "teacher name")?;
        match self.write_mode {
            WriteMode::Confirmed => {
                let session_id = self
                    .insert_with_retry(|id| {
                        new_record(
                            id,
                            ContentKind::Text,
                            String::new(),
                            teacher_name,
                            None,
                            None,
                            None,
                        )
                    })
                    .await?;
                info!(%session_id, teacher = teacher_name, "session created");
                Ok(CreateSessionResp {
                    session_id,
                    confirmed: true,
                })
            }
            WriteMode::FireAndForget => {
                let session_id = generate_id();
                let row = new_record(
                    session_id.clone(),
                    ContentKind::Text,
                    String::new(),
                    teacher_name,
                    None,
                    None,
                    None,
                );
                let store = self.store.clone();
                let id = session_id.clone();
                tokio::spawn(async move {
                    match store.insert_content(row).await {
                        Ok(true) => debug!(session_id = %id, "background session insert done"),
                        Ok(false) => warn!(session_id = %id, "background session insert hit an id collision"),
                        Err(e) => error!(session_id = %id, error = %e, "background session insert failed"),
                    }
                });
                info!(%session_id, teacher = teacher_name, "session submitted");
                Ok(CreateSessionResp {
                    session_id,
                    confirmed: false,
                })
            }
        }
    }

    pub async fn join_session(&self, session_id: &str) -> ClassroomResult<()> {
        let exists = self
            .store
            .content_exists(session_id)
            .await
            .map_err(store_failure("join session"))?;
        if exists {
            Ok(())
        } else {
            Err(ClassroomError::not_found("session not found"))
        }
    }

    pub async fn get_content(&self, session_id: &str) -> ClassroomResult<ContentDto> {
        self.store
            .get_content(session_id)
            .await
            .map_err(store_failure("read content"))?
            .map(ContentDto::from)
            .ok_or_else(|| ClassroomError::not_found("session not found"))
    }

    /// Unconditional overwrite; the last writer wins.
    pub async fn update_content(&self, session_id: &str, text: &str) -> ClassroomResult<()> {
        let outcome = self
            .store
            .update_text(session_id, text)
            .await
            .map_err(store_failure("update content"))?;
        match outcome {
            TextUpdate::Updated => Ok(()),
            TextUpdate::NotFound => Err(ClassroomError::not_found("session not found")),
            TextUpdate::Immutable => Err(ClassroomError::validation(
                "file content cannot be edited",
            )),
        }
    }

    /// Stores a one-shot share and returns its id. Shares are never bound to a session.
    pub async fn share_once(&self, req: ShareReq, sender_name: &str) -> ClassroomResult<String> {
        let sender_name = require_name(sender_name, "sender name")?;
        if req.content.is_empty() {
            return Err(ClassroomError::validation("content is required"));
        }
        let filename = req
            .filename
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());
        if req.kind == ContentKind::File && filename.is_none() {
            return Err(ClassroomError::validation("file shares require a filename"));
        }
        let ShareReq {
            kind,
            content,
            mimetype,
            language,
            ..
        } = req;
        let content_id = self
            .insert_with_retry(|id| {
                new_record(
                    id,
                    kind,
                    content.clone(),
                    sender_name,
                    filename.clone(),
                    mimetype.clone(),
                    language.clone(),
                )
            })
            .await?;
        info!(%content_id, sender = sender_name, kind = %kind, "content shared");
        Ok(content_id)
    }

    /// Repeatable read of a share.
    pub async fn receive(&self, content_id: &str) -> ClassroomResult<ContentDto> {
        self.store
            .get_content(content_id)
            .await
            .map_err(store_failure("receive content"))?
            .map(ContentDto::from)
            .ok_or_else(|| ClassroomError::not_found("content not found"))
    }

    async fn insert_with_retry<F>(&self, mut build: F) -> ClassroomResult<String>
    where
        F: FnMut(String) -> NewContent,
    {
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = generate_id();
            let inserted = self
                .store
                .insert_content(build(id.clone()))
                .await
                .map_err(store_failure("create content"))?;
            if inserted {
                return Ok(id);
            }
            warn!(%id, attempt, "content id collision, retrying");
        }
        error!(attempts = MAX_ID_ATTEMPTS, "could not allocate a content id");
        Err(ClassroomError::StoreUnavailable(
            "failed to allocate content id".into(),
        ))
    }
}
