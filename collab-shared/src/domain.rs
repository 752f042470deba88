use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Code handed out when no access code has been stored yet.
pub const DEFAULT_ACCESS_CODE: &str = "COLLAB123";
pub const MIN_ACCESS_CODE_LEN: usize = 3;
/// Number of chat messages returned per room.
pub const CHAT_HISTORY_LIMIT: i64 = 50;
/// Room key of the class-wide chat that is not bound to a session.
pub const GENERAL_ROOM: &str = "general";
/// Length of generated session/share ids.
pub const CONTENT_ID_LEN: usize = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    File,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::File => "file",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown content kind: {0}")]
pub struct UnknownContentKind(pub String);

impl FromStr for ContentKind {
    type Err = UnknownContentKind;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentKind::Text),
            "file" => Ok(ContentKind::File),
            other => Err(UnknownContentKind(other.to_string())),
        }
    }
}

/// Chat scope: either the global room or a single session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomKey {
    General,
    Session(String),
}

impl RoomKey {
    pub fn as_str(&self) -> &str {
        match self {
            RoomKey::General => GENERAL_ROOM,
            RoomKey::Session(id) => id,
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomKey {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == GENERAL_ROOM {
            Ok(RoomKey::General)
        } else {
            Ok(RoomKey::Session(s.to_string()))
        }
    }
}

impl From<&str> for RoomKey {
    fn from(value: &str) -> Self {
        match value.parse() {
            Ok(room) => room,
            Err(never) => match never {},
        }
    }
}

/// Trims, lowercases and joins whitespace runs with `_`.
///
/// Two raw names that normalize to the same string refer to the same student.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

pub fn student_id(name: &str) -> String {
    format!("student_{}", normalize_name(name))
}

/// Teachers are keyed by the identity provider subject when there is one.
pub fn teacher_id(external_id: Option<&str>, email: Option<&str>, name: &str) -> String {
    if let Some(ext) = external_id.map(str::trim).filter(|s| !s.is_empty()) {
        return ext.to_string();
    }
    let basis = email.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(name);
    format!("teacher_{}", normalize_name(basis))
}
