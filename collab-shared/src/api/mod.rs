use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::domain::ContentKind;

pub mod endpoints;
#[cfg(feature = "rest-client")]
pub mod rest;

pub const API_V1_PREFIX: &str = "/api/v1";
pub const ADMIN_REMOVE_USERS_PATH: &str = "/api/admin/remove-users";
pub const CRON_CLEAR_DB_PATH: &str = "/api/cron/clear-db";

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct StudentAuthReq {
    pub code: String,
    pub name: String,
}

/// Identity triple handed over by the teacher's identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct TeacherAuthReq {
    pub display_name: String,
    pub email: Option<String>,
    pub external_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
    pub user: UserDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDto {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub points: i64,
    pub created_at: String, // RFC3339 UTC
}

// Access code
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessCodeDto {
    pub code: String,
}

// Sessions and shared content
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResp {
    pub session_id: String,
    /// `false` when the record write was submitted but not awaited.
    pub confirmed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDto {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    /// Raw text, or the base64 payload of a file.
    pub content: String,
    pub filename: Option<String>,
    pub mimetype: Option<String>,
    pub language: Option<String>,
    pub sender_name: String,
    pub created_at: String, // RFC3339 UTC
    pub updated_at: String, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateContentReq {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShareReq {
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub content: String,
    pub filename: Option<String>,
    pub mimetype: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShareResp {
    pub content_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStateDto {
    pub content: ContentDto,
    pub messages: Vec<MessageDto>,
}

// Chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: i64,
    pub room: String,
    pub text: String,
    pub sender_name: String,
    pub timestamp: String, // RFC3339 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostMessageReq {
    pub text: String,
}

// Rewards and points
#[derive(Debug, Serialize, Deserialize)]
pub struct RewardReq {
    pub sender_name: String,
    /// Dedup key; without it every call awards a point.
    pub content_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RewardResp {
    pub already_rewarded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RewardStatusDto {
    pub rewarded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PointsDto {
    pub name: String,
    pub points: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaderboardDto {
    pub teachers: Vec<UserDto>,
    pub students: Vec<UserDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionDto {
    pub version: String,
}

// Administrative surface (camelCase on the wire)
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveUsersReq {
    pub action: Option<String>,
    pub role: Option<String>,
    pub user_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveUsersResp {
    pub success: bool,
    pub deleted_count: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurgeCounts {
    pub content: usize,
    pub messages: usize,
    pub rewards: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearDbResp {
    pub success: bool,
    pub deleted_counts: PurgeCounts,
    pub timestamp: String,
}
