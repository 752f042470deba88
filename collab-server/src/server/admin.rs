//! Key-protected maintenance routes used by operators and the purge scheduler.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, body::Bytes};
use chrono::Utc;
use collab_shared::api::{ClearDbResp, RemoveUsersReq, RemoveUsersResp};
use collab_shared::auth::Role;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::AppState;
use crate::classroom::ClassroomError;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Serialize)]
struct AdminErrorBody {
    success: bool,
    error: String,
}

#[derive(Debug)]
pub enum AdminError {
    Unauthorized,
    BadRequest(String),
    Failed(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AdminError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AdminError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            AdminError::Failed(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        tracing::warn!(status = %status, error = %error, "admin request failed");
        let body = Json(AdminErrorBody {
            success: false,
            error,
        });
        (status, body).into_response()
    }
}

impl From<ClassroomError> for AdminError {
    fn from(e: ClassroomError) -> Self {
        match e {
            ClassroomError::Validation(m) => AdminError::BadRequest(m),
            other => AdminError::Failed(other.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct KeyQuery {
    key: Option<String>,
    #[serde(flatten)]
    remove: RemoveUsersReq,
}

/// Malformed query strings get the admin error body, not axum's plain-text rejection.
fn key_query(query: Result<Query<KeyQuery>, QueryRejection>) -> Result<KeyQuery, AdminError> {
    query
        .map(|Query(q)| q)
        .map_err(|e| AdminError::BadRequest(format!("invalid query: {}", e.body_text())))
}

/// No configured key means the route is open.
fn check_key(expected: Option<&str>, headers: &HeaderMap, query: &KeyQuery) -> Result<(), AdminError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = query.key.as_deref().or_else(|| {
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
    });
    if provided == Some(expected) {
        Ok(())
    } else {
        warn!("admin: api key mismatch");
        Err(AdminError::Unauthorized)
    }
}

enum RemoveAction {
    All,
    ByRole(Role),
    ByName(String),
}

fn parse_action(req: RemoveUsersReq) -> Result<RemoveAction, AdminError> {
    match req.action.as_deref().unwrap_or("all") {
        "all" => Ok(RemoveAction::All),
        "byRole" => {
            let role = req
                .role
                .as_deref()
                .and_then(|r| r.parse::<Role>().ok())
                .ok_or_else(|| {
                    AdminError::BadRequest("Invalid role. Must be 'teacher' or 'student'".into())
                })?;
            Ok(RemoveAction::ByRole(role))
        }
        "byName" => {
            let name = req
                .user_name
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| AdminError::BadRequest("userName is required".into()))?;
            Ok(RemoveAction::ByName(name))
        }
        _ => Err(AdminError::BadRequest(
            "Invalid action. Use 'all', 'byRole', or 'byName'".into(),
        )),
    }
}

async fn remove_users(state: &AppState, action: RemoveAction) -> Result<RemoveUsersResp, AdminError> {
    let identity = &state.classroom.identity;
    let deleted_count = match action {
        RemoveAction::All => identity.remove_all().await?,
        RemoveAction::ByRole(role) => identity.remove_by_role(role).await?,
        RemoveAction::ByName(name) => identity.remove_by_name(&name).await?,
    };
    Ok(RemoveUsersResp {
        success: true,
        deleted_count,
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// `GET /api/admin/remove-users?action=&role=&userName=`
pub async fn remove_users_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<KeyQuery>, QueryRejection>,
) -> Result<Json<RemoveUsersResp>, AdminError> {
    let query = key_query(query)?;
    check_key(state.config.admin_key(), &headers, &query)?;
    let action = parse_action(query.remove)?;
    Ok(Json(remove_users(&state, action).await?))
}

/// `POST /api/admin/remove-users` with a JSON body.
pub async fn remove_users_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<KeyQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<RemoveUsersResp>, AdminError> {
    let query = key_query(query)?;
    check_key(state.config.admin_key(), &headers, &query)?;
    let req: RemoveUsersReq = serde_json::from_slice(&body)
        .map_err(|e| AdminError::BadRequest(format!("invalid body: {e}")))?;
    if req.action.is_none() {
        return Err(AdminError::BadRequest(
            "Invalid action. Use 'all', 'byRole', or 'byName'".into(),
        ));
    }
    let action = parse_action(req)?;
    Ok(Json(remove_users(&state, action).await?))
}

/// `GET|POST /api/cron/clear-db`
pub async fn clear_db(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<KeyQuery>, QueryRejection>,
) -> Result<Json<ClearDbResp>, AdminError> {
    let query = key_query(query)?;
    check_key(state.config.cron_key(), &headers, &query)?;
    let deleted_counts = state.classroom.purge_activity().await?;
    info!(
        content = deleted_counts.content,
        messages = deleted_counts.messages,
        rewards = deleted_counts.rewards,
        "cron: activity purged"
    );
    Ok(Json(ClearDbResp {
        success: true,
        deleted_counts,
        timestamp: Utc::now().to_rfc3339(),
    }))
}
