mod acl;
mod admin;
pub mod auth;
mod config;

use crate::classroom::{Classroom, ClassroomError};
use crate::server::auth::AuthCtx;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::{Method, StatusCode, header},
    routing::{get, post},
};
use collab_shared::api::{self, ADMIN_REMOVE_USERS_PATH, CRON_CLEAR_DB_PATH};
use collab_shared::domain::RoomKey;
use collab_shared::path::{content_id_from_path, room_from_path};
pub use config::{AppConfig, ConfigError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub classroom: Classroom,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, classroom: Classroom) -> Self {
        Self {
            config,
            classroom,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelled once the process starts shutting down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let private = Router::new()
        .route(
            "/api/v1/access-code",
            get(api_get_access_code).put(api_set_access_code),
        )
        .route("/api/v1/sessions", post(api_create_session))
        .route("/api/v1/sessions/{id}/join", post(api_join_session))
        .route("/api/v1/sessions/{id}/state", get(api_session_state))
        .route(
            "/api/v1/sessions/{id}/content",
            get(api_get_content).put(api_update_content),
        )
        .route(
            "/api/v1/chat/{room}/messages",
            get(api_recent_messages).post(api_post_message),
        )
        .route("/api/v1/shares", post(api_share))
        .route("/api/v1/shares/{id}", get(api_receive))
        .route("/api/v1/rewards", post(api_reward))
        .route("/api/v1/rewards/status", get(api_reward_status))
        .route("/api/v1/points/me", get(api_my_points))
        .route("/api/v1/points/{name}", get(api_points))
        .route("/api/v1/leaderboard", get(api_leaderboard))
        .with_state(state.clone())
        .layer(middleware::from_fn(acl::enforce_acl))
        .layer(middleware::from_fn(set_auth_span_fields))
        // Outermost: the layers above see the AuthCtx it inserts
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let path = req.uri().path();
        let span = info_span!(
            "request",
            method = %req.method(),
            path = %path,
            request_id = %request_id,
            username = tracing::field::Empty,
            role = tracing::field::Empty,
            content_id = tracing::field::Empty,
            room = tracing::field::Empty
        );
        if let Some(id) = content_id_from_path(path) {
            span.record("content_id", tracing::field::display(id));
        }
        if let Some(room) = room_from_path(path) {
            span.record("room", tracing::field::display(room));
        }
        span
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/version", get(api_version))
        .route("/api/v1/auth/student", post(api_auth_student))
        .route("/api/v1/auth/teacher", post(api_auth_teacher))
        .route(
            ADMIN_REMOVE_USERS_PATH,
            get(admin::remove_users_get).post(admin::remove_users_post),
        )
        .route(
            CRON_CLEAR_DB_PATH,
            get(admin::clear_db).post(admin::clear_db),
        )
        .merge(private)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured
    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health(State(state): State<AppState>) -> Result<&'static str, AppError> {
    state.classroom.store().health_check().await.map_err(|e| {
        tracing::error!(error = %e, "healthz: store check failed");
        AppError::Unavailable("store unavailable".into())
    })?;
    Ok("ok")
}

async fn api_version() -> Json<api::VersionDto> {
    Json(api::VersionDto {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("SAMEORIGIN"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );

    // Every poll must hit the store
    if path == "/healthz" || path.starts_with("/api/") {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
        headers.insert(
            HeaderName::from_static("pragma"),
            HeaderValue::from_static("no-cache"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("username", tracing::field::display(&auth.claims.sub));
        span.record("role", tracing::field::display(&auth.claims.role));
    }
    Ok(next.run(req).await)
}

// Auth

async fn api_auth_student(
    State(state): State<AppState>,
    Json(body): Json<api::StudentAuthReq>,
) -> Result<Json<api::AuthResp>, AppError> {
    let user = state
        .classroom
        .access
        .authenticate(&body.code, &body.name)
        .await?;
    let token = auth::issue_jwt_for_user(&state, &user)?;
    tracing::info!(user_id = %user.id, "login: student");
    Ok(Json(api::AuthResp { token, user }))
}

async fn api_auth_teacher(
    State(state): State<AppState>,
    Json(body): Json<api::TeacherAuthReq>,
) -> Result<Json<api::AuthResp>, AppError> {
    let user = state
        .classroom
        .identity
        .upsert_teacher(
            &body.display_name,
            body.external_id.as_deref(),
            body.email.as_deref(),
        )
        .await?;
    let token = auth::issue_jwt_for_user(&state, &user)?;
    tracing::info!(user_id = %user.id, "login: teacher");
    Ok(Json(api::AuthResp { token, user }))
}

// Access code

async fn api_get_access_code(
    State(state): State<AppState>,
) -> Result<Json<api::AccessCodeDto>, AppError> {
    let code = state.classroom.access.get_code().await?;
    Ok(Json(api::AccessCodeDto { code }))
}

async fn api_set_access_code(
    State(state): State<AppState>,
    Json(body): Json<api::AccessCodeDto>,
) -> Result<StatusCode, AppError> {
    state.classroom.access.set_code(&body.code).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Sessions and content

async fn api_create_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::CreateSessionResp>, AppError> {
    let resp = state
        .classroom
        .content
        .create_session(&auth.claims.sub)
        .await?;
    Ok(Json(resp))
}

async fn api_join_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.classroom.content.join_session(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_session_state(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<api::SessionStateDto>, AppError> {
    let dto = state
        .classroom
        .session_state(&id, Some((&auth.claims.sub, auth.claims.role)))
        .await?;
    Ok(Json(dto))
}

async fn api_get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<api::ContentDto>, AppError> {
    Ok(Json(state.classroom.content.get_content(&id).await?))
}

async fn api_update_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<api::UpdateContentReq>,
) -> Result<StatusCode, AppError> {
    state
        .classroom
        .content
        .update_content(&id, &body.content)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// Chat

#[derive(Deserialize)]
struct HistoryOpts {
    limit: Option<i64>,
}

async fn api_recent_messages(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Query(opts): Query<HistoryOpts>,
) -> Result<Json<Vec<api::MessageDto>>, AppError> {
    let room = RoomKey::from(room.as_str());
    Ok(Json(state.classroom.chat.recent(&room, opts.limit).await?))
}

async fn api_post_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(room): Path<String>,
    Json(body): Json<api::PostMessageReq>,
) -> Result<Json<api::MessageDto>, AppError> {
    let room = RoomKey::from(room.as_str());
    let msg = state
        .classroom
        .chat
        .post(&room, &body.text, &auth.claims.sub)
        .await?;
    Ok(Json(msg))
}

// One-shot shares

async fn api_share(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::ShareReq>,
) -> Result<Json<api::ShareResp>, AppError> {
    let content_id = state
        .classroom
        .content
        .share_once(body, &auth.claims.sub)
        .await?;
    Ok(Json(api::ShareResp { content_id }))
}

async fn api_receive(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<api::ContentDto>, AppError> {
    Ok(Json(state.classroom.content.receive(&id).await?))
}

// Rewards and points

async fn api_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::RewardReq>,
) -> Result<Json<api::RewardResp>, AppError> {
    let resp = state
        .classroom
        .rewards
        .try_reward(
            Some(&auth.claims.sub),
            &body.sender_name,
            body.content_id.as_deref(),
        )
        .await?;
    Ok(Json(resp))
}

#[derive(Deserialize)]
struct RewardStatusQuery {
    content_id: String,
}

async fn api_reward_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Query(q): Query<RewardStatusQuery>,
) -> Result<Json<api::RewardStatusDto>, AppError> {
    let rewarded = state
        .classroom
        .rewards
        .has_rewarded(&auth.claims.sub, &q.content_id)
        .await?;
    Ok(Json(api::RewardStatusDto { rewarded }))
}

async fn api_my_points(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::PointsDto>, AppError> {
    let points = state.classroom.identity.get_points(&auth.claims.sub).await?;
    Ok(Json(api::PointsDto {
        name: auth.claims.sub,
        points,
    }))
}

async fn api_points(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<api::PointsDto>, AppError> {
    let points = state.classroom.identity.get_points(&name).await?;
    Ok(Json(api::PointsDto { name, points }))
}

async fn api_leaderboard(
    State(state): State<AppState>,
) -> Result<Json<api::LeaderboardDto>, AppError> {
    Ok(Json(state.classroom.leaderboard.compute().await?))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    InvalidCode,
    Forbidden,
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl AppError {
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<ClassroomError> for AppError {
    fn from(e: ClassroomError) -> Self {
        match e {
            ClassroomError::InvalidCode => AppError::InvalidCode,
            ClassroomError::NotFound(m) => AppError::NotFound(m),
            ClassroomError::Validation(m) => AppError::BadRequest(m),
            ClassroomError::StoreUnavailable(m) => AppError::Unavailable(m),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                None,
            ),
            AppError::InvalidCode => (
                StatusCode::UNAUTHORIZED,
                "invalid access code".into(),
                "invalid_code",
                None,
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".into(), "forbidden", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::Unavailable(m) => (
                StatusCode::SERVICE_UNAVAILABLE,
                m,
                "store_unavailable",
                None,
            ),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else if status.is_server_error() {
            tracing::error!(status = %status, kind = kind, message = %msg, "request failed");
        } else {
            tracing::warn!(status = %status, kind = kind, message = %msg, "request rejected");
        }
        let body = axum::Json(ErrorBody { error: msg });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn classroom_errors_map_to_statuses() {
        let status = |e: ClassroomError| AppError::from(e).into_response().status();
        assert_eq!(
            status(ClassroomError::StoreUnavailable("failed to apply reward".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status(ClassroomError::InvalidCode), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(ClassroomError::NotFound("no such session".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(ClassroomError::Validation("text is required".into())),
            StatusCode::BAD_REQUEST
        );
    }
}
