use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use collab_shared::api::UserDto;
use collab_shared::jwt::{self, JwtClaims};
use tracing::error;

use super::{AppError, AppState};

/// How many days before mandatory re-login.
const TOKEN_TTL_DAYS: i64 = 30;

#[derive(Clone, Debug)]
pub struct AuthCtx {
    pub claims: JwtClaims,
}

pub async fn require_bearer(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let unauthorized = || Err(AppError::unauthorized());
    let header_val = match req.headers().get(header::AUTHORIZATION) {
        Some(v) => v,
        None => return unauthorized(),
    };
    let header_str = header_val.to_str().map_err(|_| AppError::unauthorized())?;
    let Some(token) = header_str.strip_prefix("Bearer ") else {
        return unauthorized();
    };

    let claims = match jwt::decode_and_verify(token, state.config.jwt_secret.as_bytes()) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error=%e, "auth: jwt decode failed");
            return unauthorized();
        }
    };
    if claims.sub.trim().is_empty() {
        tracing::warn!(uid = %claims.uid, "auth: token without a display name");
        return unauthorized();
    }

    req.extensions_mut().insert(AuthCtx { claims });
    Ok(next.run(req).await)
}

/// Signs a token for a freshly upserted user.
pub fn issue_jwt_for_user(state: &AppState, user: &UserDto) -> Result<String, AppError> {
    let claims = JwtClaims {
        sub: user.name.clone(),
        uid: user.id.clone(),
        jti: uuid::Uuid::new_v4().to_string(),
        exp: (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
        role: user.role,
    };
    jwt::encode(&claims, state.config.jwt_secret.as_bytes()).map_err(|e| {
        error!(username = %user.name, error=%e, "login: jwt encode failed");
        AppError::internal(e)
    })
}
