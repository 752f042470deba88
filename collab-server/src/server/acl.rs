use super::{AppError, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::OriginalUri,
    http::{Method, Request},
    middleware::Next,
};
use collab_shared::auth::Role;

pub async fn enforce_acl(req: Request<axum::body::Body>, next: Next) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };
    let claims = &auth.claims;

    let segs = segmented(&path);
    let prefix = ["api", "v1"];
    if !segs.as_slice().starts_with(&prefix) {
        tracing::warn!(?segs, "ACL: path outside api scope");
        return Err(AppError::forbidden());
    }
    let rest = &segs[prefix.len()..];

    let decision = match claims.role {
        Role::Teacher => allow_teacher(&method, rest),
        Role::Student => allow_student(&method, rest),
    };

    if let Err(err) = decision {
        tracing::warn!(
            method = %method,
            path = %path,
            username = %claims.sub,
            role = %claims.role,
            "ACL: no rule matched; denying"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}

/// Routes open to both roles.
fn allow_common(method: &Method, rest: &[&str]) -> bool {
    match rest {
        ["sessions", _, "join"] => *method == Method::POST,
        ["sessions", _, "state"] => *method == Method::GET,
        ["sessions", _, "content"] => *method == Method::GET,
        ["chat", _, "messages"] => *method == Method::GET || *method == Method::POST,
        ["shares"] => *method == Method::POST,
        ["shares", _] => *method == Method::GET,
        ["leaderboard"] => *method == Method::GET,
        ["points", _] => *method == Method::GET,
        _ => false,
    }
}

fn allow_teacher(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    if allow_common(method, rest) {
        return Ok(());
    }
    match rest {
        ["access-code"] if *method == Method::GET || *method == Method::PUT => Ok(()),
        ["sessions"] if *method == Method::POST => Ok(()),
        ["sessions", _, "content"] if *method == Method::PUT => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn allow_student(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    if allow_common(method, rest) {
        return Ok(());
    }
    match rest {
        ["rewards"] if *method == Method::POST => Ok(()),
        ["rewards", "status"] if *method == Method::GET => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_teachers_manage_sessions_and_code() {
        assert!(allow_teacher(&Method::POST, &["sessions"]).is_ok());
        assert!(allow_teacher(&Method::PUT, &["access-code"]).is_ok());
        assert!(allow_teacher(&Method::PUT, &["sessions", "abc", "content"]).is_ok());
        assert!(allow_student(&Method::POST, &["sessions"]).is_err());
        assert!(allow_student(&Method::GET, &["access-code"]).is_err());
        assert!(allow_student(&Method::PUT, &["sessions", "abc", "content"]).is_err());
    }

    #[test]
    fn only_students_reward() {
        assert!(allow_student(&Method::POST, &["rewards"]).is_ok());
        assert!(allow_student(&Method::GET, &["rewards", "status"]).is_ok());
        assert!(allow_teacher(&Method::POST, &["rewards"]).is_err());
    }

    #[test]
    fn both_roles_read_and_chat() {
        for allow in [allow_teacher, allow_student] {
            assert!(allow(&Method::GET, &["sessions", "abc", "state"]).is_ok());
            assert!(allow(&Method::POST, &["chat", "general", "messages"]).is_ok());
            assert!(allow(&Method::GET, &["shares", "xyz"]).is_ok());
            assert!(allow(&Method::GET, &["points", "me"]).is_ok());
            assert!(allow(&Method::DELETE, &["leaderboard"]).is_err());
        }
    }
}
