//! Minimal REST client helpers for consumers (clients).

use super::endpoints as ep;
use super::*;
use once_cell::sync::Lazy;
use std::time::Duration;

pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("http: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("serde: {0}")]
    Serde(String),
}

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        // Polls run every few seconds; a request must not outlive its tick by much
        .timeout(Duration::from_secs(10))
        .build()
        .expect("failed to build HTTP client")
});

fn mk_client() -> Result<reqwest::Client, RestError> {
    Ok(HTTP_CLIENT.clone())
}

async fn handle_json<T: for<'de> serde::Deserialize<'de>>(
    res: reqwest::Response,
) -> Result<T, RestError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(RestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    res.json::<T>()
        .await
        .map_err(|e| RestError::Serde(e.to_string()))
}

async fn handle_empty(res: reqwest::Response) -> Result<(), RestError> {
    if res.status().is_success() {
        Ok(())
    } else {
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        Err(RestError::Status { status, body })
    }
}

async fn get_json<T: for<'de> serde::Deserialize<'de>>(
    url: String,
    bearer: Option<&str>,
) -> Result<T, RestError> {
    let client = mk_client()?;
    let mut req = client.get(url);
    if let Some(token) = bearer {
        req = req.bearer_auth(token);
    }
    let res = req
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn login_student(base: &str, req: &StudentAuthReq) -> Result<AuthResp, RestError> {
    let client = mk_client()?;
    let res = client
        .post(ep::auth_student(base))
        .json(req)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn login_teacher(base: &str, req: &TeacherAuthReq) -> Result<AuthResp, RestError> {
    let client = mk_client()?;
    let res = client
        .post(ep::auth_teacher(base))
        .json(req)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn get_access_code(base: &str, bearer: &str) -> Result<AccessCodeDto, RestError> {
    get_json(ep::access_code(base), Some(bearer)).await
}

pub async fn set_access_code(base: &str, bearer: &str, code: &str) -> Result<(), RestError> {
    let client = mk_client()?;
    let res = client
        .put(ep::access_code(base))
        .bearer_auth(bearer)
        .json(&AccessCodeDto {
            code: code.to_string(),
        })
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_empty(res).await
}

pub async fn create_session(base: &str, bearer: &str) -> Result<CreateSessionResp, RestError> {
    let client = mk_client()?;
    let res = client
        .post(ep::sessions(base))
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn join_session(base: &str, bearer: &str, session_id: &str) -> Result<(), RestError> {
    let client = mk_client()?;
    let res = client
        .post(ep::session_join(base, session_id))
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_empty(res).await
}

pub async fn session_state(
    base: &str,
    bearer: &str,
    session_id: &str,
) -> Result<SessionStateDto, RestError> {
    get_json(ep::session_state(base, session_id), Some(bearer)).await
}

pub async fn session_content(
    base: &str,
    bearer: &str,
    session_id: &str,
) -> Result<ContentDto, RestError> {
    get_json(ep::session_content(base, session_id), Some(bearer)).await
}

pub async fn update_session_content(
    base: &str,
    bearer: &str,
    session_id: &str,
    content: &str,
) -> Result<(), RestError> {
    let client = mk_client()?;
    let res = client
        .put(ep::session_content(base, session_id))
        .bearer_auth(bearer)
        .json(&UpdateContentReq {
            content: content.to_string(),
        })
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_empty(res).await
}

pub async fn recent_messages(
    base: &str,
    bearer: &str,
    room: &str,
) -> Result<Vec<MessageDto>, RestError> {
    get_json(ep::chat_messages(base, room), Some(bearer)).await
}

pub async fn post_message(
    base: &str,
    bearer: &str,
    room: &str,
    text: &str,
) -> Result<MessageDto, RestError> {
    let client = mk_client()?;
    let res = client
        .post(ep::chat_messages(base, room))
        .bearer_auth(bearer)
        .json(&PostMessageReq {
            text: text.to_string(),
        })
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn share(base: &str, bearer: &str, req: &ShareReq) -> Result<ShareResp, RestError> {
    let client = mk_client()?;
    let res = client
        .post(ep::shares(base))
        .bearer_auth(bearer)
        .json(req)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn receive(base: &str, bearer: &str, content_id: &str) -> Result<ContentDto, RestError> {
    get_json(ep::share(base, content_id), Some(bearer)).await
}

pub async fn reward(base: &str, bearer: &str, req: &RewardReq) -> Result<RewardResp, RestError> {
    let client = mk_client()?;
    let res = client
        .post(ep::rewards(base))
        .bearer_auth(bearer)
        .json(req)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn reward_status(
    base: &str,
    bearer: &str,
    content_id: &str,
) -> Result<RewardStatusDto, RestError> {
    get_json(ep::reward_status(base, content_id), Some(bearer)).await
}

pub async fn my_points(base: &str, bearer: &str) -> Result<PointsDto, RestError> {
    get_json(ep::my_points(base), Some(bearer)).await
}

pub async fn leaderboard(base: &str, bearer: &str) -> Result<LeaderboardDto, RestError> {
    get_json(ep::leaderboard(base), Some(bearer)).await
}

pub async fn points_of(base: &str, bearer: &str, name: &str) -> Result<PointsDto, RestError> {
    get_json(ep::points(base, name), Some(bearer)).await
}
