use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::API_V1_PREFIX;

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

fn v1(base: &str, path: &str) -> String {
    base_join(base, &format!("{}/{}", API_V1_PREFIX, path))
}

pub fn auth_student(base: &str) -> String {
    v1(base, "auth/student")
}
pub fn auth_teacher(base: &str) -> String {
    v1(base, "auth/teacher")
}
pub fn access_code(base: &str) -> String {
    v1(base, "access-code")
}
pub fn sessions(base: &str) -> String {
    v1(base, "sessions")
}
pub fn session_join(base: &str, session_id: &str) -> String {
    v1(base, &format!("sessions/{}/join", enc(session_id)))
}
pub fn session_state(base: &str, session_id: &str) -> String {
    v1(base, &format!("sessions/{}/state", enc(session_id)))
}
pub fn session_content(base: &str, session_id: &str) -> String {
    v1(base, &format!("sessions/{}/content", enc(session_id)))
}
pub fn chat_messages(base: &str, room: &str) -> String {
    v1(base, &format!("chat/{}/messages", enc(room)))
}
pub fn shares(base: &str) -> String {
    v1(base, "shares")
}
pub fn share(base: &str, content_id: &str) -> String {
    v1(base, &format!("shares/{}", enc(content_id)))
}
pub fn rewards(base: &str) -> String {
    v1(base, "rewards")
}
pub fn reward_status(base: &str, content_id: &str) -> String {
    v1(base, &format!("rewards/status?content_id={}", enc(content_id)))
}
pub fn my_points(base: &str) -> String {
    v1(base, "points/me")
}
pub fn points(base: &str, name: &str) -> String {
    v1(base, &format!("points/{}", enc(name)))
}
pub fn leaderboard(base: &str) -> String {
    v1(base, "leaderboard")
}
