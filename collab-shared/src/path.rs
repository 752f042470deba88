use percent_encoding::percent_decode_str;

use crate::api::API_V1_PREFIX;

/// Extracts `{id}` from `/api/v1/sessions/{id}/...` or `/api/v1/shares/{id}`.
/// Returns a percent-decoded owned [`String`].
pub fn content_id_from_path(path: &str) -> Option<String> {
    let rest = path.strip_prefix(API_V1_PREFIX)?;
    let rest = rest
        .strip_prefix("/sessions/")
        .or_else(|| rest.strip_prefix("/shares/"))?;
    let seg = rest.split('/').next()?;
    if seg.is_empty() {
        None
    } else {
        Some(percent_decode_str(seg).decode_utf8_lossy().to_string())
    }
}

/// Extracts the room key from `/api/v1/chat/{room}/messages`.
pub fn room_from_path(path: &str) -> Option<String> {
    let rest = path.strip_prefix(API_V1_PREFIX)?.strip_prefix("/chat/")?;
    let seg = rest.split('/').next()?;
    if seg.is_empty() {
        None
    } else {
        Some(percent_decode_str(seg).decode_utf8_lossy().to_string())
    }
}
