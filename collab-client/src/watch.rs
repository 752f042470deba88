//! Interactive views: a live session and the leaderboard.

use std::sync::Arc;

use collab_shared::api::{self, LeaderboardDto, RewardReq};
use collab_shared::auth::Role;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::AppError;
use crate::poll::{PollPolicy, poll_loop};

/// Identity and server the views talk to.
#[derive(Clone)]
pub struct Viewer {
    pub base: String,
    pub token: String,
    pub name: String,
    pub role: Option<Role>,
}

/// Follows a session until `cancel` fires or stdin closes.
///
/// Lines typed on stdin are posted to the session chat; `/reward` rewards
/// the author of the session content and refreshes the points display.
pub async fn watch_session(
    viewer: Viewer,
    session_id: String,
    policy: PollPolicy,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    api::rest::join_session(&viewer.base, &viewer.token, &session_id).await?;
    println!("Joined session {session_id} as {}", viewer.name);

    let points_nudge = Arc::new(Notify::new());
    let chat_nudge = Arc::new(Notify::new());
    let mut tasks = Vec::new();

    {
        let v = viewer.clone();
        let sid = session_id.clone();
        let mut last_update: Option<String> = None;
        // The state route also refreshes a student viewer's activity stamp
        tasks.push(tokio::spawn(poll_loop(
            "content",
            policy.content,
            cancel.child_token(),
            None,
            move || {
                let v = v.clone();
                let sid = sid.clone();
                async move { api::rest::session_state(&v.base, &v.token, &sid).await }
            },
            move |state: api::SessionStateDto| {
                let content = state.content;
                if last_update.as_deref() != Some(content.updated_at.as_str()) {
                    println!(
                        "--- content by {} (updated {}) ---\n{}\n---",
                        content.sender_name, content.updated_at, content.content
                    );
                    last_update = Some(content.updated_at);
                }
            },
        )));
    }

    {
        let v = viewer.clone();
        let sid = session_id.clone();
        let mut last_id = 0i64;
        tasks.push(tokio::spawn(poll_loop(
            "chat",
            policy.chat,
            cancel.child_token(),
            Some(chat_nudge.clone()),
            move || {
                let v = v.clone();
                let sid = sid.clone();
                async move { api::rest::recent_messages(&v.base, &v.token, &sid).await }
            },
            move |messages: Vec<api::MessageDto>| {
                for m in messages {
                    if m.id <= last_id {
                        continue;
                    }
                    println!("[{}] {}: {}", m.timestamp, m.sender_name, m.text);
                    last_id = m.id;
                }
            },
        )));
    }

    {
        let v = viewer.clone();
        let mut last_points: Option<i64> = None;
        tasks.push(tokio::spawn(poll_loop(
            "points",
            policy.points,
            cancel.child_token(),
            Some(points_nudge.clone()),
            move || {
                let v = v.clone();
                async move { api::rest::my_points(&v.base, &v.token).await }
            },
            move |p: api::PointsDto| {
                if last_points != Some(p.points) {
                    println!("* {} has {} point(s)", p.name, p.points);
                    last_points = Some(p.points);
                }
            },
        )));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            l = lines.next_line() => l?,
        };
        let Some(line) = line else {
            info!("stdin closed; leaving session");
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if line == "/reward" {
            match reward_author(&viewer, &session_id, &points_nudge).await {
                Some(RewardOutcome::Rewarded(to)) => println!("Rewarded {to}"),
                Some(RewardOutcome::AlreadyRewarded(to)) => println!("You already rewarded {to}"),
                Some(RewardOutcome::NotAllowed) => println!("Only students can give rewards"),
                None => {}
            }
            continue;
        }
        send_chat(&viewer, &session_id, line, &chat_nudge).await;
    }

    cancel.cancel();
    for t in tasks {
        let _ = t.await;
    }
    Ok(())
}

/// Posts a chat line and asks the chat poll to refetch right away.
pub async fn send_chat(viewer: &Viewer, room: &str, text: &str, chat_nudge: &Notify) -> bool {
    match api::rest::post_message(&viewer.base, &viewer.token, room, text).await {
        Ok(_) => {
            chat_nudge.notify_one();
            true
        }
        Err(e) => {
            warn!(error = %e, "chat post failed");
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardOutcome {
    Rewarded(String),
    AlreadyRewarded(String),
    NotAllowed,
}

/// Rewards the author of the session content once. `None` when a request failed.
pub async fn reward_author(
    viewer: &Viewer,
    session_id: &str,
    points_nudge: &Notify,
) -> Option<RewardOutcome> {
    if viewer.role != Some(Role::Student) {
        return Some(RewardOutcome::NotAllowed);
    }
    let content = match api::rest::session_content(&viewer.base, &viewer.token, session_id).await {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "could not load session content");
            return None;
        }
    };
    let author = content.sender_name;
    match api::rest::reward_status(&viewer.base, &viewer.token, &content.id).await {
        Ok(status) if status.rewarded => return Some(RewardOutcome::AlreadyRewarded(author)),
        Ok(_) => {}
        // Advisory only; the server still dedups
        Err(e) => warn!(error = %e, "reward status unavailable"),
    }
    let req = RewardReq {
        sender_name: author,
        content_id: Some(content.id),
    };
    let outcome = match api::rest::reward(&viewer.base, &viewer.token, &req).await {
        Ok(r) if r.already_rewarded => RewardOutcome::AlreadyRewarded(req.sender_name),
        Ok(_) => RewardOutcome::Rewarded(req.sender_name),
        Err(e) => {
            warn!(error = %e, "reward failed");
            return None;
        }
    };
    points_nudge.notify_one();
    Some(outcome)
}

pub fn print_leaderboard(board: &LeaderboardDto) {
    println!("Teachers");
    for (i, u) in board.teachers.iter().enumerate() {
        println!("  {:>2}. {:<24} {:>5}", i + 1, u.name, u.points);
    }
    println!("Students");
    for (i, u) in board.students.iter().enumerate() {
        println!("  {:>2}. {:<24} {:>5}", i + 1, u.name, u.points);
    }
}

/// Reprints the leaderboard on every poll until cancelled.
pub async fn watch_leaderboard(viewer: Viewer, policy: PollPolicy, cancel: CancellationToken) {
    poll_loop(
        "leaderboard",
        policy.leaderboard,
        cancel,
        None,
        move || {
            let v = viewer.clone();
            async move { api::rest::leaderboard(&v.base, &v.token).await }
        },
        |board: LeaderboardDto| {
            println!();
            print_leaderboard(&board);
        },
    )
    .await
}
