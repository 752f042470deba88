use std::time::Duration;

use collab_server::classroom::{Classroom, ClassroomError, ClassroomOptions, WriteMode};
use collab_server::storage::Store;
use collab_shared::api::ShareReq;
use collab_shared::auth::Role;
use collab_shared::domain::{ContentKind, RoomKey};
use diesel::prelude::*;

struct Fixture {
    classroom: Classroom,
    _tempdir: tempfile::TempDir,
}

async fn fixture_with(opts: ClassroomOptions) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("classroom.db");
    let store = Store::connect_sqlite(db_path.to_str().unwrap(), Duration::from_secs(5))
        .await
        .expect("db");
    store.health_check().await.expect("health");
    Fixture {
        classroom: Classroom::new(store, opts),
        _tempdir: dir,
    }
}

async fn fixture() -> Fixture {
    fixture_with(ClassroomOptions::default()).await
}

fn text_share(body: &str) -> ShareReq {
    ShareReq {
        kind: ContentKind::Text,
        content: body.to_string(),
        filename: None,
        mimetype: None,
        language: None,
    }
}

#[tokio::test]
async fn student_upsert_collapses_equivalent_names() {
    let f = fixture().await;
    let first = f.classroom.identity.upsert_student("Ada Lovelace").await.unwrap();
    let second = f
        .classroom
        .identity
        .upsert_student("  ada   LOVELACE ")
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.id, "student_ada_lovelace");

    let users = f.classroom.identity.list().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "  ada   LOVELACE ");
    assert_eq!(users[0].points, 0);
    assert_eq!(users[0].role, Role::Student);
}

#[tokio::test]
async fn duplicate_reward_counts_once() {
    let f = fixture().await;
    let rewards = &f.classroom.rewards;
    let first = rewards
        .try_reward(Some("Bob"), "Ada", Some("c1"))
        .await
        .unwrap();
    let second = rewards
        .try_reward(Some("bob "), "ADA", Some("c1"))
        .await
        .unwrap();
    assert!(!first.already_rewarded);
    assert!(second.already_rewarded);
    assert_eq!(f.classroom.identity.get_points("Ada").await.unwrap(), 1);
    assert!(rewards.has_rewarded("Bob", "c1").await.unwrap());
    assert!(!rewards.has_rewarded("Bob", "c2").await.unwrap());
}

#[tokio::test]
async fn reward_dedup_ignores_name_spelling() {
    let f = fixture().await;
    let rewards = &f.classroom.rewards;
    let mut outcomes = Vec::new();
    for (rewarder, sender) in [
        ("Bob Jones", "Ada Lovelace"),
        ("bob  jones", "Ada  Lovelace"),
        ("Bob\tJones", "Ada\tLovelace"),
        (" BOB JONES ", " ada lovelace "),
    ] {
        let r = rewards
            .try_reward(Some(rewarder), sender, Some("c1"))
            .await
            .unwrap();
        outcomes.push(r.already_rewarded);
    }
    assert_eq!(outcomes, vec![false, true, true, true]);
    assert_eq!(f.classroom.identity.get_points("Ada Lovelace").await.unwrap(), 1);
    assert_eq!(f.classroom.identity.list().await.unwrap().len(), 1);
    assert!(rewards.has_rewarded("bob   JONES", "c1").await.unwrap());
}

#[tokio::test]
async fn teacher_reward_dedup_uses_the_teacher_row() {
    let f = fixture().await;
    f.classroom
        .identity
        .upsert_teacher("Ms Frizzle", Some("idp-7"), None)
        .await
        .unwrap();
    let rewards = &f.classroom.rewards;
    let first = rewards
        .try_reward(Some("Bob"), "Ms Frizzle", Some("s1"))
        .await
        .unwrap();
    let second = rewards
        .try_reward(Some("bob"), "Ms Frizzle", Some("s1"))
        .await
        .unwrap();
    assert!(!first.already_rewarded);
    assert!(second.already_rewarded);
    assert_eq!(f.classroom.identity.get_points("Ms Frizzle").await.unwrap(), 1);
}

#[tokio::test]
async fn store_timeout_surfaces_as_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("classroom.db");
    let db = db_path.to_str().unwrap();
    let store = Store::connect_sqlite(db, Duration::from_millis(200))
        .await
        .expect("db");
    let classroom = Classroom::new(store, ClassroomOptions::default());

    // A second connection holds the write lock; writers wait on busy_timeout
    let mut holder = SqliteConnection::establish(db).unwrap();
    diesel::sql_query("BEGIN EXCLUSIVE").execute(&mut holder).unwrap();
    let err = classroom.access.set_code("LOCKED1").await.unwrap_err();
    assert!(
        matches!(err, ClassroomError::StoreUnavailable(_)),
        "unexpected error: {err:?}"
    );
    diesel::sql_query("ROLLBACK").execute(&mut holder).unwrap();

    // The timed-out write may still land once the lock is gone; later calls work again
    tokio::time::sleep(Duration::from_secs(1)).await;
    classroom.access.set_code("OPEN123").await.unwrap();
    assert_eq!(classroom.access.get_code().await.unwrap(), "OPEN123");
}

#[tokio::test]
async fn concurrent_duplicate_rewards_count_once() {
    let f = fixture().await;
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let rewards = f.classroom.rewards.clone();
        tasks.push(tokio::spawn(async move {
            rewards.try_reward(Some("Bob"), "Ada", Some("c1")).await
        }));
    }
    let mut fresh = 0;
    for t in tasks {
        if !t.await.unwrap().unwrap().already_rewarded {
            fresh += 1;
        }
    }
    assert_eq!(fresh, 1);
    assert_eq!(f.classroom.identity.get_points("Ada").await.unwrap(), 1);
}

#[tokio::test]
async fn distinct_content_rewards_accumulate() {
    let f = fixture().await;
    let rewards = &f.classroom.rewards;
    rewards.try_reward(Some("Bob"), "Ada", Some("c1")).await.unwrap();
    rewards.try_reward(Some("Bob"), "Ada", Some("c2")).await.unwrap();
    // No dedup key: always awards
    rewards.try_reward(Some("Bob"), "Ada", None).await.unwrap();
    rewards.try_reward(None, "Ada", Some("c1")).await.unwrap();
    assert_eq!(f.classroom.identity.get_points("ada").await.unwrap(), 4);
}

#[tokio::test]
async fn self_reward_is_rejected() {
    let f = fixture().await;
    let err = f
        .classroom
        .rewards
        .try_reward(Some("Ada Lovelace"), "ada  lovelace", Some("c1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClassroomError::Validation(_)));
    assert_eq!(f.classroom.identity.get_points("Ada Lovelace").await.unwrap(), 0);
}

#[tokio::test]
async fn teacher_points_resolve_by_exact_name() {
    let f = fixture().await;
    let teacher = f
        .classroom
        .identity
        .upsert_teacher("Ms Hopper", Some("idp-7"), Some("hopper@school.test"))
        .await
        .unwrap();
    assert_eq!(teacher.id, "idp-7");
    f.classroom
        .rewards
        .try_reward(Some("Ada"), "Ms Hopper", Some("c9"))
        .await
        .unwrap();
    assert_eq!(f.classroom.identity.get_points("Ms Hopper").await.unwrap(), 1);

    let board = f.classroom.leaderboard.compute().await.unwrap();
    assert_eq!(board.teachers.len(), 1);
    assert_eq!(board.teachers[0].points, 1);
    // No student row was created for the teacher's name
    assert!(board.students.is_empty());
}

#[tokio::test]
async fn recent_messages_are_ordered_and_bounded() {
    let f = fixture().await;
    let chat = &f.classroom.chat;
    let room = RoomKey::Session("s1".into());
    for i in 0..55 {
        chat.post(&room, &format!("msg {i}"), "Ada").await.unwrap();
    }
    chat.post(&RoomKey::General, "elsewhere", "Bob").await.unwrap();

    let first = chat.recent(&room, None).await.unwrap();
    let again = chat.recent(&room, Some(50)).await.unwrap();
    assert_eq!(first.len(), 50);
    assert_eq!(first.first().unwrap().text, "msg 5");
    assert_eq!(first.last().unwrap().text, "msg 54");
    assert!(first.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    let ids: Vec<_> = first.iter().map(|m| m.id).collect();
    let ids_again: Vec<_> = again.iter().map(|m| m.id).collect();
    assert_eq!(ids, ids_again);

    assert_eq!(chat.recent(&room, Some(500)).await.unwrap().len(), 50);
    assert_eq!(chat.recent(&room, Some(0)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn chat_rejects_blank_and_oversized_text() {
    let f = fixture_with(ClassroomOptions {
        chat_max_len: 10,
        ..ClassroomOptions::default()
    })
    .await;
    let chat = &f.classroom.chat;
    for text in ["", "   \n"] {
        let err = chat.post(&RoomKey::General, text, "Ada").await.unwrap_err();
        assert!(matches!(err, ClassroomError::Validation(_)));
    }
    let err = chat
        .post(&RoomKey::General, "01234567890", "Ada")
        .await
        .unwrap_err();
    assert!(matches!(err, ClassroomError::Validation(_)));
    chat.post(&RoomKey::General, "0123456789", "Ada").await.unwrap();
}

#[tokio::test]
async fn content_update_is_last_write_wins() {
    let f = fixture().await;
    let content = &f.classroom.content;
    let created = content.create_session("Ms Hopper").await.unwrap();
    assert!(created.confirmed);
    let sid = created.session_id;

    content.join_session(&sid).await.unwrap();
    content.update_content(&sid, "a").await.unwrap();
    content.update_content(&sid, "b").await.unwrap();
    let got = content.get_content(&sid).await.unwrap();
    assert_eq!(got.content, "b");
    assert_eq!(got.sender_name, "Ms Hopper");

    assert!(matches!(
        content.update_content("missing1", "x").await,
        Err(ClassroomError::NotFound(_))
    ));
    assert!(matches!(
        content.join_session("missing1").await,
        Err(ClassroomError::NotFound(_))
    ));
}

#[tokio::test]
async fn shares_are_repeatable_and_files_are_immutable() {
    let f = fixture().await;
    let content = &f.classroom.content;
    let cid = content.share_once(text_share("hello"), "Ada").await.unwrap();
    assert_eq!(content.receive(&cid).await.unwrap().content, "hello");
    assert_eq!(content.receive(&cid).await.unwrap().content, "hello");

    let file = ShareReq {
        kind: ContentKind::File,
        content: "aGVsbG8=".into(),
        filename: Some("hello.txt".into()),
        mimetype: Some("text/plain".into()),
        language: None,
    };
    let fid = content.share_once(file, "Ada").await.unwrap();
    let got = content.receive(&fid).await.unwrap();
    assert_eq!(got.kind, ContentKind::File);
    assert_eq!(got.filename.as_deref(), Some("hello.txt"));
    assert!(matches!(
        content.update_content(&fid, "x").await,
        Err(ClassroomError::Validation(_))
    ));

    let missing_name = ShareReq {
        kind: ContentKind::File,
        content: "aGVsbG8=".into(),
        filename: Some("  ".into()),
        mimetype: None,
        language: None,
    };
    assert!(matches!(
        content.share_once(missing_name, "Ada").await,
        Err(ClassroomError::Validation(_))
    ));
    assert!(matches!(
        content.share_once(text_share(""), "Ada").await,
        Err(ClassroomError::Validation(_))
    ));
    assert!(matches!(
        content.receive("nothing0").await,
        Err(ClassroomError::NotFound(_))
    ));
}

#[tokio::test]
async fn fire_and_forget_sessions_appear_eventually() {
    let f = fixture_with(ClassroomOptions {
        session_writes: WriteMode::FireAndForget,
        ..ClassroomOptions::default()
    })
    .await;
    let created = f.classroom.content.create_session("Ms Hopper").await.unwrap();
    assert!(!created.confirmed);

    let mut joined = false;
    for _ in 0..50 {
        if f.classroom.content.join_session(&created.session_id).await.is_ok() {
            joined = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(joined, "background insert never landed");
}

#[tokio::test]
async fn access_code_validation() {
    let f = fixture().await;
    let access = &f.classroom.access;
    assert_eq!(access.get_code().await.unwrap(), "COLLAB123");
    for bad in ["", "   ", "ab"] {
        assert!(matches!(
            access.set_code(bad).await,
            Err(ClassroomError::Validation(_))
        ));
    }
    access.set_code("abc").await.unwrap();
    assert_eq!(access.get_code().await.unwrap(), "abc");

    assert!(matches!(
        access.authenticate("ABC", "Ada").await,
        Err(ClassroomError::InvalidCode)
    ));
    let user = access.authenticate("abc", "Ada").await.unwrap();
    assert_eq!(user.id, "student_ada");
}

#[tokio::test]
async fn session_scenario_and_state() {
    let f = fixture().await;
    let c = &f.classroom;
    let sid = c.content.create_session("Ms Hopper").await.unwrap().session_id;
    let code = c.access.get_code().await.unwrap();
    c.access.authenticate(&code, "Ada").await.unwrap();
    c.content.join_session(&sid).await.unwrap();
    c.chat
        .post(&RoomKey::Session(sid.clone()), "hi", "Ada")
        .await
        .unwrap();

    let state = c.session_state(&sid, Some(("Ada", Role::Student))).await.unwrap();
    assert_eq!(state.content.id, sid);
    assert_eq!(state.messages.len(), 1);

    assert!(matches!(
        c.rewards.try_reward(Some("Ada"), "Ada", Some(&sid)).await,
        Err(ClassroomError::Validation(_))
    ));
}

#[tokio::test]
async fn leaderboard_orders_students_with_ties() {
    let f = fixture().await;
    let c = &f.classroom;
    for name in ["A", "B", "C"] {
        c.identity.upsert_student(name).await.unwrap();
    }
    for (name, points) in [("A", 3), ("B", 1), ("C", 3)] {
        for _ in 0..points {
            c.identity.increment_points(name).await.unwrap();
        }
    }
    let board = c.leaderboard.compute().await.unwrap();
    let names: Vec<_> = board.students.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names.len(), 3);
    assert!(names[..2].contains(&"A") && names[..2].contains(&"C"));
    assert_eq!(names[2], "B");
}

#[tokio::test]
async fn purge_keeps_users_and_access_code() {
    let f = fixture().await;
    let c = &f.classroom;
    c.access.set_code("KEEPME").await.unwrap();
    c.identity.upsert_student("Ada").await.unwrap();
    let sid = c.content.create_session("Ms Hopper").await.unwrap().session_id;
    c.chat.post(&RoomKey::General, "hi", "Ada").await.unwrap();
    c.rewards.try_reward(Some("Bob"), "Ada", Some(&sid)).await.unwrap();

    let counts = c.purge_activity().await.unwrap();
    assert_eq!((counts.content, counts.messages, counts.rewards), (1, 1, 1));

    assert_eq!(c.access.get_code().await.unwrap(), "KEEPME");
    assert_eq!(c.identity.get_points("Ada").await.unwrap(), 1);
    assert!(c.chat.recent(&RoomKey::General, None).await.unwrap().is_empty());
    assert!(matches!(
        c.content.get_content(&sid).await,
        Err(ClassroomError::NotFound(_))
    ));
}

#[tokio::test]
async fn remove_users_by_role_and_name() {
    let f = fixture().await;
    let id = &f.classroom.identity;
    id.upsert_student("Ada").await.unwrap();
    id.upsert_student("Bob").await.unwrap();
    id.upsert_teacher("Ms Hopper", None, None).await.unwrap();

    assert_eq!(id.remove_by_name("Ms Hopper").await.unwrap(), 1);
    assert_eq!(id.remove_by_name("BOB").await.unwrap(), 1);
    assert_eq!(id.remove_by_name("nobody").await.unwrap(), 0);
    assert_eq!(id.remove_by_role(Role::Teacher).await.unwrap(), 0);
    assert_eq!(id.remove_all().await.unwrap(), 1);
    assert!(id.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn close_waits_for_checked_out_connections() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("classroom.db");
    let db = db_path.to_str().unwrap();
    let store = Store::connect_sqlite(db, Duration::from_secs(5))
        .await
        .expect("db");

    let mut holder = SqliteConnection::establish(db).unwrap();
    diesel::sql_query("BEGIN EXCLUSIVE").execute(&mut holder).unwrap();
    let writer = store.clone();
    let pending = tokio::spawn(async move { writer.put_setting("greeting", "v").await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!store.clone().close(Duration::from_millis(100)).await);

    diesel::sql_query("ROLLBACK").execute(&mut holder).unwrap();
    pending.await.unwrap().unwrap();
    assert!(store.close(Duration::from_secs(2)).await);
}
