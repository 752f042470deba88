pub mod models;
pub mod schema;

use std::time::Duration;

use chrono::Utc;
use collab_shared::api::PurgeCounts;
use collab_shared::auth::Role;
use collab_shared::domain::student_id;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::{Content, Message, NewContent, NewMessage, NewReward, NewSetting, NewUser, User};
use tracing::{debug, trace, warn};

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The operation did not finish within the configured bound.
    #[error("{0}: timed out")]
    Timeout(&'static str),
}

/// Result of overwriting the text of a content record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextUpdate {
    Updated,
    NotFound,
    /// The record holds a file; its payload never changes.
    Immutable,
}

/// Dedup key of a reward: normalized rewarder and content id. The sender side
/// is the id of the user the point lands on, resolved inside the transaction.
#[derive(Debug, Clone)]
pub struct RewardKey {
    pub rewarder: String,
    pub content_id: String,
}

/// The user a point for a display name lands on.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Recipient {
    /// Existing teacher with this exact name.
    Teacher(String),
    /// Derived student id; the row may not exist yet.
    Student(String),
}

impl Recipient {
    fn id(&self) -> &str {
        match self {
            Recipient::Teacher(id) | Recipient::Student(id) => id,
        }
    }
}

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    op_timeout: Duration,
}

impl Store {
    pub async fn connect_sqlite(path: &str, op_timeout: Duration) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder()
            .max_size(8)
            .connection_timeout(op_timeout)
            .build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool, op_timeout })
    }

    /// Round-trips a trivial query through the pool.
    pub async fn health_check(&self) -> Result<(), StorageError> {
        self.run("health_check", |conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Waits up to `grace` for checked-out connections to return, then folds the
    /// WAL back into the database file. Returns `false` if connections were still
    /// in use at the deadline; the pool itself closes when the last clone drops.
    pub async fn close(self, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let state = self.pool.state();
            let busy = state.connections.saturating_sub(state.idle_connections);
            if busy == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(busy, "store: connections still in use at close");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let checkpoint = self
            .run("close", |conn| {
                diesel::sql_query("PRAGMA wal_checkpoint(TRUNCATE);").execute(conn)?;
                Ok(())
            })
            .await;
        if let Err(e) = checkpoint {
            warn!(error = %e, "store: wal checkpoint failed");
        }
        debug!("store: closed");
        true
    }

    /// Runs `f` on a pooled connection on the blocking pool, bounded by the store timeout.
    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        trace!(op, "store op starting");
        let task = tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            f(&mut conn)
        });
        match tokio::time::timeout(self.op_timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => Err(StorageError::Timeout(op)),
        }
    }

    // Settings

    /// Returns the stored value, inserting `default` first when the key is absent.
    pub async fn get_or_init_setting(
        &self,
        key: &str,
        default: &str,
    ) -> Result<String, StorageError> {
        use schema::settings::dsl as s;
        let key = key.to_string();
        let default = default.to_string();
        self.run("get_or_init_setting", move |conn| {
            let row = NewSetting {
                id: &key,
                value: &default,
                updated_at: Utc::now().naive_utc(),
            };
            diesel::insert_into(s::settings)
                .values(&row)
                .on_conflict_do_nothing()
                .execute(conn)?;
            Ok(s::settings
                .filter(s::id.eq(&key))
                .select(s::value)
                .first::<String>(conn)?)
        })
        .await
    }

    pub async fn put_setting(&self, key: &str, value: &str) -> Result<(), StorageError> {
        use schema::settings::dsl as s;
        let key = key.to_string();
        let value = value.to_string();
        self.run("put_setting", move |conn| {
            let now = Utc::now().naive_utc();
            let row = NewSetting {
                id: &key,
                value: &value,
                updated_at: now,
            };
            diesel::insert_into(s::settings)
                .values(&row)
                .on_conflict(s::id)
                .do_update()
                .set((s::value.eq(&value), s::updated_at.eq(now)))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    // Users

    /// Creates the user or refreshes its display name, email and activity stamp.
    /// Role and points of an existing row are left untouched.
    pub async fn upsert_user(
        &self,
        user_id: &str,
        display_name: &str,
        role: Role,
        user_email: Option<&str>,
    ) -> Result<User, StorageError> {
        use schema::users::dsl as u;
        let user_id = user_id.to_string();
        let display_name = display_name.to_string();
        let user_email = user_email.map(|s| s.to_string());
        self.run("upsert_user", move |conn| {
            let now = Utc::now().naive_utc();
            let row = NewUser {
                id: &user_id,
                name: &display_name,
                role: role.as_str(),
                points: 0,
                email: user_email.as_deref(),
                created_at: now,
                last_active_at: now,
            };
            let insert = diesel::insert_into(u::users)
                .values(&row)
                .on_conflict(u::id)
                .do_update();
            match user_email.as_deref() {
                Some(mail) => insert
                    .set((
                        u::name.eq(&display_name),
                        u::email.eq(mail),
                        u::last_active_at.eq(now),
                    ))
                    .execute(conn)?,
                None => insert
                    .set((u::name.eq(&display_name), u::last_active_at.eq(now)))
                    .execute(conn)?,
            };
            Ok(u::users.find(&user_id).first::<User>(conn)?)
        })
        .await
    }

    /// Refreshes `last_active_at` of a student, creating the row when missing.
    pub async fn touch_student(&self, display_name: &str) -> Result<(), StorageError> {
        use schema::users::dsl as u;
        let display_name = display_name.to_string();
        self.run("touch_student", move |conn| {
            let now = Utc::now().naive_utc();
            let sid = student_id(&display_name);
            let row = NewUser {
                id: &sid,
                name: &display_name,
                role: Role::Student.as_str(),
                points: 0,
                email: None,
                created_at: now,
                last_active_at: now,
            };
            diesel::insert_into(u::users)
                .values(&row)
                .on_conflict(u::id)
                .do_update()
                .set(u::last_active_at.eq(now))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Student row by derived id first, then a teacher with this exact name; 0 otherwise.
    pub async fn points_for(&self, display_name: &str) -> Result<i64, StorageError> {
        use schema::users::dsl as u;
        let display_name = display_name.to_string();
        self.run("points_for", move |conn| {
            let sid = student_id(&display_name);
            if let Some(p) = u::users
                .find(&sid)
                .select(u::points)
                .first::<i64>(conn)
                .optional()?
            {
                return Ok(p);
            }
            let teacher = u::users
                .filter(u::role.eq(Role::Teacher.as_str()))
                .filter(u::name.eq(&display_name))
                .order(u::created_at.asc())
                .select(u::points)
                .first::<i64>(conn)
                .optional()?;
            Ok(teacher.unwrap_or(0))
        })
        .await
    }

    pub async fn increment_points(&self, display_name: &str) -> Result<(), StorageError> {
        let display_name = display_name.to_string();
        self.run("increment_points", move |conn| {
            conn.immediate_transaction(|conn| {
                let to = resolve_recipient(conn, &display_name)?;
                credit_point(conn, &to, &display_name)
            })?;
            Ok(())
        })
        .await
    }

    /// All users in store order (creation time, then id).
    pub async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        use schema::users::dsl as u;
        self.run("list_users", |conn| {
            Ok(u::users
                .order((u::created_at.asc(), u::id.asc()))
                .load::<User>(conn)?)
        })
        .await
    }

    pub async fn delete_all_users(&self) -> Result<usize, StorageError> {
        use schema::users::dsl as u;
        self.run("delete_all_users", |conn| {
            Ok(diesel::delete(u::users).execute(conn)?)
        })
        .await
    }

    pub async fn delete_users_by_role(&self, role: Role) -> Result<usize, StorageError> {
        use schema::users::dsl as u;
        self.run("delete_users_by_role", move |conn| {
            Ok(diesel::delete(u::users.filter(u::role.eq(role.as_str()))).execute(conn)?)
        })
        .await
    }

    /// Deletes rows whose name matches exactly; if none did, the derived student id.
    pub async fn delete_user_by_name(&self, display_name: &str) -> Result<usize, StorageError> {
        use schema::users::dsl as u;
        let display_name = display_name.to_string();
        self.run("delete_user_by_name", move |conn| {
            let by_name = diesel::delete(u::users.filter(u::name.eq(&display_name))).execute(conn)?;
            if by_name > 0 {
                return Ok(by_name);
            }
            let sid = student_id(&display_name);
            Ok(diesel::delete(u::users.find(&sid)).execute(conn)?)
        })
        .await
    }

    // Content

    /// Inserts a content record. Returns `false` when the id is already taken.
    pub async fn insert_content(&self, row: NewContent) -> Result<bool, StorageError> {
        use schema::content::dsl as c;
        self.run("insert_content", move |conn| {
            let inserted = diesel::insert_into(c::content)
                .values(&row)
                .on_conflict_do_nothing()
                .execute(conn)?;
            Ok(inserted > 0)
        })
        .await
    }

    pub async fn get_content(&self, content_id: &str) -> Result<Option<Content>, StorageError> {
        use schema::content::dsl as c;
        let content_id = content_id.to_string();
        self.run("get_content", move |conn| {
            Ok(c::content
                .find(&content_id)
                .first::<Content>(conn)
                .optional()?)
        })
        .await
    }

    pub async fn content_exists(&self, content_id: &str) -> Result<bool, StorageError> {
        use schema::content::dsl as c;
        let content_id = content_id.to_string();
        self.run("content_exists", move |conn| {
            let count: i64 = c::content
                .filter(c::id.eq(&content_id))
                .count()
                .get_result(conn)?;
            Ok(count > 0)
        })
        .await
    }

    /// Overwrites the body of a text record; last write wins.
    pub async fn update_text(
        &self,
        content_id: &str,
        text: &str,
    ) -> Result<TextUpdate, StorageError> {
        use schema::content::dsl as c;
        let content_id = content_id.to_string();
        let text = text.to_string();
        self.run("update_text", move |conn| {
            let updated = diesel::update(
                c::content
                    .filter(c::id.eq(&content_id))
                    .filter(c::kind.eq("text")),
            )
            .set((c::body.eq(&text), c::updated_at.eq(Utc::now().naive_utc())))
            .execute(conn)?;
            if updated > 0 {
                return Ok(TextUpdate::Updated);
            }
            let exists: i64 = c::content
                .filter(c::id.eq(&content_id))
                .count()
                .get_result(conn)?;
            Ok(if exists > 0 {
                TextUpdate::Immutable
            } else {
                TextUpdate::NotFound
            })
        })
        .await
    }

    // Chat

    pub async fn insert_message(
        &self,
        room: &str,
        text: &str,
        sender_name: &str,
    ) -> Result<Message, StorageError> {
        use schema::messages::dsl as m;
        let room = room.to_string();
        let text = text.to_string();
        let sender_name = sender_name.to_string();
        self.run("insert_message", move |conn| {
            let row = NewMessage {
                room: &room,
                text: &text,
                sender_name: &sender_name,
                created_at: Utc::now().naive_utc(),
            };
            Ok(diesel::insert_into(m::messages)
                .values(&row)
                .returning(Message::as_returning())
                .get_result(conn)?)
        })
        .await
    }

    /// Newest `limit` messages of a room, oldest first.
    pub async fn recent_messages(
        &self,
        room: &str,
        limit: i64,
    ) -> Result<Vec<Message>, StorageError> {
        use schema::messages::dsl as m;
        let room = room.to_string();
        self.run("recent_messages", move |conn| {
            let mut rows = m::messages
                .filter(m::room.eq(&room))
                .order((m::created_at.desc(), m::id.desc()))
                .limit(limit)
                .load::<Message>(conn)?;
            rows.reverse();
            Ok(rows)
        })
        .await
    }

    // Rewards

    /// Records the reward (when keyed) and increments the sender's points in one transaction.
    /// Returns `true` when the key was already present; nothing is changed then.
    ///
    /// The stored sender is the recipient's user id, so every spelling of a
    /// name that credits the same user shares one dedup key.
    pub async fn apply_reward(
        &self,
        key: Option<RewardKey>,
        sender_name: &str,
    ) -> Result<bool, StorageError> {
        use schema::rewards::dsl as r;
        let sender_name = sender_name.to_string();
        self.run("apply_reward", move |conn| {
            conn.immediate_transaction(|conn| -> Result<bool, StorageError> {
                let to = resolve_recipient(conn, &sender_name)?;
                if let Some(key) = &key {
                    let row = NewReward {
                        rewarder_name: &key.rewarder,
                        sender_name: to.id(),
                        content_id: &key.content_id,
                        created_at: Utc::now().naive_utc(),
                    };
                    // Unique index on the triple makes the duplicate insert a no-op
                    let inserted = diesel::insert_into(r::rewards)
                        .values(&row)
                        .on_conflict_do_nothing()
                        .execute(conn)?;
                    if inserted == 0 {
                        return Ok(true);
                    }
                }
                credit_point(conn, &to, &sender_name)?;
                Ok(false)
            })
        })
        .await
    }

    pub async fn has_rewarded(
        &self,
        rewarder: &str,
        content_id: &str,
    ) -> Result<bool, StorageError> {
        use schema::rewards::dsl as r;
        let rewarder = rewarder.to_string();
        let content_id = content_id.to_string();
        self.run("has_rewarded", move |conn| {
            let count: i64 = r::rewards
                .filter(r::rewarder_name.eq(&rewarder))
                .filter(r::content_id.eq(&content_id))
                .count()
                .get_result(conn)?;
            Ok(count > 0)
        })
        .await
    }

    // Maintenance

    /// Deletes content, chat and reward records; users and settings stay.
    pub async fn purge_activity(&self) -> Result<PurgeCounts, StorageError> {
        use schema::{content, messages, rewards};
        self.run("purge_activity", |conn| {
            conn.immediate_transaction(|conn| -> Result<PurgeCounts, StorageError> {
                Ok(PurgeCounts {
                    content: diesel::delete(content::table).execute(conn)?,
                    messages: diesel::delete(messages::table).execute(conn)?,
                    rewards: diesel::delete(rewards::table).execute(conn)?,
                })
            })
        })
        .await
    }
}

/// The teacher with this exact name, else the derived student.
fn resolve_recipient(
    conn: &mut SqliteConnection,
    display_name: &str,
) -> Result<Recipient, StorageError> {
    use schema::users::dsl as u;
    let teacher_id = u::users
        .filter(u::role.eq(Role::Teacher.as_str()))
        .filter(u::name.eq(display_name))
        .order(u::created_at.asc())
        .select(u::id)
        .first::<String>(conn)
        .optional()?;
    Ok(match teacher_id {
        Some(tid) => Recipient::Teacher(tid),
        None => Recipient::Student(student_id(display_name)),
    })
}

/// `points + 1` on the recipient; a missing student is created with 1.
fn credit_point(
    conn: &mut SqliteConnection,
    to: &Recipient,
    display_name: &str,
) -> Result<(), StorageError> {
    use schema::users::dsl as u;
    match to {
        Recipient::Teacher(tid) => {
            diesel::update(u::users.find(tid))
                .set(u::points.eq(u::points + 1i64))
                .execute(conn)?;
        }
        Recipient::Student(sid) => {
            let now = Utc::now().naive_utc();
            let row = NewUser {
                id: sid,
                name: display_name,
                role: Role::Student.as_str(),
                points: 1,
                email: None,
                created_at: now,
                last_active_at: now,
            };
            diesel::insert_into(u::users)
                .values(&row)
                .on_conflict(u::id)
                .do_update()
                .set(u::points.eq(u::points + 1i64))
                .execute(conn)?;
        }
    }
    Ok(())
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Busy timeout first so the remaining pragmas wait on a locked database
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    Ok(())
}
