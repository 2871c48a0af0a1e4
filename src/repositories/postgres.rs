use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::{error::SqlState, Row};
use uuid::Uuid;

use crate::models::{
    message::Message,
    referral::ReferralLink,
    session::{Session, SessionOccupancy},
    task::{Task, TaskDescriptor},
    user::{RosterEntry, User},
};
use crate::repositories::{JoinOutcome, Store, StoreError};

impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            let constraint = err
                .as_db_error()
                .and_then(|db| db.constraint())
                .unwrap_or("key")
                .to_string();
            return StoreError::UniqueViolation(constraint);
        }
        StoreError::Backend(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        StoreError::Backend(format!("pool: {}", err))
    }
}

const USER_COLUMNS: &str = "id, email, user_name, profile_picture_url, password_hash, created_at";
const TASK_COLUMNS: &str = "id, title, category, difficulty, content, is_deleted, created_at";
const MESSAGE_COLUMNS: &str =
    "id, collab_hash, user_id, content, is_edited, is_pinned, created_at, updated_at";

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        user_name: row.try_get("user_name")?,
        profile_picture_url: row.try_get("profile_picture_url")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_task(row: &Row) -> Result<Task, StoreError> {
    let difficulty: String = row.try_get("difficulty")?;
    Ok(Task {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        category: row.try_get("category")?,
        difficulty: difficulty.parse().map_err(StoreError::Backend)?,
        content: row.try_get("content")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_session(row: &Row) -> Result<Session, StoreError> {
    Ok(Session {
        hash: row.try_get("hash")?,
        task_id: row.try_get("task_id")?,
        is_passed: row.try_get("is_passed")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_message(row: &Row) -> Result<Message, StoreError> {
    Ok(Message {
        id: row.try_get("id")?,
        session_hash: row.try_get("collab_hash")?,
        user_id: row.try_get("user_id")?,
        content: row.try_get("content")?,
        is_edited: row.try_get("is_edited")?,
        is_pinned: row.try_get("is_pinned")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// A PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
            ))
            .await?;
        let row = client
            .query_one(
                &stmt,
                &[
                    &user.id,
                    &user.email,
                    &user.user_name,
                    &user.profile_picture_url,
                    &user.password_hash,
                    &user.created_at,
                ],
            )
            .await?;
        row_to_user(&row)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"), &[&id])
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"), &[&email])
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        let deleted = client.execute("DELETE FROM users WHERE id = $1", &[&id]).await?;
        if deleted == 0 {
            return Err(StoreError::NotFound("user".to_string()));
        }
        Ok(())
    }

    async fn update_user(
        &self,
        id: Uuid,
        user_name: Option<String>,
        profile_picture_url: Option<String>,
    ) -> Result<User, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE users SET user_name = COALESCE($2, user_name), \
                     profile_picture_url = COALESCE($3, profile_picture_url) \
                     WHERE id = $1 RETURNING {USER_COLUMNS}"
                ),
                &[&id, &user_name, &profile_picture_url],
            )
            .await?;
        match row {
            Some(row) => row_to_user(&row),
            None => Err(StoreError::NotFound("user".to_string())),
        }
    }

    async fn create_task(&self, task: Task) -> Result<Task, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO tasks ({TASK_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {TASK_COLUMNS}"
                ),
                &[
                    &task.id,
                    &task.title,
                    &task.category,
                    &task.difficulty.as_str(),
                    &task.content,
                    &task.is_deleted,
                    &task.created_at,
                ],
            )
            .await?;
        row_to_task(&row)
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"), &[&id])
            .await?;
        row.map(|r| row_to_task(&r)).transpose()
    }

    async fn find_task_for_descriptor(
        &self,
        descriptor: &TaskDescriptor,
    ) -> Result<Option<Task>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    SELECT {TASK_COLUMNS}
                    FROM tasks
                    WHERE is_deleted = FALSE
                      AND category = $1
                      AND difficulty = $2
                      AND ($3::TEXT IS NULL OR title = $3)
                    ORDER BY created_at ASC
                    LIMIT 1
                    "#
                ),
                &[
                    &descriptor.category,
                    &descriptor.difficulty.as_str(),
                    &descriptor.title,
                ],
            )
            .await?;
        row.map(|r| row_to_task(&r)).transpose()
    }

    async fn insert_session(&self, session: Session) -> Result<Session, StoreError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                r#"
                INSERT INTO collabs (hash, task_id, is_passed, created_at)
                VALUES ($1, $2, $3, $4)
                RETURNING hash, task_id, is_passed, created_at
                "#,
            )
            .await?;
        let row = client
            .query_one(
                &stmt,
                &[&session.hash, &session.task_id, &session.is_passed, &session.created_at],
            )
            .await?;
        row_to_session(&row)
    }

    async fn find_session(&self, hash: &str) -> Result<Option<Session>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT hash, task_id, is_passed, created_at FROM collabs WHERE hash = $1",
                &[&hash],
            )
            .await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn open_sessions_for_descriptor(
        &self,
        descriptor: &TaskDescriptor,
    ) -> Result<Vec<SessionOccupancy>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT c.hash, c.task_id, c.is_passed, c.created_at,
                       COUNT(cu.user_id) AS member_count
                FROM collabs c
                JOIN tasks t ON t.id = c.task_id
                LEFT JOIN collab_users cu ON cu.collab_hash = c.hash
                WHERE c.is_passed = FALSE
                  AND t.is_deleted = FALSE
                  AND t.category = $1
                  AND t.difficulty = $2
                  AND ($3::TEXT IS NULL OR t.title = $3)
                GROUP BY c.hash
                ORDER BY c.created_at ASC, c.seq ASC
                "#,
                &[
                    &descriptor.category,
                    &descriptor.difficulty.as_str(),
                    &descriptor.title,
                ],
            )
            .await?;

        rows.iter()
            .map(|row| {
                let member_count: i64 = row.try_get("member_count")?;
                Ok(SessionOccupancy {
                    session: row_to_session(row)?,
                    member_count: member_count as usize,
                })
            })
            .collect()
    }

    async fn mark_session_passed(&self, hash: &str) -> Result<bool, StoreError> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE collabs SET is_passed = TRUE WHERE hash = $1 AND is_passed = FALSE",
                &[&hash],
            )
            .await?;
        if updated > 0 {
            return Ok(true);
        }

        let exists: bool = client
            .query_one("SELECT EXISTS (SELECT 1 FROM collabs WHERE hash = $1)", &[&hash])
            .await?
            .try_get(0)?;
        if !exists {
            return Err(StoreError::NotFound("session".to_string()));
        }
        Ok(false)
    }

    async fn insert_membership_if_open(
        &self,
        user_id: Uuid,
        hash: &str,
        capacity: usize,
    ) -> Result<JoinOutcome, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        // The row lock serializes every joiner of this session until commit.
        let Some(row) = tx
            .query_opt("SELECT is_passed FROM collabs WHERE hash = $1 FOR UPDATE", &[&hash])
            .await?
        else {
            return Ok(JoinOutcome::SessionMissing);
        };
        let is_passed: bool = row.try_get("is_passed")?;
        if is_passed {
            return Ok(JoinOutcome::SessionClosed);
        }

        let already: bool = tx
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM collab_users WHERE user_id = $1 AND collab_hash = $2)",
                &[&user_id, &hash],
            )
            .await?
            .try_get(0)?;
        if already {
            return Ok(JoinOutcome::AlreadyMember);
        }

        let count: i64 = tx
            .query_one("SELECT COUNT(*) FROM collab_users WHERE collab_hash = $1", &[&hash])
            .await?
            .try_get(0)?;
        if count as usize >= capacity {
            return Ok(JoinOutcome::SessionFull);
        }

        tx.execute(
            "INSERT INTO collab_users (user_id, collab_hash) VALUES ($1, $2)",
            &[&user_id, &hash],
        )
        .await?;
        tx.commit().await?;
        Ok(JoinOutcome::Inserted)
    }

    async fn delete_membership(&self, user_id: Uuid, hash: &str) -> Result<bool, StoreError> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                "DELETE FROM collab_users WHERE user_id = $1 AND collab_hash = $2",
                &[&user_id, &hash],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn membership_exists(&self, user_id: Uuid, hash: &str) -> Result<bool, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM collab_users WHERE user_id = $1 AND collab_hash = $2)",
                &[&user_id, &hash],
            )
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn count_members(&self, hash: &str) -> Result<usize, StoreError> {
        let client = self.pool.get().await?;
        let count: i64 = client
            .query_one("SELECT COUNT(*) FROM collab_users WHERE collab_hash = $1", &[&hash])
            .await?
            .try_get(0)?;
        Ok(count as usize)
    }

    async fn list_members(&self, hash: &str) -> Result<Vec<RosterEntry>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT u.id, u.profile_picture_url, u.user_name
                FROM collab_users cu
                JOIN users u ON u.id = cu.user_id
                WHERE cu.collab_hash = $1
                ORDER BY cu.seq ASC
                "#,
                &[&hash],
            )
            .await?;
        rows.iter()
            .map(|row| {
                Ok(RosterEntry {
                    id: row.try_get("id")?,
                    profile_picture_url: row.try_get("profile_picture_url")?,
                    user_name: row.try_get("user_name")?,
                })
            })
            .collect()
    }

    async fn create_referral(&self, link: ReferralLink) -> Result<ReferralLink, StoreError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO referrals (token, collab_hash, expires_at) VALUES ($1, $2, $3)",
                &[&link.token, &link.session_hash, &link.expires_at],
            )
            .await?;
        Ok(link)
    }

    async fn find_referral(&self, token: &str) -> Result<Option<ReferralLink>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT token, collab_hash, expires_at FROM referrals WHERE token = $1",
                &[&token],
            )
            .await?;
        row.map(|r| {
            Ok(ReferralLink {
                token: r.try_get("token")?,
                session_hash: r.try_get("collab_hash")?,
                expires_at: r.try_get("expires_at")?,
            })
        })
        .transpose()
    }

    async fn insert_message(&self, message: Message) -> Result<Message, StoreError> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {MESSAGE_COLUMNS}"
            ))
            .await?;
        let row = client
            .query_one(
                &stmt,
                &[
                    &message.id,
                    &message.session_hash,
                    &message.user_id,
                    &message.content,
                    &message.is_edited,
                    &message.is_pinned,
                    &message.created_at,
                    &message.updated_at,
                ],
            )
            .await?;
        row_to_message(&row)
    }

    async fn find_message(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"), &[&id])
            .await?;
        row.map(|r| row_to_message(&r)).transpose()
    }

    async fn update_message_content(&self, id: Uuid, content: &str) -> Result<Message, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    UPDATE messages
                    SET content = $2, is_edited = TRUE, updated_at = NOW()
                    WHERE id = $1
                    RETURNING {MESSAGE_COLUMNS}
                    "#
                ),
                &[&id, &content],
            )
            .await?
            .ok_or_else(|| StoreError::NotFound("message".to_string()))?;
        row_to_message(&row)
    }

    async fn set_message_pinned(&self, id: Uuid, pinned: bool) -> Result<Message, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "UPDATE messages SET is_pinned = $2, updated_at = NOW() WHERE id = $1 RETURNING {MESSAGE_COLUMNS}"
                ),
                &[&id, &pinned],
            )
            .await?
            .ok_or_else(|| StoreError::NotFound("message".to_string()))?;
        row_to_message(&row)
    }

    async fn delete_message(&self, id: Uuid) -> Result<bool, StoreError> {
        let client = self.pool.get().await?;
        let deleted = client.execute("DELETE FROM messages WHERE id = $1", &[&id]).await?;
        Ok(deleted > 0)
    }

    async fn list_messages(&self, hash: &str) -> Result<Vec<Message>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE collab_hash = $1 ORDER BY updated_at ASC"
                ),
                &[&hash],
            )
            .await?;
        rows.iter().map(row_to_message).collect()
    }

    async fn search_messages(&self, hash: &str, query: &str) -> Result<Vec<Message>, StoreError> {
        let client = self.pool.get().await?;
        // strpos keeps the match literal and case-sensitive, unlike LIKE patterns.
        let rows = client
            .query(
                &format!(
                    r#"
                    SELECT {MESSAGE_COLUMNS}
                    FROM messages
                    WHERE collab_hash = $1 AND strpos(content, $2) > 0
                    ORDER BY updated_at ASC
                    "#
                ),
                &[&hash, &query],
            )
            .await?;
        rows.iter().map(row_to_message).collect()
    }
}
