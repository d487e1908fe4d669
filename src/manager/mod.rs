use std::{
    ops::{Deref, DerefMut},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{pool::PoolConnection, Sqlite, SqliteConnection, SqlitePool};
use tracing::warn;

pub mod chapel_manager;
pub mod feedback_manager;
pub mod speaker_manager;
pub mod task_manager;
pub mod user_manager;

/// Membership kind shared by users and speakers.
#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserType {
    Student,
    Faculty,
    Staff,
    Admin,
    Alumni,
    Guest,
}

impl UserType {
    pub const ALL: [UserType; 6] = [
        UserType::Student,
        UserType::Faculty,
        UserType::Staff,
        UserType::Admin,
        UserType::Alumni,
        UserType::Guest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Student => "STUDENT",
            UserType::Faculty => "FACULTY",
            UserType::Staff => "STAFF",
            UserType::Admin => "ADMIN",
            UserType::Alumni => "ALUMNI",
            UserType::Guest => "GUEST",
        }
    }
}

impl FromStr for UserType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or(())
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub user_type: UserType,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct Speaker {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub bio: Option<String>,
    pub title: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub speaker_type: UserType,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct ChapelSession {
    pub id: i64,
    pub topic: String,
    pub scripture: Option<String>,
    pub date: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub number_standings: Option<i64>,
    pub speaker_id: Option<i64>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct Feedback {
    pub id: i64,
    pub stars: i64,
    pub response: Option<String>,
    pub user_id: i64,
    pub chapel_session_id: i64,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub completed: bool,
}

/// A chapel session with its speaker loaded when requested.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChapelSessionDetail {
    #[serde(flatten)]
    pub session: ChapelSession,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<Speaker>,
}

/// Feedback with its session (and that session's speaker) and author loaded when requested.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FeedbackDetail {
    #[serde(flatten)]
    pub feedback: Feedback,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapel_session: Option<ChapelSessionDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
}

impl From<ChapelSession> for ChapelSessionDetail {
    fn from(session: ChapelSession) -> Self {
        Self {
            session,
            speaker: None,
        }
    }
}

impl From<Feedback> for FeedbackDetail {
    fn from(feedback: Feedback) -> Self {
        Self {
            feedback,
            chapel_session: None,
            author: None,
        }
    }
}

/// A transaction that takes SQLite's write lock on `BEGIN`.
///
/// A deferred transaction that reads before it writes has to upgrade its
/// lock at the first write, and SQLite answers a contended upgrade with
/// `SQLITE_BUSY` instead of waiting. `BEGIN IMMEDIATE` queues behind the
/// busy timeout instead, so checks and the write that depends on them see
/// the same data.
///
/// Dropping it without [`WriteTx::commit`] rolls back before the connection
/// goes back to the pool.
pub(crate) struct WriteTx {
    conn: Option<PoolConnection<Sqlite>>,
}

const RELEASED: &str = "WriteTx connection is only released by commit or drop";

impl WriteTx {
    pub(crate) async fn begin(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self { conn: Some(conn) })
    }

    pub(crate) async fn commit(mut self) -> Result<(), sqlx::Error> {
        sqlx::query("COMMIT").execute(&mut *self).await?;
        // Committed, so the connection returns to the pool untouched.
        drop(self.conn.take());
        Ok(())
    }
}

impl Deref for WriteTx {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_deref().expect(RELEASED)
    }
}

impl DerefMut for WriteTx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_deref_mut().expect(RELEASED)
    }
}

impl Drop for WriteTx {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(err) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                        warn!("rollback failed, closing connection: {err}");
                        let _ = conn.close().await;
                    }
                });
            }
            // Closing the connection rolls back whatever it left open.
            Err(_) => drop(conn.detach()),
        }
    }
}

// Table names are crate constants, never caller input.
pub(crate) async fn exists(
    conn: &mut SqliteConnection,
    table: &'static str,
    id: i64,
) -> Result<bool, sqlx::Error> {
    let found: i64 = sqlx::query_scalar(&format!(
        "SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?)"
    ))
    .bind(id)
    .fetch_one(conn)
    .await?;

    Ok(found >= 1)
}

pub(crate) async fn count_referencing(
    conn: &mut SqliteConnection,
    table: &'static str,
    column: &'static str,
    id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?"))
        .bind(id)
        .fetch_one(conn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_type_round_trips_through_its_name() {
        for kind in UserType::ALL {
            assert_eq!(kind.as_str().parse::<UserType>(), Ok(kind));
        }
        assert!("student".parse::<UserType>().is_err());
    }

    #[sqlx::test(fixtures("users"))]
    async fn dropped_write_tx_rolls_back(pool: SqlitePool) {
        {
            let mut tx = WriteTx::begin(&pool).await.unwrap();
            sqlx::query("DELETE FROM User")
                .execute(&mut *tx)
                .await
                .unwrap();
        }

        // The rollback runs on a spawned task; the next writer waits behind it.
        let mut tx = WriteTx::begin(&pool).await.unwrap();
        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM User")
            .fetch_one(&mut *tx)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(users, 2);
    }

    #[sqlx::test]
    async fn concurrent_write_txs_all_commit(pool: SqlitePool) {
        let writers = (0..20).map(|n| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let mut tx = WriteTx::begin(&pool).await?;
                let tasks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Task")
                    .fetch_one(&mut *tx)
                    .await?;
                sqlx::query("INSERT INTO Task(title) VALUES (?)")
                    .bind(format!("task {n} after {tasks}"))
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await
            })
        });

        for writer in writers.collect::<Vec<_>>() {
            writer.await.unwrap().unwrap();
        }

        let tasks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Task")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(tasks, 20);
    }

    #[test]
    fn speaker_serializes_type_field() {
        let speaker = Speaker {
            id: 1,
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            bio: None,
            title: "Dr.".into(),
            speaker_type: UserType::Faculty,
        };
        let value = serde_json::to_value(&speaker).unwrap();
        assert_eq!(value["type"], "FACULTY");
        assert!(value["bio"].is_null());
    }
}
