//! REST backend for chapel attendance: users, speakers, chapel sessions,
//! the feedback users leave on sessions, and a standalone task list.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub mod chapel_view;
pub mod config;
pub mod error;
pub mod feedback_view;
pub mod manager;
pub mod routes;
pub mod speaker_view;
pub mod task_view;
pub mod user_view;
pub mod utils;
pub mod validate;

use config::Config;

/// Shared by every handler. Built once at startup and handed to the router.
pub struct AppState {
    pub pool: SqlitePool,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Opens the pool and brings the schema up to date.
pub async fn connect(config: &Config) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!().run(&pool).await?;
    Ok(pool)
}
