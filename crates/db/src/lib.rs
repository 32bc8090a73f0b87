use std::{env, str::FromStr, time::Duration};

use sqlx::{
    Error, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

pub mod models;
pub mod serde_helpers;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://atlas.db?mode=rwc";

#[derive(Clone)]
pub struct DBService {
    pub pool: SqlitePool,
}

impl DBService {
    /// Create a new DBService from the DATABASE_URL environment variable.
    pub async fn new() -> Result<DBService, Error> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        Self::connect(&database_url).await
    }

    /// Connect to a file-backed SQLite database and run pending migrations.
    pub async fn connect(database_url: &str) -> Result<DBService, Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!("Connected to {}", database_url);
        Ok(DBService { pool })
    }

    /// Private in-memory database, used by tests and throwaway sessions.
    ///
    /// The pool holds exactly one connection that is never recycled, since every
    /// SQLite memory connection is its own database.
    pub async fn new_in_memory() -> Result<DBService, Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(DBService { pool })
    }
}
