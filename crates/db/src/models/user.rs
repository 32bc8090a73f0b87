use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite};
use ts_rs::TS;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct User {
    #[ts(type = "number")]
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS, JsonSchema)]
pub struct CreateUser {
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub is_staff: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, TS, JsonSchema)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_staff: Option<bool>,
    pub is_active: Option<bool>,
}

const USER_COLUMNS: &str = "id, email, first_name, last_name, is_staff, is_active, date_joined";

impl User {
    pub async fn find_all<'e, E>(executor: E) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"))
            .fetch_all(executor)
            .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Email lookup is case-insensitive (the column is `COLLATE NOCASE`).
    pub async fn find_by_email<'e, E>(executor: E, email: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email.trim())
            .fetch_optional(executor)
            .await
    }

    /// The subset of `ids` that name existing users.
    pub async fn existing_ids<'e, E>(executor: E, ids: &[i64]) -> Result<Vec<i64>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query_builder = QueryBuilder::<Sqlite>::new("SELECT id FROM users WHERE id IN (");
        let mut separated = query_builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id ASC");
        query_builder.build_query_scalar().fetch_all(executor).await
    }

    pub async fn create<'e, E>(executor: E, data: &CreateUser) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, first_name, last_name, is_staff, is_active, date_joined)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(data.email.trim())
        .bind(data.first_name.as_deref().unwrap_or_default())
        .bind(data.last_name.as_deref().unwrap_or_default())
        .bind(data.is_staff.unwrap_or(false))
        .bind(data.is_active.unwrap_or(true))
        .bind(Utc::now())
        .fetch_one(executor)
        .await
    }

    /// Persist every mutable column of `user`.
    pub async fn save<'e, E>(executor: E, user: &User) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET email = $2, first_name = $3, last_name = $4, is_staff = $5, is_active = $6
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .bind(user.email.trim())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_staff)
        .bind(user.is_active)
        .fetch_one(executor)
        .await
    }

    pub async fn delete<'e, E>(executor: E, id: i64) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
