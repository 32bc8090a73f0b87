use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite, SqliteConnection, types::Json};
use ts_rs::TS;

use super::{LlmContext, push_page, visibility::Visibility};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Comment {
    #[ts(type = "number")]
    pub id: i64,
    pub title: String,
    pub description: String,
    #[ts(type = "number")]
    pub owner_id: i64,
    #[ts(type = "number")]
    pub task_id: i64,
    #[ts(type = "Record<string, unknown>")]
    pub llm_context: Json<LlmContext>,
    pub deleted: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS, JsonSchema)]
pub struct CreateComment {
    pub title: String,
    pub description: String,
    #[ts(type = "number")]
    pub task_id: i64,
    /// Defaults to the acting user.
    #[serde(default)]
    #[ts(type = "number | null")]
    pub owner_id: Option<i64>,
    #[serde(default)]
    pub llm_notes: Option<String>,
    #[serde(default)]
    #[ts(type = "Record<string, unknown> | null")]
    pub llm_context: Option<LlmContext>,
}

#[derive(Debug, Clone, Default, Deserialize, TS, JsonSchema)]
pub struct UpdateComment {
    pub title: Option<String>,
    pub description: Option<String>,
    #[ts(type = "number | null")]
    pub owner_id: Option<i64>,
    pub llm_notes: Option<String>,
    #[ts(type = "Record<string, unknown> | null")]
    pub llm_context: Option<LlmContext>,
}

#[derive(Debug, Clone, Default)]
pub struct CommentFilter {
    pub visibility: Visibility,
    pub task_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const COMMENT_COLUMNS: &str =
    "id, title, description, owner_id, task_id, llm_context, deleted, created, updated";

impl Comment {
    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Comment>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1 AND deleted = 0"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_id_including_deleted<'e, E>(
        executor: E,
        id: i64,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Comment>(&format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Re-read a live comment after taking the database write lock.
    pub async fn lock_for_update(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query("UPDATE comments SET id = id WHERE id = $1 AND deleted = 0")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Self::find_by_id(&mut *conn, id).await
    }

    pub async fn find_by_ids<'e, E>(executor: E, ids: &[i64]) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query_builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE deleted = 0 AND id IN ("
        ));
        let mut separated = query_builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id ASC");
        query_builder.build_query_as().fetch_all(executor).await
    }

    fn push_filter(query_builder: &mut QueryBuilder<'_, Sqlite>, filter: &CommentFilter) {
        filter.visibility.push_predicate(query_builder, "c", None);
        if let Some(task_id) = filter.task_id {
            query_builder.push(" AND c.task_id = ");
            query_builder.push_bind(task_id);
        }
    }

    pub async fn find_filtered<'e, E>(
        executor: E,
        filter: &CommentFilter,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut query_builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COMMENT_COLUMNS} FROM comments c WHERE c.deleted = 0"
        ));
        Self::push_filter(&mut query_builder, filter);
        query_builder.push(" ORDER BY c.id ASC");
        push_page(&mut query_builder, filter.limit, filter.offset);
        query_builder.build_query_as().fetch_all(executor).await
    }

    pub async fn count_filtered<'e, E>(executor: E, filter: &CommentFilter) -> Result<i64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut query_builder =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM comments c WHERE c.deleted = 0");
        Self::push_filter(&mut query_builder, filter);
        query_builder.build_query_scalar().fetch_one(executor).await
    }

    pub async fn create<'e, E>(
        executor: E,
        data: &CreateComment,
        owner_id: i64,
        llm_context: &LlmContext,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Comment>(&format!(
            "INSERT INTO comments (title, description, owner_id, task_id, llm_context, created, updated)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(&data.title)
        .bind(&data.description)
        .bind(owner_id)
        .bind(data.task_id)
        .bind(Json(llm_context))
        .bind(Utc::now())
        .fetch_one(executor)
        .await
    }

    pub async fn save<'e, E>(executor: E, comment: &Comment) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Comment>(&format!(
            "UPDATE comments
             SET title = $2, description = $3, owner_id = $4, llm_context = $5, updated = $6
             WHERE id = $1
             RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(comment.id)
        .bind(&comment.title)
        .bind(&comment.description)
        .bind(comment.owner_id)
        .bind(Json(&comment.llm_context.0))
        .bind(Utc::now())
        .fetch_one(executor)
        .await
    }

    pub async fn soft_delete<'e, E>(executor: E, id: i64) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE comments SET deleted = 1, updated = $2 WHERE id = $1 AND deleted = 0",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }
}
