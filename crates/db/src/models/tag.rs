use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite, SqliteConnection};
use ts_rs::TS;

use super::{contains_pattern, push_page};

pub const DEFAULT_TAG_COLOR: &str = "#000000";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Tag {
    #[ts(type = "number")]
    pub id: i64,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Deserialize, TS, JsonSchema)]
pub struct CreateTag {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, TS, JsonSchema)]
pub struct UpdateTag {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    /// Case-insensitive substring of `name`.
    pub name_contains: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Tag {
    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Tag>("SELECT id, name, color FROM tags WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Re-read a tag after taking the database write lock.
    pub async fn lock_for_update(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query("UPDATE tags SET id = id WHERE id = $1")
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
        let mut query_builder =
            QueryBuilder::<Sqlite>::new("SELECT id, name, color FROM tags WHERE id IN (");
        let mut separated = query_builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id ASC");
        query_builder.build_query_as().fetch_all(executor).await
    }

    fn push_filter(query_builder: &mut QueryBuilder<'_, Sqlite>, filter: &TagFilter) {
        if let Some(name) = filter.name_contains.as_deref().filter(|n| !n.is_empty()) {
            query_builder.push(" AND name LIKE ");
            query_builder.push_bind(contains_pattern(name));
            query_builder.push(" ESCAPE '\\'");
        }
    }

    pub async fn find_filtered<'e, E>(executor: E, filter: &TagFilter) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut query_builder = QueryBuilder::<Sqlite>::new("SELECT id, name, color FROM tags WHERE 1");
        Self::push_filter(&mut query_builder, filter);
        query_builder.push(" ORDER BY id ASC");
        push_page(&mut query_builder, filter.limit, filter.offset);
        query_builder.build_query_as().fetch_all(executor).await
    }

    pub async fn count_filtered<'e, E>(executor: E, filter: &TagFilter) -> Result<i64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut query_builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM tags WHERE 1");
        Self::push_filter(&mut query_builder, filter);
        query_builder.build_query_scalar().fetch_one(executor).await
    }

    pub async fn create<'e, E>(executor: E, data: &CreateTag) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Tag>(
            "INSERT INTO tags (name, color) VALUES ($1, $2) RETURNING id, name, color",
        )
        .bind(&data.name)
        .bind(data.color.as_deref().unwrap_or(DEFAULT_TAG_COLOR))
        .fetch_one(executor)
        .await
    }

    pub async fn save<'e, E>(executor: E, tag: &Tag) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Tag>(
            "UPDATE tags SET name = $2, color = $3 WHERE id = $1 RETURNING id, name, color",
        )
        .bind(tag.id)
        .bind(&tag.name)
        .bind(&tag.color)
        .fetch_one(executor)
        .await
    }

    /// Hard delete; link rows go with it through `ON DELETE CASCADE`.
    pub async fn delete<'e, E>(executor: E, id: i64) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{link::PROJECT_TAGS, project::{CreateProject, Project}, test_support, LlmContext};

    #[tokio::test]
    async fn create_defaults_color_and_filters_by_name() {
        let db = test_support::db().await;
        let tag = Tag::create(
            &db.pool,
            &CreateTag {
                name: "Outdoor".to_string(),
                color: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(tag.color, DEFAULT_TAG_COLOR);
        Tag::create(
            &db.pool,
            &CreateTag {
                name: "finance".to_string(),
                color: Some("#FF0000".to_string()),
            },
        )
        .await
        .unwrap();

        let found = Tag::find_filtered(
            &db.pool,
            &TagFilter {
                name_contains: Some("OUT".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, tag.id);
    }

    #[tokio::test]
    async fn hard_delete_removes_links() {
        let db = test_support::db().await;
        let owner = test_support::user(&db, "owner@example.com", false).await;
        let tag = Tag::create(
            &db.pool,
            &CreateTag {
                name: "outdoor".to_string(),
                color: None,
            },
        )
        .await
        .unwrap();
        let project = Project::create(
            &db.pool,
            &CreateProject {
                title: "Garden".to_string(),
                description: String::new(),
                owner_id: None,
                deadline: None,
                category: None,
                tag_ids: None,
                llm_notes: None,
                llm_context: None,
            },
            owner.id,
            &LlmContext::new(),
        )
        .await
        .unwrap();

        let mut conn = db.pool.acquire().await.unwrap();
        Project::set_tags(&mut conn, project.id, &[tag.id]).await.unwrap();
        assert_eq!(Tag::delete(&mut *conn, tag.id).await.unwrap(), 1);
        assert!(PROJECT_TAGS.ids_for(&mut *conn, project.id).await.unwrap().is_empty());
        assert_eq!(Tag::delete(&mut *conn, tag.id).await.unwrap(), 0);
    }
}
