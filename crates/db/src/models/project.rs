use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite, SqliteConnection, types::Json};
use ts_rs::TS;

use super::{LlmContext, contains_pattern, link::PROJECT_TAGS, push_page, visibility::Visibility};
use crate::serde_helpers::{deserialize_flexible_datetime, deserialize_optional_nullable_datetime};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Project {
    #[ts(type = "number")]
    pub id: i64,
    pub title: String,
    pub description: String,
    #[ts(type = "number")]
    pub owner_id: i64,
    pub deadline: Option<DateTime<Utc>>,
    pub category: String,
    #[ts(type = "Record<string, unknown>")]
    pub llm_context: Json<LlmContext>,
    pub deleted: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ProjectWithTags {
    #[serde(flatten)]
    #[ts(flatten)]
    pub project: Project,
    #[ts(type = "Array<number>")]
    pub tag_ids: Vec<i64>,
}

impl std::ops::Deref for ProjectWithTags {
    type Target = Project;
    fn deref(&self) -> &Self::Target {
        &self.project
    }
}

#[derive(Debug, Clone, Deserialize, TS, JsonSchema)]
pub struct CreateProject {
    pub title: String,
    pub description: String,
    /// Defaults to the acting user.
    #[serde(default)]
    #[ts(type = "number | null")]
    pub owner_id: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_flexible_datetime")]
    #[schemars(with = "Option<String>")]
    #[ts(type = "string | null")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    #[ts(type = "Array<number> | null")]
    pub tag_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub llm_notes: Option<String>,
    #[serde(default)]
    #[ts(type = "Record<string, unknown> | null")]
    pub llm_context: Option<LlmContext>,
}

#[derive(Debug, Clone, Default, Deserialize, TS, JsonSchema)]
pub struct UpdateProject {
    pub title: Option<String>,
    pub description: Option<String>,
    #[ts(type = "number | null")]
    pub owner_id: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable_datetime")]
    #[schemars(with = "Option<String>")]
    #[ts(type = "string | null")]
    pub deadline: Option<Option<DateTime<Utc>>>,
    pub category: Option<String>,
    #[ts(type = "Array<number> | null")]
    pub tag_ids: Option<Vec<i64>>,
    pub llm_notes: Option<String>,
    #[ts(type = "Record<string, unknown> | null")]
    pub llm_context: Option<LlmContext>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub visibility: Visibility,
    /// Case-insensitive substring of `category`.
    pub category_contains: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const PROJECT_COLUMNS: &str =
    "id, title, description, owner_id, deadline, category, llm_context, deleted, created, updated";

impl Project {
    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 AND deleted = 0"
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
        sqlx::query_as::<_, Project>(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Re-read a live project after taking the database write lock.
    ///
    /// Must be the first statement of the surrounding transaction.
    pub async fn lock_for_update(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query("UPDATE projects SET id = id WHERE id = $1 AND deleted = 0")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Self::find_by_id(&mut *conn, id).await
    }

    /// Live projects with the given ids, ascending.
    pub async fn find_by_ids<'e, E>(executor: E, ids: &[i64]) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query_builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE deleted = 0 AND id IN ("
        ));
        let mut separated = query_builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id ASC");
        query_builder.build_query_as().fetch_all(executor).await
    }

    fn push_filter(query_builder: &mut QueryBuilder<'_, Sqlite>, filter: &ProjectFilter) {
        filter.visibility.push_predicate(query_builder, "p", None);
        if let Some(category) = filter.category_contains.as_deref().filter(|c| !c.is_empty()) {
            query_builder.push(" AND p.category LIKE ");
            query_builder.push_bind(contains_pattern(category));
            query_builder.push(" ESCAPE '\\'");
        }
    }

    pub async fn find_filtered<'e, E>(
        executor: E,
        filter: &ProjectFilter,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut query_builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {PROJECT_COLUMNS} FROM projects p WHERE p.deleted = 0"
        ));
        Self::push_filter(&mut query_builder, filter);
        query_builder.push(" ORDER BY p.id ASC");
        push_page(&mut query_builder, filter.limit, filter.offset);
        query_builder.build_query_as().fetch_all(executor).await
    }

    /// Number of rows [`Project::find_filtered`] would return without paging.
    pub async fn count_filtered<'e, E>(executor: E, filter: &ProjectFilter) -> Result<i64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut query_builder =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM projects p WHERE p.deleted = 0");
        Self::push_filter(&mut query_builder, filter);
        query_builder.build_query_scalar().fetch_one(executor).await
    }

    pub async fn create<'e, E>(
        executor: E,
        data: &CreateProject,
        owner_id: i64,
        llm_context: &LlmContext,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        sqlx::query_as::<_, Project>(&format!(
            "INSERT INTO projects (title, description, owner_id, deadline, category, llm_context, created, updated)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(&data.title)
        .bind(&data.description)
        .bind(owner_id)
        .bind(data.deadline)
        .bind(data.category.as_deref().unwrap_or_default())
        .bind(Json(llm_context))
        .bind(now)
        .fetch_one(executor)
        .await
    }

    /// Persist every mutable column of `project` and bump `updated`.
    pub async fn save<'e, E>(executor: E, project: &Project) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Project>(&format!(
            "UPDATE projects
             SET title = $2, description = $3, owner_id = $4, deadline = $5, category = $6,
                 llm_context = $7, updated = $8
             WHERE id = $1
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(project.id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(project.owner_id)
        .bind(project.deadline)
        .bind(&project.category)
        .bind(Json(&project.llm_context.0))
        .bind(Utc::now())
        .fetch_one(executor)
        .await
    }

    /// Flag the project deleted, along with its tasks and their comments.
    pub async fn soft_delete(conn: &mut SqliteConnection, id: i64) -> Result<u64, sqlx::Error> {
        let now = Utc::now();
        let result =
            sqlx::query("UPDATE projects SET deleted = 1, updated = $2 WHERE id = $1 AND deleted = 0")
                .bind(id)
                .bind(now)
                .execute(&mut *conn)
                .await?;
        sqlx::query(
            "UPDATE comments SET deleted = 1, updated = $2
             WHERE deleted = 0 AND task_id IN (SELECT id FROM tasks WHERE project_id = $1)",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        sqlx::query("UPDATE tasks SET deleted = 1, updated = $2 WHERE project_id = $1 AND deleted = 0")
            .bind(id)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn tag_ids<'e, E>(executor: E, id: i64) -> Result<Vec<i64>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        PROJECT_TAGS.ids_for(executor, id).await
    }

    pub async fn set_tags(
        conn: &mut SqliteConnection,
        id: i64,
        tag_ids: &[i64],
    ) -> Result<(), sqlx::Error> {
        PROJECT_TAGS.replace(conn, id, tag_ids).await
    }

    /// Attach tag ids to each project with one relation query.
    pub async fn with_tags(
        conn: &mut SqliteConnection,
        projects: Vec<Project>,
    ) -> Result<Vec<ProjectWithTags>, sqlx::Error> {
        let ids: Vec<i64> = projects.iter().map(|p| p.id).collect();
        let mut tags = PROJECT_TAGS.ids_for_many(&mut *conn, &ids).await?;
        Ok(projects
            .into_iter()
            .map(|project| ProjectWithTags {
                tag_ids: tags.remove(&project.id).unwrap_or_default(),
                project,
            })
            .collect())
    }
}
