use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, QueryBuilder, Sqlite, SqliteConnection, Type, types::Json};
use strum_macros::{Display, EnumString, VariantNames};
use thiserror::Error;
use ts_rs::TS;

use super::{
    LlmContext, contains_pattern,
    link::{TASK_ASSIGNEES, TASK_TAGS},
    push_page,
    visibility::Visibility,
};
use crate::serde_helpers::{
    deserialize_flexible_datetime, deserialize_optional_nullable,
    deserialize_optional_nullable_datetime,
};

#[derive(
    Debug,
    Clone,
    Copy,
    Type,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    TS,
    EnumString,
    Display,
    VariantNames,
    Default,
    JsonSchema,
)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Type,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    TS,
    EnumString,
    Display,
    VariantNames,
    Default,
    JsonSchema,
)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Task {
    #[ts(type = "number")]
    pub id: i64,
    pub title: String,
    pub description: String,
    #[ts(type = "number")]
    pub owner_id: i64,
    #[ts(type = "number")]
    pub project_id: i64,
    #[ts(type = "number | null")]
    pub depends_on_id: Option<i64>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    #[ts(type = "Record<string, unknown>")]
    pub llm_context: Json<LlmContext>,
    pub deleted: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct TaskWithRelations {
    #[serde(flatten)]
    #[ts(flatten)]
    pub task: Task,
    #[ts(type = "Array<number>")]
    pub assignee_ids: Vec<i64>,
    #[ts(type = "Array<number>")]
    pub tag_ids: Vec<i64>,
}

impl std::ops::Deref for TaskWithRelations {
    type Target = Task;
    fn deref(&self) -> &Self::Target {
        &self.task
    }
}

impl std::ops::DerefMut for TaskWithRelations {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.task
    }
}

#[derive(Debug, Clone, Deserialize, TS, JsonSchema)]
pub struct CreateTask {
    pub title: String,
    pub description: String,
    #[ts(type = "number")]
    pub project_id: i64,
    #[serde(default)]
    #[ts(type = "Array<number> | null")]
    pub assignee_ids: Option<Vec<i64>>,
    #[serde(default)]
    #[ts(type = "number | null")]
    pub depends_on_id: Option<i64>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "deserialize_flexible_datetime")]
    #[schemars(with = "Option<String>")]
    #[ts(type = "string | null")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
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
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    #[ts(type = "number | null")]
    pub owner_id: Option<i64>,
    #[ts(type = "Array<number> | null")]
    pub assignee_ids: Option<Vec<i64>>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    #[schemars(with = "Option<i64>")]
    #[ts(type = "number | null")]
    pub depends_on_id: Option<Option<i64>>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable_datetime")]
    #[schemars(with = "Option<String>")]
    #[ts(type = "string | null")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    #[schemars(with = "Option<f64>")]
    #[ts(type = "number | null")]
    pub estimated_hours: Option<Option<f64>>,
    #[ts(type = "Array<number> | null")]
    pub tag_ids: Option<Vec<i64>>,
    pub llm_notes: Option<String>,
    #[ts(type = "Record<string, unknown> | null")]
    pub llm_context: Option<LlmContext>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagRef {
    Id(i64),
    Name(String),
}

impl From<&str> for TagRef {
    /// Numeric strings are ids, anything else is a tag name.
    fn from(raw: &str) -> Self {
        raw.trim()
            .parse::<i64>()
            .map(TagRef::Id)
            .unwrap_or_else(|_| TagRef::Name(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskOrderField {
    #[default]
    Id,
    Title,
    Priority,
    Status,
    DueDate,
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskOrdering {
    pub field: TaskOrderField,
    pub descending: bool,
}

#[derive(Debug, Error)]
#[error("unknown ordering '{0}'")]
pub struct UnknownOrdering(pub String);

impl FromStr for TaskOrdering {
    type Err = UnknownOrdering;

    /// `field` or `-field`, e.g. `-priority`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (descending, name) = match trimmed.strip_prefix('-') {
            Some(name) => (true, name),
            None => (false, trimmed),
        };
        let field = match name {
            "id" => TaskOrderField::Id,
            "title" => TaskOrderField::Title,
            "priority" => TaskOrderField::Priority,
            "status" => TaskOrderField::Status,
            "due_date" => TaskOrderField::DueDate,
            "created" => TaskOrderField::Created,
            "updated" => TaskOrderField::Updated,
            _ => return Err(UnknownOrdering(raw.to_string())),
        };
        Ok(TaskOrdering { field, descending })
    }
}

impl TaskOrdering {
    fn sql_expression(&self) -> &'static str {
        match self.field {
            TaskOrderField::Id => "t.id",
            TaskOrderField::Title => "t.title",
            TaskOrderField::Priority => {
                "CASE t.priority WHEN 'LOW' THEN 0 WHEN 'MEDIUM' THEN 1 WHEN 'HIGH' THEN 2 ELSE 3 END"
            }
            TaskOrderField::Status => {
                "CASE t.status WHEN 'TODO' THEN 0 WHEN 'IN_PROGRESS' THEN 1 WHEN 'REVIEW' THEN 2 ELSE 3 END"
            }
            TaskOrderField::DueDate => "t.due_date",
            TaskOrderField::Created => "t.created",
            TaskOrderField::Updated => "t.updated",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub visibility: Visibility,
    pub project_id: Option<i64>,
    pub assignee_id: Option<i64>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub tag: Option<TagRef>,
    /// Case-insensitive substring of title or description.
    pub search: Option<String>,
    pub ordering: TaskOrdering,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

const TASK_COLUMNS: &str = "id, title, description, owner_id, project_id, depends_on_id, priority, \
     status, due_date, estimated_hours, llm_context, deleted, created, updated";

impl Task {
    pub async fn find_by_id<'e, E>(executor: E, id: i64) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND deleted = 0"
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
        sqlx::query_as::<_, Task>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Re-read a live task after taking the database write lock.
    ///
    /// Must be the first statement of the surrounding transaction.
    pub async fn lock_for_update(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query("UPDATE tasks SET id = id WHERE id = $1 AND deleted = 0")
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
            "SELECT {TASK_COLUMNS} FROM tasks WHERE deleted = 0 AND id IN ("
        ));
        let mut separated = query_builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id ASC");
        query_builder.build_query_as().fetch_all(executor).await
    }

    fn push_filter(query_builder: &mut QueryBuilder<'_, Sqlite>, filter: &TaskFilter) {
        filter
            .visibility
            .push_predicate(query_builder, "t", Some(TASK_ASSIGNEES));
        if let Some(project_id) = filter.project_id {
            query_builder.push(" AND t.project_id = ");
            query_builder.push_bind(project_id);
        }
        if let Some(assignee_id) = filter.assignee_id {
            query_builder.push(
                " AND EXISTS (SELECT 1 FROM task_assignees a WHERE a.task_id = t.id AND a.user_id = ",
            );
            query_builder.push_bind(assignee_id);
            query_builder.push(")");
        }
        if let Some(status) = filter.status {
            query_builder.push(" AND t.status = ");
            query_builder.push_bind(status);
        }
        if let Some(priority) = filter.priority {
            query_builder.push(" AND t.priority = ");
            query_builder.push_bind(priority);
        }
        match &filter.tag {
            Some(TagRef::Id(tag_id)) => {
                query_builder
                    .push(" AND EXISTS (SELECT 1 FROM task_tags g WHERE g.task_id = t.id AND g.tag_id = ");
                query_builder.push_bind(*tag_id);
                query_builder.push(")");
            }
            Some(TagRef::Name(name)) => {
                query_builder.push(
                    " AND EXISTS (SELECT 1 FROM task_tags g JOIN tags n ON n.id = g.tag_id \
                     WHERE g.task_id = t.id AND n.name = ",
                );
                query_builder.push_bind(name.clone());
                query_builder.push(")");
            }
            None => {}
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = contains_pattern(search);
            query_builder.push(" AND (t.title LIKE ");
            query_builder.push_bind(pattern.clone());
            query_builder.push(" ESCAPE '\\' OR t.description LIKE ");
            query_builder.push_bind(pattern);
            query_builder.push(" ESCAPE '\\')");
        }
    }

    pub async fn find_filtered<'e, E>(executor: E, filter: &TaskFilter) -> Result<Vec<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut query_builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {TASK_COLUMNS} FROM tasks t WHERE t.deleted = 0"
        ));
        Self::push_filter(&mut query_builder, filter);
        query_builder.push(" ORDER BY ");
        query_builder.push(filter.ordering.sql_expression());
        query_builder.push(if filter.ordering.descending { " DESC" } else { " ASC" });
        if filter.ordering.field != TaskOrderField::Id {
            query_builder.push(", t.id ASC");
        }
        push_page(&mut query_builder, filter.limit, filter.offset);
        query_builder.build_query_as().fetch_all(executor).await
    }

    /// Number of rows [`Task::find_filtered`] would return without paging.
    pub async fn count_filtered<'e, E>(executor: E, filter: &TaskFilter) -> Result<i64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut query_builder =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM tasks t WHERE t.deleted = 0");
        Self::push_filter(&mut query_builder, filter);
        query_builder.build_query_scalar().fetch_one(executor).await
    }

    pub async fn create<'e, E>(
        executor: E,
        data: &CreateTask,
        owner_id: i64,
        llm_context: &LlmContext,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks (title, description, owner_id, project_id, depends_on_id, priority,
                                status, due_date, estimated_hours, llm_context, created, updated)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(&data.title)
        .bind(&data.description)
        .bind(owner_id)
        .bind(data.project_id)
        .bind(data.depends_on_id)
        .bind(data.priority.unwrap_or_default())
        .bind(data.status.unwrap_or_default())
        .bind(data.due_date)
        .bind(data.estimated_hours)
        .bind(Json(llm_context))
        .bind(now)
        .fetch_one(executor)
        .await
    }

    /// Persist every mutable column of `task` and bump `updated`.
    pub async fn save<'e, E>(executor: E, task: &Task) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks
             SET title = $2, description = $3, owner_id = $4, depends_on_id = $5, priority = $6,
                 status = $7, due_date = $8, estimated_hours = $9, llm_context = $10, updated = $11
             WHERE id = $1
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.owner_id)
        .bind(task.depends_on_id)
        .bind(task.priority)
        .bind(task.status)
        .bind(task.due_date)
        .bind(task.estimated_hours)
        .bind(Json(&task.llm_context.0))
        .bind(Utc::now())
        .fetch_one(executor)
        .await
    }

    /// Flag the task deleted along with its comments.
    pub async fn soft_delete(conn: &mut SqliteConnection, id: i64) -> Result<u64, sqlx::Error> {
        let now = Utc::now();
        let result =
            sqlx::query("UPDATE tasks SET deleted = 1, updated = $2 WHERE id = $1 AND deleted = 0")
                .bind(id)
                .bind(now)
                .execute(&mut *conn)
                .await?;
        sqlx::query("UPDATE comments SET deleted = 1, updated = $2 WHERE task_id = $1 AND deleted = 0")
            .bind(id)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn assignee_ids<'e, E>(executor: E, id: i64) -> Result<Vec<i64>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        TASK_ASSIGNEES.ids_for(executor, id).await
    }

    pub async fn set_assignees(
        conn: &mut SqliteConnection,
        id: i64,
        user_ids: &[i64],
    ) -> Result<(), sqlx::Error> {
        TASK_ASSIGNEES.replace(conn, id, user_ids).await
    }

    pub async fn set_tags(
        conn: &mut SqliteConnection,
        id: i64,
        tag_ids: &[i64],
    ) -> Result<(), sqlx::Error> {
        TASK_TAGS.replace(conn, id, tag_ids).await
    }

    /// Attach assignee and tag ids to each task.
    pub async fn with_relations(
        conn: &mut SqliteConnection,
        tasks: Vec<Task>,
    ) -> Result<Vec<TaskWithRelations>, sqlx::Error> {
        let ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
        let mut assignees = TASK_ASSIGNEES.ids_for_many(&mut *conn, &ids).await?;
        let mut tags = TASK_TAGS.ids_for_many(&mut *conn, &ids).await?;
        Ok(tasks
            .into_iter()
            .map(|task| TaskWithRelations {
                assignee_ids: assignees.remove(&task.id).unwrap_or_default(),
                tag_ids: tags.remove(&task.id).unwrap_or_default(),
                task,
            })
            .collect())
    }
}
