use db::{
    DBService,
    models::{
        LlmContext,
        project::Project,
        task::{
            CreateTask, TagRef, Task, TaskFilter, TaskOrdering, TaskPriority, TaskStatus,
            TaskWithRelations, UpdateTask,
        },
        user::User,
    },
};
use schemars::JsonSchema;
use serde::Deserialize;
use sqlx::{SqliteConnection, types::Json};

use super::{
    access::{self, Caller},
    error::EntityError,
    llm_context::{self, LlmAction},
    results::{DeleteConfirmation, Page},
    validation,
};

const ENTITY: &str = "Task";

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TaskQuery {
    #[serde(default, alias = "project")]
    pub project_id: Option<i64>,
    /// Only tasks the caller owns, even for staff.
    #[serde(default, alias = "mine")]
    pub owned_only: bool,
    /// For non-staff callers, also list tasks they are assigned to.
    #[serde(default = "default_true")]
    pub include_assigned: bool,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    /// Tag id or exact tag name.
    pub tag: Option<String>,
    /// Only tasks assigned to this user id.
    pub assigned: Option<i64>,
    /// Case-insensitive substring of title or description.
    pub q: Option<String>,
    /// `id`, `title`, `priority`, `status`, `due_date`, `created` or `updated`,
    /// optionally prefixed with `-` for descending.
    pub ordering: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Default for TaskQuery {
    fn default() -> Self {
        Self {
            project_id: None,
            owned_only: false,
            include_assigned: true,
            status: None,
            priority: None,
            tag: None,
            assigned: None,
            q: None,
            ordering: None,
            limit: None,
            offset: None,
        }
    }
}

async fn ensure_live_dependency(conn: &mut SqliteConnection, id: i64) -> Result<(), EntityError> {
    if Task::find_by_id(&mut *conn, id).await?.is_none() {
        return Err(EntityError::validation(format!(
            "depends_on_id: task {id} does not exist"
        )));
    }
    Ok(())
}

async fn with_relations(
    conn: &mut SqliteConnection,
    task: Task,
) -> Result<TaskWithRelations, EntityError> {
    let id = task.id;
    Task::with_relations(conn, vec![task])
        .await?
        .pop()
        .ok_or_else(|| EntityError::not_found(ENTITY, id))
}

/// Create a task in a live project. The owner is always the project's owner.
pub async fn create_task(
    db: &DBService,
    caller: &Caller,
    mut payload: CreateTask,
) -> Result<TaskWithRelations, EntityError> {
    validation::title(&payload.title)?;
    payload.estimated_hours = payload
        .estimated_hours
        .map(validation::estimated_hours)
        .transpose()?;
    let assignee_ids = validation::unique_ids(payload.assignee_ids.as_deref().unwrap_or_default());
    let tag_ids = validation::unique_ids(payload.tag_ids.as_deref().unwrap_or_default());

    let mut tx = db.pool.begin().await?;
    let project = Project::lock_for_update(&mut tx, payload.project_id)
        .await?
        .ok_or_else(|| EntityError::not_found("Project", payload.project_id))?;
    access::ensure(
        access::can_write(&caller.actor, project.owner_id),
        "You do not have permission to add tasks to this project",
    )?;
    if let Some(depends_on_id) = payload.depends_on_id {
        ensure_live_dependency(&mut tx, depends_on_id).await?;
    }
    validation::ensure_users_exist(&mut tx, "assignee_ids", &assignee_ids).await?;
    validation::ensure_tags_exist(&mut tx, &tag_ids).await?;

    let context = llm_context::merge(
        &LlmContext::new(),
        caller,
        LlmAction::Create,
        payload.llm_notes.as_deref(),
        &format!("Task '{}' created via {}", payload.title, caller.source.as_str()),
        payload.llm_context.as_ref(),
    );
    let task = Task::create(&mut *tx, &payload, project.owner_id, &context).await?;
    Task::set_assignees(&mut tx, task.id, &assignee_ids).await?;
    Task::set_tags(&mut tx, task.id, &tag_ids).await?;
    tx.commit().await?;

    tracing::debug!(task_id = task.id, project_id = project.id, "Created task");
    Ok(TaskWithRelations {
        task,
        assignee_ids,
        tag_ids,
    })
}

pub async fn get_task(
    db: &DBService,
    caller: &Caller,
    id: i64,
) -> Result<TaskWithRelations, EntityError> {
    let mut conn = db.pool.acquire().await?;
    let task = Task::find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| EntityError::not_found(ENTITY, id))?;
    let task = with_relations(&mut conn, task).await?;
    access::ensure(
        access::can_view_task(&caller.actor, task.owner_id, &task.assignee_ids),
        "You do not have permission to view this task",
    )?;
    Ok(task)
}

pub async fn list_tasks(
    db: &DBService,
    caller: &Caller,
    query: &TaskQuery,
) -> Result<Page<TaskWithRelations>, EntityError> {
    validation::page(query.limit, query.offset)?;
    let ordering = query
        .ordering
        .as_deref()
        .map(str::parse::<TaskOrdering>)
        .transpose()
        .map_err(|err| EntityError::validation(err.to_string()))?
        .unwrap_or_default();
    let visibility = if query.owned_only {
        access::owned_scope(&caller.actor)
    } else {
        access::visibility_scope(&caller.actor, query.include_assigned)
    };
    let filter = TaskFilter {
        visibility,
        project_id: query.project_id,
        assignee_id: query.assigned,
        status: query.status,
        priority: query.priority,
        tag: query.tag.as_deref().map(TagRef::from),
        search: query.q.clone(),
        ordering,
        limit: query.limit,
        offset: query.offset,
    };

    let mut conn = db.pool.acquire().await?;
    let count = Task::count_filtered(&mut *conn, &filter).await?;
    let tasks = Task::find_filtered(&mut *conn, &filter).await?;
    let results = Task::with_relations(&mut conn, tasks).await?;
    Ok(Page { count, results })
}

pub async fn update_task(
    db: &DBService,
    caller: &Caller,
    id: i64,
    payload: UpdateTask,
) -> Result<TaskWithRelations, EntityError> {
    if let Some(title) = payload.title.as_deref() {
        validation::title(title)?;
    }
    let estimated_hours = match payload.estimated_hours {
        Some(Some(hours)) => Some(Some(validation::estimated_hours(hours)?)),
        other => other,
    };

    let mut tx = db.pool.begin().await?;
    let mut task = Task::lock_for_update(&mut tx, id)
        .await?
        .ok_or_else(|| EntityError::not_found(ENTITY, id))?;
    access::ensure(
        access::can_write(&caller.actor, task.owner_id),
        "You do not have permission to modify this task",
    )?;

    if let Some(owner_id) = payload.owner_id {
        if User::find_by_id(&mut *tx, owner_id).await?.is_none() {
            return Err(EntityError::validation(format!(
                "owner_id: user {owner_id} does not exist"
            )));
        }
        task.owner_id = owner_id;
    }
    if let Some(title) = payload.title {
        task.title = title;
    }
    if let Some(description) = payload.description {
        task.description = description;
    }
    if let Some(priority) = payload.priority {
        task.priority = priority;
    }
    if let Some(status) = payload.status {
        task.status = status;
    }
    if let Some(depends_on_id) = payload.depends_on_id {
        if let Some(dependency) = depends_on_id {
            ensure_live_dependency(&mut tx, dependency).await?;
        }
        task.depends_on_id = depends_on_id;
    }
    if let Some(due_date) = payload.due_date {
        task.due_date = due_date;
    }
    if let Some(hours) = estimated_hours {
        task.estimated_hours = hours;
    }
    task.llm_context = Json(llm_context::merge(
        &task.llm_context,
        caller,
        LlmAction::Update,
        payload.llm_notes.as_deref(),
        "",
        payload.llm_context.as_ref(),
    ));
    let task = Task::save(&mut *tx, &task).await?;

    if let Some(assignee_ids) = payload.assignee_ids {
        let assignee_ids = validation::unique_ids(&assignee_ids);
        validation::ensure_users_exist(&mut tx, "assignee_ids", &assignee_ids).await?;
        Task::set_assignees(&mut tx, id, &assignee_ids).await?;
    }
    if let Some(tag_ids) = payload.tag_ids {
        let tag_ids = validation::unique_ids(&tag_ids);
        validation::ensure_tags_exist(&mut tx, &tag_ids).await?;
        Task::set_tags(&mut tx, id, &tag_ids).await?;
    }
    let task = with_relations(&mut tx, task).await?;
    tx.commit().await?;

    tracing::debug!(task_id = id, "Updated task");
    Ok(task)
}

/// Soft delete; the task's comments go with it.
pub async fn delete_task(
    db: &DBService,
    caller: &Caller,
    id: i64,
) -> Result<DeleteConfirmation, EntityError> {
    let mut tx = db.pool.begin().await?;
    let task = Task::lock_for_update(&mut tx, id)
        .await?
        .ok_or_else(|| EntityError::not_found(ENTITY, id))?;
    access::ensure(
        access::can_write(&caller.actor, task.owner_id),
        "You do not have permission to delete this task",
    )?;
    Task::soft_delete(&mut tx, id).await?;
    tx.commit().await?;

    tracing::debug!(task_id = id, "Deleted task");
    Ok(DeleteConfirmation::new("task", id))
}

pub(crate) async fn views_by_ids(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<Vec<TaskWithRelations>, EntityError> {
    let tasks = Task::find_by_ids(&mut *conn, ids).await?;
    Ok(Task::with_relations(conn, tasks).await?)
}
