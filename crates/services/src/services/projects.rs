use db::{
    DBService,
    models::{
        LlmContext,
        project::{CreateProject, Project, ProjectFilter, ProjectWithTags, UpdateProject},
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

const ENTITY: &str = "Project";

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ProjectQuery {
    /// Case-insensitive substring of the category.
    pub category: Option<String>,
    /// Only projects the caller owns, even for staff.
    #[serde(default, alias = "mine")]
    pub owned_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn validate_fields(title: Option<&str>, category: Option<&str>) -> Result<(), EntityError> {
    if let Some(title) = title {
        validation::title(title)?;
    }
    if let Some(category) = category {
        validation::max_len("category", category, validation::MAX_CATEGORY_LEN)?;
    }
    Ok(())
}

pub async fn create_project(
    db: &DBService,
    caller: &Caller,
    payload: CreateProject,
) -> Result<ProjectWithTags, EntityError> {
    validate_fields(Some(&payload.title), payload.category.as_deref())?;
    let owner_id = payload
        .owner_id
        .or(caller.actor.user_id)
        .ok_or_else(|| EntityError::validation("owner_id is required when acting without a user"))?;
    access::ensure(
        access::can_write(&caller.actor, owner_id),
        "You can only create projects for yourself",
    )?;
    if User::find_by_id(&db.pool, owner_id).await?.is_none() {
        return Err(EntityError::validation(format!(
            "owner_id: user {owner_id} does not exist"
        )));
    }

    let tag_ids = validation::unique_ids(payload.tag_ids.as_deref().unwrap_or_default());
    let context = llm_context::merge(
        &LlmContext::new(),
        caller,
        LlmAction::Create,
        payload.llm_notes.as_deref(),
        &format!(
            "Project '{}' created via {}",
            payload.title,
            caller.source.as_str()
        ),
        payload.llm_context.as_ref(),
    );

    let mut tx = db.pool.begin().await?;
    let project = Project::create(&mut *tx, &payload, owner_id, &context).await?;
    validation::ensure_tags_exist(&mut tx, &tag_ids).await?;
    Project::set_tags(&mut tx, project.id, &tag_ids).await?;
    tx.commit().await?;

    tracing::debug!(project_id = project.id, owner_id, "Created project");
    Ok(ProjectWithTags { project, tag_ids })
}

pub async fn get_project(
    db: &DBService,
    caller: &Caller,
    id: i64,
) -> Result<ProjectWithTags, EntityError> {
    let mut conn = db.pool.acquire().await?;
    let project = Project::find_by_id(&mut *conn, id)
        .await?
        .ok_or_else(|| EntityError::not_found(ENTITY, id))?;
    access::ensure(
        access::can_view_owned(&caller.actor, project.owner_id),
        "You do not have permission to view this project",
    )?;
    let tag_ids = Project::tag_ids(&mut *conn, id).await?;
    Ok(ProjectWithTags { project, tag_ids })
}

pub async fn list_projects(
    db: &DBService,
    caller: &Caller,
    query: &ProjectQuery,
) -> Result<Page<ProjectWithTags>, EntityError> {
    validation::page(query.limit, query.offset)?;
    let visibility = if query.owned_only {
        access::owned_scope(&caller.actor)
    } else {
        access::visibility_scope(&caller.actor, false)
    };
    let filter = ProjectFilter {
        visibility,
        category_contains: query.category.clone(),
        limit: query.limit,
        offset: query.offset,
    };

    let mut conn = db.pool.acquire().await?;
    let count = Project::count_filtered(&mut *conn, &filter).await?;
    let projects = Project::find_filtered(&mut *conn, &filter).await?;
    let results = Project::with_tags(&mut conn, projects).await?;
    Ok(Page { count, results })
}

pub async fn update_project(
    db: &DBService,
    caller: &Caller,
    id: i64,
    payload: UpdateProject,
) -> Result<ProjectWithTags, EntityError> {
    validate_fields(payload.title.as_deref(), payload.category.as_deref())?;

    let mut tx = db.pool.begin().await?;
    let mut project = Project::lock_for_update(&mut tx, id)
        .await?
        .ok_or_else(|| EntityError::not_found(ENTITY, id))?;
    access::ensure(
        access::can_write(&caller.actor, project.owner_id),
        "You do not have permission to modify this project",
    )?;

    if let Some(owner_id) = payload.owner_id {
        if User::find_by_id(&mut *tx, owner_id).await?.is_none() {
            return Err(EntityError::validation(format!(
                "owner_id: user {owner_id} does not exist"
            )));
        }
        project.owner_id = owner_id;
    }
    if let Some(title) = payload.title {
        project.title = title;
    }
    if let Some(description) = payload.description {
        project.description = description;
    }
    if let Some(deadline) = payload.deadline {
        project.deadline = deadline;
    }
    if let Some(category) = payload.category {
        project.category = category;
    }
    project.llm_context = Json(llm_context::merge(
        &project.llm_context,
        caller,
        LlmAction::Update,
        payload.llm_notes.as_deref(),
        "",
        payload.llm_context.as_ref(),
    ));
    let project = Project::save(&mut *tx, &project).await?;

    let tag_ids = match payload.tag_ids {
        Some(tag_ids) => {
            let tag_ids = validation::unique_ids(&tag_ids);
            validation::ensure_tags_exist(&mut tx, &tag_ids).await?;
            Project::set_tags(&mut tx, id, &tag_ids).await?;
            tag_ids
        }
        None => Project::tag_ids(&mut *tx, id).await?,
    };
    tx.commit().await?;

    tracing::debug!(project_id = id, "Updated project");
    Ok(ProjectWithTags { project, tag_ids })
}

/// Soft delete; the project's tasks and their comments go with it.
pub async fn delete_project(
    db: &DBService,
    caller: &Caller,
    id: i64,
) -> Result<DeleteConfirmation, EntityError> {
    let mut tx = db.pool.begin().await?;
    let project = Project::lock_for_update(&mut tx, id)
        .await?
        .ok_or_else(|| EntityError::not_found(ENTITY, id))?;
    access::ensure(
        access::can_write(&caller.actor, project.owner_id),
        "You do not have permission to delete this project",
    )?;
    Project::soft_delete(&mut tx, id).await?;
    tx.commit().await?;

    tracing::debug!(project_id = id, "Deleted project");
    Ok(DeleteConfirmation::new("project", id))
}

/// Live projects with the given ids, ascending, with their tag ids.
pub(crate) async fn views_by_ids(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<Vec<ProjectWithTags>, EntityError> {
    let projects = Project::find_by_ids(&mut *conn, ids).await?;
    Ok(Project::with_tags(conn, projects).await?)
}
