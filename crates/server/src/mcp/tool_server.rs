use anyhow::{Context, bail};
use db::{
    DBService,
    models::{
        comment::{CreateComment, UpdateComment},
        project::{CreateProject, UpdateProject},
        tag::{CreateTag, UpdateTag},
        task::{CreateTask, UpdateTask},
        user::User,
    },
};
use rmcp::{
    ErrorData, ServerHandler,
    handler::server::tool::{Parameters, ToolRouter},
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    schemars, tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};
use services::services::{
    access::{Actor, Caller},
    comments::{self, CommentQuery},
    error::EntityError,
    orm::{self, OrmAction},
    projects::{self, ProjectQuery},
    tags::{self, TagQuery},
    tasks::{self, TaskQuery},
};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct IdRequest {
    #[schemars(description = "The id of the record")]
    pub id: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateProjectRequest {
    #[schemars(description = "The id of the project to update")]
    pub id: i64,
    #[serde(flatten)]
    pub changes: UpdateProject,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateTaskRequest {
    #[schemars(description = "The id of the task to update")]
    pub id: i64,
    #[serde(flatten)]
    pub changes: UpdateTask,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateTagRequest {
    #[schemars(description = "The id of the tag to update")]
    pub id: i64,
    #[serde(flatten)]
    pub changes: UpdateTag,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateCommentRequest {
    #[schemars(description = "The id of the comment to update")]
    pub id: i64,
    #[serde(flatten)]
    pub changes: UpdateComment,
}

/// Resolve the user every tool call acts as. The user must exist and be active.
pub async fn agent_actor(db: &DBService, email: Option<&str>) -> anyhow::Result<Actor> {
    let Some(email) = email.map(str::trim).filter(|email| !email.is_empty()) else {
        bail!("AGENT_USER_EMAIL must name the user the tools act as");
    };
    let user = User::find_by_email(&db.pool, email)
        .await
        .with_context(|| format!("failed to look up agent user {email}"))?;
    match user {
        Some(user) if user.is_active => {
            tracing::info!(user_id = user.id, "Tools act as {}", user.email);
            Ok(Actor::from(&user))
        }
        Some(user) => bail!("agent user {} is inactive", user.email),
        None => bail!("no user with email {email}"),
    }
}

/// Agent-facing tools over projects, tasks, tags and comments, bound to one actor.
#[derive(Clone)]
pub struct ProjectToolServer {
    db: DBService,
    caller: Caller,
    tool_router: ToolRouter<ProjectToolServer>,
}

impl ProjectToolServer {
    pub fn new(db: DBService, actor: Actor) -> Self {
        Self {
            db,
            caller: Caller::agent(actor),
            tool_router: Self::tool_router(),
        }
    }

    fn success<T: Serialize>(data: &T) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(data)
                .unwrap_or_else(|_| "Failed to serialize response".to_string()),
        )]))
    }

    fn failure(err: EntityError) -> Result<CallToolResult, ErrorData> {
        tracing::debug!(kind = err.kind(), "Tool call failed: {}", err);
        let body = serde_json::json!({
            "success": false,
            "kind": err.kind(),
            "error": err.to_string(),
        });
        Ok(CallToolResult::error(vec![Content::text(
            serde_json::to_string_pretty(&body)
                .unwrap_or_else(|_| "Failed to serialize error".to_string()),
        )]))
    }

    fn respond<T: Serialize>(result: Result<T, EntityError>) -> Result<CallToolResult, ErrorData> {
        match result {
            Ok(data) => Self::success(&data),
            Err(err) => Self::failure(err),
        }
    }
}

#[tool_router]
impl ProjectToolServer {
    #[tool(
        description = "Create a project. Owner defaults to you; only staff may create projects for someone else. `llm_notes` becomes the summary in `llm_context`."
    )]
    async fn create_project(
        &self,
        Parameters(payload): Parameters<CreateProject>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(projects::create_project(&self.db, &self.caller, payload).await)
    }

    #[tool(description = "Get one project by `id`.")]
    async fn get_project(
        &self,
        Parameters(IdRequest { id }): Parameters<IdRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(projects::get_project(&self.db, &self.caller, id).await)
    }

    #[tool(
        description = "List the projects you can see, optionally filtered by `category` substring or `owned_only`."
    )]
    async fn list_projects(
        &self,
        Parameters(query): Parameters<ProjectQuery>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(projects::list_projects(&self.db, &self.caller, &query).await)
    }

    #[tool(
        description = "Update a project you own. Only the supplied fields change; `deadline: null` clears it and `tag_ids` replaces the tag set."
    )]
    async fn update_project(
        &self,
        Parameters(UpdateProjectRequest { id, changes }): Parameters<UpdateProjectRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(projects::update_project(&self.db, &self.caller, id, changes).await)
    }

    #[tool(description = "Delete a project you own, along with its tasks and comments.")]
    async fn delete_project(
        &self,
        Parameters(IdRequest { id }): Parameters<IdRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(projects::delete_project(&self.db, &self.caller, id).await)
    }

    #[tool(
        description = "Create a task in a project you own. `project_id` is required; the task's owner is always the project's owner. Dates accept RFC 3339, YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD."
    )]
    async fn create_task(
        &self,
        Parameters(payload): Parameters<CreateTask>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(tasks::create_task(&self.db, &self.caller, payload).await)
    }

    #[tool(description = "Get one task by `id`. Owners and assignees can read it.")]
    async fn get_task(
        &self,
        Parameters(IdRequest { id }): Parameters<IdRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(tasks::get_task(&self.db, &self.caller, id).await)
    }

    #[tool(
        description = "List tasks you own or are assigned to. Filters: `project_id`, `owned_only`, `include_assigned`, `status`, `priority`, `tag`, `assigned`, `q`, `ordering`."
    )]
    async fn list_tasks(
        &self,
        Parameters(query): Parameters<TaskQuery>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(tasks::list_tasks(&self.db, &self.caller, &query).await)
    }

    #[tool(
        description = "Update a task you own. Only the supplied fields change; null clears `due_date`, `estimated_hours` and `depends_on_id`."
    )]
    async fn update_task(
        &self,
        Parameters(UpdateTaskRequest { id, changes }): Parameters<UpdateTaskRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(tasks::update_task(&self.db, &self.caller, id, changes).await)
    }

    #[tool(description = "Delete a task you own, along with its comments.")]
    async fn delete_task(
        &self,
        Parameters(IdRequest { id }): Parameters<IdRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(tasks::delete_task(&self.db, &self.caller, id).await)
    }

    #[tool(description = "Create a tag. Names are unique; `color` is a hex string like #1A2B3C.")]
    async fn create_tag(
        &self,
        Parameters(payload): Parameters<CreateTag>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(tags::create_tag(&self.db, &self.caller, payload).await)
    }

    #[tool(description = "Get one tag by `id`.")]
    async fn get_tag(
        &self,
        Parameters(IdRequest { id }): Parameters<IdRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(tags::get_tag(&self.db, &self.caller, id).await)
    }

    #[tool(description = "List tags, optionally filtered by `name_contains`.")]
    async fn list_tags(
        &self,
        Parameters(query): Parameters<TagQuery>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(tags::list_tags(&self.db, &self.caller, &query).await)
    }

    #[tool(description = "Rename or recolor a tag.")]
    async fn update_tag(
        &self,
        Parameters(UpdateTagRequest { id, changes }): Parameters<UpdateTagRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(tags::update_tag(&self.db, &self.caller, id, changes).await)
    }

    #[tool(description = "Permanently delete a tag.")]
    async fn delete_tag(
        &self,
        Parameters(IdRequest { id }): Parameters<IdRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(tags::delete_tag(&self.db, &self.caller, id).await)
    }

    #[tool(description = "Comment on a task you own or are assigned to. `task_id` is required.")]
    async fn create_comment(
        &self,
        Parameters(payload): Parameters<CreateComment>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(comments::create_comment(&self.db, &self.caller, payload).await)
    }

    #[tool(description = "Get one of your comments by `id`.")]
    async fn get_comment(
        &self,
        Parameters(IdRequest { id }): Parameters<IdRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(comments::get_comment(&self.db, &self.caller, id).await)
    }

    #[tool(description = "List your comments, optionally for one `task_id`.")]
    async fn list_comments(
        &self,
        Parameters(query): Parameters<CommentQuery>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(comments::list_comments(&self.db, &self.caller, &query).await)
    }

    #[tool(description = "Update a comment you wrote. Only the supplied fields change.")]
    async fn update_comment(
        &self,
        Parameters(UpdateCommentRequest { id, changes }): Parameters<UpdateCommentRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(comments::update_comment(&self.db, &self.caller, id, changes).await)
    }

    #[tool(description = "Delete a comment you wrote.")]
    async fn delete_comment(
        &self,
        Parameters(IdRequest { id }): Parameters<IdRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(comments::delete_comment(&self.db, &self.caller, id).await)
    }

    #[tool(
        description = "Generic create/read/update/delete/query on `project`, `task`, `tag` or `comment`. Pass `type` plus `model_name`; `id` for read/update/delete, `data` for create/update, `filters` and `limit` (default 100, max 1000) for query. Relation filters use `<name>_id` or `<name>_ids`."
    )]
    async fn orm_action(
        &self,
        Parameters(action): Parameters<OrmAction>,
    ) -> Result<CallToolResult, ErrorData> {
        Self::respond(orm::dispatch(&self.db, &self.caller, action).await)
    }
}

#[tool_handler]
impl ServerHandler for ProjectToolServer {
    fn get_info(&self) -> ServerInfo {
        let instruction = "A project and task management server. Every call acts as one fixed user: you can read and change what that user owns, read tasks they are assigned to, and comment on those tasks. Use the typed tools ('create_project', 'get_task', 'list_tags', 'update_comment', ...) for everyday work and 'orm_action' for filtered queries. Failures come back as {success: false, kind, error} where kind is one of not_found, forbidden, validation, conflict or internal.".to_string();

        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "atlas-projects".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(instruction),
        }
    }
}
