use db::{
    DBService,
    models::{
        LlmContext,
        comment::{Comment, CommentFilter, CreateComment, UpdateComment},
        task::Task,
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

const ENTITY: &str = "Comment";

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct CommentQuery {
    #[serde(default, alias = "task")]
    pub task_id: Option<i64>,
    /// Only comments the caller wrote, even for staff.
    #[serde(default, alias = "mine")]
    pub owned_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Anyone who can see the task may comment; writing on someone else's behalf
/// needs the same rights as editing their records.
pub async fn create_comment(
    db: &DBService,
    caller: &Caller,
    payload: CreateComment,
) -> Result<Comment, EntityError> {
    validation::title(&payload.title)?;

    let mut tx = db.pool.begin().await?;
    let task = Task::lock_for_update(&mut tx, payload.task_id)
        .await?
        .ok_or_else(|| EntityError::not_found("Task", payload.task_id))?;
    let assignee_ids = Task::assignee_ids(&mut *tx, task.id).await?;
    access::ensure(
        access::can_comment(&caller.actor, task.owner_id, &assignee_ids),
        "You do not have permission to comment on this task",
    )?;

    let owner_id = payload
        .owner_id
        .or(caller.actor.user_id)
        .ok_or_else(|| EntityError::validation("owner_id is required when acting without a user"))?;
    access::ensure(
        access::can_write(&caller.actor, owner_id),
        "You can only comment as yourself",
    )?;
    if User::find_by_id(&mut *tx, owner_id).await?.is_none() {
        return Err(EntityError::validation(format!(
            "owner_id: user {owner_id} does not exist"
        )));
    }

    let context = llm_context::merge(
        &LlmContext::new(),
        caller,
        LlmAction::Create,
        payload.llm_notes.as_deref(),
        &format!("Comment created on task {}", task.id),
        payload.llm_context.as_ref(),
    );
    let comment = Comment::create(&mut *tx, &payload, owner_id, &context).await?;
    tx.commit().await?;

    tracing::debug!(comment_id = comment.id, task_id = task.id, "Created comment");
    Ok(comment)
}

pub async fn get_comment(db: &DBService, caller: &Caller, id: i64) -> Result<Comment, EntityError> {
    let comment = Comment::find_by_id(&db.pool, id)
        .await?
        .ok_or_else(|| EntityError::not_found(ENTITY, id))?;
    access::ensure(
        access::can_view_owned(&caller.actor, comment.owner_id),
        "You do not have permission to view this comment",
    )?;
    Ok(comment)
}

pub async fn list_comments(
    db: &DBService,
    caller: &Caller,
    query: &CommentQuery,
) -> Result<Page<Comment>, EntityError> {
    validation::page(query.limit, query.offset)?;
    let visibility = if query.owned_only {
        access::owned_scope(&caller.actor)
    } else {
        access::visibility_scope(&caller.actor, false)
    };
    let filter = CommentFilter {
        visibility,
        task_id: query.task_id,
        limit: query.limit,
        offset: query.offset,
    };
    let mut conn = db.pool.acquire().await?;
    let count = Comment::count_filtered(&mut *conn, &filter).await?;
    let results = Comment::find_filtered(&mut *conn, &filter).await?;
    Ok(Page { count, results })
}

pub async fn update_comment(
    db: &DBService,
    caller: &Caller,
    id: i64,
    payload: UpdateComment,
) -> Result<Comment, EntityError> {
    if let Some(title) = payload.title.as_deref() {
        validation::title(title)?;
    }

    let mut tx = db.pool.begin().await?;
    let mut comment = Comment::lock_for_update(&mut tx, id)
        .await?
        .ok_or_else(|| EntityError::not_found(ENTITY, id))?;
    access::ensure(
        access::can_write(&caller.actor, comment.owner_id),
        "You do not have permission to modify this comment",
    )?;

    if let Some(owner_id) = payload.owner_id {
        if User::find_by_id(&mut *tx, owner_id).await?.is_none() {
            return Err(EntityError::validation(format!(
                "owner_id: user {owner_id} does not exist"
            )));
        }
        comment.owner_id = owner_id;
    }
    if let Some(title) = payload.title {
        comment.title = title;
    }
    if let Some(description) = payload.description {
        comment.description = description;
    }
    comment.llm_context = Json(llm_context::merge(
        &comment.llm_context,
        caller,
        LlmAction::Update,
        payload.llm_notes.as_deref(),
        "",
        payload.llm_context.as_ref(),
    ));
    let comment = Comment::save(&mut *tx, &comment).await?;
    tx.commit().await?;

    tracing::debug!(comment_id = id, "Updated comment");
    Ok(comment)
}

pub async fn delete_comment(
    db: &DBService,
    caller: &Caller,
    id: i64,
) -> Result<DeleteConfirmation, EntityError> {
    let mut tx = db.pool.begin().await?;
    let comment = Comment::lock_for_update(&mut tx, id)
        .await?
        .ok_or_else(|| EntityError::not_found(ENTITY, id))?;
    access::ensure(
        access::can_write(&caller.actor, comment.owner_id),
        "You do not have permission to delete this comment",
    )?;
    Comment::soft_delete(&mut *tx, id).await?;
    tx.commit().await?;

    tracing::debug!(comment_id = id, "Deleted comment");
    Ok(DeleteConfirmation::new("comment", id))
}

pub(crate) async fn views_by_ids(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<Vec<Comment>, EntityError> {
    Ok(Comment::find_by_ids(conn, ids).await?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::services::{projects::create_project, tasks::create_task, test_support};

    fn note(task_id: i64) -> CreateComment {
        CreateComment {
            title: "Note".to_string(),
            description: "Bring gloves".to_string(),
            task_id,
            owner_id: None,
            llm_notes: None,
            llm_context: None,
        }
    }

    #[tokio::test]
    async fn assignee_comments_as_themself() {
        let db = test_support::db().await;
        let alice = test_support::user(&db, "alice@example.com", false).await;
        let helper = test_support::user(&db, "helper@example.com", false).await;
        let stranger = test_support::user(&db, "stranger@example.com", false).await;
        let project = create_project(&db, &test_support::api(&alice), test_support::new_project("Garden"))
            .await
            .unwrap();
        let mut payload = test_support::new_task(project.id, "Dig");
        payload.assignee_ids = Some(vec![helper.id]);
        let task = create_task(&db, &test_support::api(&alice), payload).await.unwrap();

        let comment = create_comment(&db, &test_support::agent(&helper), note(task.id))
            .await
            .unwrap();
        assert_eq!(comment.owner_id, helper.id);
        assert_eq!(
            comment.llm_context.0["summary_text"],
            json!(format!("Comment created on task {}", task.id))
        );

        let err = create_comment(&db, &test_support::agent(&stranger), note(task.id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");

        let mut impersonation = note(task.id);
        impersonation.owner_id = Some(alice.id);
        let err = create_comment(&db, &test_support::agent(&helper), impersonation)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[tokio::test]
    async fn comments_are_private_to_their_author() {
        let db = test_support::db().await;
        let alice = test_support::user(&db, "alice@example.com", false).await;
        let helper = test_support::user(&db, "helper@example.com", false).await;
        let project = create_project(&db, &test_support::api(&alice), test_support::new_project("Garden"))
            .await
            .unwrap();
        let mut payload = test_support::new_task(project.id, "Dig");
        payload.assignee_ids = Some(vec![helper.id]);
        let task = create_task(&db, &test_support::api(&alice), payload).await.unwrap();
        let comment = create_comment(&db, &test_support::api(&helper), note(task.id))
            .await
            .unwrap();

        let err = get_comment(&db, &test_support::api(&alice), comment.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
        let alices = list_comments(&db, &test_support::api(&alice), &CommentQuery::default())
            .await
            .unwrap();
        assert_eq!(alices.count, 0);

        let query = CommentQuery {
            task_id: Some(task.id),
            ..Default::default()
        };
        let helpers = list_comments(&db, &test_support::api(&helper), &query).await.unwrap();
        assert_eq!(helpers.results.len(), 1);
    }

    #[tokio::test]
    async fn partial_update_keeps_title() {
        let db = test_support::db().await;
        let alice = test_support::user(&db, "alice@example.com", false).await;
        let caller = test_support::agent(&alice);
        let project = create_project(&db, &caller, test_support::new_project("Garden"))
            .await
            .unwrap();
        let task = create_task(&db, &caller, test_support::new_task(project.id, "Dig"))
            .await
            .unwrap();
        let comment = create_comment(&db, &caller, note(task.id)).await.unwrap();

        let updated = update_comment(
            &db,
            &caller,
            comment.id,
            UpdateComment {
                description: Some("Bring two pairs".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.title, "Note");
        assert_eq!(updated.description, "Bring two pairs");
        assert_eq!(updated.llm_context.0["last_action"], json!("update"));
        assert_eq!(
            updated.llm_context.0["summary_text"],
            comment.llm_context.0["summary_text"]
        );
    }

    #[tokio::test]
    async fn task_delete_hides_comments() {
        let db = test_support::db().await;
        let alice = test_support::user(&db, "alice@example.com", false).await;
        let caller = test_support::api(&alice);
        let project = create_project(&db, &caller, test_support::new_project("Garden"))
            .await
            .unwrap();
        let task = create_task(&db, &caller, test_support::new_task(project.id, "Dig"))
            .await
            .unwrap();
        let comment = create_comment(&db, &caller, note(task.id)).await.unwrap();

        crate::services::tasks::delete_task(&db, &caller, task.id)
            .await
            .unwrap();
        let err = get_comment(&db, &caller, comment.id).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
        let err = update_comment(&db, &caller, comment.id, UpdateComment::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
