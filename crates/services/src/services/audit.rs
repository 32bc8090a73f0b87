use db::{
    DBService,
    models::{comment::Comment, project::Project, tag::Tag, task::Task},
};
use serde_json::Value;

use super::{access::Caller, error::EntityError, schema::EntityKind};

/// Staff-only lookup that also returns soft-deleted records, with `deleted` set.
pub async fn fetch_record(
    db: &DBService,
    caller: &Caller,
    kind: EntityKind,
    id: i64,
) -> Result<Value, EntityError> {
    if !caller.actor.is_staff {
        return Err(EntityError::Forbidden(
            "Only staff can read the audit trail".to_string(),
        ));
    }

    let mut conn = db.pool.acquire().await?;
    let record = match kind {
        EntityKind::Project => match Project::find_by_id_including_deleted(&mut *conn, id).await? {
            Some(project) => Project::with_tags(&mut conn, vec![project])
                .await?
                .pop()
                .map(serde_json::to_value)
                .transpose()?,
            None => None,
        },
        EntityKind::Task => match Task::find_by_id_including_deleted(&mut *conn, id).await? {
            Some(task) => Task::with_relations(&mut conn, vec![task])
                .await?
                .pop()
                .map(serde_json::to_value)
                .transpose()?,
            None => None,
        },
        EntityKind::Tag => Tag::find_by_id(&mut *conn, id)
            .await?
            .map(serde_json::to_value)
            .transpose()?,
        EntityKind::Comment => Comment::find_by_id_including_deleted(&mut *conn, id)
            .await?
            .map(serde_json::to_value)
            .transpose()?,
    };
    record.ok_or_else(|| EntityError::not_found(kind.entity_name(), id))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::services::{projects, tasks, test_support};

    #[tokio::test]
    async fn deleted_records_stay_visible_to_staff() {
        let db = test_support::db().await;
        let admin = test_support::user(&db, "admin@example.com", true).await;
        let alice = test_support::user(&db, "alice@example.com", false).await;
        let caller = test_support::api(&alice);
        let project = projects::create_project(&db, &caller, test_support::new_project("Garden"))
            .await
            .unwrap();
        let task = tasks::create_task(&db, &caller, test_support::new_task(project.id, "Dig"))
            .await
            .unwrap();
        projects::delete_project(&db, &caller, project.id).await.unwrap();

        let staff = test_support::api(&admin);
        let record = fetch_record(&db, &staff, EntityKind::Task, task.id).await.unwrap();
        assert_eq!(record["deleted"], json!(true));
        assert_eq!(record["project_id"], json!(project.id));
        let record = fetch_record(&db, &staff, EntityKind::Project, project.id)
            .await
            .unwrap();
        assert_eq!(record["deleted"], json!(true));

        let err = fetch_record(&db, &caller, EntityKind::Task, task.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
        let err = fetch_record(&db, &staff, EntityKind::Comment, 404).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
