//! One entry point for create/read/update/delete/query against any allow-listed
//! kind. Payloads are checked against the descriptor tables in [`super::schema`]
//! and then handed to the same per-entity operations the typed tools use.

use db::{
    DBService,
    models::{record_query::RecordQuery, tag::Tag, visibility::Visibility},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use super::{
    access::{self, Caller},
    comments,
    error::EntityError,
    projects,
    schema::{EntityKind, WriteMode},
    tags, tasks,
};

pub const DEFAULT_QUERY_LIMIT: i64 = 100;
pub const MAX_QUERY_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OrmAction {
    Create {
        model_name: String,
        data: Map<String, Value>,
    },
    Read {
        model_name: String,
        id: i64,
    },
    Update {
        model_name: String,
        id: i64,
        data: Map<String, Value>,
    },
    Delete {
        model_name: String,
        id: i64,
    },
    /// Equality filters over the kind's fields; `<relation>_ids` matches records
    /// linked to the given id and `null` matches empty nullable fields.
    Query {
        model_name: String,
        #[serde(default)]
        filters: Map<String, Value>,
        #[serde(default)]
        limit: Option<i64>,
    },
}

impl OrmAction {
    pub fn model_name(&self) -> &str {
        match self {
            OrmAction::Create { model_name, .. }
            | OrmAction::Read { model_name, .. }
            | OrmAction::Update { model_name, .. }
            | OrmAction::Delete { model_name, .. }
            | OrmAction::Query { model_name, .. } => model_name,
        }
    }
}

fn payload<T: DeserializeOwned>(kind: EntityKind, data: Map<String, Value>) -> Result<T, EntityError> {
    serde_json::from_value(Value::Object(data)).map_err(|err| {
        EntityError::validation(format!("invalid {} data: {err}", kind.model_name()))
    })
}

fn to_value<T: Serialize>(value: T) -> Result<Value, EntityError> {
    Ok(serde_json::to_value(value)?)
}

fn query_limit(limit: Option<i64>) -> Result<i64, EntityError> {
    match limit {
        None => Ok(DEFAULT_QUERY_LIMIT),
        Some(limit) if limit < 0 => Err(EntityError::validation("limit must not be negative")),
        Some(limit) => Ok(limit.min(MAX_QUERY_LIMIT)),
    }
}

pub async fn dispatch(db: &DBService, caller: &Caller, action: OrmAction) -> Result<Value, EntityError> {
    let kind = EntityKind::from_model_name(action.model_name())?;
    let schema = kind.schema();
    tracing::debug!(model = kind.model_name(), "Dispatching ORM action");

    match action {
        OrmAction::Create { data, .. } => {
            schema.check_data_keys(kind.model_name(), &data, WriteMode::Create)?;
            match kind {
                EntityKind::Project => {
                    to_value(projects::create_project(db, caller, payload(kind, data)?).await?)
                }
                EntityKind::Task => to_value(tasks::create_task(db, caller, payload(kind, data)?).await?),
                EntityKind::Tag => to_value(tags::create_tag(db, caller, payload(kind, data)?).await?),
                EntityKind::Comment => {
                    to_value(comments::create_comment(db, caller, payload(kind, data)?).await?)
                }
            }
        }
        OrmAction::Read { id, .. } => match kind {
            EntityKind::Project => to_value(projects::get_project(db, caller, id).await?),
            EntityKind::Task => to_value(tasks::get_task(db, caller, id).await?),
            EntityKind::Tag => to_value(tags::get_tag(db, caller, id).await?),
            EntityKind::Comment => to_value(comments::get_comment(db, caller, id).await?),
        },
        OrmAction::Update { id, data, .. } => {
            schema.check_data_keys(kind.model_name(), &data, WriteMode::Update)?;
            match kind {
                EntityKind::Project => {
                    to_value(projects::update_project(db, caller, id, payload(kind, data)?).await?)
                }
                EntityKind::Task => {
                    to_value(tasks::update_task(db, caller, id, payload(kind, data)?).await?)
                }
                EntityKind::Tag => to_value(tags::update_tag(db, caller, id, payload(kind, data)?).await?),
                EntityKind::Comment => {
                    to_value(comments::update_comment(db, caller, id, payload(kind, data)?).await?)
                }
            }
        }
        OrmAction::Delete { id, .. } => match kind {
            EntityKind::Project => to_value(projects::delete_project(db, caller, id).await?),
            EntityKind::Task => to_value(tasks::delete_task(db, caller, id).await?),
            EntityKind::Tag => to_value(tags::delete_tag(db, caller, id).await?),
            EntityKind::Comment => to_value(comments::delete_comment(db, caller, id).await?),
        },
        OrmAction::Query { filters, limit, .. } => {
            let capabilities = schema.capabilities;
            let visibility = if capabilities.ownable {
                access::visibility_scope(&caller.actor, capabilities.assignable.is_some())
            } else {
                Visibility::All
            };
            let query = RecordQuery {
                table: schema.table,
                live_only: capabilities.soft_delete,
                conditions: schema.conditions(kind.model_name(), &filters)?,
                visibility,
                assignees: capabilities.assignable,
                limit: query_limit(limit)?,
            };

            let mut conn = db.pool.acquire().await?;
            let ids = query.find_ids(&mut *conn).await?;
            match kind {
                EntityKind::Project => to_value(projects::views_by_ids(&mut conn, &ids).await?),
                EntityKind::Task => to_value(tasks::views_by_ids(&mut conn, &ids).await?),
                EntityKind::Tag => to_value(Tag::find_by_ids(&mut *conn, &ids).await?),
                EntityKind::Comment => to_value(comments::views_by_ids(&mut conn, &ids).await?),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use db::models::task::{CreateTask, UpdateTask};
    use serde_json::json;

    use super::*;
    use crate::services::{access::Actor, test_support};

    fn action(value: Value) -> OrmAction {
        serde_json::from_value(value).unwrap()
    }

    /// Drop the keys that legitimately differ between two otherwise equal records.
    fn comparable(mut value: Value) -> Value {
        if let Some(record) = value.as_object_mut() {
            for key in ["id", "created", "updated", "llm_context"] {
                record.remove(key);
            }
        }
        value
    }

    #[tokio::test]
    async fn create_matches_typed_tool() {
        let db = test_support::db().await;
        let alice = test_support::user(&db, "alice@example.com", false).await;
        let caller = test_support::agent(&alice);
        let project = projects::create_project(&db, &caller, test_support::new_project("Garden"))
            .await
            .unwrap();

        let mut typed_payload: CreateTask = test_support::new_task(project.id, "Dig");
        typed_payload.due_date = Some("2025-03-01T10:00:00Z".parse().unwrap());
        let typed = to_value(tasks::create_task(&db, &caller, typed_payload).await.unwrap()).unwrap();
        let generic = dispatch(
            &db,
            &caller,
            action(json!({
                "type": "create",
                "model_name": "Task",
                "data": {
                    "title": "Dig",
                    "description": "",
                    "project_id": project.id,
                    "due_date": "2025-03-01T10:00:00Z",
                },
            })),
        )
        .await
        .unwrap();

        assert_eq!(comparable(typed.clone()), comparable(generic.clone()));
        let typed_keys: Vec<_> = typed.as_object().unwrap().keys().collect();
        let generic_keys: Vec<_> = generic.as_object().unwrap().keys().collect();
        assert_eq!(typed_keys, generic_keys);
        assert_eq!(generic["llm_context"]["source"], json!("agent"));
    }

    #[tokio::test]
    async fn task_owner_is_project_owner_on_every_path() {
        let db = test_support::db().await;
        let admin = test_support::user(&db, "admin@example.com", true).await;
        let alice = test_support::user(&db, "alice@example.com", false).await;
        let project = projects::create_project(
            &db,
            &test_support::agent(&admin),
            db::models::project::CreateProject {
                owner_id: Some(alice.id),
                ..test_support::new_project("Garden")
            },
        )
        .await
        .unwrap();

        let created = dispatch(
            &db,
            &test_support::agent(&admin),
            action(json!({
                "type": "create",
                "model_name": "task",
                "data": {"title": "Dig", "description": "", "project_id": project.id, "owner_id": admin.id},
            })),
        )
        .await
        .unwrap();
        assert_eq!(created["owner_id"], json!(alice.id));
    }

    #[tokio::test]
    async fn authorization_outcomes_match_typed_tools() {
        let db = test_support::db().await;
        let alice = test_support::user(&db, "alice@example.com", false).await;
        let bob = test_support::user(&db, "bob@example.com", false).await;
        let project = projects::create_project(&db, &test_support::agent(&alice), test_support::new_project("Garden"))
            .await
            .unwrap();
        let bob = test_support::agent(&bob);

        let typed = projects::get_project(&db, &bob, project.id).await.unwrap_err();
        let generic = dispatch(
            &db,
            &bob,
            action(json!({"type": "read", "model_name": "project", "id": project.id})),
        )
        .await
        .unwrap_err();
        assert_eq!(typed.kind(), "forbidden");
        assert_eq!(generic.kind(), typed.kind());

        let generic = dispatch(
            &db,
            &bob,
            action(json!({"type": "delete", "model_name": "project", "id": project.id + 100})),
        )
        .await
        .unwrap_err();
        assert_eq!(generic.kind(), "not_found");
    }

    #[tokio::test]
    async fn query_scopes_filters_and_caps() {
        let db = test_support::db().await;
        let alice = test_support::user(&db, "alice@example.com", false).await;
        let carol = test_support::user(&db, "carol@example.com", false).await;
        let alices = test_support::agent(&alice);
        let carols = test_support::agent(&carol);

        let garden = projects::create_project(&db, &alices, test_support::new_project("Garden"))
            .await
            .unwrap();
        let kitchen = projects::create_project(&db, &carols, test_support::new_project("Kitchen"))
            .await
            .unwrap();
        let own_todo = tasks::create_task(&db, &alices, test_support::new_task(garden.id, "Dig"))
            .await
            .unwrap();
        let mut done = test_support::new_task(garden.id, "Plant");
        done.status = Some(db::models::task::TaskStatus::Done);
        tasks::create_task(&db, &alices, done).await.unwrap();
        let mut assigned = test_support::new_task(kitchen.id, "Wash");
        assigned.assignee_ids = Some(vec![alice.id]);
        let assigned = tasks::create_task(&db, &carols, assigned).await.unwrap();
        tasks::create_task(&db, &carols, test_support::new_task(kitchen.id, "Dry"))
            .await
            .unwrap();

        let query = |limit: Value| {
            action(json!({
                "type": "query",
                "model_name": "task",
                "filters": {"status": "TODO"},
                "limit": limit,
            }))
        };
        let found = dispatch(&db, &alices, query(Value::Null)).await.unwrap();
        let ids: Vec<i64> = found
            .as_array()
            .unwrap()
            .iter()
            .map(|task| task["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![own_todo.id, assigned.id]);

        let capped = dispatch(&db, &alices, query(json!(1))).await.unwrap();
        assert_eq!(capped.as_array().unwrap().len(), 1);

        let everything = dispatch(&db, &Caller::agent(Actor { is_staff: true, ..Actor::anonymous() }), query(Value::Null))
            .await
            .unwrap();
        assert_eq!(everything.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rejects_unknown_models_and_managed_keys() {
        let db = test_support::db().await;
        let alice = test_support::user(&db, "alice@example.com", false).await;
        let caller = test_support::agent(&alice);

        let err = dispatch(&db, &caller, action(json!({"type": "query", "model_name": "user"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = dispatch(
            &db,
            &caller,
            action(json!({"type": "create", "model_name": "tag", "data": {"name": "x", "id": 5}})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let project = projects::create_project(&db, &caller, test_support::new_project("Garden"))
            .await
            .unwrap();
        let task = tasks::create_task(&db, &caller, test_support::new_task(project.id, "Dig"))
            .await
            .unwrap();
        let err = dispatch(
            &db,
            &caller,
            action(json!({"type": "update", "model_name": "task", "id": task.id, "data": {"project_id": project.id}})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = dispatch(
            &db,
            &caller,
            action(json!({"type": "update", "model_name": "task", "id": task.id, "data": {"priority": "SOMEDAY"}})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn delete_then_query_hides_record() {
        let db = test_support::db().await;
        let alice = test_support::user(&db, "alice@example.com", false).await;
        let caller = test_support::agent(&alice);
        let created = dispatch(
            &db,
            &caller,
            action(json!({"type": "create", "model_name": "TAG", "data": {"name": "home"}})),
        )
        .await
        .unwrap();
        let id = created["id"].as_i64().unwrap();
        assert_eq!(created["color"], json!("#000000"));

        let deleted = dispatch(
            &db,
            &caller,
            action(json!({"type": "delete", "model_name": "tag", "id": id})),
        )
        .await
        .unwrap();
        assert_eq!(deleted, json!({"deleted": true, "tag_id": id}));

        let found = dispatch(
            &db,
            &caller,
            action(json!({"type": "query", "model_name": "tag", "filters": {"name": "home"}})),
        )
        .await
        .unwrap();
        assert_eq!(found, json!([]));
    }

    #[tokio::test]
    async fn update_changes_fields_and_keeps_custom_context() {
        let db = test_support::db().await;
        let alice = test_support::user(&db, "alice@example.com", false).await;
        let caller = test_support::agent(&alice);
        let project = projects::create_project(&db, &caller, test_support::new_project("Garden"))
            .await
            .unwrap();
        let created = dispatch(
            &db,
            &caller,
            action(json!({
                "type": "create",
                "model_name": "task",
                "data": {
                    "title": "Dig",
                    "description": "",
                    "project_id": project.id,
                    "llm_context": {"agent_run": "r-1"},
                },
            })),
        )
        .await
        .unwrap();
        let id = created["id"].as_i64().unwrap();

        let updated = dispatch(
            &db,
            &caller,
            action(json!({
                "type": "update",
                "model_name": "task",
                "id": id,
                "data": {
                    "status": "IN_PROGRESS",
                    "estimated_hours": 2.5,
                    "llm_notes": "Started digging",
                    "llm_context": {"confidence": 0.9},
                },
            })),
        )
        .await
        .unwrap();
        assert_eq!(updated["title"], json!("Dig"));
        assert_eq!(updated["status"], json!("IN_PROGRESS"));
        assert_eq!(updated["estimated_hours"], json!(2.5));
        let context = &updated["llm_context"];
        assert_eq!(context["last_action"], json!("update"));
        assert_eq!(context["source"], json!("agent"));
        assert_eq!(context["summary_text"], json!("Started digging"));
        assert_eq!(context["agent_run"], json!("r-1"));
        assert_eq!(context["confidence"], json!(0.9));

        let renamed = dispatch(
            &db,
            &caller,
            action(json!({"type": "update", "model_name": "task", "id": id, "data": {"title": "Dig deeper"}})),
        )
        .await
        .unwrap();
        assert_eq!(renamed["title"], json!("Dig deeper"));
        assert_eq!(renamed["status"], json!("IN_PROGRESS"));
        assert_eq!(renamed["llm_context"]["agent_run"], json!("r-1"));
        assert_eq!(renamed["llm_context"]["confidence"], json!(0.9));
        assert_eq!(renamed["llm_context"]["summary_text"], json!("Started digging"));
    }

    #[tokio::test]
    async fn writes_by_non_owner_are_forbidden_on_both_paths() {
        let db = test_support::db().await;
        let alice = test_support::user(&db, "alice@example.com", false).await;
        let bob = test_support::user(&db, "bob@example.com", false).await;
        let alices = test_support::agent(&alice);
        let bobs = test_support::agent(&bob);
        let project = projects::create_project(&db, &alices, test_support::new_project("Garden"))
            .await
            .unwrap();
        let task = tasks::create_task(&db, &alices, test_support::new_task(project.id, "Dig"))
            .await
            .unwrap();
        let task_id = task.task.id;

        let typed = tasks::update_task(
            &db,
            &bobs,
            task_id,
            UpdateTask {
                title: Some("Mine now".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        let generic = dispatch(
            &db,
            &bobs,
            action(json!({"type": "update", "model_name": "task", "id": task_id, "data": {"title": "Mine now"}})),
        )
        .await
        .unwrap_err();
        assert_eq!(typed.kind(), "forbidden");
        assert_eq!(generic.kind(), typed.kind());

        let typed = tasks::delete_task(&db, &bobs, task_id).await.unwrap_err();
        let generic = dispatch(
            &db,
            &bobs,
            action(json!({"type": "delete", "model_name": "task", "id": task_id})),
        )
        .await
        .unwrap_err();
        assert_eq!(typed.kind(), "forbidden");
        assert_eq!(generic.kind(), typed.kind());

        let generic = dispatch(
            &db,
            &bobs,
            action(json!({"type": "delete", "model_name": "project", "id": project.id})),
        )
        .await
        .unwrap_err();
        assert_eq!(generic.kind(), "forbidden");

        let unchanged = tasks::get_task(&db, &alices, task_id).await.unwrap();
        assert_eq!(unchanged.task.title, "Dig");
        assert!(!unchanged.task.deleted);
        assert!(projects::get_project(&db, &alices, project.id).await.is_ok());
    }

    #[tokio::test]
    async fn relation_ids_attach_on_create_and_replace_on_update() {
        let db = test_support::db().await;
        let alice = test_support::user(&db, "alice@example.com", false).await;
        let carol = test_support::user(&db, "carol@example.com", false).await;
        let alices = test_support::agent(&alice);
        let carols = test_support::agent(&carol);

        let mut tag_ids = Vec::new();
        for name in ["urgent", "later"] {
            let tag = dispatch(
                &db,
                &alices,
                action(json!({"type": "create", "model_name": "tag", "data": {"name": name}})),
            )
            .await
            .unwrap();
            tag_ids.push(tag["id"].as_i64().unwrap());
        }
        let (urgent, later) = (tag_ids[0], tag_ids[1]);

        let project = dispatch(
            &db,
            &alices,
            action(json!({
                "type": "create",
                "model_name": "project",
                "data": {"title": "Garden", "description": "", "tag_ids": [urgent]},
            })),
        )
        .await
        .unwrap();
        assert_eq!(project["tag_ids"], json!([urgent]));
        let project_id = project["id"].as_i64().unwrap();

        let task = dispatch(
            &db,
            &alices,
            action(json!({
                "type": "create",
                "model_name": "task",
                "data": {
                    "title": "Dig",
                    "description": "",
                    "project_id": project_id,
                    "assignee_ids": [carol.id],
                    "tag_ids": [later, urgent],
                },
            })),
        )
        .await
        .unwrap();
        let task_id = task["id"].as_i64().unwrap();
        assert_eq!(task["assignee_ids"], json!([carol.id]));
        assert_eq!(task["tag_ids"], json!([urgent, later]));

        let seen = dispatch(
            &db,
            &carols,
            action(json!({"type": "read", "model_name": "task", "id": task_id})),
        )
        .await
        .unwrap();
        assert_eq!(seen["id"], json!(task_id));
        let found = dispatch(
            &db,
            &alices,
            action(json!({"type": "query", "model_name": "task", "filters": {"tag_ids": later}})),
        )
        .await
        .unwrap();
        assert_eq!(found.as_array().unwrap().len(), 1);

        let updated = dispatch(
            &db,
            &alices,
            action(json!({
                "type": "update",
                "model_name": "task",
                "id": task_id,
                "data": {"assignee_ids": [], "tag_ids": [later]},
            })),
        )
        .await
        .unwrap();
        assert_eq!(updated["assignee_ids"], json!([]));
        assert_eq!(updated["tag_ids"], json!([later]));
        let err = dispatch(
            &db,
            &carols,
            action(json!({"type": "read", "model_name": "task", "id": task_id})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "forbidden");

        let err = dispatch(
            &db,
            &alices,
            action(json!({
                "type": "create",
                "model_name": "task",
                "data": {"title": "Rake", "description": "", "project_id": project_id, "tag_ids": [404]},
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "validation");
        let all = dispatch(&db, &alices, action(json!({"type": "query", "model_name": "task"})))
            .await
            .unwrap();
        assert_eq!(all.as_array().unwrap().len(), 1);
    }
}
