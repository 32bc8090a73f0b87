use axum::{Router, middleware::from_fn_with_state, routing::get};
use db::DBService;
use tower_http::trace::TraceLayer;

use crate::middleware::require_user;

pub mod agent;
pub mod comments;
pub mod health;
pub mod projects;
pub mod tags;
pub mod tasks;
pub mod users;

pub fn router(db: DBService) -> Router {
    // Everything except the health check needs an authenticated user
    let authenticated = Router::new()
        .merge(projects::router())
        .merge(tasks::router())
        .merge(tags::router())
        .merge(comments::router())
        .merge(users::router())
        .merge(agent::router())
        .layer(from_fn_with_state(db.clone(), require_user));

    let base_routes = Router::new()
        .route("/health", get(health::health_check))
        .merge(authenticated)
        .with_state(db);

    Router::new()
        .nest("/api", base_routes)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use db::models::user::{CreateUser, User};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::middleware::USER_ID_HEADER;

    async fn app() -> (Router, DBService) {
        let db = DBService::new_in_memory().await.unwrap();
        (router(db.clone()), db)
    }

    async fn user(db: &DBService, email: &str, is_staff: bool) -> User {
        User::create(
            &db.pool,
            &CreateUser {
                email: email.to_string(),
                first_name: None,
                last_name: None,
                is_staff: Some(is_staff),
                is_active: None,
            },
        )
        .await
        .unwrap()
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        user_id: Option<i64>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user_id {
            builder = builder.header(USER_ID_HEADER, user_id.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn identity_header_is_required() {
        let (app, db) = app().await;
        let alice = user(&db, "alice@example.com", false).await;

        let (status, body) = send(&app, "GET", "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!("OK"));

        let (status, body) = send(&app, "GET", "/api/projects", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], json!(false));
        let (status, _) = send(&app, "GET", "/api/projects", Some(alice.id + 50), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut inactive = alice.clone();
        inactive.is_active = false;
        User::save(&db.pool, &inactive).await.unwrap();
        let (status, _) = send(&app, "GET", "/api/projects", Some(alice.id), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn project_lifecycle_over_rest() {
        let (app, db) = app().await;
        let alice = user(&db, "alice@example.com", false).await;
        let bob = user(&db, "bob@example.com", false).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/projects",
            Some(alice.id),
            Some(json!({"title": "Garden", "description": "Beds", "deadline": "2025-06-01"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let project = &body["data"];
        let id = project["id"].as_i64().unwrap();
        assert_eq!(project["owner_id"], json!(alice.id));
        assert_eq!(project["tag_ids"], json!([]));
        assert_eq!(project["llm_context"]["source"], json!("api"));

        let uri = format!("/api/projects/{id}");
        let (status, _) = send(&app, "GET", &uri, Some(bob.id), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = send(&app, "GET", "/api/projects", Some(bob.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!({"count": 0, "results": []}));

        let (status, body) = send(&app, "PATCH", &uri, Some(alice.id), Some(json!({"deadline": null}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deadline"], Value::Null);
        assert_eq!(body["data"]["title"], json!("Garden"));

        let (status, body) = send(&app, "DELETE", &uri, Some(alice.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!({"deleted": true, "project_id": id}));
        let (status, _) = send(&app, "GET", &uri, Some(alice.id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_input_maps_to_client_errors() {
        let (app, db) = app().await;
        let alice = user(&db, "alice@example.com", false).await;

        let (status, body) = send(&app, "POST", "/api/projects", Some(alice.id), Some(json!({"description": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));

        let (status, _) = send(&app, "GET", "/api/projects/abc", Some(alice.id), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", "/api/tasks?status=SOMEDAY", Some(alice.id), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let tag = json!({"name": "urgent", "color": "#FF0000"});
        let (status, _) = send(&app, "POST", "/api/tags", Some(alice.id), Some(tag.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(&app, "POST", "/api/tags", Some(alice.id), Some(tag)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn orm_endpoint_and_audit_trail() {
        let (app, db) = app().await;
        let admin = user(&db, "admin@example.com", true).await;
        let alice = user(&db, "alice@example.com", false).await;

        let (_, body) = send(
            &app,
            "POST",
            "/api/agent/orm",
            Some(alice.id),
            Some(json!({"type": "create", "model_name": "project", "data": {"title": "Garden", "description": ""}})),
        )
        .await;
        let project_id = body["data"]["id"].as_i64().unwrap();
        assert_eq!(body["data"]["llm_context"]["source"], json!("agent"));

        let (status, body) = send(
            &app,
            "POST",
            "/api/tasks",
            Some(alice.id),
            Some(json!({"title": "Dig", "description": "", "project_id": project_id, "priority": "HIGH"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let task_id = body["data"]["id"].as_i64().unwrap();

        let (status, body) = send(
            &app,
            "POST",
            "/api/agent/orm",
            Some(alice.id),
            Some(json!({"type": "query", "model_name": "Task", "filters": {"priority": "HIGH"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["id"], json!(task_id));

        let (status, _) = send(
            &app,
            "POST",
            "/api/agent/orm",
            Some(alice.id),
            Some(json!({"type": "query", "model_name": "user"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        send(&app, "DELETE", &format!("/api/tasks/{task_id}"), Some(alice.id), None).await;
        let audit_uri = format!("/api/audit/task/{task_id}");
        let (status, _) = send(&app, "GET", &audit_uri, Some(alice.id), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = send(&app, "GET", &audit_uri, Some(admin.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deleted"], json!(true));
    }

    #[tokio::test]
    async fn users_are_staff_managed() {
        let (app, db) = app().await;
        let admin = user(&db, "admin@example.com", true).await;
        let alice = user(&db, "alice@example.com", false).await;

        let (status, _) = send(&app, "GET", "/api/users", Some(alice.id), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = send(&app, "GET", "/api/users", Some(admin.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["count"], json!(2));

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/users/{}", alice.id),
            Some(alice.id),
            Some(json!({"first_name": "Alice"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["first_name"], json!("Alice"));

        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/api/users/{}", alice.id),
            Some(alice.id),
            Some(json!({"is_staff": true})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let unchanged = User::find_by_id(&db.pool, alice.id).await.unwrap().unwrap();
        assert!(!unchanged.is_staff);
    }
}
