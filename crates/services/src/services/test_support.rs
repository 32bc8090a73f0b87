use db::{
    DBService,
    models::{
        project::CreateProject,
        task::CreateTask,
        user::{CreateUser, User},
    },
};

use super::access::{Actor, Caller};

pub async fn db() -> DBService {
    DBService::new_in_memory().await.unwrap()
}

pub async fn user(db: &DBService, email: &str, is_staff: bool) -> User {
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

pub fn agent(user: &User) -> Caller {
    Caller::agent(Actor::from(user))
}

pub fn api(user: &User) -> Caller {
    Caller::api(Actor::from(user))
}

pub fn new_project(title: &str) -> CreateProject {
    CreateProject {
        title: title.to_string(),
        description: format!("{title} description"),
        owner_id: None,
        deadline: None,
        category: None,
        tag_ids: None,
        llm_notes: None,
        llm_context: None,
    }
}

pub fn new_task(project_id: i64, title: &str) -> CreateTask {
    CreateTask {
        title: title.to_string(),
        description: String::new(),
        project_id,
        assignee_ids: None,
        depends_on_id: None,
        priority: None,
        status: None,
        due_date: None,
        estimated_hours: None,
        tag_ids: None,
        llm_notes: None,
        llm_context: None,
    }
}
