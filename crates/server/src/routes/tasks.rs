use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::get,
};
use db::{
    DBService,
    models::task::{CreateTask, TaskWithRelations, UpdateTask},
};
use services::services::{
    access::Caller,
    results::{DeleteConfirmation, Page},
    tasks::{self, TaskQuery},
};

use crate::{
    error::{ApiError, ApiJson, ApiPath, ApiQuery},
    response::ApiResponse,
};

pub fn router() -> Router<DBService> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task)
                .put(update_task)
                .patch(update_task)
                .delete(delete_task),
        )
}

pub async fn list_tasks(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiQuery(query): ApiQuery<TaskQuery>,
) -> Result<ResponseJson<ApiResponse<Page<TaskWithRelations>>>, ApiError> {
    let page = tasks::list_tasks(&db, &caller, &query).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub async fn create_task(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiJson(payload): ApiJson<CreateTask>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<TaskWithRelations>>), ApiError> {
    let task = tasks::create_task(&db, &caller, payload).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(task))))
}

pub async fn get_task(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
) -> Result<ResponseJson<ApiResponse<TaskWithRelations>>, ApiError> {
    let task = tasks::get_task(&db, &caller, id).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn update_task(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<UpdateTask>,
) -> Result<ResponseJson<ApiResponse<TaskWithRelations>>, ApiError> {
    let task = tasks::update_task(&db, &caller, id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn delete_task(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
) -> Result<ResponseJson<ApiResponse<DeleteConfirmation>>, ApiError> {
    let deleted = tasks::delete_task(&db, &caller, id).await?;
    Ok(ResponseJson(ApiResponse::success(deleted)))
}
