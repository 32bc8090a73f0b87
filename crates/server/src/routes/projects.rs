use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::get,
};
use db::{
    DBService,
    models::project::{CreateProject, ProjectWithTags, UpdateProject},
};
use services::services::{
    access::Caller,
    projects::{self, ProjectQuery},
    results::{DeleteConfirmation, Page},
};

use crate::{
    error::{ApiError, ApiJson, ApiPath, ApiQuery},
    response::ApiResponse,
};

pub fn router() -> Router<DBService> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/{id}",
            get(get_project)
                .put(update_project)
                .patch(update_project)
                .delete(delete_project),
        )
}

pub async fn list_projects(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiQuery(query): ApiQuery<ProjectQuery>,
) -> Result<ResponseJson<ApiResponse<Page<ProjectWithTags>>>, ApiError> {
    let page = projects::list_projects(&db, &caller, &query).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub async fn create_project(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiJson(payload): ApiJson<CreateProject>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<ProjectWithTags>>), ApiError> {
    let project = projects::create_project(&db, &caller, payload).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(project))))
}

pub async fn get_project(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
) -> Result<ResponseJson<ApiResponse<ProjectWithTags>>, ApiError> {
    let project = projects::get_project(&db, &caller, id).await?;
    Ok(ResponseJson(ApiResponse::success(project)))
}

pub async fn update_project(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<UpdateProject>,
) -> Result<ResponseJson<ApiResponse<ProjectWithTags>>, ApiError> {
    let project = projects::update_project(&db, &caller, id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(project)))
}

pub async fn delete_project(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
) -> Result<ResponseJson<ApiResponse<DeleteConfirmation>>, ApiError> {
    let deleted = projects::delete_project(&db, &caller, id).await?;
    Ok(ResponseJson(ApiResponse::success(deleted)))
}
