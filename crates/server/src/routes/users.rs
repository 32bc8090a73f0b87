use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::get,
};
use db::{
    DBService,
    models::user::{CreateUser, UpdateUser, User},
};
use services::services::{
    access::Caller,
    results::{DeleteConfirmation, Page},
    users,
};

use crate::{
    error::{ApiError, ApiJson, ApiPath},
    response::ApiResponse,
};

pub fn router() -> Router<DBService> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user)
                .put(update_user)
                .patch(update_user)
                .delete(delete_user),
        )
}

pub async fn list_users(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
) -> Result<ResponseJson<ApiResponse<Page<User>>>, ApiError> {
    let results = users::list_users(&db, &caller).await?;
    let count = results.len() as i64;
    Ok(ResponseJson(ApiResponse::success(Page { count, results })))
}

pub async fn create_user(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiJson(payload): ApiJson<CreateUser>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<User>>), ApiError> {
    let user = users::create_user(&db, &caller, payload).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(user))))
}

pub async fn get_user(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let user = users::get_user(&db, &caller, id).await?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

pub async fn update_user(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<UpdateUser>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let user = users::update_user(&db, &caller, id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

pub async fn delete_user(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
) -> Result<ResponseJson<ApiResponse<DeleteConfirmation>>, ApiError> {
    let deleted = users::delete_user(&db, &caller, id).await?;
    Ok(ResponseJson(ApiResponse::success(deleted)))
}
