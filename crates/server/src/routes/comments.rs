use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::get,
};
use db::{
    DBService,
    models::comment::{Comment, CreateComment, UpdateComment},
};
use services::services::{
    access::Caller,
    comments::{self, CommentQuery},
    results::{DeleteConfirmation, Page},
};

use crate::{
    error::{ApiError, ApiJson, ApiPath, ApiQuery},
    response::ApiResponse,
};

pub fn router() -> Router<DBService> {
    Router::new()
        .route("/comments", get(list_comments).post(create_comment))
        .route(
            "/comments/{id}",
            get(get_comment)
                .put(update_comment)
                .patch(update_comment)
                .delete(delete_comment),
        )
}

pub async fn list_comments(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiQuery(query): ApiQuery<CommentQuery>,
) -> Result<ResponseJson<ApiResponse<Page<Comment>>>, ApiError> {
    let page = comments::list_comments(&db, &caller, &query).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub async fn create_comment(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiJson(payload): ApiJson<CreateComment>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Comment>>), ApiError> {
    let comment = comments::create_comment(&db, &caller, payload).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(comment))))
}

pub async fn get_comment(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
) -> Result<ResponseJson<ApiResponse<Comment>>, ApiError> {
    let comment = comments::get_comment(&db, &caller, id).await?;
    Ok(ResponseJson(ApiResponse::success(comment)))
}

pub async fn update_comment(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<UpdateComment>,
) -> Result<ResponseJson<ApiResponse<Comment>>, ApiError> {
    let comment = comments::update_comment(&db, &caller, id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(comment)))
}

pub async fn delete_comment(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
) -> Result<ResponseJson<ApiResponse<DeleteConfirmation>>, ApiError> {
    let deleted = comments::delete_comment(&db, &caller, id).await?;
    Ok(ResponseJson(ApiResponse::success(deleted)))
}
