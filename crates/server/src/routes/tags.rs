use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    response::Json as ResponseJson,
    routing::get,
};
use db::{
    DBService,
    models::tag::{CreateTag, Tag, UpdateTag},
};
use services::services::{
    access::Caller,
    tags::{self, TagQuery},
    results::{DeleteConfirmation, Page},
};

use crate::{
    error::{ApiError, ApiJson, ApiPath, ApiQuery},
    response::ApiResponse,
};

pub fn router() -> Router<DBService> {
    Router::new()
        .route("/tags", get(list_tags).post(create_tag))
        .route(
            "/tags/{id}",
            get(get_tag)
                .put(update_tag)
                .patch(update_tag)
                .delete(delete_tag),
        )
}

pub async fn list_tags(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiQuery(query): ApiQuery<TagQuery>,
) -> Result<ResponseJson<ApiResponse<Page<Tag>>>, ApiError> {
    let page = tags::list_tags(&db, &caller, &query).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub async fn create_tag(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiJson(payload): ApiJson<CreateTag>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Tag>>), ApiError> {
    let tag = tags::create_tag(&db, &caller, payload).await?;
    Ok((StatusCode::CREATED, ResponseJson(ApiResponse::success(tag))))
}

pub async fn get_tag(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
) -> Result<ResponseJson<ApiResponse<Tag>>, ApiError> {
    let tag = tags::get_tag(&db, &caller, id).await?;
    Ok(ResponseJson(ApiResponse::success(tag)))
}

pub async fn update_tag(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<UpdateTag>,
) -> Result<ResponseJson<ApiResponse<Tag>>, ApiError> {
    let tag = tags::update_tag(&db, &caller, id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(tag)))
}

pub async fn delete_tag(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<i64>,
) -> Result<ResponseJson<ApiResponse<DeleteConfirmation>>, ApiError> {
    let deleted = tags::delete_tag(&db, &caller, id).await?;
    Ok(ResponseJson(ApiResponse::success(deleted)))
}
