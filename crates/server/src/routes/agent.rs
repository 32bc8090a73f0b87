use axum::{
    Extension, Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::DBService;
use serde_json::Value;
use services::services::{
    access::Caller,
    audit,
    orm::{self, OrmAction},
    schema::EntityKind,
};

use crate::{
    error::{ApiError, ApiJson, ApiPath},
    response::ApiResponse,
};

pub fn router() -> Router<DBService> {
    Router::new()
        .route("/agent/orm", post(orm_action))
        .route("/audit/{model_name}/{id}", get(audit_record))
}

/// The generic dispatcher, acting for the authenticated user with agent provenance.
pub async fn orm_action(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiJson(action): ApiJson<OrmAction>,
) -> Result<ResponseJson<ApiResponse<Value>>, ApiError> {
    let result = orm::dispatch(&db, &Caller::agent(caller.actor), action).await?;
    Ok(ResponseJson(ApiResponse::success(result)))
}

pub async fn audit_record(
    State(db): State<DBService>,
    Extension(caller): Extension<Caller>,
    ApiPath((model_name, id)): ApiPath<(String, i64)>,
) -> Result<ResponseJson<ApiResponse<Value>>, ApiError> {
    let kind = EntityKind::from_model_name(&model_name)?;
    let record = audit::fetch_record(&db, &caller, kind, id).await?;
    Ok(ResponseJson(ApiResponse::success(record)))
}
