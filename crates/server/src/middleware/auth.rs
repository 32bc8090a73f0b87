use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use db::{DBService, models::user::User};
use services::services::access::{Actor, Caller};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Resolve `X-User-Id` to an active user and insert the [`Caller`] extension.
pub async fn require_user(
    State(db): State<DBService>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let raw = request
        .headers()
        .get(USER_ID_HEADER)
        .ok_or_else(|| ApiError::Unauthorized("Missing X-User-Id header".to_string()))?;
    let user_id: i64 = raw
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .ok_or_else(|| ApiError::Unauthorized("X-User-Id must be a numeric user id".to_string()))?;

    let user = match User::find_by_id(&db.pool, user_id).await? {
        Some(user) => user,
        None => {
            tracing::warn!("User {} not found", user_id);
            return Err(ApiError::Unauthorized(format!("Unknown user {user_id}")));
        }
    };
    if !user.is_active {
        tracing::warn!("Inactive user {} rejected", user_id);
        return Err(ApiError::Forbidden("User account is inactive".to_string()));
    }

    request
        .extensions_mut()
        .insert(Caller::api(Actor::from(&user)));
    Ok(next.run(request).await)
}
