use std::sync::LazyLock;

use db::models::{tag::Tag, user::User};
use regex::Regex;
use sqlx::SqliteConnection;

use super::error::EntityError;

pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_CATEGORY_LEN: usize = 100;
pub const MAX_TAG_NAME_LEN: usize = 50;
pub const MAX_ESTIMATED_HOURS: f64 = 999.99;

static HEX_COLOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("hex color pattern compiles"));

pub fn max_len(field: &str, value: &str, max: usize) -> Result<(), EntityError> {
    if value.chars().count() > max {
        return Err(EntityError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

pub fn required_text(field: &str, value: &str, max: usize) -> Result<(), EntityError> {
    if value.trim().is_empty() {
        return Err(EntityError::validation(format!("{field} must not be blank")));
    }
    max_len(field, value, max)
}

pub fn title(value: &str) -> Result<(), EntityError> {
    required_text("title", value, MAX_TITLE_LEN)
}

pub fn color(value: &str) -> Result<(), EntityError> {
    if !HEX_COLOR.is_match(value) {
        return Err(EntityError::validation(format!(
            "color '{value}' must be a hex string like #1A2B3C"
        )));
    }
    Ok(())
}

/// Range-check and round to two decimal places.
pub fn estimated_hours(value: f64) -> Result<f64, EntityError> {
    let rounded = (value * 100.0).round() / 100.0;
    if !rounded.is_finite() || !(0.0..=MAX_ESTIMATED_HOURS).contains(&rounded) {
        return Err(EntityError::validation(format!(
            "estimated_hours must be between 0 and {MAX_ESTIMATED_HOURS}"
        )));
    }
    Ok(rounded)
}

pub fn email(value: &str) -> Result<String, EntityError> {
    let trimmed = value.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(trimmed.to_string()),
        _ => Err(EntityError::validation(format!(
            "'{value}' is not a valid email address"
        ))),
    }
}

pub fn page(limit: Option<i64>, offset: Option<i64>) -> Result<(), EntityError> {
    if limit.is_some_and(|l| l < 0) || offset.is_some_and(|o| o < 0) {
        return Err(EntityError::validation("limit and offset must not be negative"));
    }
    Ok(())
}

/// Sorted, de-duplicated copy of a relation id list.
pub fn unique_ids(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

pub async fn ensure_users_exist(
    conn: &mut SqliteConnection,
    field: &str,
    ids: &[i64],
) -> Result<(), EntityError> {
    let found = User::existing_ids(&mut *conn, ids).await?;
    if let Some(missing) = ids.iter().find(|id| !found.contains(id)) {
        return Err(EntityError::validation(format!(
            "{field}: user {missing} does not exist"
        )));
    }
    Ok(())
}

pub async fn ensure_tags_exist(conn: &mut SqliteConnection, ids: &[i64]) -> Result<(), EntityError> {
    let found: Vec<i64> = Tag::find_by_ids(&mut *conn, ids)
        .await?
        .into_iter()
        .map(|tag| tag.id)
        .collect();
    if let Some(missing) = ids.iter().find(|id| !found.contains(id)) {
        return Err(EntityError::validation(format!(
            "tag_ids: tag {missing} does not exist"
        )));
    }
    Ok(())
}
