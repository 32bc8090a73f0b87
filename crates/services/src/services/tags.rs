use db::{
    DBService,
    models::tag::{CreateTag, Tag, TagFilter, UpdateTag},
};
use schemars::JsonSchema;
use serde::Deserialize;

use super::{
    access::Caller,
    error::EntityError,
    results::{DeleteConfirmation, Page},
    validation,
};

const ENTITY: &str = "Tag";

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct TagQuery {
    /// Case-insensitive substring of the tag name.
    #[serde(alias = "name")]
    pub name_contains: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn validate_fields(name: Option<&str>, color: Option<&str>) -> Result<(), EntityError> {
    if let Some(name) = name {
        validation::required_text("name", name, validation::MAX_TAG_NAME_LEN)?;
    }
    if let Some(color) = color {
        validation::color(color)?;
    }
    Ok(())
}

// Tags carry no owner: any caller may manage them.

pub async fn create_tag(
    db: &DBService,
    _caller: &Caller,
    payload: CreateTag,
) -> Result<Tag, EntityError> {
    validate_fields(Some(&payload.name), payload.color.as_deref())?;
    let tag = Tag::create(&db.pool, &payload).await?;
    tracing::debug!(tag_id = tag.id, "Created tag");
    Ok(tag)
}

pub async fn get_tag(db: &DBService, _caller: &Caller, id: i64) -> Result<Tag, EntityError> {
    Tag::find_by_id(&db.pool, id)
        .await?
        .ok_or_else(|| EntityError::not_found(ENTITY, id))
}

pub async fn list_tags(
    db: &DBService,
    _caller: &Caller,
    query: &TagQuery,
) -> Result<Page<Tag>, EntityError> {
    validation::page(query.limit, query.offset)?;
    let filter = TagFilter {
        name_contains: query.name_contains.clone(),
        limit: query.limit,
        offset: query.offset,
    };
    let mut conn = db.pool.acquire().await?;
    let count = Tag::count_filtered(&mut *conn, &filter).await?;
    let results = Tag::find_filtered(&mut *conn, &filter).await?;
    Ok(Page { count, results })
}

pub async fn update_tag(
    db: &DBService,
    _caller: &Caller,
    id: i64,
    payload: UpdateTag,
) -> Result<Tag, EntityError> {
    validate_fields(payload.name.as_deref(), payload.color.as_deref())?;
    let mut tx = db.pool.begin().await?;
    let mut tag = Tag::lock_for_update(&mut tx, id)
        .await?
        .ok_or_else(|| EntityError::not_found(ENTITY, id))?;
    if let Some(name) = payload.name {
        tag.name = name;
    }
    if let Some(color) = payload.color {
        tag.color = color;
    }
    let tag = Tag::save(&mut *tx, &tag).await?;
    tx.commit().await?;
    Ok(tag)
}

/// Hard delete.
pub async fn delete_tag(
    db: &DBService,
    _caller: &Caller,
    id: i64,
) -> Result<DeleteConfirmation, EntityError> {
    if Tag::delete(&db.pool, id).await? == 0 {
        return Err(EntityError::not_found(ENTITY, id));
    }
    tracing::debug!(tag_id = id, "Deleted tag");
    Ok(DeleteConfirmation::new("tag", id))
}
