use db::{
    DBService,
    models::user::{CreateUser, UpdateUser, User},
};

use super::{
    access::{self, Caller},
    error::EntityError,
    results::DeleteConfirmation,
};
use crate::services::validation;

const ENTITY: &str = "User";

fn ensure_staff(caller: &Caller) -> Result<(), EntityError> {
    access::ensure(caller.actor.is_staff, "Only staff can manage users")
}

fn ensure_self_or_staff(caller: &Caller, id: i64) -> Result<(), EntityError> {
    access::ensure(
        caller.actor.is_staff || caller.actor.is_user(id),
        "You can only access your own account",
    )
}

pub async fn list_users(db: &DBService, caller: &Caller) -> Result<Vec<User>, EntityError> {
    ensure_staff(caller)?;
    Ok(User::find_all(&db.pool).await?)
}

pub async fn get_user(db: &DBService, caller: &Caller, id: i64) -> Result<User, EntityError> {
    ensure_self_or_staff(caller, id)?;
    User::find_by_id(&db.pool, id)
        .await?
        .ok_or_else(|| EntityError::not_found(ENTITY, id))
}

pub async fn create_user(
    db: &DBService,
    caller: &Caller,
    mut payload: CreateUser,
) -> Result<User, EntityError> {
    ensure_staff(caller)?;
    payload.email = validation::email(&payload.email)?;
    let user = User::create(&db.pool, &payload).await?;
    tracing::info!(user_id = user.id, email = %user.email, "Created user");
    Ok(user)
}

pub async fn update_user(
    db: &DBService,
    caller: &Caller,
    id: i64,
    payload: UpdateUser,
) -> Result<User, EntityError> {
    ensure_self_or_staff(caller, id)?;
    if (payload.is_staff.is_some() || payload.is_active.is_some()) && !caller.actor.is_staff {
        return Err(EntityError::Forbidden(
            "Only staff can change is_staff or is_active".to_string(),
        ));
    }

    let mut user = User::find_by_id(&db.pool, id)
        .await?
        .ok_or_else(|| EntityError::not_found(ENTITY, id))?;
    if let Some(email) = payload.email {
        user.email = validation::email(&email)?;
    }
    if let Some(first_name) = payload.first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = payload.last_name {
        user.last_name = last_name;
    }
    if let Some(is_staff) = payload.is_staff {
        user.is_staff = is_staff;
    }
    if let Some(is_active) = payload.is_active {
        user.is_active = is_active;
    }
    Ok(User::save(&db.pool, &user).await?)
}

/// Hard delete; the user's owned records and memberships go with it.
pub async fn delete_user(
    db: &DBService,
    caller: &Caller,
    id: i64,
) -> Result<DeleteConfirmation, EntityError> {
    ensure_staff(caller)?;
    if User::delete(&db.pool, id).await? == 0 {
        return Err(EntityError::not_found(ENTITY, id));
    }
    tracing::info!(user_id = id, "Deleted user");
    Ok(DeleteConfirmation::new("user", id))
}

/// Create the account for `email` as staff, or promote it if it already exists.
pub async fn ensure_bootstrap_admin(db: &DBService, email: &str) -> Result<User, EntityError> {
    let email = validation::email(email)?;
    if let Some(mut user) = User::find_by_email(&db.pool, &email).await? {
        if user.is_staff && user.is_active {
            return Ok(user);
        }
        user.is_staff = true;
        user.is_active = true;
        let user = User::save(&db.pool, &user).await?;
        tracing::info!(user_id = user.id, "Promoted bootstrap admin");
        return Ok(user);
    }
    let user = User::create(
        &db.pool,
        &CreateUser {
            email,
            first_name: None,
            last_name: None,
            is_staff: Some(true),
            is_active: Some(true),
        },
    )
    .await?;
    tracing::info!(user_id = user.id, "Created bootstrap admin");
    Ok(user)
}
