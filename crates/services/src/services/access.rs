//! Ownership and visibility rules shared by REST handlers, agent tools and the
//! ORM dispatcher.
//!
//! Staff see and modify everything. Everyone else sees what they own, plus tasks
//! they are assigned to, and may only modify what they own. A denied check on a
//! single record is an error; list queries narrow to the visible set instead.

use db::models::{user::User, visibility::Visibility};
use serde::Serialize;

use super::error::EntityError;

/// The identity a request acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub is_staff: bool,
}

impl Actor {
    /// No user: owns nothing and is not staff.
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            email: None,
            is_staff: false,
        }
    }

    pub fn is_user(&self, user_id: i64) -> bool {
        self.user_id == Some(user_id)
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            user_id: Some(user.id),
            email: Some(user.email.clone()),
            is_staff: user.is_staff,
        }
    }
}

/// Which surface a mutation came through; recorded as `llm_context.source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Agent,
    Api,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Agent => "agent",
            Source::Api => "api",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Caller {
    pub actor: Actor,
    pub source: Source,
}

impl Caller {
    pub fn agent(actor: Actor) -> Self {
        Self {
            actor,
            source: Source::Agent,
        }
    }

    pub fn api(actor: Actor) -> Self {
        Self {
            actor,
            source: Source::Api,
        }
    }
}

/// Update/delete rule for every owned kind.
pub fn can_write(actor: &Actor, owner_id: i64) -> bool {
    actor.is_staff || actor.is_user(owner_id)
}

/// Read rule for projects and comments.
pub fn can_view_owned(actor: &Actor, owner_id: i64) -> bool {
    actor.is_staff || actor.is_user(owner_id)
}

pub fn can_view_task(actor: &Actor, owner_id: i64, assignee_ids: &[i64]) -> bool {
    if actor.is_staff || actor.is_user(owner_id) {
        return true;
    }
    actor
        .user_id
        .is_some_and(|user_id| assignee_ids.contains(&user_id))
}

/// Anyone who can see a task may comment on it.
pub fn can_comment(actor: &Actor, task_owner_id: i64, task_assignee_ids: &[i64]) -> bool {
    can_view_task(actor, task_owner_id, task_assignee_ids)
}

pub fn ensure(allowed: bool, message: impl Into<String>) -> Result<(), EntityError> {
    if allowed {
        Ok(())
    } else {
        Err(EntityError::Forbidden(message.into()))
    }
}

/// The list-time counterpart of the view checks.
pub fn visibility_scope(actor: &Actor, assignable: bool) -> Visibility {
    if actor.is_staff {
        return Visibility::All;
    }
    match actor.user_id {
        Some(user_id) if assignable => Visibility::OwnedOrAssigned(user_id),
        Some(user_id) => Visibility::OwnedBy(user_id),
        None => Visibility::Nothing,
    }
}

/// Only rows the actor owns, whatever their staff flag.
pub fn owned_scope(actor: &Actor) -> Visibility {
    actor.user_id.map_or(Visibility::Nothing, Visibility::OwnedBy)
}
