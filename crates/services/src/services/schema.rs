//! Static field descriptors for the kinds the ORM dispatcher may touch.

use std::str::FromStr;

use db::{
    models::{
        link::{LinkTable, PROJECT_TAGS, TASK_ASSIGNEES, TASK_TAGS},
        record_query::{Condition, FieldValue},
        task::{TaskPriority, TaskStatus},
    },
    serde_helpers::parse_flexible_datetime,
};
use serde_json::{Map, Value};
use strum::VariantNames;

use super::error::EntityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Project,
    Task,
    Tag,
    Comment,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Project,
        EntityKind::Task,
        EntityKind::Tag,
        EntityKind::Comment,
    ];

    /// Case-insensitive lookup against the allow-list.
    pub fn from_model_name(name: &str) -> Result<Self, EntityError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.model_name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| EntityError::validation(format!("model not allowed: '{name}'")))
    }

    pub fn model_name(&self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Task => "task",
            EntityKind::Tag => "tag",
            EntityKind::Comment => "comment",
        }
    }

    pub fn entity_name(&self) -> &'static str {
        match self {
            EntityKind::Project => "Project",
            EntityKind::Task => "Task",
            EntityKind::Tag => "Tag",
            EntityKind::Comment => "Comment",
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        match self {
            EntityKind::Project => &PROJECT,
            EntityKind::Task => &TASK,
            EntityKind::Tag => &TAG,
            EntityKind::Comment => &COMMENT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Integer,
    Real,
    Text,
    Bool,
    DateTime,
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarType),
    /// `<name>_id` column pointing at another table.
    ToOne,
    /// `<name>_ids`, stored in a join table.
    ToMany(LinkTable),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccess {
    /// Managed by the store.
    ReadOnly,
    /// Settable on create, rejected on update.
    CreateOnly,
    Writable,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub access: FieldAccess,
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub ownable: bool,
    pub assignable: Option<LinkTable>,
    pub soft_delete: bool,
}

#[derive(Debug)]
pub struct EntitySchema {
    pub table: &'static str,
    pub capabilities: Capabilities,
    pub fields: &'static [FieldDescriptor],
}

/// Accepted in `data` but never stored as columns.
pub const METADATA_FIELDS: [&str; 2] = ["llm_notes", "llm_context"];

const fn field(
    name: &'static str,
    kind: FieldKind,
    access: FieldAccess,
    nullable: bool,
) -> FieldDescriptor {
    FieldDescriptor {
        name,
        kind,
        access,
        nullable,
    }
}

const ID: FieldDescriptor = field("id", FieldKind::Scalar(ScalarType::Integer), FieldAccess::ReadOnly, false);
const DELETED: FieldDescriptor = field("deleted", FieldKind::Scalar(ScalarType::Bool), FieldAccess::ReadOnly, false);
const CREATED: FieldDescriptor = field("created", FieldKind::Scalar(ScalarType::DateTime), FieldAccess::ReadOnly, false);
const UPDATED: FieldDescriptor = field("updated", FieldKind::Scalar(ScalarType::DateTime), FieldAccess::ReadOnly, false);
const TITLE: FieldDescriptor = field("title", FieldKind::Scalar(ScalarType::Text), FieldAccess::Writable, false);
const DESCRIPTION: FieldDescriptor = field("description", FieldKind::Scalar(ScalarType::Text), FieldAccess::Writable, false);
const OWNER: FieldDescriptor = field("owner_id", FieldKind::ToOne, FieldAccess::Writable, false);

static PROJECT: EntitySchema = EntitySchema {
    table: "projects",
    capabilities: Capabilities {
        ownable: true,
        assignable: None,
        soft_delete: true,
    },
    fields: &[
        ID,
        TITLE,
        DESCRIPTION,
        OWNER,
        field("deadline", FieldKind::Scalar(ScalarType::DateTime), FieldAccess::Writable, true),
        field("category", FieldKind::Scalar(ScalarType::Text), FieldAccess::Writable, false),
        field("tag_ids", FieldKind::ToMany(PROJECT_TAGS), FieldAccess::Writable, false),
        DELETED,
        CREATED,
        UPDATED,
    ],
};

static TASK: EntitySchema = EntitySchema {
    table: "tasks",
    capabilities: Capabilities {
        ownable: true,
        assignable: Some(TASK_ASSIGNEES),
        soft_delete: true,
    },
    fields: &[
        ID,
        TITLE,
        DESCRIPTION,
        OWNER,
        field("project_id", FieldKind::ToOne, FieldAccess::CreateOnly, false),
        field("depends_on_id", FieldKind::ToOne, FieldAccess::Writable, true),
        field(
            "priority",
            FieldKind::Scalar(ScalarType::Enum(TaskPriority::VARIANTS)),
            FieldAccess::Writable,
            false,
        ),
        field(
            "status",
            FieldKind::Scalar(ScalarType::Enum(TaskStatus::VARIANTS)),
            FieldAccess::Writable,
            false,
        ),
        field("due_date", FieldKind::Scalar(ScalarType::DateTime), FieldAccess::Writable, true),
        field("estimated_hours", FieldKind::Scalar(ScalarType::Real), FieldAccess::Writable, true),
        field("assignee_ids", FieldKind::ToMany(TASK_ASSIGNEES), FieldAccess::Writable, false),
        field("tag_ids", FieldKind::ToMany(TASK_TAGS), FieldAccess::Writable, false),
        DELETED,
        CREATED,
        UPDATED,
    ],
};

static TAG: EntitySchema = EntitySchema {
    table: "tags",
    capabilities: Capabilities {
        ownable: false,
        assignable: None,
        soft_delete: false,
    },
    fields: &[
        ID,
        field("name", FieldKind::Scalar(ScalarType::Text), FieldAccess::Writable, false),
        field("color", FieldKind::Scalar(ScalarType::Text), FieldAccess::Writable, false),
    ],
};

static COMMENT: EntitySchema = EntitySchema {
    table: "comments",
    capabilities: Capabilities {
        ownable: true,
        assignable: None,
        soft_delete: true,
    },
    fields: &[
        ID,
        TITLE,
        DESCRIPTION,
        OWNER,
        field("task_id", FieldKind::ToOne, FieldAccess::CreateOnly, false),
        DELETED,
        CREATED,
        UPDATED,
    ],
};

/// Whether a payload is for a create or an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Reject keys that are unknown, managed, or create-only on update.
    pub fn check_data_keys(
        &self,
        model_name: &str,
        data: &Map<String, Value>,
        mode: WriteMode,
    ) -> Result<(), EntityError> {
        for key in data.keys() {
            if METADATA_FIELDS.contains(&key.as_str()) {
                continue;
            }
            let Some(field) = self.field(key) else {
                return Err(EntityError::validation(format!(
                    "'{key}' is not a field of {model_name}"
                )));
            };
            match (field.access, mode) {
                (FieldAccess::ReadOnly, _) => {
                    return Err(EntityError::validation(format!(
                        "'{key}' is managed by the store and cannot be set"
                    )));
                }
                (FieldAccess::CreateOnly, WriteMode::Update) => {
                    return Err(EntityError::validation(format!(
                        "'{key}' cannot be changed after creation"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Turn caller filters into typed store conditions.
    pub fn conditions(
        &self,
        model_name: &str,
        filters: &Map<String, Value>,
    ) -> Result<Vec<Condition>, EntityError> {
        filters
            .iter()
            .map(|(key, value)| {
                let field = self.field(key).ok_or_else(|| {
                    EntityError::validation(format!("cannot filter {model_name} by '{key}'"))
                })?;
                field.condition(value)
            })
            .collect()
    }
}

impl FieldDescriptor {
    fn invalid(&self, expected: &str, value: &Value) -> EntityError {
        EntityError::validation(format!(
            "filter '{}' expects {expected}, got {value}",
            self.name
        ))
    }

    fn condition(&self, value: &Value) -> Result<Condition, EntityError> {
        match (self.kind, value) {
            (FieldKind::ToMany(_), Value::Null) => Err(self.invalid("a user or tag id", value)),
            (_, Value::Null) if self.nullable => Ok(Condition::IsNull(self.name)),
            (_, Value::Null) => Err(EntityError::validation(format!(
                "'{}' is never null",
                self.name
            ))),
            (FieldKind::ToMany(link), value) => {
                let id = integer(value).ok_or_else(|| self.invalid("an id", value))?;
                Ok(Condition::Links(link, id))
            }
            (FieldKind::ToOne, value) => {
                let id = integer(value).ok_or_else(|| self.invalid("an id", value))?;
                Ok(Condition::Equals(self.name, FieldValue::Integer(id)))
            }
            (FieldKind::Scalar(scalar), value) => {
                Ok(Condition::Equals(self.name, self.scalar_value(scalar, value)?))
            }
        }
    }

    fn scalar_value(&self, scalar: ScalarType, value: &Value) -> Result<FieldValue, EntityError> {
        let parsed = match scalar {
            ScalarType::Integer => integer(value).map(FieldValue::Integer),
            ScalarType::Real => value.as_f64().map(FieldValue::Real),
            ScalarType::Text => value.as_str().map(|s| FieldValue::Text(s.to_string())),
            ScalarType::Bool => value.as_bool().map(FieldValue::Bool),
            ScalarType::DateTime => value
                .as_str()
                .and_then(parse_flexible_datetime)
                .map(FieldValue::DateTime),
            ScalarType::Enum(variants) => value
                .as_str()
                .and_then(|s| variants.iter().find(|v| v.eq_ignore_ascii_case(s)))
                .map(|v| FieldValue::Text((*v).to_string())),
        };
        parsed.ok_or_else(|| match scalar {
            ScalarType::Integer => self.invalid("an integer", value),
            ScalarType::Real => self.invalid("a number", value),
            ScalarType::Text => self.invalid("a string", value),
            ScalarType::Bool => self.invalid("a boolean", value),
            ScalarType::DateTime => self.invalid("a date", value),
            ScalarType::Enum(variants) => self.invalid(&format!("one of {}", variants.join(", ")), value),
        })
    }
}

/// Integers, or strings holding one (query strings arrive as text).
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => i64::from_str(s.trim()).ok(),
        _ => None,
    }
}
