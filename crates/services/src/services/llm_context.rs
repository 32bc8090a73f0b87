use chrono::{SecondsFormat, Utc};
use db::models::LlmContext;
use serde_json::Value;

use super::access::Caller;

/// Keys owned by the merger. Callers cannot set them through `extra`.
pub const PROVENANCE_KEYS: [&str; 6] = [
    "source",
    "last_action",
    "actor_user_id",
    "actor_email",
    "timestamp",
    "summary_text",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmAction {
    Create,
    Update,
}

impl LlmAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmAction::Create => "create",
            LlmAction::Update => "update",
        }
    }
}

/// Fold one mutation's provenance into an existing context map.
///
/// Custom keys already present survive, custom keys from `extra` are layered on
/// top, and the provenance keys are always rewritten. `default_summary` is only
/// used on create; an update without a note keeps the previous summary.
pub fn merge(
    existing: &LlmContext,
    caller: &Caller,
    action: LlmAction,
    note: Option<&str>,
    default_summary: &str,
    extra: Option<&LlmContext>,
) -> LlmContext {
    let mut merged = existing.clone();

    if let Some(extra) = extra {
        for (key, value) in extra {
            if !PROVENANCE_KEYS.contains(&key.as_str()) {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    let note = note.map(str::trim).filter(|n| !n.is_empty());
    let summary = match (note, action) {
        (Some(note), _) => Value::String(note.to_string()),
        (None, LlmAction::Create) => Value::String(default_summary.to_string()),
        (None, LlmAction::Update) => existing.get("summary_text").cloned().unwrap_or(Value::Null),
    };

    let actor = &caller.actor;
    merged.insert("source".into(), Value::from(caller.source.as_str()));
    merged.insert("last_action".into(), Value::from(action.as_str()));
    merged.insert(
        "actor_user_id".into(),
        actor.user_id.map(Value::from).unwrap_or(Value::Null),
    );
    merged.insert(
        "actor_email".into(),
        actor.email.clone().map(Value::from).unwrap_or(Value::Null),
    );
    merged.insert(
        "timestamp".into(),
        Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    merged.insert("summary_text".into(), summary);
    merged
}
