//! Table-agnostic id lookup driven by caller-supplied equality conditions.
//!
//! Table and column names come from static descriptor tables, never from user
//! input; only values are bound.

use chrono::{DateTime, Utc};
use sqlx::{Executor, QueryBuilder, Sqlite};

use super::{link::LinkTable, visibility::Visibility};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    DateTime(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(&'static str, FieldValue),
    IsNull(&'static str),
    /// The row is linked to `target_id` through the join table.
    Links(LinkTable, i64),
}

#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub table: &'static str,
    /// Skip rows flagged `deleted`.
    pub live_only: bool,
    pub conditions: Vec<Condition>,
    pub visibility: Visibility,
    /// Join table consulted for [`Visibility::OwnedOrAssigned`].
    pub assignees: Option<LinkTable>,
    pub limit: i64,
}

impl RecordQuery {
    /// Matching ids, ascending.
    pub async fn find_ids<'e, E>(&self, executor: E) -> Result<Vec<i64>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut query_builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT r.id FROM {} r WHERE 1", self.table));
        if self.live_only {
            query_builder.push(" AND r.deleted = 0");
        }
        for condition in &self.conditions {
            match condition {
                Condition::Equals(column, value) => {
                    query_builder.push(format!(" AND r.{column} = "));
                    match value {
                        FieldValue::Integer(v) => query_builder.push_bind(*v),
                        FieldValue::Real(v) => query_builder.push_bind(*v),
                        FieldValue::Text(v) => query_builder.push_bind(v.clone()),
                        FieldValue::Bool(v) => query_builder.push_bind(*v),
                        FieldValue::DateTime(v) => query_builder.push_bind(*v),
                    };
                }
                Condition::IsNull(column) => {
                    query_builder.push(format!(" AND r.{column} IS NULL"));
                }
                Condition::Links(link, target_id) => {
                    query_builder.push(format!(
                        " AND EXISTS (SELECT 1 FROM {table} l WHERE l.{source} = r.id AND l.{target} = ",
                        table = link.table,
                        source = link.source_column,
                        target = link.target_column,
                    ));
                    query_builder.push_bind(*target_id);
                    query_builder.push(")");
                }
            }
        }
        self.visibility
            .push_predicate(&mut query_builder, "r", self.assignees);
        query_builder.push(" ORDER BY r.id ASC LIMIT ");
        query_builder.push_bind(self.limit);
        query_builder.build_query_scalar().fetch_all(executor).await
    }
}
