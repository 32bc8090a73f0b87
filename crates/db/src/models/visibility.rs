use sqlx::{QueryBuilder, Sqlite};

use super::link::LinkTable;

/// Which rows of an owned table an actor may see in list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    All,
    OwnedBy(i64),
    /// Owned rows plus rows linked to the user through an assignee table.
    OwnedOrAssigned(i64),
    Nothing,
}

impl Visibility {
    /// Append ` AND <predicate>` restricting rows of `alias` to this scope.
    ///
    /// `assignees` is only consulted for [`Visibility::OwnedOrAssigned`]; without it
    /// the scope degrades to ownership.
    pub fn push_predicate(
        &self,
        query_builder: &mut QueryBuilder<'_, Sqlite>,
        alias: &str,
        assignees: Option<LinkTable>,
    ) {
        match (*self, assignees) {
            (Visibility::All, _) => {}
            (Visibility::Nothing, _) => {
                query_builder.push(" AND 0");
            }
            (Visibility::OwnedBy(user_id), _) | (Visibility::OwnedOrAssigned(user_id), None) => {
                query_builder.push(format!(" AND {alias}.owner_id = "));
                query_builder.push_bind(user_id);
            }
            (Visibility::OwnedOrAssigned(user_id), Some(link)) => {
                query_builder.push(format!(" AND ({alias}.owner_id = "));
                query_builder.push_bind(user_id);
                query_builder.push(format!(
                    " OR EXISTS (SELECT 1 FROM {table} v WHERE v.{source} = {alias}.id AND v.{target} = ",
                    table = link.table,
                    source = link.source_column,
                    target = link.target_column,
                ));
                query_builder.push_bind(user_id);
                query_builder.push("))");
            }
        }
    }
}
