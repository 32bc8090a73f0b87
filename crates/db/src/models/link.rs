use std::collections::HashMap;

use sqlx::{Executor, QueryBuilder, Sqlite, SqliteConnection};

/// A many-to-many join table between two entity tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTable {
    pub table: &'static str,
    pub source_column: &'static str,
    pub target_column: &'static str,
}

pub const PROJECT_TAGS: LinkTable = LinkTable {
    table: "project_tags",
    source_column: "project_id",
    target_column: "tag_id",
};

pub const TASK_TAGS: LinkTable = LinkTable {
    table: "task_tags",
    source_column: "task_id",
    target_column: "tag_id",
};

pub const TASK_ASSIGNEES: LinkTable = LinkTable {
    table: "task_assignees",
    source_column: "task_id",
    target_column: "user_id",
};

impl LinkTable {
    /// Target ids linked to one source row, ascending.
    pub async fn ids_for<'e, E>(&self, executor: E, source_id: i64) -> Result<Vec<i64>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT {target} FROM {table} WHERE {source} = $1 ORDER BY {target} ASC",
            target = self.target_column,
            table = self.table,
            source = self.source_column,
        );
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(source_id)
            .fetch_all(executor)
            .await
    }

    /// Target ids for many source rows at once, keyed by source id.
    pub async fn ids_for_many<'e, E>(
        &self,
        executor: E,
        source_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<i64>>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let mut links: HashMap<i64, Vec<i64>> = HashMap::new();
        if source_ids.is_empty() {
            return Ok(links);
        }

        let mut query_builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {source}, {target} FROM {table} WHERE {source} IN (",
            source = self.source_column,
            target = self.target_column,
            table = self.table,
        ));
        let mut separated = query_builder.separated(", ");
        for id in source_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(format!(
            ") ORDER BY {source} ASC, {target} ASC",
            source = self.source_column,
            target = self.target_column,
        ));

        let rows: Vec<(i64, i64)> = query_builder.build_query_as().fetch_all(executor).await?;
        for (source_id, target_id) in rows {
            links.entry(source_id).or_default().push(target_id);
        }
        Ok(links)
    }

    /// Replace the full set of targets linked to `source_id`.
    pub async fn replace(
        &self,
        conn: &mut SqliteConnection,
        source_id: i64,
        target_ids: &[i64],
    ) -> Result<(), sqlx::Error> {
        let delete = format!(
            "DELETE FROM {table} WHERE {source} = $1",
            table = self.table,
            source = self.source_column,
        );
        sqlx::query(&delete).bind(source_id).execute(&mut *conn).await?;

        let insert = format!(
            "INSERT INTO {table} ({source}, {target}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            table = self.table,
            source = self.source_column,
            target = self.target_column,
        );
        for target_id in target_ids {
            sqlx::query(&insert)
                .bind(source_id)
                .bind(*target_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}
