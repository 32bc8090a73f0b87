pub mod comment;
pub mod link;
pub mod project;
pub mod record_query;
pub mod tag;
pub mod task;
pub mod user;
pub mod visibility;

/// Free-form provenance/context map stored alongside owned records.
pub type LlmContext = serde_json::Map<String, serde_json::Value>;

/// Build a `LIKE ... ESCAPE '\'` pattern matching `needle` anywhere in the column.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Append `LIMIT`/`OFFSET`; SQLite needs a `LIMIT -1` before a bare offset.
pub(crate) fn push_page(
    query_builder: &mut sqlx::QueryBuilder<'_, sqlx::Sqlite>,
    limit: Option<i64>,
    offset: Option<i64>,
) {
    match (limit, offset) {
        (None, None) => {}
        (limit, offset) => {
            query_builder.push(" LIMIT ");
            query_builder.push_bind(limit.unwrap_or(-1));
            if let Some(offset) = offset {
                query_builder.push(" OFFSET ");
                query_builder.push_bind(offset);
            }
        }
    }
}
