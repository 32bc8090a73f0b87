pub mod access;
pub mod audit;
pub mod comments;
pub mod error;
pub mod llm_context;
pub mod orm;
pub mod projects;
pub mod results;
pub mod schema;
pub mod tags;
pub mod tasks;
pub mod users;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;
