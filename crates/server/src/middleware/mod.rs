pub mod auth;

pub use auth::{USER_ID_HEADER, require_user};
