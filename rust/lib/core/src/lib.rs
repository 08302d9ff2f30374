pub mod auth;
pub mod config;
pub mod error;
pub mod module;
pub mod types;

pub use auth::{Authenticator, AllowAll, DenyAll};
pub use config::ServiceConfig;
pub use error::ServiceError;
pub use module::Module;
pub use types::{ListParams, ListResult, format_rfc3339, new_id, now_rfc3339, parse_rfc3339};
