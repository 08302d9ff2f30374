//! SQLite persistence for tokens, rules, collaborator projections and the
//! scan audit log.

pub mod rules;
pub mod runs;
pub mod scans;
pub mod schema;
pub mod tokens;
pub mod transparency;

pub use rules::SqlRuleStore;
pub use runs::SqlRunDirectory;
pub use scans::{ScanDraft, ScanLog};
pub use tokens::TokenStore;
pub use transparency::SqlTransparencyDirectory;

use plantops_core::ServiceError;
use plantops_sql::SQLError;

pub(crate) fn storage_err(e: SQLError) -> ServiceError {
    if e.is_unique_violation() {
        ServiceError::Conflict(e.to_string())
    } else {
        ServiceError::Storage(e.to_string())
    }
}
