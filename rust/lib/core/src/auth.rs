//! Authentication seam.
//!
//! Business modules never decode credentials themselves. They hold an
//! `Arc<dyn Authenticator>` injected by the binary at startup and ask it
//! whether a request carries a given permission.

use axum::http::HeaderMap;

use crate::ServiceError;

/// Pluggable authenticator.
///
/// The check receives the request headers (for extracting tokens) and a
/// permission string of the form `module:resource:action`.
pub trait Authenticator: Send + Sync + 'static {
    /// Authenticate a request and check the given permission.
    ///
    /// Returns `Ok(())` if allowed, `Err(ServiceError)` if denied.
    fn check(
        &self,
        headers: &HeaderMap,
        permission: &str,
    ) -> Result<(), ServiceError>;
}

/// A no-op authenticator that allows everything. Used for testing.
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn check(&self, _headers: &HeaderMap, _permission: &str) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// An authenticator that denies everything. Used for testing and for
/// deployments that expose only the public scan surface.
pub struct DenyAll;

impl Authenticator for DenyAll {
    fn check(&self, _headers: &HeaderMap, permission: &str) -> Result<(), ServiceError> {
        Err(ServiceError::PermissionDenied(format!("{} denied", permission)))
    }
}
