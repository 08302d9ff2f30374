use axum::Router;

/// A service module that contributes HTTP routes.
///
/// Each business module implements this trait to register its endpoints.
/// The binary entry point collects all modules and merges their routes
/// into a single Router. Modules own their full path space (the QR module
/// serves both the short printed `/q/...` links and its `/qr/v1` API), so
/// routes are merged at the root rather than nested.
pub trait Module: Send + Sync {
    /// Module name, used for logging.
    fn name(&self) -> &str;

    /// Return the module's routes.
    fn routes(&self) -> Router;
}
