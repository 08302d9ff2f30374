//! QR token resolution.
//!
//! A scanned string is format-checked, looked up and classified, passed
//! through the public/operational gate, routed by the precedence cascade
//! when operational, and audited before any response goes out. The
//! calibration token takes a separate in-memory path.

pub mod api;
pub mod audit;
pub mod calibration;
pub mod config;
pub mod error;
pub mod format;
pub mod gate;
pub mod lookup;
pub mod model;
pub mod precedence;
pub mod render;
pub mod resolver;
pub mod service;
pub mod store;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio_util::sync::CancellationToken;

use plantops_core::{Authenticator, Module, ServiceError};
use plantops_sql::SQLStore;

pub use config::QrConfig;
pub use error::QrError;
pub use service::{QrService, ScanOutcome, ScanRequest};

/// Permission strings checked through the [`Authenticator`].
pub mod permissions {
    pub const SCAN_OPERATIONAL: &str = "qr:scan:operational";
    pub const CALIBRATION_STREAM: &str = "qr:calibration:stream";
    pub const TOKEN_CREATE: &str = "qr:token:create";
    pub const TOKEN_READ: &str = "qr:token:read";
    pub const TOKEN_REVOKE: &str = "qr:token:revoke";
    pub const SCAN_LIST: &str = "qr:scan:list";

    pub const ALL: &[&str] = &[
        SCAN_OPERATIONAL,
        CALIBRATION_STREAM,
        TOKEN_CREATE,
        TOKEN_READ,
        TOKEN_REVOKE,
        SCAN_LIST,
    ];
}

/// The QR module: scan resolution routes, token administration and the
/// expiry sweeper.
pub struct QrModule {
    service: Arc<QrService>,
    auth: Arc<dyn Authenticator>,
    worker_cancel: CancellationToken,
}

impl QrModule {
    /// Initialise storage and start the expiry sweeper. Must be called
    /// inside a tokio runtime.
    pub fn new(
        db: Arc<dyn SQLStore>,
        config: QrConfig,
        auth: Arc<dyn Authenticator>,
    ) -> Result<Self, ServiceError> {
        let sweep = Duration::from_secs(config.expiry_sweep_secs.max(1));
        let service = Arc::new(QrService::new(db, config)?);
        let worker_cancel = worker::start(Arc::clone(&service), sweep);
        Ok(Self {
            service,
            auth,
            worker_cancel,
        })
    }

    pub fn service(&self) -> &Arc<QrService> {
        &self.service
    }
}

impl Drop for QrModule {
    fn drop(&mut self) {
        self.worker_cancel.cancel();
    }
}

impl Module for QrModule {
    fn name(&self) -> &str {
        "qr"
    }

    fn routes(&self) -> Router {
        api::router(Arc::clone(&self.service), Arc::clone(&self.auth))
    }
}
