use tracing::{debug, error};

use crate::error::{error_code, QrError};
use crate::model::ScanEvent;
use crate::store::{ScanDraft, ScanLog};

/// Writes the durable record of what a scanner was shown.
pub struct ScanAuditor {
    log: ScanLog,
}

impl ScanAuditor {
    pub fn new(log: ScanLog) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &ScanLog {
        &self.log
    }

    /// Commit the audit entry together with the scan-count increment (and
    /// the lazy expiry transition when `expire` is set).
    ///
    /// Any storage failure fails the scan. `Ok(None)` means the token's
    /// status changed after it was read and nothing was written.
    pub fn record(&self, draft: ScanDraft, expire: bool) -> Result<Option<ScanEvent>, QrError> {
        let token_id = draft.token_id.clone();
        let resolution_type = draft.resolution_type;
        match self.log.commit(draft, expire) {
            Ok(None) => {
                debug!(token_id = %token_id, "token status changed before audit commit");
                Ok(None)
            }
            Ok(Some(event)) => {
                debug!(
                    token_id = %event.token_id,
                    resolution_type = %event.resolution_type,
                    mode = %event.mode,
                    scan_count = event.scan_count_at_resolution,
                    "scan audited"
                );
                Ok(Some(event))
            }
            Err(e) => {
                error!(
                    code = error_code::AUDIT_WRITE_FAILURE,
                    token_id = %token_id,
                    resolution_type = %resolution_type,
                    error = %e,
                    "scan audit commit failed"
                );
                Err(QrError::AuditWriteFailure(e.to_string()))
            }
        }
    }
}
