use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use plantops_core::{
    format_rfc3339, new_id, now_rfc3339, parse_rfc3339, ListParams, ListResult, ServiceError,
};
use plantops_sql::SQLStore;

use crate::audit::ScanAuditor;
use crate::calibration::CalibrationBuffer;
use crate::config::QrConfig;
use crate::error::{error_code, QrError};
use crate::gate::GateDecision;
use crate::model::{
    CalibrationScanEvent, GeoHints, IssueTokenRequest, MatchedBy, RedirectRule, ScanEvent,
    ScanMode, Token, TokenStatus,
};
use crate::precedence::{encode_segment, PrecedenceEngine};
use crate::render;
use crate::resolver::{TokenResolver, TokenState};
use crate::store::schema::init_schema;
use crate::store::{
    ScanDraft, ScanLog, SqlRuleStore, SqlRunDirectory, SqlTransparencyDirectory, TokenStore,
};

/// Hex characters appended to the prefix of issued tokens.
const ISSUED_BODY_LEN: usize = 16;

/// Token statuses only move forward (ACTIVE to REVOKED or EXPIRED), so a
/// scan needs at most one re-read.
const SCAN_ATTEMPTS: usize = 3;

/// One incoming scan.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub token: String,
    pub mode: ScanMode,
    pub ip_address: Option<String>,
    pub geo: GeoHints,
    pub user_agent: Option<String>,
}

/// What the scanner gets back.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Redirect { url: String, event: ScanEvent },
    Verification { html: String, event: ScanEvent },
    InternalStatus { html: String, event: ScanEvent },
    /// The calibration token: a preview page, nothing persisted.
    Calibration { html: String },
}

impl ScanOutcome {
    pub fn event(&self) -> Option<&ScanEvent> {
        match self {
            Self::Redirect { event, .. }
            | Self::Verification { event, .. }
            | Self::InternalStatus { event, .. } => Some(event),
            Self::Calibration { .. } => None,
        }
    }
}

/// The QR resolution subsystem: validation, classification, mode gate,
/// precedence cascade, audit, plus token administration.
pub struct QrService {
    config: QrConfig,
    tokens: Arc<TokenStore>,
    rules: Arc<SqlRuleStore>,
    runs: Arc<SqlRunDirectory>,
    transparency: Arc<SqlTransparencyDirectory>,
    resolver: TokenResolver,
    engine: PrecedenceEngine,
    auditor: ScanAuditor,
    calibration: Arc<CalibrationBuffer>,
}

impl QrService {
    /// Initialise the schema and wire SQL-backed collaborators.
    pub fn new(db: Arc<dyn SQLStore>, config: QrConfig) -> Result<Self, ServiceError> {
        init_schema(db.as_ref())?;

        let tokens = Arc::new(TokenStore::new(db.clone()));
        let rules = Arc::new(SqlRuleStore::new(db.clone()));
        let runs = Arc::new(SqlRunDirectory::new(db.clone()));
        let transparency = Arc::new(SqlTransparencyDirectory::new(db.clone()));

        let resolver = TokenResolver::new(tokens.clone(), config.token_format());
        let engine = PrecedenceEngine::new(
            transparency.clone(),
            rules.clone(),
            runs.clone(),
            config.routes.clone(),
        );
        let auditor = ScanAuditor::new(ScanLog::new(db));
        let calibration = Arc::new(CalibrationBuffer::new(
            &config.calibration_token,
            config.calibration_capacity,
        ));

        Ok(Self {
            config,
            tokens,
            rules,
            runs,
            transparency,
            resolver,
            engine,
            auditor,
            calibration,
        })
    }

    pub fn config(&self) -> &QrConfig {
        &self.config
    }

    pub fn calibration(&self) -> &Arc<CalibrationBuffer> {
        &self.calibration
    }

    pub fn rules(&self) -> &SqlRuleStore {
        &self.rules
    }

    pub fn runs(&self) -> &SqlRunDirectory {
        &self.runs
    }

    pub fn transparency(&self) -> &SqlTransparencyDirectory {
        &self.transparency
    }

    // =======================================================================
    // Scan resolution
    // =======================================================================

    /// Resolve one scan end to end.
    ///
    /// Found tokens are always audited (with exactly one scan-count
    /// increment) before an outcome is returned. Unknown or malformed input
    /// returns `QrError::NotFound` and leaves no trace in storage. A token
    /// whose status changes between the read and the audit commit is
    /// resolved again under its new status.
    pub fn scan(&self, req: &ScanRequest) -> Result<ScanOutcome, QrError> {
        let now = Utc::now();

        if self.calibration.is_calibration_token(&req.token) {
            self.push_calibration(&req.token, req.user_agent.clone().unwrap_or_default(), now)?;
            return Ok(ScanOutcome::Calibration {
                html: render::calibration_page(&req.token),
            });
        }

        for _ in 0..SCAN_ATTEMPTS {
            if let Some(outcome) = self.scan_once(req, now)? {
                return Ok(outcome);
            }
        }
        Err(QrError::AuditWriteFailure(format!(
            "token status kept changing across {SCAN_ATTEMPTS} attempts"
        )))
    }

    fn scan_once(
        &self,
        req: &ScanRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<ScanOutcome>, QrError> {
        let state = self.resolver.resolve(&req.token, now)?;
        let (mut token, lapsed) = match state {
            TokenState::NotFound => return Err(QrError::NotFound),
            TokenState::Active(t) | TokenState::Revoked(t) => (t, false),
            TokenState::Expired { token, lapsed } => (token, lapsed),
        };
        if token.status.is_terminal() {
            debug!(
                code = error_code::TERMINAL_TOKEN,
                token_id = %token.id,
                status = %token.status,
                mode = %req.mode,
                "terminal token scanned"
            );
        }

        let mut draft = ScanDraft::for_token(&token, format_rfc3339(now), req.mode);
        draft.ip_address = req.ip_address.clone();
        draft.geo = req.geo.clone();
        draft.user_agent = req.user_agent.clone();

        let decision = GateDecision::decide(req.mode, token.status);
        match decision {
            GateDecision::Verification { resolution_type } => {
                draft.resolution_type = resolution_type;
                draft.destination = self.verification_path(&token);
            }
            GateDecision::InternalStatus { resolution_type } => {
                draft.resolution_type = resolution_type;
                draft.destination = self.record_path(&token);
            }
            GateDecision::Precedence => {
                let dest = self.engine.resolve(&token, now)?;
                draft.resolution_type = dest.resolution_type;
                draft.destination = dest.url;
                if let Some(run) = dest.run {
                    draft.run_step = run.current_step.as_ref().map(|s| s.to_string());
                    draft.run_id = Some(run.run_id);
                }
            }
        }

        let Some(event) = self.auditor.record(draft, lapsed)? else {
            return Ok(None);
        };
        token.scan_count = event.scan_count_at_resolution;
        token.last_scanned_at = Some(event.timestamp.clone());

        let outcome = match decision {
            GateDecision::Verification { .. } => ScanOutcome::Verification {
                html: render::verification_page(&token),
                event,
            },
            GateDecision::InternalStatus { .. } => ScanOutcome::InternalStatus {
                html: render::internal_status_page(&token, &event.destination),
                event,
            },
            GateDecision::Precedence => ScanOutcome::Redirect {
                url: event.destination.clone(),
                event,
            },
        };
        Ok(Some(outcome))
    }

    fn verification_path(&self, token: &Token) -> String {
        format!(
            "{}/{}",
            self.config.routes.verification.trim_end_matches('/'),
            encode_segment(&token.value)
        )
    }

    fn record_path(&self, token: &Token) -> String {
        format!(
            "{}/{}",
            self.config.routes.token.trim_end_matches('/'),
            encode_segment(&token.id)
        )
    }

    // =======================================================================
    // Calibration
    // =======================================================================

    /// Accept a calibration scan report. Any other token is rejected.
    pub fn notify_calibration(&self, token: &str, user_agent: &str) -> Result<u64, ServiceError> {
        self.push_calibration(token, user_agent.to_string(), Utc::now())
    }

    fn push_calibration(
        &self,
        token: &str,
        user_agent: String,
        now: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let seq = self.calibration.push(CalibrationScanEvent {
            timestamp: format_rfc3339(now),
            token: token.to_string(),
            user_agent,
            success: true,
        })?;
        debug!(seq, "calibration scan recorded");
        Ok(seq)
    }

    // =======================================================================
    // Token administration
    // =======================================================================

    pub fn issue_token(&self, req: &IssueTokenRequest) -> Result<Token, ServiceError> {
        if req.entity_id.trim().is_empty() {
            return Err(ServiceError::Validation("entityId is required".into()));
        }
        let redirect_url = match req.redirect_url.as_deref().map(str::trim) {
            Some("") => {
                return Err(ServiceError::Validation(
                    "redirectUrl must not be blank".into(),
                ))
            }
            other => other.map(String::from),
        };
        let expires_at = match req.expires_at.as_deref() {
            None => None,
            Some(raw) => Some(format_rfc3339(parse_rfc3339(raw).ok_or_else(|| {
                ServiceError::Validation(format!("expiresAt is not RFC 3339: {raw}"))
            })?)),
        };

        let body = &new_id()[..ISSUED_BODY_LEN];
        let token = Token {
            id: new_id(),
            value: format!("{}{}", self.config.token_prefix, body),
            status: TokenStatus::Active,
            entity_type: req.entity_type,
            entity_id: req.entity_id.clone(),
            redirect_url,
            version_id: req.version_id.clone().filter(|v| !v.trim().is_empty()),
            printed_at: now_rfc3339(),
            expires_at,
            revoked_at: None,
            revoked_reason: None,
            scan_count: 0,
            last_scanned_at: None,
        };
        self.tokens.insert(&token)?;
        info!(
            token_id = %token.id,
            entity_type = %token.entity_type,
            entity_id = %token.entity_id,
            "token issued"
        );
        Ok(token)
    }

    pub fn get_token(&self, id: &str) -> Result<Token, ServiceError> {
        self.tokens.get(id)
    }

    /// Register an externally printed token. The value must match the token
    /// format.
    pub fn import_token(&self, token: &Token) -> Result<(), ServiceError> {
        if !self.resolver.format().is_valid(&token.value) {
            return Err(ServiceError::Validation(format!(
                "token value must start with '{}'",
                self.config.token_prefix
            )));
        }
        self.tokens.insert(token)
    }

    /// ACTIVE → REVOKED. Terminal tokens cannot be revoked again.
    pub fn revoke_token(&self, id: &str, reason: &str) -> Result<Token, ServiceError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::Validation("reason is required".into()));
        }
        let token = self.tokens.revoke(id, reason, &now_rfc3339())?;
        info!(token_id = %id, reason, "token revoked");
        Ok(token)
    }

    /// Audit entries for a token, newest first.
    pub fn scans_for_token(
        &self,
        id: &str,
        params: &ListParams,
    ) -> Result<ListResult<ScanEvent>, ServiceError> {
        self.tokens.get(id)?;
        self.auditor.log().list_for_token(id, params)
    }

    /// Persist ACTIVE → EXPIRED for every lapsed token.
    pub fn expire_lapsed(&self) -> Result<u64, ServiceError> {
        self.tokens.expire_lapsed(&now_rfc3339())
    }

    /// Create the FALLBACK rule from `url` unless one already exists
    /// (enabled or not). Returns whether a rule was created.
    pub fn ensure_default_redirect(&self, url: &str) -> Result<bool, ServiceError> {
        if let Some(existing) = self.rules.fallback()? {
            if existing.redirect_url != url {
                warn!(
                    rule_id = %existing.id,
                    configured = url,
                    stored = %existing.redirect_url,
                    "default redirect already exists, keeping stored url"
                );
            }
            return Ok(false);
        }
        self.rules.insert(&RedirectRule {
            id: new_id(),
            matched_by: MatchedBy::Fallback,
            entity_type: None,
            entity_id: None,
            version_id: None,
            redirect_url: url.to_string(),
            active: true,
            starts_at: None,
            ends_at: None,
            create_at: now_rfc3339(),
        })?;
        info!(url, "default redirect created");
        Ok(true)
    }
}
