use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use plantops_core::ServiceError;

use crate::error::error_code;
use crate::format::TokenFormat;
use crate::model::{Token, TokenStatus};
use crate::store::TokenStore;

/// Classification of a scanned string.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenState {
    /// Unknown token, or one that failed the format check.
    NotFound,
    Active(Token),
    Revoked(Token),
    /// `lapsed` is set when the stored status is still ACTIVE but the expiry
    /// has passed; the returned token already reads EXPIRED and the caller
    /// persists the transition with the scan.
    Expired { token: Token, lapsed: bool },
}

impl TokenState {
    pub fn token(&self) -> Option<&Token> {
        match self {
            Self::NotFound => None,
            Self::Active(t) | Self::Revoked(t) => Some(t),
            Self::Expired { token, .. } => Some(token),
        }
    }
}

/// Loads tokens and classifies them. Read-only: counting happens once the
/// scan is committed.
pub struct TokenResolver {
    tokens: Arc<TokenStore>,
    format: TokenFormat,
}

impl TokenResolver {
    pub fn new(tokens: Arc<TokenStore>, format: TokenFormat) -> Self {
        Self { tokens, format }
    }

    pub fn format(&self) -> &TokenFormat {
        &self.format
    }

    pub fn resolve(&self, raw: &str, now: DateTime<Utc>) -> Result<TokenState, ServiceError> {
        if !self.format.is_valid(raw) {
            warn!(code = error_code::MALFORMED_INPUT, len = raw.len(), "rejected scan input");
            return Ok(TokenState::NotFound);
        }

        let Some(mut token) = self.tokens.find_by_value(raw)? else {
            debug!(code = error_code::NOT_FOUND, token = raw, "unknown token");
            return Ok(TokenState::NotFound);
        };

        let state = match token.status {
            TokenStatus::Active if token.is_lapsed(now) => {
                token.status = TokenStatus::Expired;
                TokenState::Expired { token, lapsed: true }
            }
            TokenStatus::Active => TokenState::Active(token),
            TokenStatus::Revoked => TokenState::Revoked(token),
            TokenStatus::Expired => TokenState::Expired {
                token,
                lapsed: false,
            },
        };
        Ok(state)
    }
}
