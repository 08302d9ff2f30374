//! Redirect precedence for ACTIVE tokens in operational mode.
//!
//! Checks run in a fixed order and stop at the first match:
//! token override, production-run binding, transparency visibility,
//! redirect rule, canonical entity route.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use plantops_core::parse_rfc3339;

use crate::config::RouteConfig;
use crate::error::QrError;
use crate::lookup::{ProductionRunDirectory, RedirectRuleSource, TransparencyDirectory};
use crate::model::{
    EntityType, RedirectRule, ResolutionType, RuleKey, RunProjection, Token,
};

/// Where an operational scan goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub url: String,
    pub resolution_type: ResolutionType,
    /// Set when the token is bound to a production run.
    pub run: Option<RunProjection>,
}

// ---------------------------------------------------------------------------
// Rule ranking
// ---------------------------------------------------------------------------

/// Pick the single winning rule among `candidates` for `key` at `now`.
///
/// Disabled rules, rules outside their window and rules whose scope does not
/// cover `key` are dropped. The rest rank by tier (VERSION, then exact
/// entity, then FALLBACK), then newest `create_at`, then highest id.
pub fn select_winning_rule(
    candidates: Vec<RedirectRule>,
    key: &RuleKey,
    now: DateTime<Utc>,
) -> Option<RedirectRule> {
    candidates
        .into_iter()
        .filter(|r| r.active && r.in_window(now) && r.applies_to(key))
        .min_by(rank)
}

fn rank(a: &RedirectRule, b: &RedirectRule) -> Ordering {
    a.matched_by
        .tier()
        .cmp(&b.matched_by.tier())
        .then_with(|| parse_rfc3339(&b.create_at).cmp(&parse_rfc3339(&a.create_at)))
        .then_with(|| b.id.cmp(&a.id))
}

// ---------------------------------------------------------------------------
// PrecedenceEngine
// ---------------------------------------------------------------------------

pub struct PrecedenceEngine {
    transparency: Arc<dyn TransparencyDirectory>,
    rules: Arc<dyn RedirectRuleSource>,
    runs: Arc<dyn ProductionRunDirectory>,
    routes: RouteConfig,
}

impl PrecedenceEngine {
    pub fn new(
        transparency: Arc<dyn TransparencyDirectory>,
        rules: Arc<dyn RedirectRuleSource>,
        runs: Arc<dyn ProductionRunDirectory>,
        routes: RouteConfig,
    ) -> Self {
        Self {
            transparency,
            rules,
            runs,
            routes,
        }
    }

    /// Compute the destination for an ACTIVE token.
    ///
    /// Always yields a non-empty URL or `ResolutionInconsistency`.
    pub fn resolve(&self, token: &Token, now: DateTime<Utc>) -> Result<Destination, QrError> {
        let dest = self.cascade(token, now)?;
        if dest.url.trim().is_empty() {
            error!(
                token_id = %token.id,
                resolution_type = %dest.resolution_type,
                "precedence cascade produced an empty destination"
            );
            return Err(QrError::ResolutionInconsistency(token.id.clone()));
        }
        debug!(
            token_id = %token.id,
            resolution_type = %dest.resolution_type,
            destination = %dest.url,
            "destination resolved"
        );
        Ok(dest)
    }

    fn cascade(&self, token: &Token, now: DateTime<Utc>) -> Result<Destination, QrError> {
        if let Some(url) = token.override_url() {
            return Ok(Destination {
                url: url.to_string(),
                resolution_type: ResolutionType::Token,
                run: None,
            });
        }

        if let Some(run) = self.runs.bound_production_run(&token.id)? {
            return Ok(Destination {
                url: format!(
                    "{}/{}",
                    trim_base(&self.routes.production_run),
                    encode_segment(&run.run_id)
                ),
                resolution_type: ResolutionType::Token,
                run: Some(run),
            });
        }

        if token.entity_type.has_transparency()
            && self
                .transparency
                .is_publicly_visible(token.entity_type, &token.entity_id)?
        {
            return Ok(Destination {
                url: self.transparency_url(token.entity_type, &token.entity_id),
                resolution_type: ResolutionType::Transparency,
                run: None,
            });
        }

        let key = RuleKey {
            entity_type: token.entity_type,
            entity_id: token.entity_id.clone(),
            version_id: token.version_id.clone(),
        };
        if let Some(rule) = self.rules.find_active_redirect_rule(&key, now)? {
            return Ok(Destination {
                url: rule.redirect_url,
                resolution_type: rule.matched_by.into(),
                run: None,
            });
        }

        Ok(Destination {
            url: self.default_route(token),
            resolution_type: ResolutionType::Default,
            run: None,
        })
    }

    fn transparency_url(&self, entity_type: EntityType, entity_id: &str) -> String {
        format!(
            "{}/{}/{}",
            trim_base(&self.routes.transparency),
            entity_type.slug(),
            encode_segment(entity_id)
        )
    }

    /// Canonical page for the token's entity, with the token carried along
    /// as `?token=` so the page can recover scan context.
    pub fn default_route(&self, token: &Token) -> String {
        let base = match token.entity_type {
            EntityType::Product => Some(&self.routes.product),
            EntityType::Batch => Some(&self.routes.batch),
            EntityType::Inventory => Some(&self.routes.inventory),
            EntityType::Custom => None,
        };
        let path = match base {
            Some(base) => format!("{}/{}", trim_base(base), encode_segment(&token.entity_id)),
            None => self.routes.home.clone(),
        };
        format!("{}?token={}", path, encode_segment(&token.value))
    }
}

fn trim_base(base: &str) -> &str {
    base.trim_end_matches('/')
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub(crate) fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}
