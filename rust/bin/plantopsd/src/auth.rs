//! JWT-backed permission checks for the QR routes.
//!
//! Tokens are issued by the platform's auth service; this binary only
//! verifies them. A request passes when its roles include the root role,
//! the exact permission, or any configured operational role.

use axum::http::HeaderMap;
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use plantops_core::{Authenticator, ServiceError};

/// The well-known role that bypasses every permission check.
pub const ROOT_ROLE_ID: &str = "auth:root";

/// JWT claims payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user id.
    pub sub: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Roles assigned to the user. Root has ["auth:root"].
    #[serde(default)]
    pub roles: Vec<String>,
    /// Session id.
    #[serde(default)]
    pub sid: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
}

impl Claims {
    pub fn is_root(&self) -> bool {
        self.roles.iter().any(|r| r == ROOT_ROLE_ID)
    }
}

pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    validation: Validation,
    operational_roles: Vec<String>,
}

impl JwtAuthenticator {
    pub fn new(secret: &str, operational_roles: Vec<String>) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            operational_roles,
        }
    }

    fn claims(&self, headers: &HeaderMap) -> Result<Claims, ServiceError> {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ServiceError::Unauthorized("missing authorization token".into()))?;

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {}", e)))?;
        Ok(data.claims)
    }
}

impl Authenticator for JwtAuthenticator {
    fn check(&self, headers: &HeaderMap, permission: &str) -> Result<(), ServiceError> {
        let claims = self.claims(headers)?;

        if claims.is_root() {
            return Ok(());
        }
        let granted = claims
            .roles
            .iter()
            .any(|r| r == permission || self.operational_roles.contains(r));
        if granted {
            return Ok(());
        }

        Err(ServiceError::PermissionDenied(format!(
            "permission denied: requires '{}'",
            permission
        )))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    pub(crate) const SECRET: &str = "test-secret";

    pub(crate) fn bearer(roles: &[&str], exp_offset: i64) -> HeaderMap {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let claims = Claims {
            sub: "u1".into(),
            name: "Operator".into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            sid: "s1".into(),
            iat: now,
            exp: now + exp_offset,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {token}").parse().unwrap());
        headers
    }

    fn auth() -> JwtAuthenticator {
        JwtAuthenticator::new(SECRET, vec!["ops:floor".into()])
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let err = auth().check(&HeaderMap::new(), "qr:token:read").unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let err = auth()
            .check(&bearer(&[ROOT_ROLE_ID], -3600), "qr:token:read")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let other = JwtAuthenticator::new("other-secret", vec![]);
        let err = other
            .check(&bearer(&[ROOT_ROLE_ID], 3600), "qr:token:read")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn root_passes_everything() {
        assert!(auth().check(&bearer(&[ROOT_ROLE_ID], 3600), "qr:token:revoke").is_ok());
    }

    #[test]
    fn exact_permission_or_operational_role() {
        let a = auth();
        assert!(a.check(&bearer(&["qr:token:read"], 3600), "qr:token:read").is_ok());
        assert!(a.check(&bearer(&["ops:floor"], 3600), "qr:scan:operational").is_ok());

        let err = a
            .check(&bearer(&["qr:token:read"], 3600), "qr:token:revoke")
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
    }
}
