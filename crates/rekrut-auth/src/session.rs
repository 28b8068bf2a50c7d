//! Session issuer
//!
//! Stateless signed tokens: validity is fully determined by the HMAC
//! signature and the expiry claim, nothing is stored server-side. One TTL
//! applies uniformly to every session.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rekrut_core::config::SessionConfig;
use rekrut_core::types::{Identity, Role};
use rekrut_core::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Identity id
    pub sub: Uuid,
    pub email: String,
    /// Display name at issuance
    pub name: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl SessionIssuer {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            ttl_secs: config.ttl_secs,
        }
    }

    pub fn issue(&self, identity: &Identity) -> Result<String> {
        let iat = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: identity.id,
            email: identity.email.clone(),
            name: identity.display_name(),
            role: identity.role,
            iat,
            exp: iat + self.ttl_secs as i64,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("token signing failed: {}", e)))
    }

    /// Signature is checked before expiry; the two failures stay
    /// distinguishable for callers even though both answer 401 outwardly.
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => Error::TokenExpired,
                _ => Error::TokenInvalid,
            })
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }
}
