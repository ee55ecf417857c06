//! Session tokens and password credentials. Sessions are HS256 JWTs carrying
//! the user id and role; passwords are PBKDF2-HMAC-SHA256 with a per-user
//! random salt, stored as `pbkdf2-sha256$<iterations>$<salt>$<hash>`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Validation};
use openpenpal_errors::DomainError;
use openpenpal_types::{UserId, UserRole};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

const SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub role: UserRole,
    pub exp: i64,
}

/// Key material for issuing and validating session tokens, derived from the
/// configured HMAC secret once at startup.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue(&self, user_id: UserId, role: UserRole, now: DateTime<Utc>) -> Result<String, DomainError> {
        let claims = SessionClaims {
            sub: user_id.0,
            role,
            exp: (now + Duration::hours(SESSION_TTL_HOURS)).timestamp(),
        };
        jsonwebtoken::encode(&jsonwebtoken::Header::default(), &claims, &self.encoding)
            .map_err(|e| DomainError::Internal(e.to_string()))
    }

    pub fn validate(&self, token: &str) -> Result<SessionClaims, DomainError> {
        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| DomainError::Unauthenticated)
    }
}

/// The authenticated caller, extracted from `Authorization: Bearer <jwt>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        matches!(
            self.role,
            UserRole::SchoolAdmin | UserRole::PlatformAdmin | UserRole::SuperAdmin
        )
    }

    pub fn is_courier(&self) -> bool {
        matches!(
            self.role,
            UserRole::CourierL1 | UserRole::CourierL2 | UserRole::CourierL3 | UserRole::CourierL4
        )
    }

    pub fn require_admin(&self) -> Result<(), DomainError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::UnauthorizedHierarchy)
        }
    }

    pub fn require_courier(&self) -> Result<(), DomainError> {
        if self.is_courier() || self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::UnauthorizedHierarchy)
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<crate::state::AppState> for AuthUser {
    type Rejection = DomainError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &crate::state::AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(DomainError::Unauthenticated)?;
        let token = header.strip_prefix("Bearer ").ok_or(DomainError::Unauthenticated)?;
        let claims = state.session_keys.validate(token)?;
        Ok(AuthUser {
            user_id: UserId(claims.sub),
            role: claims.role,
        })
    }
}

const PBKDF2_ITERATIONS: u32 = 120_000;
const SALT_BYTES: usize = 16;
const HASH_BYTES: usize = 32;

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut salt);
    let mut hash = [0u8; HASH_BYTES];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut hash);
    format!(
        "pbkdf2-sha256${}${}${}",
        PBKDF2_ITERATIONS,
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash)
    )
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (scheme, iterations, salt, expected) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(s), Some(i), Some(salt), Some(hash)) => (s, i, salt, hash),
            _ => return false,
        };
    if scheme != "pbkdf2-sha256" {
        return false;
    }
    let iterations: u32 = match iterations.parse() {
        Ok(n) => n,
        Err(_) => return false,
    };
    let salt = match STANDARD_NO_PAD.decode(salt) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let expected = match STANDARD_NO_PAD.decode(expected) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut computed = vec![0u8; expected.len().max(1)];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut computed);

    let mut diff = u8::from(computed.len() != expected.len());
    for (a, b) in computed.iter().zip(expected.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_verifies() {
        let stored = hash_password("letters-move-slowly");
        assert!(verify_password("letters-move-slowly", &stored));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let stored = hash_password("letters-move-slowly");
        assert!(!verify_password("letters-move-fast", &stored));
    }

    #[test]
    fn malformed_stored_hash_is_rejected() {
        assert!(!verify_password("anything", "not-a-hash"));
        assert!(!verify_password("anything", "pbkdf2-sha256$oops$x$y"));
    }

    #[test]
    fn session_round_trips_id_and_role() {
        let keys = SessionKeys::from_secret(b"test-secret");
        let user_id = UserId::new();
        let token = keys.issue(user_id, UserRole::CourierL2, Utc::now()).unwrap();
        let claims = keys.validate(&token).unwrap();
        assert_eq!(claims.sub, user_id.0);
        assert!(matches!(claims.role, UserRole::CourierL2));
    }

    #[test]
    fn expired_session_is_rejected() {
        let keys = SessionKeys::from_secret(b"test-secret");
        let token = keys
            .issue(UserId::new(), UserRole::User, Utc::now() - Duration::hours(48))
            .unwrap();
        assert!(keys.validate(&token).is_err());
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let other = SessionKeys::from_secret(b"other-secret");
        let token = other.issue(UserId::new(), UserRole::User, Utc::now()).unwrap();
        let keys = SessionKeys::from_secret(b"test-secret");
        assert!(keys.validate(&token).is_err());
    }
}
