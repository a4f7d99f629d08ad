//! Token Authority
//!
//! HS256 bearer tokens. Signature and expiry are checked here; the denylist
//! and admin-session checks happen in [`super::check_session`], since a valid
//! signature alone never authorizes an admin request.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::config::JwtSecret;
use crate::domain::entity::{admin_session::SessionId, user::User};
use crate::domain::value_object::{user_id::UserId, user_role::UserRole};
use crate::error::{IdentityError, IdentityResult};

/// Claims carried by every bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Subject
    pub id: UserId,
    pub email: String,
    pub role: String,
    /// Present only on tokens bound to an admin session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Pending second factor; such a token authorizes nothing but `/2fa/verify`
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub temp: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub remember_me: bool,
    /// Unique per token so denylisting one never affects another
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }

    /// Remaining lifetime, never negative
    pub fn remaining(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.expires_at() - now).to_std().unwrap_or_default()
    }
}

/// A freshly signed token
#[derive(Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Verified caller attached to an authenticated request
#[derive(Clone)]
pub struct Principal {
    pub user_id: UserId,
    pub email: String,
    pub role: UserRole,
    pub session_id: Option<SessionId>,
    /// Raw bearer token, kept for logout/denylisting
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Principal")
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// How long a denylist entry for this token must live
    pub fn remaining(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.expires_at - now).to_std().unwrap_or_default()
    }
}

/// Signs and verifies bearer tokens
#[derive(Clone)]
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenAuthority {
    pub fn new(secret: &JwtSecret) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Final token; `session` is set for administrators
    pub fn issue(
        &self,
        user: &User,
        session: Option<SessionId>,
        ttl: Duration,
        remember_me: bool,
        now: DateTime<Utc>,
    ) -> IdentityResult<IssuedToken> {
        self.sign(Claims {
            id: user.user_id,
            email: user.email.as_str().to_string(),
            role: user.role.code().to_string(),
            session_id: session,
            temp: false,
            remember_me,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        })
    }

    /// Intermediate token issued after the password step when 2FA is on
    pub fn issue_two_factor(
        &self,
        user: &User,
        ttl: Duration,
        remember_me: bool,
        now: DateTime<Utc>,
    ) -> IdentityResult<IssuedToken> {
        self.sign(Claims {
            id: user.user_id,
            email: user.email.as_str().to_string(),
            role: user.role.code().to_string(),
            session_id: None,
            temp: true,
            remember_me,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        })
    }

    /// Check signature and expiry. Every failure is `Unauthenticated`.
    pub fn decode(&self, token: &str) -> IdentityResult<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Bearer token rejected");
                IdentityError::Unauthenticated
            })
    }

    fn sign(&self, claims: Claims) -> IdentityResult<IssuedToken> {
        let expires_at = claims.expires_at();
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map(|token| IssuedToken { token, expires_at })
            .map_err(|e| IdentityError::Internal(format!("Token signing failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::user::UserProfile;
    use crate::domain::value_object::{email::Email, user_password::RawPassword};
    use platform::password::HashingCost;

    fn authority(secret: &str) -> TokenAuthority {
        TokenAuthority::new(&JwtSecret::new(secret).unwrap())
    }

    fn user() -> User {
        User::register(
            Email::new("carol@example.com").unwrap(),
            &RawPassword::new("Str0ng!Passphrase".into()).unwrap(),
            UserRole::Admin,
            UserProfile::default(),
            &HashingCost::minimal(),
            Utc::now(),
        )
        .unwrap()
    }

    const SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

    #[test]
    fn test_issue_and_decode() {
        let tokens = authority(SECRET);
        let user = user();
        let session = SessionId::new();
        let issued = tokens
            .issue(&user, Some(session), Duration::hours(8), false, Utc::now())
            .unwrap();

        assert_eq!(issued.token.split('.').count(), 3);
        let claims = tokens.decode(&issued.token).unwrap();
        assert_eq!(claims.id, user.user_id);
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.session_id, Some(session));
        assert!(!claims.temp);
    }

    #[test]
    fn test_wire_claim_names() {
        let tokens = authority(SECRET);
        let issued = tokens
            .issue_two_factor(&user(), Duration::minutes(10), false, Utc::now())
            .unwrap();
        let claims = tokens.decode(&issued.token).unwrap();
        let json = serde_json::to_value(&claims).unwrap();

        assert_eq!(json["temp"], true);
        assert!(json.get("sessionId").is_none());
        assert!(json.get("rememberMe").is_none());
        assert!(json.get("id").is_some());
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = authority(SECRET);
        let issued = tokens
            .issue(&user(), None, Duration::hours(1), false, Utc::now() - Duration::hours(2))
            .unwrap();
        assert!(matches!(
            tokens.decode(&issued.token),
            Err(IdentityError::Unauthenticated)
        ));
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let issued = authority(SECRET)
            .issue(&user(), None, Duration::hours(1), false, Utc::now())
            .unwrap();
        let other = authority("another-secret-that-is-long-enough-too");
        assert!(other.decode(&issued.token).is_err());
        assert!(other.decode("not.a.token").is_err());
    }

    #[test]
    fn test_tokens_are_unique() {
        let tokens = authority(SECRET);
        let user = user();
        let now = Utc::now();
        let a = tokens.issue(&user, None, Duration::hours(1), false, now).unwrap();
        let b = tokens.issue(&user, None, Duration::hours(1), false, now).unwrap();
        assert_ne!(a.token, b.token);
    }
}
