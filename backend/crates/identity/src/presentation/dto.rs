//! API DTOs (Data Transfer Objects)
//!
//! Wire shapes only. Responses are built from domain types and never carry
//! password hashes, TOTP secrets or one-time token digests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::token::IssuedToken;
use crate::domain::entity::{
    admin_session::{AdminSession, SessionId},
    pending_user::PendingUser,
    security_log::{Page, SecurityLogEntry},
    user::{Address, User, UserProfile},
};
use crate::domain::validation::RegistrationInput;
use crate::domain::value_object::totp_secret::TotpProvisioning;

/// Redacts credential fields in `Debug`
macro_rules! redacted_debug {
    ($ty:ident { $($field:ident),* } hide { $($secret:ident),* }) => {
        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty))
                    $(.field(stringify!($field), &self.$field))*
                    $(.field(stringify!($secret), &"[REDACTED]"))*
                    .finish()
            }
        }
    };
}

// ============================================================================
// Shared
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressResponse {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl From<&Address> for AddressResponse {
    fn from(address: &Address) -> Self {
        Self {
            street: address.street.clone(),
            city: address.city.clone(),
            postal_code: address.postal_code.clone(),
            country: address.country.clone(),
        }
    }
}

/// Non-sensitive view of a user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub role: &'static str,
    pub status: &'static str,
    pub email_verified: bool,
    pub first_name: String,
    pub last_name: String,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub phone: Option<String>,
    pub address: Option<AddressResponse>,
    pub two_factor_enabled: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        let UserProfile {
            first_name,
            last_name,
            company_name,
            tax_id,
            phone,
            address,
        } = &user.profile;

        Self {
            id: user.user_id.to_string(),
            email: user.email.as_str().to_string(),
            role: user.role.code(),
            status: user.status.code(),
            email_verified: user.email_verified,
            first_name: first_name.clone(),
            last_name: last_name.clone(),
            company_name: company_name.clone(),
            tax_id: tax_id.clone(),
            phone: phone.clone(),
            address: address.as_ref().map(AddressResponse::from),
            two_factor_enabled: user.two_factor_enabled(),
            last_login_at: user.last_login_at,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Paginated listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

impl<T> PageResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: Page) -> Self {
        Self {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
            total_pages: total.div_ceil(u64::from(page.per_page)),
        }
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Missing fields deserialize as empty and fail validation with field detail
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

redacted_debug!(RegisterRequest { email, first_name, last_name } hide { password });

impl From<RegisterRequest> for RegistrationInput {
    fn from(req: RegisterRequest) -> Self {
        Self {
            email: req.email,
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
            company_name: req.company_name,
            tax_id: req.tax_id,
            phone: req.phone,
            street: req.street,
            city: req.city,
            postal_code: req.postal_code,
            country: req.country,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user: UserResponse,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedRegistrationResponse {
    pub message: &'static str,
    pub pending_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmailRequest {
    pub email: String,
}

// ============================================================================
// Sign In
// ============================================================================

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub remember_me: bool,
}

redacted_debug!(LoginRequest { email, remember_me } hide { password });

/// Either a final token with the user, or `requires2FA` with an intermediate token
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserResponse>,
    #[serde(rename = "requires2FA")]
    pub requires_two_factor: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_token: Option<String>,
}

redacted_debug!(LoginResponse { expires_at, user, requires_two_factor } hide { token, temp_token });

impl LoginResponse {
    pub fn authenticated(token: IssuedToken, user: &User) -> Self {
        Self {
            token: Some(token.token),
            expires_at: Some(token.expires_at),
            user: Some(UserResponse::from(user)),
            requires_two_factor: false,
            temp_token: None,
        }
    }

    pub fn two_factor_required(temp_token: IssuedToken) -> Self {
        Self {
            token: None,
            expires_at: Some(temp_token.expires_at),
            user: None,
            requires_two_factor: true,
            temp_token: Some(temp_token.token),
        }
    }
}

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TwoFactorVerifyRequest {
    pub temp_token: String,
    pub code: String,
}

redacted_debug!(TwoFactorVerifyRequest {} hide { temp_token, code });

// ============================================================================
// Passwords and account
// ============================================================================

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

redacted_debug!(ResetPasswordRequest {} hide { token, new_password });

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

redacted_debug!(ChangePasswordRequest {} hide { current_password, new_password });

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeleteAccountRequest {
    pub password: String,
}

redacted_debug!(DeleteAccountRequest {} hide { password });

// ============================================================================
// Two-factor enrollment
// ============================================================================

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct CodeRequest {
    pub code: String,
}

redacted_debug!(CodeRequest {} hide { code });

/// Returned once; the secret is not retrievable afterwards
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotpSetupResponse {
    pub secret: String,
    pub otpauth_url: String,
    /// Base64-encoded PNG
    pub qr_code: String,
}

redacted_debug!(TotpSetupResponse {} hide { secret, otpauth_url, qr_code });

impl From<TotpProvisioning> for TotpSetupResponse {
    fn from(provisioning: TotpProvisioning) -> Self {
        Self {
            secret: provisioning.secret,
            otpauth_url: provisioning.otpauth_url,
            qr_code: provisioning.qr_code_base64,
        }
    }
}

// ============================================================================
// Administration
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChangeRoleRequest {
    pub role: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevokedSessionsResponse {
    pub revoked: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    /// The session behind the requesting token
    pub current: bool,
}

impl SessionResponse {
    pub fn new(session: &AdminSession, current: Option<SessionId>) -> Self {
        Self {
            id: session.session_id.to_string(),
            ip_address: session.ip_address.clone(),
            user_agent: session.user_agent.clone(),
            created_at: session.created_at,
            expires_at: session.expires_at,
            last_activity_at: session.last_activity_at,
            current: current == Some(session.session_id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUserResponse {
    pub id: String,
    pub email: String,
    pub role: &'static str,
    pub status: &'static str,
    pub first_name: String,
    pub last_name: String,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub phone: Option<String>,
    pub address: Option<AddressResponse>,
    pub created_at: DateTime<Utc>,
}

impl From<&PendingUser> for PendingUserResponse {
    fn from(pending: &PendingUser) -> Self {
        Self {
            id: pending.pending_id.to_string(),
            email: pending.email.as_str().to_string(),
            role: pending.role.code(),
            status: pending.status.code(),
            first_name: pending.profile.first_name.clone(),
            last_name: pending.profile.last_name.clone(),
            company_name: pending.profile.company_name.clone(),
            tax_id: pending.profile.tax_id.clone(),
            phone: pending.profile.phone.clone(),
            address: pending.profile.address.as_ref().map(AddressResponse::from),
            created_at: pending.created_at,
        }
    }
}

/// `eventType` takes a comma-separated list
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityLogQuery {
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub ip: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub pattern: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityLogResponse {
    pub id: String,
    pub user_id: Option<String>,
    pub event_type: &'static str,
    pub outcome: &'static str,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<&SecurityLogEntry> for SecurityLogResponse {
    fn from(entry: &SecurityLogEntry) -> Self {
        Self {
            id: entry.log_id.to_string(),
            user_id: entry.user_id.map(|id| id.to_string()),
            event_type: entry.event_type.code(),
            outcome: entry.outcome.code(),
            ip_address: entry.ip_address.clone(),
            user_agent: entry.user_agent.clone(),
            details: entry.details.clone(),
            created_at: entry.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_response_two_factor_shape() {
        let response = LoginResponse::two_factor_required(IssuedToken {
            token: "temp".into(),
            expires_at: Utc::now(),
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["requires2FA"], true);
        assert_eq!(json["tempToken"], "temp");
        assert!(json.get("token").is_none());
        assert!(json.get("user").is_none());
    }

    #[test]
    fn test_register_request_debug_hides_password() {
        let req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "alice@example.com",
            "password": "Str0ng!Passphrase",
            "firstName": "Alice",
        }))
        .unwrap();
        let debug = format!("{req:?}");
        assert!(!debug.contains("Str0ng"));
        assert_eq!(req.first_name, "Alice");
        assert!(req.last_name.is_empty());
    }

    #[test]
    fn test_page_response_total_pages() {
        let page = Page::new(Some(2), Some(20));
        let response = PageResponse::new(vec![1, 2], 41, page);
        assert_eq!(response.total_pages, 3);
        assert_eq!(response.page, 2);
    }
}
