//! Identity Error Types
//!
//! Identity-specific error variants that integrate with the unified
//! `kernel::error::AppError` system. Credential failures keep their messages
//! generic; the precise cause goes to the security log instead.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use platform::denylist::DenylistError;
use platform::password::{PasswordHashError, PasswordPolicyError};
use platform::rate_limit::RateLimitError;
use thiserror::Error;

use crate::domain::validation::FieldError;

/// Identity result type alias
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Identity error variants
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Field-level input errors
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Email is already registered")]
    EmailTaken,

    #[error("Tax ID is already registered")]
    TaxIdTaken,

    /// Wrong and expired tokens are deliberately indistinguishable
    #[error("Invalid or expired verification token")]
    InvalidVerificationToken,

    #[error("Invalid or expired password reset token")]
    InvalidResetToken,

    #[error("Two-factor authentication is not set up")]
    TwoFactorNotSetup,

    #[error("Two-factor authentication is already enabled")]
    TwoFactorAlreadyEnabled,

    /// Block/delete/role change aimed at the acting administrator
    #[error("Administrators cannot perform this action on their own account")]
    SelfTargetForbidden,

    #[error("User email is not verified")]
    EmailNotVerified,

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// Transition not valid for the current lifecycle state
    #[error("{0}")]
    InvalidState(&'static str),

    /// Re-authentication with the current password failed
    #[error("Current password is incorrect")]
    IncorrectPassword,

    /// Unknown email or wrong password
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Every second-factor failure, whatever the cause
    #[error("Invalid or expired two-factor code")]
    InvalidTwoFactorCode,

    /// Missing, malformed, expired, denylisted or session-less token
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Account not activated. Please verify your email address")]
    AccountNotActivated,

    #[error("Account is pending administrator approval")]
    AccountPendingApproval,

    #[error("Account is blocked")]
    AccountBlocked,

    #[error("Administrator access required")]
    Forbidden,

    #[error("Account is temporarily locked")]
    AccountLocked { until: DateTime<Utc> },

    #[error("User not found")]
    UserNotFound,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Pending registration not found")]
    PendingUserNotFound,

    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IdentityError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::Validation(_)
            | IdentityError::EmailTaken
            | IdentityError::TaxIdTaken
            | IdentityError::InvalidVerificationToken
            | IdentityError::InvalidResetToken
            | IdentityError::TwoFactorNotSetup
            | IdentityError::TwoFactorAlreadyEnabled
            | IdentityError::SelfTargetForbidden
            | IdentityError::EmailNotVerified
            | IdentityError::InvalidRole(_)
            | IdentityError::InvalidState(_)
            | IdentityError::IncorrectPassword => ErrorKind::BadRequest,
            IdentityError::InvalidCredentials
            | IdentityError::InvalidTwoFactorCode
            | IdentityError::Unauthenticated => ErrorKind::Unauthorized,
            IdentityError::AccountNotActivated
            | IdentityError::AccountPendingApproval
            | IdentityError::AccountBlocked
            | IdentityError::Forbidden => ErrorKind::Forbidden,
            IdentityError::AccountLocked { .. } => ErrorKind::Locked,
            IdentityError::UserNotFound
            | IdentityError::SessionNotFound
            | IdentityError::PendingUserNotFound => ErrorKind::NotFound,
            IdentityError::RateLimited { .. } => ErrorKind::TooManyRequests,
            IdentityError::Database(_) | IdentityError::Internal(_) => {
                ErrorKind::InternalServerError
            }
        }
    }

    /// Convert to AppError
    pub fn to_app_error(&self) -> AppError {
        match self {
            IdentityError::Validation(errors) => AppError::bad_request(self.to_string())
                .with_details(serde_json::to_value(errors).unwrap_or_default()),
            IdentityError::AccountLocked { until } => AppError::locked(self.to_string())
                .with_action(format!("Try again after {}", until.to_rfc3339())),
            IdentityError::RateLimited { retry_after_secs } => {
                AppError::too_many_requests(self.to_string())
                    .with_action(format!("Retry after {retry_after_secs} seconds"))
            }
            IdentityError::AccountNotActivated => AppError::forbidden(self.to_string())
                .with_action("Check your inbox for the verification link"),
            IdentityError::Database(_) | IdentityError::Internal(_) => {
                AppError::internal("Internal server error")
            }
            _ => AppError::new(self.kind(), self.to_string()),
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            IdentityError::Database(e) => {
                tracing::error!(error = %e, "Identity database error");
            }
            IdentityError::Internal(msg) => {
                tracing::error!(message = %msg, "Identity internal error");
            }
            IdentityError::InvalidCredentials | IdentityError::InvalidTwoFactorCode => {
                tracing::warn!(error = %self, "Credential rejected");
            }
            IdentityError::AccountLocked { until } => {
                tracing::warn!(%until, "Login attempt on locked account");
            }
            IdentityError::RateLimited { retry_after_secs } => {
                tracing::warn!(retry_after_secs, "Rate limit exceeded");
            }
            _ => {
                tracing::debug!(error = %self, "Identity error");
            }
        }
    }
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        self.log();
        let retry_after = match &self {
            IdentityError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let mut response = match self {
            // Keep the driver error as source so connection failures map to 503
            IdentityError::Database(e) => AppError::from(e).into_response(),
            other => other.to_app_error().into_response(),
        };

        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<AppError> for IdentityError {
    fn from(err: AppError) -> Self {
        IdentityError::Internal(err.to_string())
    }
}

impl From<RateLimitError> for IdentityError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Exceeded { retry_after_secs } => {
                IdentityError::RateLimited { retry_after_secs }
            }
            RateLimitError::Backend(msg) => IdentityError::Internal(msg),
        }
    }
}

impl From<DenylistError> for IdentityError {
    fn from(err: DenylistError) -> Self {
        IdentityError::Internal(err.to_string())
    }
}

impl From<PasswordHashError> for IdentityError {
    fn from(err: PasswordHashError) -> Self {
        IdentityError::Internal(err.to_string())
    }
}

impl From<PasswordPolicyError> for IdentityError {
    fn from(err: PasswordPolicyError) -> Self {
        IdentityError::Validation(vec![FieldError::new("password", err.to_string())])
    }
}
