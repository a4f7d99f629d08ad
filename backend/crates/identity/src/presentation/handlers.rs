//! HTTP Handlers
//!
//! Thin adapters: extract, call one use case, shape the response. Router
//! state is [`IdentityServices`]; every use case is built per request from a
//! clone of it (a handful of `Arc` bumps).

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::sign_in::SignInInput;
use crate::application::{
    AccountUseCase, EphemeralStore, IdentityServices, PasswordUseCase, PendingUsersUseCase,
    RegisterUseCase, SecurityLogsUseCase, SessionAdminUseCase, SignInOutput, SignInUseCase,
    SignOutUseCase, TotpSetupUseCase, UserAdminUseCase, VerifyEmailUseCase,
};
use crate::domain::entity::admin_session::SessionId;
use crate::domain::entity::pending_user::PendingUserId;
use crate::domain::entity::security_log::{Page, SecurityEventType, SecurityLogFilter};
use crate::domain::repository::IdentityStore;
use crate::domain::validation::FieldError;
use crate::domain::value_object::{user_id::UserId, user_status::UserStatus};
use crate::error::{IdentityError, IdentityResult};
use crate::presentation::dto::{
    ChangePasswordRequest, ChangeRoleRequest, CodeRequest, DeleteAccountRequest, EmailRequest,
    LoginRequest, LoginResponse, MessageResponse, PageQuery, PageResponse, PendingUserResponse,
    ReasonRequest, RegisterRequest, RegisterResponse, ResetPasswordRequest,
    RevokedSessionsResponse, SecurityLogQuery, SecurityLogResponse, SessionResponse,
    StagedRegistrationResponse, TotpSetupResponse, TwoFactorVerifyRequest, UserListQuery,
    UserResponse, VerifyEmailQuery,
};
use crate::presentation::extractors::{AdminUser, AuthUser, ClientInfo};

/// Shared state for identity handlers
pub type IdentityState<R, C> = IdentityServices<R, C>;

fn sign_in_response(output: SignInOutput) -> LoginResponse {
    match output {
        SignInOutput::Authenticated { token, user, .. } => LoginResponse::authenticated(token, &user),
        SignInOutput::TwoFactorRequired { temp_token } => {
            LoginResponse::two_factor_required(temp_token)
        }
    }
}

// ============================================================================
// Registration
// ============================================================================

/// POST /api/auth/register
pub async fn register<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    Json(req): Json<RegisterRequest>,
) -> IdentityResult<impl IntoResponse>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let user = RegisterUseCase::new(services)
        .register(req.into(), &client)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Check your email to verify your account.",
            user: UserResponse::from(&user),
        }),
    ))
}

/// POST /api/auth/register/staged
pub async fn register_staged<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    Json(req): Json<RegisterRequest>,
) -> IdentityResult<impl IntoResponse>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let pending = RegisterUseCase::new(services)
        .stage(req.into(), &client)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(StagedRegistrationResponse {
            message: "Registration received and awaiting review.",
            pending_id: pending.pending_id.to_string(),
        }),
    ))
}

/// GET /api/auth/verify-email?token=
pub async fn verify_email<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    Query(query): Query<VerifyEmailQuery>,
) -> IdentityResult<Json<RegisterResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let token = query.token.unwrap_or_default();
    let user = VerifyEmailUseCase::new(services)
        .verify(&token, &client)
        .await?;

    Ok(Json(RegisterResponse {
        message: "Email verified. Your account is awaiting administrator approval.",
        user: UserResponse::from(&user),
    }))
}

/// POST /api/auth/resend-verification
pub async fn resend_verification<R, C>(
    State(services): State<IdentityState<R, C>>,
    Json(req): Json<EmailRequest>,
) -> IdentityResult<Json<MessageResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    VerifyEmailUseCase::new(services).resend(&req.email).await?;

    Ok(Json(MessageResponse::new(
        "If the account exists and is unverified, a new verification email has been sent.",
    )))
}

// ============================================================================
// Sign In / Sign Out
// ============================================================================

/// POST /api/auth/login
pub async fn login<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    Json(req): Json<LoginRequest>,
) -> IdentityResult<Json<LoginResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let input = SignInInput {
        email: req.email,
        password: req.password,
        remember_me: req.remember_me,
    };
    let output = SignInUseCase::new(services).login(input, &client).await?;

    Ok(Json(sign_in_response(output)))
}

/// POST /api/auth/2fa/verify
pub async fn verify_two_factor<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    Json(req): Json<TwoFactorVerifyRequest>,
) -> IdentityResult<Json<LoginResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let output = SignInUseCase::new(services)
        .verify_two_factor(&req.temp_token, &req.code, &client)
        .await?;

    Ok(Json(sign_in_response(output)))
}

/// POST /api/auth/logout
pub async fn logout<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    AuthUser(principal): AuthUser,
) -> IdentityResult<Json<MessageResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    SignOutUseCase::new(services)
        .logout(&principal, &client)
        .await?;

    Ok(Json(MessageResponse::new("Logged out")))
}

// ============================================================================
// Passwords
// ============================================================================

/// POST /api/auth/forgot-password
pub async fn forgot_password<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    Json(req): Json<EmailRequest>,
) -> IdentityResult<Json<MessageResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    PasswordUseCase::new(services)
        .forgot(&req.email, &client)
        .await?;

    Ok(Json(MessageResponse::new(
        "If the account exists, a password reset email has been sent.",
    )))
}

/// POST /api/auth/reset-password
pub async fn reset_password<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    Json(req): Json<ResetPasswordRequest>,
) -> IdentityResult<Json<MessageResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    PasswordUseCase::new(services)
        .reset(&req.token, req.new_password, &client)
        .await?;

    Ok(Json(MessageResponse::new("Password has been reset")))
}

/// PUT /api/auth/password
pub async fn change_password<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    AuthUser(principal): AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> IdentityResult<Json<MessageResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    PasswordUseCase::new(services)
        .change(&principal, req.current_password, req.new_password, &client)
        .await?;

    Ok(Json(MessageResponse::new("Password changed")))
}

// ============================================================================
// Profile
// ============================================================================

/// GET /api/auth/profile
pub async fn profile<R, C>(
    State(services): State<IdentityState<R, C>>,
    AuthUser(principal): AuthUser,
) -> IdentityResult<Json<UserResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let user = AccountUseCase::new(services).profile(&principal).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// DELETE /api/auth/profile
pub async fn delete_profile<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    AuthUser(principal): AuthUser,
    Json(req): Json<DeleteAccountRequest>,
) -> IdentityResult<Json<MessageResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    AccountUseCase::new(services)
        .delete_self(&principal, req.password, &client)
        .await?;

    Ok(Json(MessageResponse::new("Account deleted")))
}

// ============================================================================
// Two-factor enrollment
// ============================================================================

/// POST /api/auth/2fa/setup
pub async fn totp_setup<R, C>(
    State(services): State<IdentityState<R, C>>,
    AuthUser(principal): AuthUser,
) -> IdentityResult<Json<TotpSetupResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let provisioning = TotpSetupUseCase::new(services).setup(&principal).await?;
    Ok(Json(TotpSetupResponse::from(provisioning)))
}

/// POST /api/auth/2fa/confirm
pub async fn totp_confirm<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    AuthUser(principal): AuthUser,
    Json(req): Json<CodeRequest>,
) -> IdentityResult<Json<MessageResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    TotpSetupUseCase::new(services)
        .confirm(&principal, &req.code, &client)
        .await?;

    Ok(Json(MessageResponse::new("Two-factor authentication enabled")))
}

/// POST /api/auth/2fa/disable
pub async fn totp_disable<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    AuthUser(principal): AuthUser,
    Json(req): Json<CodeRequest>,
) -> IdentityResult<Json<MessageResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    TotpSetupUseCase::new(services)
        .disable(&principal, &req.code, &client)
        .await?;

    Ok(Json(MessageResponse::new("Two-factor authentication disabled")))
}

// ============================================================================
// User administration
// ============================================================================

/// GET /api/auth/users
pub async fn list_users<R, C>(
    State(services): State<IdentityState<R, C>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<UserListQuery>,
) -> IdentityResult<Json<PageResponse<UserResponse>>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let status = query
        .status
        .as_deref()
        .map(|code| {
            UserStatus::from_code(code).ok_or_else(|| {
                IdentityError::Validation(vec![FieldError::new("status", "Unknown status")])
            })
        })
        .transpose()?;
    let page = Page::new(query.page, query.per_page);

    let (users, total) = UserAdminUseCase::new(services).list(status, page).await?;
    let items = users.iter().map(UserResponse::from).collect();

    Ok(Json(PageResponse::new(items, total, page)))
}

/// POST /api/auth/users/{id}/approve
pub async fn approve_user<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<UserId>,
) -> IdentityResult<Json<UserResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let user = UserAdminUseCase::new(services)
        .approve(&admin, &user_id, &client)
        .await?;

    Ok(Json(UserResponse::from(&user)))
}

/// POST /api/auth/users/{id}/reject
pub async fn reject_user<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<UserId>,
    Json(req): Json<ReasonRequest>,
) -> IdentityResult<Json<MessageResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    UserAdminUseCase::new(services)
        .reject(&admin, &user_id, req.reason, &client)
        .await?;

    Ok(Json(MessageResponse::new("User rejected")))
}

/// POST /api/auth/users/{id}/block
pub async fn block_user<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<UserId>,
    Json(req): Json<ReasonRequest>,
) -> IdentityResult<Json<UserResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let user = UserAdminUseCase::new(services)
        .block(&admin, &user_id, req.reason, &client)
        .await?;

    Ok(Json(UserResponse::from(&user)))
}

/// POST /api/auth/users/{id}/unblock
pub async fn unblock_user<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<UserId>,
) -> IdentityResult<Json<UserResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let user = UserAdminUseCase::new(services)
        .unblock(&admin, &user_id, &client)
        .await?;

    Ok(Json(UserResponse::from(&user)))
}

/// PUT /api/auth/users/{id}/role
pub async fn change_role<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<UserId>,
    Json(req): Json<ChangeRoleRequest>,
) -> IdentityResult<Json<UserResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let user = UserAdminUseCase::new(services)
        .change_role(&admin, &user_id, &req.role, req.reason, &client)
        .await?;

    Ok(Json(UserResponse::from(&user)))
}

/// DELETE /api/auth/users/{id}
pub async fn delete_user<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<UserId>,
) -> IdentityResult<Json<MessageResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    UserAdminUseCase::new(services)
        .delete(&admin, &user_id, &client)
        .await?;

    Ok(Json(MessageResponse::new("User deleted")))
}

/// POST /api/auth/users/{id}/sessions/revoke
pub async fn revoke_user_sessions<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<UserId>,
) -> IdentityResult<Json<RevokedSessionsResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let revoked = UserAdminUseCase::new(services)
        .revoke_user_sessions(&admin, &user_id, &client)
        .await?;

    Ok(Json(RevokedSessionsResponse { revoked }))
}

// ============================================================================
// Admin sessions
// ============================================================================

/// GET /api/auth/sessions
pub async fn list_sessions<R, C>(
    State(services): State<IdentityState<R, C>>,
    AdminUser(admin): AdminUser,
) -> IdentityResult<Json<Vec<SessionResponse>>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let sessions = SessionAdminUseCase::new(services).list_own(&admin).await?;

    Ok(Json(
        sessions
            .iter()
            .map(|session| SessionResponse::new(session, admin.session_id))
            .collect(),
    ))
}

/// DELETE /api/auth/sessions/{id}
pub async fn revoke_session<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    AdminUser(admin): AdminUser,
    Path(session_id): Path<SessionId>,
) -> IdentityResult<Json<MessageResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    SessionAdminUseCase::new(services)
        .revoke(&admin, &session_id, &client)
        .await?;

    Ok(Json(MessageResponse::new("Session revoked")))
}

// ============================================================================
// Staged registrations
// ============================================================================

/// GET /api/auth/pending-users
pub async fn list_pending_users<R, C>(
    State(services): State<IdentityState<R, C>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<PageQuery>,
) -> IdentityResult<Json<PageResponse<PendingUserResponse>>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let page = Page::new(query.page, query.per_page);
    let (pending, total) = PendingUsersUseCase::new(services).list(page).await?;
    let items = pending.iter().map(PendingUserResponse::from).collect();

    Ok(Json(PageResponse::new(items, total, page)))
}

/// POST /api/auth/pending-users/{id}/accept
pub async fn accept_pending_user<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    AdminUser(admin): AdminUser,
    Path(pending_id): Path<PendingUserId>,
) -> IdentityResult<Json<UserResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let user = PendingUsersUseCase::new(services)
        .accept(&admin, &pending_id, &client)
        .await?;

    Ok(Json(UserResponse::from(&user)))
}

/// POST /api/auth/pending-users/{id}/reject
pub async fn reject_pending_user<R, C>(
    State(services): State<IdentityState<R, C>>,
    ClientInfo(client): ClientInfo,
    AdminUser(admin): AdminUser,
    Path(pending_id): Path<PendingUserId>,
) -> IdentityResult<Json<MessageResponse>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    PendingUsersUseCase::new(services)
        .reject(&admin, &pending_id, &client)
        .await?;

    Ok(Json(MessageResponse::new("Registration rejected")))
}

// ============================================================================
// Security log
// ============================================================================

fn log_filter(query: &SecurityLogQuery) -> IdentityResult<SecurityLogFilter> {
    let mut errors = Vec::new();

    let mut event_types = Vec::new();
    for code in query
        .event_type
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
    {
        match SecurityEventType::from_code(code) {
            Some(event) => event_types.push(event),
            None => errors.push(FieldError::new("eventType", format!("Unknown event type: {code}"))),
        }
    }

    let user_id = match query.user_id.as_deref().map(str::parse::<UserId>).transpose() {
        Ok(user_id) => user_id,
        Err(_) => {
            errors.push(FieldError::new("userId", "Must be a UUID"));
            None
        }
    };

    if !errors.is_empty() {
        return Err(IdentityError::Validation(errors));
    }

    Ok(SecurityLogFilter {
        event_types,
        user_id,
        ip_address: query.ip.clone(),
        since: query.since,
        pattern: query.pattern.clone(),
    })
}

/// GET /api/auth/security-logs
pub async fn list_security_logs<R, C>(
    State(services): State<IdentityState<R, C>>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<SecurityLogQuery>,
) -> IdentityResult<Json<PageResponse<SecurityLogResponse>>>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let filter = log_filter(&query)?;
    let page = Page::new(query.page, query.per_page);

    let (entries, total) = SecurityLogsUseCase::new(services)
        .list(&filter, page)
        .await?;
    let items = entries.iter().map(SecurityLogResponse::from).collect();

    Ok(Json(PageResponse::new(items, total, page)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_parses_event_list() {
        let query = SecurityLogQuery {
            event_type: Some("login_failure, suspicious_activity".into()),
            ..SecurityLogQuery::default()
        };
        let filter = log_filter(&query).unwrap();
        assert_eq!(
            filter.event_types,
            vec![SecurityEventType::LoginFailure, SecurityEventType::SuspiciousActivity]
        );
    }

    #[test]
    fn test_log_filter_rejects_unknown_values() {
        let query = SecurityLogQuery {
            event_type: Some("nope".into()),
            user_id: Some("not-a-uuid".into()),
            ..SecurityLogQuery::default()
        };
        match log_filter(&query) {
            Err(IdentityError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
