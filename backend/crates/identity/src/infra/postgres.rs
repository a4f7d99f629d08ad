//! PostgreSQL Repository Implementations

use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::domain::entity::{
    admin_session::{AdminSession, SessionId},
    pending_user::{PendingStatus, PendingUser, PendingUserId},
    security_log::{
        LogId, Outcome, Page, SecurityEventType, SecurityLogEntry, SecurityLogFilter,
    },
    user::{Address, LockoutPolicy, LoginFailure, User, UserProfile},
};
use crate::domain::repository::{
    AdminSessionRepository, PendingUserRepository, SecurityLogRepository, UserRepository,
};
use crate::domain::value_object::{
    email::Email, one_time_token::OneTimeToken, totp_secret::TotpSecret, user_id::UserId,
    user_password::UserPassword, user_role::UserRole, user_status::UserStatus,
};
use crate::error::{IdentityError, IdentityResult};

/// PostgreSQL-backed identity repository
#[derive(Clone)]
pub struct PgIdentityRepository {
    pool: PgPool,
}

impl PgIdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = r#"
    user_id, email, password_hash, role, status, email_verified,
    first_name, last_name, company_name, tax_id, phone,
    street, city, postal_code, country,
    email_verification_token_hash, email_verification_expires_at,
    password_reset_token_hash, password_reset_expires_at,
    totp_secret, pending_totp_secret,
    deleted_at, created_at, updated_at,
    failed_login_count, locked_until, last_login_at
"#;

const SESSION_COLUMNS: &str = r#"
    session_id, user_id, ip_address, user_agent, created_at, expires_at,
    last_activity_at, is_active, revoked_at, revoked_by
"#;

const LOG_COLUMNS: &str =
    "log_id, user_id, event_type, outcome, ip_address, user_agent, details, created_at";

const PENDING_COLUMNS: &str = r#"
    pending_id, email, password_hash, role,
    first_name, last_name, company_name, tax_id, phone,
    street, city, postal_code, country,
    status, created_at, updated_at
"#;

/// Unique violations carry meaning for registration; everything else is a 500
fn map_unique_violation(e: sqlx::Error) -> IdentityError {
    if let sqlx::Error::Database(db) = &e {
        match db.constraint() {
            Some("users_email_key") | Some("pending_users_email_key") => {
                return IdentityError::EmailTaken;
            }
            Some("users_tax_id_key") => return IdentityError::TaxIdTaken,
            _ => {}
        }
    }
    IdentityError::Database(e)
}

fn count_to_u64(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}

/// Binds $1..$27 in `USER_COLUMNS` order
fn bind_user<'q>(
    query: Query<'q, Postgres, PgArguments>,
    user: &'q User,
) -> Query<'q, Postgres, PgArguments> {
    bind_user_fields(query, user)
        .bind(i32::try_from(user.failed_login_count).unwrap_or(i32::MAX))
        .bind(user.locked_until)
        .bind(user.last_login_at)
}

/// Binds $1..$24: every column except the login-tracking tail, which only
/// the dedicated atomic statements write
fn bind_user_fields<'q>(
    query: Query<'q, Postgres, PgArguments>,
    user: &'q User,
) -> Query<'q, Postgres, PgArguments> {
    let profile = &user.profile;
    let address = profile.address.as_ref();
    query
        .bind(user.user_id.into_uuid())
        .bind(user.email.as_str())
        .bind(user.password_hash.as_phc_string())
        .bind(user.role.id())
        .bind(user.status.id())
        .bind(user.email_verified)
        .bind(profile.first_name.as_str())
        .bind(profile.last_name.as_str())
        .bind(profile.company_name.as_deref())
        .bind(profile.tax_id.as_deref())
        .bind(profile.phone.as_deref())
        .bind(address.map(|a| a.street.as_str()))
        .bind(address.map(|a| a.city.as_str()))
        .bind(address.map(|a| a.postal_code.as_str()))
        .bind(address.map(|a| a.country.as_str()))
        .bind(user.email_verification.as_ref().map(OneTimeToken::token_hash))
        .bind(user.email_verification.as_ref().map(OneTimeToken::expires_at))
        .bind(user.password_reset.as_ref().map(OneTimeToken::token_hash))
        .bind(user.password_reset.as_ref().map(OneTimeToken::expires_at))
        .bind(user.totp_secret.as_ref().map(TotpSecret::as_base32))
        .bind(user.pending_totp_secret.as_ref().map(TotpSecret::as_base32))
        .bind(user.deleted_at)
        .bind(user.created_at)
        .bind(user.updated_at)
}

// ============================================================================
// User Repository Implementation
// ============================================================================

fn select_user_where(predicate: &str) -> String {
    format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}")
}

impl UserRepository for PgIdentityRepository {
    async fn create_user(&self, user: &User) -> IdentityResult<()> {
        let sql = format!(
            r#"
            INSERT INTO users ({USER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)
            "#
        );
        bind_user(sqlx::query(&sql), user)
            .execute(&self.pool)
            .await
            .map_err(map_unique_violation)?;

        Ok(())
    }

    async fn find_user(&self, user_id: &UserId) -> IdentityResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&select_user_where("user_id = $1"))
            .bind(user_id.into_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn find_user_by_email(&self, email: &Email) -> IdentityResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&select_user_where("email = $1"))
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn find_user_by_verification_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> IdentityResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&select_user_where(
            "email_verification_token_hash = $1 AND email_verification_expires_at > $2",
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn find_user_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> IdentityResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&select_user_where(
            "password_reset_token_hash = $1 AND password_reset_expires_at > $2",
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn email_exists(&self, email: &Email) -> IdentityResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn tax_id_exists(&self, tax_id: &str) -> IdentityResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE tax_id = $1)")
                .bind(tax_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn update_user(&self, user: &User) -> IdentityResult<()> {
        let updated = bind_user_fields(
            sqlx::query(
                r#"
                UPDATE users SET
                    email = $2,
                    password_hash = $3,
                    role = $4,
                    status = $5,
                    email_verified = $6,
                    first_name = $7,
                    last_name = $8,
                    company_name = $9,
                    tax_id = $10,
                    phone = $11,
                    street = $12,
                    city = $13,
                    postal_code = $14,
                    country = $15,
                    email_verification_token_hash = $16,
                    email_verification_expires_at = $17,
                    password_reset_token_hash = $18,
                    password_reset_expires_at = $19,
                    totp_secret = $20,
                    pending_totp_secret = $21,
                    deleted_at = $22,
                    created_at = $23,
                    updated_at = $24
                WHERE user_id = $1
                "#,
            ),
            user,
        )
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?
        .rows_affected();

        if updated == 0 {
            return Err(IdentityError::UserNotFound);
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: &UserId) -> IdentityResult<bool> {
        let deleted = sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(user_id.into_uuid())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }

    async fn list_users(
        &self,
        status: Option<UserStatus>,
        page: Page,
    ) -> IdentityResult<(Vec<User>, u64)> {
        let status = status.map(|s| s.id());

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE ($1::SMALLINT IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE ($1::SMALLINT IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let users = sqlx::query_as::<_, UserRow>(&sql)
            .bind(status)
            .bind(i64::from(page.per_page))
            .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(UserRow::into_user)
            .collect::<IdentityResult<Vec<_>>>()?;

        Ok((users, count_to_u64(total)))
    }

    async fn record_login_failure(
        &self,
        user_id: &UserId,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> IdentityResult<Option<LoginFailure>> {
        // One statement: concurrent failures serialize on the row lock.
        // An expired lock restarts the count at 1.
        let row = sqlx::query_as::<_, (i32, Option<DateTime<Utc>>)>(
            r#"
            UPDATE users SET
                failed_login_count = CASE
                    WHEN locked_until IS NOT NULL AND locked_until <= $2 THEN 1
                    ELSE failed_login_count + 1
                END,
                locked_until = CASE
                    WHEN (CASE
                        WHEN locked_until IS NOT NULL AND locked_until <= $2 THEN 1
                        ELSE failed_login_count + 1
                    END) >= $3 THEN $4
                    WHEN locked_until IS NOT NULL AND locked_until <= $2 THEN NULL
                    ELSE locked_until
                END,
                updated_at = $2
            WHERE user_id = $1
            RETURNING failed_login_count, locked_until
            "#,
        )
        .bind(user_id.into_uuid())
        .bind(now)
        .bind(i32::try_from(policy.threshold).unwrap_or(i32::MAX))
        .bind(now + policy.duration)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(count, locked_until)| LoginFailure {
            failed_login_count: u32::try_from(count).unwrap_or(0),
            locked_until,
        }))
    }

    async fn record_login_success(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> IdentityResult<()> {
        sqlx::query(
            r#"
            UPDATE users SET
                failed_login_count = 0,
                locked_until = NULL,
                last_login_at = $2,
                updated_at = $2
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.into_uuid())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_lockout(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> IdentityResult<()> {
        sqlx::query(
            r#"
            UPDATE users SET
                failed_login_count = 0,
                locked_until = NULL,
                updated_at = $2
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.into_uuid())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Admin Session Repository Implementation
// ============================================================================

impl AdminSessionRepository for PgIdentityRepository {
    async fn create_session(&self, session: &AdminSession) -> IdentityResult<()> {
        sqlx::query(&format!(
            "INSERT INTO admin_sessions ({SESSION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(session.session_id.into_uuid())
        .bind(session.user_id.into_uuid())
        .bind(session.ip_address.as_deref())
        .bind(session.user_agent.as_deref())
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.last_activity_at)
        .bind(session.is_active)
        .bind(session.revoked_at)
        .bind(session.revoked_by.map(UserId::into_uuid))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_session(&self, session_id: &SessionId) -> IdentityResult<Option<AdminSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM admin_sessions WHERE session_id = $1"
        ))
        .bind(session_id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SessionRow::into_session))
    }

    async fn touch_session(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> IdentityResult<()> {
        sqlx::query("UPDATE admin_sessions SET last_activity_at = $2 WHERE session_id = $1")
            .bind(session_id.into_uuid())
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn revoke_session(
        &self,
        session_id: &SessionId,
        revoked_by: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> IdentityResult<bool> {
        let revoked = sqlx::query(
            r#"
            UPDATE admin_sessions
            SET is_active = FALSE, revoked_at = $2, revoked_by = $3
            WHERE session_id = $1 AND is_active
            "#,
        )
        .bind(session_id.into_uuid())
        .bind(now)
        .bind(revoked_by.map(|id| id.into_uuid()))
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(revoked > 0)
    }

    async fn revoke_all_sessions(
        &self,
        user_id: &UserId,
        revoked_by: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> IdentityResult<u64> {
        let revoked = sqlx::query(
            r#"
            UPDATE admin_sessions
            SET is_active = FALSE, revoked_at = $2, revoked_by = $3
            WHERE user_id = $1 AND is_active
            "#,
        )
        .bind(user_id.into_uuid())
        .bind(now)
        .bind(revoked_by.map(|id| id.into_uuid()))
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(revoked)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> IdentityResult<u64> {
        let deleted = sqlx::query("DELETE FROM admin_sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted)
    }

    async fn list_active_sessions(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> IdentityResult<Vec<AdminSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM admin_sessions
            WHERE user_id = $1 AND is_active AND expires_at > $2
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id.into_uuid())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SessionRow::into_session).collect())
    }
}

// ============================================================================
// Security Log Repository Implementation
// ============================================================================

fn push_log_filter(builder: &mut QueryBuilder<'static, Postgres>, filter: &SecurityLogFilter) {
    builder.push(" WHERE TRUE");
    if !filter.event_types.is_empty() {
        let codes: Vec<String> = filter
            .event_types
            .iter()
            .map(|event| event.code().to_string())
            .collect();
        builder.push(" AND event_type = ANY(").push_bind(codes).push(")");
    }
    if let Some(user_id) = filter.user_id {
        builder.push(" AND user_id = ").push_bind(user_id.into_uuid());
    }
    if let Some(ip) = &filter.ip_address {
        builder.push(" AND ip_address = ").push_bind(ip.clone());
    }
    if let Some(since) = filter.since {
        builder.push(" AND created_at >= ").push_bind(since);
    }
    if let Some(pattern) = &filter.pattern {
        builder
            .push(" AND details->>'pattern' = ")
            .push_bind(pattern.clone());
    }
}

impl SecurityLogRepository for PgIdentityRepository {
    async fn append_log(&self, entry: &SecurityLogEntry) -> IdentityResult<()> {
        sqlx::query(&format!(
            "INSERT INTO security_logs ({LOG_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(entry.log_id.into_uuid())
        .bind(entry.user_id.map(UserId::into_uuid))
        .bind(entry.event_type.code())
        .bind(entry.outcome.code())
        .bind(entry.ip_address.as_deref())
        .bind(entry.user_agent.as_deref())
        .bind(sqlx::types::Json(&entry.details))
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_logs(&self, filter: &SecurityLogFilter) -> IdentityResult<u64> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM security_logs");
        push_log_filter(&mut builder, filter);
        let total = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok(count_to_u64(total))
    }

    async fn list_logs(
        &self,
        filter: &SecurityLogFilter,
        page: Page,
    ) -> IdentityResult<(Vec<SecurityLogEntry>, u64)> {
        let total = self.count_logs(filter).await?;

        let mut builder = QueryBuilder::new(format!("SELECT {LOG_COLUMNS} FROM security_logs"));
        push_log_filter(&mut builder, filter);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(page.per_page))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let entries = builder
            .build_query_as::<LogRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(LogRow::into_entry)
            .collect::<IdentityResult<Vec<_>>>()?;

        Ok((entries, total))
    }
}

// ============================================================================
// Pending User Repository Implementation
// ============================================================================

impl PendingUserRepository for PgIdentityRepository {
    async fn create_pending_user(&self, pending: &PendingUser) -> IdentityResult<()> {
        let profile = &pending.profile;
        let address = profile.address.as_ref();
        sqlx::query(&format!(
            r#"
            INSERT INTO pending_users ({PENDING_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#
        ))
        .bind(pending.pending_id.into_uuid())
        .bind(pending.email.as_str())
        .bind(pending.password_hash.as_phc_string())
        .bind(pending.role.id())
        .bind(profile.first_name.as_str())
        .bind(profile.last_name.as_str())
        .bind(profile.company_name.as_deref())
        .bind(profile.tax_id.as_deref())
        .bind(profile.phone.as_deref())
        .bind(address.map(|a| a.street.as_str()))
        .bind(address.map(|a| a.city.as_str()))
        .bind(address.map(|a| a.postal_code.as_str()))
        .bind(address.map(|a| a.country.as_str()))
        .bind(pending.status.code())
        .bind(pending.created_at)
        .bind(pending.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        Ok(())
    }

    async fn find_pending_user(
        &self,
        pending_id: &PendingUserId,
    ) -> IdentityResult<Option<PendingUser>> {
        let row = sqlx::query_as::<_, PendingRow>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_users WHERE pending_id = $1"
        ))
        .bind(pending_id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PendingRow::into_pending).transpose()
    }

    async fn pending_email_exists(&self, email: &Email) -> IdentityResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM pending_users WHERE email = $1 AND status = 'pending')",
        )
        .bind(email.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn list_pending_users(&self, page: Page) -> IdentityResult<(Vec<PendingUser>, u64)> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM pending_users WHERE status = 'pending'",
        )
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, PendingRow>(&format!(
            r#"
            SELECT {PENDING_COLUMNS} FROM pending_users
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(i64::from(page.per_page))
        .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let pending = rows
            .into_iter()
            .map(PendingRow::into_pending)
            .collect::<IdentityResult<Vec<_>>>()?;

        Ok((pending, count_to_u64(total)))
    }

    async fn update_pending_user(&self, pending: &PendingUser) -> IdentityResult<()> {
        let updated = sqlx::query(
            "UPDATE pending_users SET status = $2, updated_at = $3 WHERE pending_id = $1",
        )
        .bind(pending.pending_id.into_uuid())
        .bind(pending.status.code())
        .bind(pending.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(IdentityError::PendingUserNotFound);
        }
        Ok(())
    }

    async fn delete_pending_user(&self, pending_id: &PendingUserId) -> IdentityResult<bool> {
        let deleted = sqlx::query("DELETE FROM pending_users WHERE pending_id = $1")
            .bind(pending_id.into_uuid())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }
}

// ============================================================================
// Row Types
// ============================================================================

fn parse_role(id: i16) -> IdentityResult<UserRole> {
    UserRole::from_id(id).ok_or_else(|| IdentityError::Internal(format!("Invalid role: {id}")))
}

fn assemble_address(
    street: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
) -> Option<Address> {
    match (street, city, postal_code, country) {
        (Some(street), Some(city), Some(postal_code), Some(country)) => Some(Address {
            street,
            city,
            postal_code,
            country,
        }),
        _ => None,
    }
}

fn parse_password(phc: String) -> IdentityResult<UserPassword> {
    UserPassword::from_phc_string(phc)
        .map_err(|e| IdentityError::Internal(format!("Invalid password hash: {e}")))
}

fn parse_totp(secret: Option<String>) -> IdentityResult<Option<TotpSecret>> {
    secret
        .map(TotpSecret::from_base32)
        .transpose()
        .map_err(|e| IdentityError::Internal(format!("Invalid TOTP secret: {e}")))
}

fn assemble_token(
    token_hash: Option<String>,
    expires_at: Option<DateTime<Utc>>,
) -> Option<OneTimeToken> {
    token_hash
        .zip(expires_at)
        .map(|(hash, expires_at)| OneTimeToken::from_db(hash, expires_at))
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: Uuid,
    email: String,
    password_hash: String,
    role: i16,
    status: i16,
    email_verified: bool,
    first_name: String,
    last_name: String,
    company_name: Option<String>,
    tax_id: Option<String>,
    phone: Option<String>,
    street: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
    email_verification_token_hash: Option<String>,
    email_verification_expires_at: Option<DateTime<Utc>>,
    password_reset_token_hash: Option<String>,
    password_reset_expires_at: Option<DateTime<Utc>>,
    failed_login_count: i32,
    locked_until: Option<DateTime<Utc>>,
    totp_secret: Option<String>,
    pending_totp_secret: Option<String>,
    last_login_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> IdentityResult<User> {
        let status = UserStatus::from_id(self.status)
            .ok_or_else(|| IdentityError::Internal(format!("Invalid status: {}", self.status)))?;

        Ok(User {
            user_id: UserId::from_uuid(self.user_id),
            email: Email::from_db(self.email),
            password_hash: parse_password(self.password_hash)?,
            role: parse_role(self.role)?,
            status,
            email_verified: self.email_verified,
            profile: UserProfile {
                first_name: self.first_name,
                last_name: self.last_name,
                company_name: self.company_name,
                tax_id: self.tax_id,
                phone: self.phone,
                address: assemble_address(self.street, self.city, self.postal_code, self.country),
            },
            email_verification: assemble_token(
                self.email_verification_token_hash,
                self.email_verification_expires_at,
            ),
            password_reset: assemble_token(
                self.password_reset_token_hash,
                self.password_reset_expires_at,
            ),
            failed_login_count: u32::try_from(self.failed_login_count).unwrap_or(0),
            locked_until: self.locked_until,
            totp_secret: parse_totp(self.totp_secret)?,
            pending_totp_secret: parse_totp(self.pending_totp_secret)?,
            last_login_at: self.last_login_at,
            deleted_at: self.deleted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: Uuid,
    user_id: Uuid,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    is_active: bool,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<Uuid>,
}

impl SessionRow {
    fn into_session(self) -> AdminSession {
        AdminSession {
            session_id: SessionId::from_uuid(self.session_id),
            user_id: UserId::from_uuid(self.user_id),
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_activity_at: self.last_activity_at,
            is_active: self.is_active,
            revoked_at: self.revoked_at,
            revoked_by: self.revoked_by.map(UserId::from_uuid),
        }
    }
}

#[derive(sqlx::FromRow)]
struct LogRow {
    log_id: Uuid,
    user_id: Option<Uuid>,
    event_type: String,
    outcome: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    details: sqlx::types::Json<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl LogRow {
    fn into_entry(self) -> IdentityResult<SecurityLogEntry> {
        let event_type = SecurityEventType::from_code(&self.event_type).ok_or_else(|| {
            IdentityError::Internal(format!("Invalid event type: {}", self.event_type))
        })?;
        let outcome = Outcome::from_code(&self.outcome)
            .ok_or_else(|| IdentityError::Internal(format!("Invalid outcome: {}", self.outcome)))?;

        Ok(SecurityLogEntry {
            log_id: LogId::from_uuid(self.log_id),
            user_id: self.user_id.map(UserId::from_uuid),
            event_type,
            outcome,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            details: self.details.0,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PendingRow {
    pending_id: Uuid,
    email: String,
    password_hash: String,
    role: i16,
    first_name: String,
    last_name: String,
    company_name: Option<String>,
    tax_id: Option<String>,
    phone: Option<String>,
    street: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PendingRow {
    fn into_pending(self) -> IdentityResult<PendingUser> {
        let status = PendingStatus::from_code(&self.status).ok_or_else(|| {
            IdentityError::Internal(format!("Invalid pending status: {}", self.status))
        })?;

        Ok(PendingUser {
            pending_id: PendingUserId::from_uuid(self.pending_id),
            email: Email::from_db(self.email),
            password_hash: parse_password(self.password_hash)?,
            role: parse_role(self.role)?,
            profile: UserProfile {
                first_name: self.first_name,
                last_name: self.last_name,
                company_name: self.company_name,
                tax_id: self.tax_id,
                phone: self.phone,
                address: assemble_address(self.street, self.city, self.postal_code, self.country),
            },
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
