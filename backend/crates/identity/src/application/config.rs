//! Application Configuration
//!
//! Configuration for the identity application layer. Read once at startup;
//! a missing or weak signing secret is a boot failure, not a request error.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use platform::client::TrustedProxies;
use platform::password::HashingCost;
use platform::rate_limit::RateLimitConfig;

use crate::application::monitor::MonitorRules;
use crate::domain::entity::user::LockoutPolicy;

/// Shortest accepted signing secret, in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Upper bound for the intermediate (pending second factor) token
const MAX_TWO_FACTOR_TOKEN_TTL_MINUTES: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("JWT_SECRET must be at least {MIN_SECRET_LEN} bytes")]
    WeakSecret,

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// HMAC signing key for bearer tokens
#[derive(Clone)]
pub struct JwtSecret(Vec<u8>);

impl JwtSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, ConfigError> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }
        Ok(Self(secret))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JwtSecret([REDACTED])")
    }
}

/// Where the process runs; `Test` disables background jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Production,
    Test,
}

impl FromStr for AppEnvironment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            _ => Err(()),
        }
    }
}

/// Per-route limiter settings
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub login: RateLimitConfig,
    pub register: RateLimitConfig,
    pub password_reset: RateLimitConfig,
    pub api: RateLimitConfig,
    /// Keyed by acting administrator, not by IP
    pub admin: RateLimitConfig,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            login: RateLimitConfig::new(5, 15 * 60),
            register: RateLimitConfig::new(3, 3600),
            password_reset: RateLimitConfig::new(3, 3600),
            api: RateLimitConfig::new(100, 60),
            admin: RateLimitConfig::new(60, 60),
        }
    }
}

/// Identity application configuration
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub jwt_secret: JwtSecret,
    pub lockout: LockoutPolicy,
    /// Token lifetime for ordinary users (24 hours)
    pub user_token_ttl: Duration,
    /// Token and session lifetime for administrators (8 hours)
    pub admin_session_ttl: Duration,
    /// Administrator lifetime under "remember me" (7 days)
    pub remember_me_ttl: Duration,
    /// Intermediate token lifetime (at most 10 minutes)
    pub two_factor_token_ttl: Duration,
    pub email_verification_ttl: Duration,
    pub password_reset_ttl: Duration,
    pub rate_limits: RateLimits,
    /// Peers whose `X-Forwarded-For` names the client; none by default
    pub trusted_proxies: TrustedProxies,
    pub session_sweep_interval: std::time::Duration,
    pub environment: AppEnvironment,
    pub totp_issuer: String,
    /// Base for links embedded in notifications
    pub public_base_url: String,
    pub notify_webhook_url: Option<String>,
    pub password_hashing: HashingCost,
    pub monitor: MonitorRules,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: JwtSecret(vec![0u8; MIN_SECRET_LEN]),
            lockout: LockoutPolicy::default(),
            user_token_ttl: Duration::hours(24),
            admin_session_ttl: Duration::hours(8),
            remember_me_ttl: Duration::days(7),
            two_factor_token_ttl: Duration::minutes(MAX_TWO_FACTOR_TOKEN_TTL_MINUTES),
            email_verification_ttl: Duration::hours(24),
            password_reset_ttl: Duration::hours(1),
            rate_limits: RateLimits::default(),
            trusted_proxies: TrustedProxies::default(),
            session_sweep_interval: std::time::Duration::from_secs(3600),
            environment: AppEnvironment::Development,
            totp_issuer: "Storefront".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
            notify_webhook_url: None,
            password_hashing: HashingCost::default(),
            monitor: MonitorRules::default(),
        }
    }
}

impl IdentityConfig {
    /// Create config with a random signing secret (for development)
    pub fn with_random_secret() -> Self {
        use rand::RngCore;
        let mut secret = vec![0u8; 64];
        rand::rng().fill_bytes(&mut secret);
        Self {
            jwt_secret: JwtSecret(secret),
            ..Default::default()
        }
    }

    /// Create config for development (random secret, never reused across restarts)
    pub fn development() -> Self {
        Self {
            environment: AppEnvironment::Development,
            ..Self::with_random_secret()
        }
    }

    /// Fast hashing, no background jobs
    #[cfg(test)]
    pub fn testing() -> Self {
        Self {
            environment: AppEnvironment::Test,
            password_hashing: HashingCost::minimal(),
            ..Self::with_random_secret()
        }
    }

    /// Read from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let defaults = Self::default();

        let secret = env
            .string("JWT_SECRET")
            .ok_or(ConfigError::MissingVar("JWT_SECRET"))?;
        let jwt_secret = JwtSecret::new(secret.into_bytes())?;

        let lockout = LockoutPolicy {
            threshold: env.parse("LOCKOUT_THRESHOLD")?.unwrap_or(defaults.lockout.threshold),
            duration: env
                .parse::<i64>("LOCKOUT_MINUTES")?
                .map_or(defaults.lockout.duration, Duration::minutes),
        };

        let two_factor_minutes = env
            .parse::<i64>("TWO_FACTOR_TOKEN_TTL_MINUTES")?
            .unwrap_or(MAX_TWO_FACTOR_TOKEN_TTL_MINUTES)
            .clamp(1, MAX_TWO_FACTOR_TOKEN_TTL_MINUTES);

        let rate_limits = RateLimits {
            login: env.limit("LOGIN", defaults.rate_limits.login)?,
            register: env.limit("REGISTER", defaults.rate_limits.register)?,
            password_reset: env.limit("PASSWORD_RESET", defaults.rate_limits.password_reset)?,
            api: env.limit("API", defaults.rate_limits.api)?,
            admin: env.limit("ADMIN", defaults.rate_limits.admin)?,
        };

        let environment = match env.string("APP_ENV") {
            Some(value) => value.parse().map_err(|()| ConfigError::Invalid {
                key: "APP_ENV",
                value,
            })?,
            None => defaults.environment,
        };

        Ok(Self {
            jwt_secret,
            lockout,
            user_token_ttl: env
                .parse("USER_TOKEN_TTL_HOURS")?
                .map_or(defaults.user_token_ttl, Duration::hours),
            admin_session_ttl: env
                .parse("ADMIN_SESSION_TTL_HOURS")?
                .map_or(defaults.admin_session_ttl, Duration::hours),
            remember_me_ttl: env
                .parse("REMEMBER_ME_TTL_DAYS")?
                .map_or(defaults.remember_me_ttl, Duration::days),
            two_factor_token_ttl: Duration::minutes(two_factor_minutes),
            email_verification_ttl: env
                .parse("EMAIL_VERIFICATION_TTL_HOURS")?
                .map_or(defaults.email_verification_ttl, Duration::hours),
            password_reset_ttl: env
                .parse("PASSWORD_RESET_TTL_MINUTES")?
                .map_or(defaults.password_reset_ttl, Duration::minutes),
            rate_limits,
            trusted_proxies: env.parse("TRUSTED_PROXIES")?.unwrap_or_default(),
            session_sweep_interval: env
                .parse("SESSION_SWEEP_INTERVAL_SECS")?
                .map_or(defaults.session_sweep_interval, std::time::Duration::from_secs),
            environment,
            totp_issuer: env.string("TOTP_ISSUER").unwrap_or(defaults.totp_issuer),
            public_base_url: env
                .string("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            notify_webhook_url: env.string("NOTIFY_WEBHOOK_URL"),
            password_hashing: defaults.password_hashing,
            monitor: defaults.monitor,
        })
    }

    pub fn background_jobs_enabled(&self) -> bool {
        self.environment != AppEnvironment::Test
    }
}

/// Typed access over a string lookup; blank values count as unset
struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        self.string(key)
            .map(|value| {
                value
                    .parse::<T>()
                    .map_err(|_| ConfigError::Invalid { key, value })
            })
            .transpose()
    }

    fn limit(&self, route: &str, default: RateLimitConfig) -> Result<RateLimitConfig, ConfigError> {
        let max_key = format!("RATE_LIMIT_{route}_MAX");
        let window_key = format!("RATE_LIMIT_{route}_WINDOW_SECS");

        let parse = |key: &str| -> Result<Option<u64>, ConfigError> {
            self.string(key)
                .map(|value| {
                    value.parse::<u64>().map_err(|_| ConfigError::Invalid {
                        key: "RATE_LIMIT",
                        value,
                    })
                })
                .transpose()
        };

        let max_requests = match parse(&max_key)? {
            Some(max) => u32::try_from(max).map_err(|_| ConfigError::Invalid {
                key: "RATE_LIMIT",
                value: max.to_string(),
            })?,
            None => default.max_requests,
        };
        let window_secs = parse(&window_key)?.unwrap_or(default.window.as_secs());

        Ok(RateLimitConfig::new(max_requests, window_secs))
    }
}
