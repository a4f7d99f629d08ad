//! Scenario tests for the identity crate
//! Drive whole flows through the use cases and the router over the
//! in-memory repository.

#[cfg(test)]
mod support {
    use std::net::{IpAddr, SocketAddr};

    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode, header};
    use platform::client::ClientContext;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::application::notification::{Notification, NotificationReceiver};
    use crate::application::sign_in::{SignInInput, SignInOutput, SignInUseCase};
    use crate::application::token::Principal;
    use crate::application::{
        CheckSessionUseCase, IdentityServices, NotificationSender, RegisterUseCase,
    };
    use crate::config::IdentityConfig;
    use crate::domain::entity::user::User;
    use crate::domain::validation::RegistrationInput;
    use crate::infra::memory::{MemoryEphemeralStore, MemoryIdentityRepository};
    use crate::presentation::router::identity_router_generic;

    pub type Services = IdentityServices<MemoryIdentityRepository, MemoryEphemeralStore>;

    pub const PASSWORD: &str = "Str0ng!Passphrase";
    pub const ADMIN_EMAIL: &str = "admin@example.com";
    pub const ADMIN_PASSWORD: &str = "Adm1n!Passphrase";

    pub struct Harness {
        pub services: Services,
        pub notifications: NotificationReceiver,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_config(IdentityConfig::testing())
        }

        pub fn with_config(config: IdentityConfig) -> Self {
            let (notifier, notifications) = NotificationSender::channel();
            let services = IdentityServices::new(
                MemoryIdentityRepository::new(),
                MemoryEphemeralStore::new(),
                config,
                notifier,
            );
            Self {
                services,
                notifications,
            }
        }

        pub fn router(&self) -> Router {
            identity_router_generic(self.services.clone())
        }

        /// Token from the newest queued notification carrying a link
        pub fn last_link_token(&mut self) -> String {
            let mut token = None;
            while let Ok(notification) = self.notifications.try_recv() {
                if let Notification::VerifyEmail { link, .. }
                | Notification::PasswordReset { link, .. } = notification
                {
                    token = link.split("token=").nth(1).map(str::to_string);
                }
            }
            token.expect("no link notification queued")
        }

        pub async fn admin(&self) -> (Principal, String) {
            RegisterUseCase::new(self.services.clone())
                .bootstrap_admin(ADMIN_EMAIL, ADMIN_PASSWORD.to_string())
                .await
                .unwrap()
                .expect("admin created");

            let token = match self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap() {
                SignInOutput::Authenticated { token, .. } => token.token,
                other => panic!("unexpected {other:?}"),
            };
            let principal = CheckSessionUseCase::new(self.services.clone())
                .authenticate(&token, &client())
                .await
                .unwrap();
            (principal, token)
        }

        pub async fn login(
            &self,
            email: &str,
            password: &str,
        ) -> crate::IdentityResult<SignInOutput> {
            self.login_with(email, password, false).await
        }

        pub async fn login_with(
            &self,
            email: &str,
            password: &str,
            remember_me: bool,
        ) -> crate::IdentityResult<SignInOutput> {
            SignInUseCase::new(self.services.clone())
                .login(
                    SignInInput {
                        email: email.to_string(),
                        password: password.to_string(),
                        remember_me,
                    },
                    &client(),
                )
                .await
        }
    }

    pub fn client() -> ClientContext {
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        ClientContext::new(Some(ip), Some("scenario-tests".to_string()))
    }

    pub fn registration(email: &str) -> RegistrationInput {
        RegistrationInput {
            email: email.to_string(),
            password: PASSWORD.to_string(),
            first_name: "Alice".to_string(),
            last_name: "Buyer".to_string(),
            company_name: Some("Acme Wholesale".to_string()),
            tax_id: None,
            phone: Some("+1 555 0100".to_string()),
            street: Some("1 Market St".to_string()),
            city: Some("Springfield".to_string()),
            postal_code: Some("12345".to_string()),
            country: Some("US".to_string()),
        }
    }

    /// Register, verify and approve a buyer
    pub async fn active_user(harness: &mut Harness, admin: &Principal, email: &str) -> User {
        use crate::application::{UserAdminUseCase, VerifyEmailUseCase};

        let user = RegisterUseCase::new(harness.services.clone())
            .register(registration(email), &client())
            .await
            .unwrap();
        let token = harness.last_link_token();
        VerifyEmailUseCase::new(harness.services.clone())
            .verify(&token, &client())
            .await
            .unwrap();
        UserAdminUseCase::new(harness.services.clone())
            .approve(admin, &user.user_id, &client())
            .await
            .unwrap()
    }

    /// A request arriving on a socket from `peer`
    pub fn request(
        method: &str,
        uri: &str,
        peer: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let mut request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let peer: IpAddr = peer.parse().unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::new(peer, 40_000)));
        request
    }

    /// Send through the router; returns status, headers and JSON body
    pub async fn send(
        router: &Router,
        request: Request<Body>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, json)
    }

    /// One request through the router from `ip`
    pub async fn call(
        router: &Router,
        method: &str,
        uri: &str,
        ip: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        send(router, request(method, uri, ip, bearer, body)).await
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::support::*;
    use crate::application::{UserAdminUseCase, VerifyEmailUseCase};
    use crate::domain::repository::UserRepository;
    use crate::domain::value_object::email::Email;
    use crate::error::IdentityError;

    #[tokio::test]
    async fn test_buyer_lifecycle_over_http() {
        let mut harness = Harness::new();
        let (_, admin_token) = harness.admin().await;
        let router = harness.router();
        let ip = "198.51.100.20";

        let (status, _, body) = call(
            &router,
            "POST",
            "/register",
            ip,
            None,
            Some(json!({
                "email": "Alice@Example.com",
                "password": PASSWORD,
                "firstName": "Alice",
                "lastName": "Buyer",
                "companyName": "Acme Wholesale",
                "street": "1 Market St",
                "city": "Springfield",
                "postalCode": "12345",
                "country": "US"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["email"], "alice@example.com");
        assert_eq!(body["user"]["emailVerified"], false);
        let user_id = body["user"]["id"].as_str().unwrap().to_string();

        let credentials = json!({ "email": "alice@example.com", "password": PASSWORD });

        // Not yet verified
        let (status, _, _) = call(&router, "POST", "/login", ip, None, Some(credentials.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let token = harness.last_link_token();
        let (status, _, _) = call(
            &router,
            "GET",
            &format!("/verify-email?token={token}"),
            ip,
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // Verified, awaiting approval
        let (status, _, _) = call(&router, "POST", "/login", ip, None, Some(credentials.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, body) = call(
            &router,
            "POST",
            &format!("/users/{user_id}/approve"),
            ip,
            Some(&admin_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], user_id.as_str());

        let (status, _, body) = call(&router, "POST", "/login", ip, None, Some(credentials)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["requires2FA"], false);
        let token = body["token"].as_str().unwrap().to_string();

        let (status, _, body) = call(&router, "GET", "/profile", ip, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "alice@example.com");
        assert_eq!(body["emailVerified"], true);
        assert!(body.get("passwordHash").is_none());
        assert!(body.get("password").is_none());
    }

    #[tokio::test]
    async fn test_profile_requires_token() {
        let harness = Harness::new();
        let router = harness.router();

        let (status, _, _) = call(&router, "GET", "/profile", "198.51.100.21", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, _) =
            call(&router, "GET", "/profile", "198.51.100.21", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let mut harness = Harness::new();
        let register = crate::application::RegisterUseCase::new(harness.services.clone());
        register
            .register(registration("dup@example.com"), &client())
            .await
            .unwrap();
        let _ = harness.last_link_token();

        let err = register
            .register(registration("DUP@example.com"), &client())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::EmailTaken));
    }

    #[tokio::test]
    async fn test_verification_token_is_single_use() {
        let mut harness = Harness::new();
        crate::application::RegisterUseCase::new(harness.services.clone())
            .register(registration("once@example.com"), &client())
            .await
            .unwrap();
        let token = harness.last_link_token();

        let verify = VerifyEmailUseCase::new(harness.services.clone());
        let user = verify.verify(&token, &client()).await.unwrap();
        assert!(user.email_verified);

        let err = verify.verify(&token, &client()).await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidVerificationToken));
    }

    #[tokio::test]
    async fn test_resend_replaces_verification_token() {
        let mut harness = Harness::new();
        crate::application::RegisterUseCase::new(harness.services.clone())
            .register(registration("resend@example.com"), &client())
            .await
            .unwrap();
        let first = harness.last_link_token();

        let verify = VerifyEmailUseCase::new(harness.services.clone());
        verify.resend("resend@example.com").await.unwrap();
        // Unknown addresses are not revealed
        verify.resend("unknown@example.com").await.unwrap();
        let second = harness.last_link_token();
        assert_ne!(first, second);

        let err = verify.verify(&first, &client()).await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidVerificationToken));
        assert!(verify.verify(&second, &client()).await.is_ok());
    }

    #[tokio::test]
    async fn test_verification_does_not_spend_registration_allowance() {
        let mut harness = Harness::new();
        let router = harness.router();
        let ip = "198.51.100.70";
        let signup = |email: &str| {
            json!({
                "email": email,
                "password": PASSWORD,
                "firstName": "Bea",
                "lastName": "Buyer",
                "street": "2 Market St",
                "city": "Springfield",
                "postalCode": "12345",
                "country": "US"
            })
        };

        // Three colleagues behind one NAT fill the hourly registration window
        let mut tokens = Vec::new();
        for n in 0..3 {
            let email = format!("nat{n}@example.com");
            let (status, _, _) =
                call(&router, "POST", "/register", ip, None, Some(signup(&email))).await;
            assert_eq!(status, StatusCode::CREATED);
            tokens.push(harness.last_link_token());
        }
        let (status, _, _) =
            call(&router, "POST", "/register", ip, None, Some(signup("nat3@example.com"))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        let (status, _, _) = call(
            &router,
            "POST",
            "/resend-verification",
            ip,
            None,
            Some(json!({ "email": "nat0@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        tokens[0] = harness.last_link_token();

        for token in &tokens {
            let uri = format!("/verify-email?token={token}");
            let (status, _, _) = call(&router, "GET", &uri, ip, None, None).await;
            assert_eq!(status, StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_approve_unverified_user_fails() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        let user = crate::application::RegisterUseCase::new(harness.services.clone())
            .register(registration("early@example.com"), &client())
            .await
            .unwrap();
        let _ = harness.last_link_token();

        let result = UserAdminUseCase::new(harness.services.clone())
            .approve(&admin, &user.user_id, &client())
            .await;
        assert!(result.is_err());

        let stored = harness
            .services
            .repo
            .find_user_by_email(&Email::new("early@example.com").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.email_verified);
    }
}

#[cfg(test)]
mod lockout_tests {
    use axum::http::{StatusCode, header};
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::support::*;
    use crate::config::IdentityConfig;
    use crate::application::sign_in::SignInOutput;
    use crate::domain::entity::security_log::{SecurityEventType, SecurityLogFilter};
    use crate::domain::repository::{SecurityLogRepository, UserRepository};
    use crate::domain::value_object::user_role::UserRole;
    use crate::error::IdentityError;

    #[tokio::test]
    async fn test_lock_after_five_failures() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        let user = active_user(&mut harness, &admin, "lock@example.com").await;

        for _ in 0..5 {
            let err = harness.login("lock@example.com", "Wr0ng!Password").await.unwrap_err();
            assert!(matches!(err, IdentityError::InvalidCredentials));
        }

        // Locked: the correct password is not even compared
        let err = harness.login("lock@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, IdentityError::AccountLocked { .. }));

        let stored = harness.services.repo.find_user(&user.user_id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_count, 5);
        assert!(stored.locked_until.is_some_and(|until| until > Utc::now()));
    }

    #[tokio::test]
    async fn test_expired_lock_admits_correct_password() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        let user = active_user(&mut harness, &admin, "expired@example.com").await;

        // Five failures 31 minutes ago; the 30 minute lock has run out
        let policy = harness.services.config.lockout;
        let then = Utc::now() - Duration::minutes(31);
        for _ in 0..5 {
            harness
                .services
                .repo
                .record_login_failure(&user.user_id, &policy, then)
                .await
                .unwrap();
        }

        let output = harness.login("expired@example.com", PASSWORD).await.unwrap();
        assert!(matches!(output, SignInOutput::Authenticated { .. }));

        let stored = harness.services.repo.find_user(&user.user_id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_count, 0);
        assert!(stored.locked_until.is_none());
        assert!(stored.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_stale_write_keeps_lock() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        let user = active_user(&mut harness, &admin, "stale@example.com").await;

        // An admin edit loaded before the failure burst and saved after it
        let mut snapshot = harness.services.repo.find_user(&user.user_id).await.unwrap().unwrap();
        for _ in 0..5 {
            assert!(harness.login("stale@example.com", "Wr0ng!Password").await.is_err());
        }
        snapshot.change_role(UserRole::User, Utc::now());
        harness.services.repo.update_user(&snapshot).await.unwrap();

        let err = harness.login("stale@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, IdentityError::AccountLocked { .. }));

        let stored = harness.services.repo.find_user(&user.user_id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_count, 5);
        assert!(stored.locked_until.is_some());
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        let user = active_user(&mut harness, &admin, "reset@example.com").await;

        for _ in 0..4 {
            assert!(harness.login("reset@example.com", "Wr0ng!Password").await.is_err());
        }
        assert!(harness.login("reset@example.com", PASSWORD).await.is_ok());

        // Four more failures do not lock after the reset
        for _ in 0..4 {
            let err = harness.login("reset@example.com", "Wr0ng!Password").await.unwrap_err();
            assert!(matches!(err, IdentityError::InvalidCredentials));
        }
        let stored = harness.services.repo.find_user(&user.user_id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_count, 4);
        assert!(stored.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_failure_burst_raises_one_alert() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        active_user(&mut harness, &admin, "burst@example.com").await;

        let mut invalid = 0;
        let mut locked = 0;
        for _ in 0..15 {
            match harness.login("burst@example.com", "Wr0ng!Password").await {
                Err(IdentityError::InvalidCredentials) => invalid += 1,
                Err(IdentityError::AccountLocked { .. }) => locked += 1,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!((invalid, locked), (5, 10));

        let alerts = SecurityLogFilter {
            event_types: vec![SecurityEventType::SuspiciousActivity],
            pattern: Some("login_failure_burst".to_string()),
            ..Default::default()
        };
        assert_eq!(harness.services.repo.count_logs(&alerts).await.unwrap(), 1);

        let failures = SecurityLogFilter {
            event_types: vec![SecurityEventType::LoginFailure],
            ip_address: client().ip_string(),
            ..Default::default()
        };
        assert_eq!(harness.services.repo.count_logs(&failures).await.unwrap(), 15);

        let lock_events = SecurityLogFilter {
            event_types: vec![SecurityEventType::AccountLocked],
            ..Default::default()
        };
        assert_eq!(harness.services.repo.count_logs(&lock_events).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_login_route_rate_limited_per_ip() {
        let harness = Harness::new();
        let router = harness.router();
        let body = json!({ "email": "nobody@example.com", "password": "Wr0ng!Password" });

        for _ in 0..5 {
            let (status, _, _) =
                call(&router, "POST", "/login", "192.0.2.44", None, Some(body.clone())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        let (status, headers, _) =
            call(&router, "POST", "/login", "192.0.2.44", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(headers.contains_key(header::RETRY_AFTER));

        // Another address has its own window
        let (status, _, _) = call(&router, "POST", "/login", "192.0.2.45", None, Some(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let limited = SecurityLogFilter {
            event_types: vec![SecurityEventType::RateLimited],
            ..Default::default()
        };
        assert_eq!(harness.services.repo.count_logs(&limited).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_forwarded_header_from_untrusted_peer_is_ignored() {
        let harness = Harness::new();
        let router = harness.router();
        let body = json!({ "email": "nobody@example.com", "password": "Wr0ng!Password" });

        // A fresh X-Forwarded-For on every request does not buy a fresh window
        let mut statuses = Vec::new();
        for n in 0..6 {
            let mut req = request("POST", "/login", "192.0.2.60", None, Some(body.clone()));
            req.headers_mut()
                .insert("x-forwarded-for", format!("10.0.0.{n}").parse().unwrap());
            let (status, _, _) = send(&router, req).await;
            statuses.push(status);
        }
        assert_eq!(statuses[..5], [StatusCode::UNAUTHORIZED; 5]);
        assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);

        let failures = SecurityLogFilter {
            event_types: vec![SecurityEventType::LoginFailure],
            ip_address: Some("192.0.2.60".to_string()),
            ..Default::default()
        };
        assert_eq!(harness.services.repo.count_logs(&failures).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_trusted_proxy_forwards_client_address() {
        let mut config = IdentityConfig::testing();
        config.trusted_proxies = "10.0.0.2".parse().unwrap();
        let harness = Harness::with_config(config);
        let router = harness.router();
        let body = json!({ "email": "nobody@example.com", "password": "Wr0ng!Password" });

        let via_proxy = |client: &'static str| {
            let mut req = request("POST", "/login", "10.0.0.2", None, Some(body.clone()));
            req.headers_mut()
                .insert("x-forwarded-for", client.parse().unwrap());
            req
        };

        for _ in 0..5 {
            let (status, _, _) = send(&router, via_proxy("203.0.113.50")).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let (status, _, _) = send(&router, via_proxy("203.0.113.50")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        // Other clients behind the same proxy keep their own window
        let (status, _, _) = send(&router, via_proxy("203.0.113.51")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let failures = SecurityLogFilter {
            event_types: vec![SecurityEventType::LoginFailure],
            ip_address: Some("203.0.113.50".to_string()),
            ..Default::default()
        };
        assert_eq!(harness.services.repo.count_logs(&failures).await.unwrap(), 5);
    }
}

#[cfg(test)]
mod admin_tests {
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};

    use super::support::*;
    use crate::application::sign_in::SignInOutput;
    use crate::application::{CheckSessionUseCase, UserAdminUseCase};
    use crate::domain::entity::security_log::{SecurityEventType, SecurityLogFilter};
    use crate::domain::repository::{AdminSessionRepository, SecurityLogRepository};
    use crate::error::IdentityError;
    use crate::domain::value_object::user_role::UserRole;

    #[tokio::test]
    async fn test_remember_me_extends_admin_session() {
        let harness = Harness::new();
        harness.admin().await;

        for (remember_me, ttl) in [(false, Duration::hours(8)), (true, Duration::days(7))] {
            let before = Utc::now();
            let output = harness
                .login_with(ADMIN_EMAIL, ADMIN_PASSWORD, remember_me)
                .await
                .unwrap();
            let SignInOutput::Authenticated {
                token,
                session_id: Some(session_id),
                ..
            } = output
            else {
                panic!("expected an admin session");
            };

            let lifetime = token.expires_at - before;
            assert!(lifetime <= ttl + Duration::seconds(1), "{remember_me}");
            assert!(lifetime > ttl - Duration::minutes(1), "{remember_me}");

            let session = harness
                .services
                .repo
                .find_session(&session_id)
                .await
                .unwrap()
                .unwrap();
            assert!((session.expires_at - token.expires_at).num_seconds().abs() <= 1);
        }
    }

    #[tokio::test]
    async fn test_remember_me_does_not_extend_buyer_token() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        active_user(&mut harness, &admin, "keep@example.com").await;

        let before = Utc::now();
        let output = harness.login_with("keep@example.com", PASSWORD, true).await.unwrap();
        let SignInOutput::Authenticated { token, session_id, .. } = output else {
            panic!("expected a token");
        };
        assert!(session_id.is_none());
        assert!(token.expires_at - before <= Duration::hours(24) + Duration::seconds(1));
    }

    #[tokio::test]
    async fn test_admin_cannot_target_self() {
        let harness = Harness::new();
        let (admin, _) = harness.admin().await;
        let users = UserAdminUseCase::new(harness.services.clone());

        let err = users
            .block(&admin, &admin.user_id, None, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::SelfTargetForbidden));

        let err = users.delete(&admin, &admin.user_id, &client()).await.unwrap_err();
        assert!(matches!(err, IdentityError::SelfTargetForbidden));

        let err = users
            .change_role(&admin, &admin.user_id, "user", None, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::SelfTargetForbidden));
        assert_eq!(err.kind().status_code(), 400);

        let denied = SecurityLogFilter {
            event_types: vec![SecurityEventType::AccessDenied],
            user_id: Some(admin.user_id),
            ..Default::default()
        };
        assert_eq!(harness.services.repo.count_logs(&denied).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_self_block_over_http_is_bad_request() {
        let harness = Harness::new();
        let (admin, token) = harness.admin().await;
        let router = harness.router();

        let (status, _, _) = call(
            &router,
            "POST",
            &format!("/users/{}/block", admin.user_id),
            "198.51.100.30",
            Some(&token),
            Some(serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_revoked_session_invalidates_admin_token() {
        let harness = Harness::new();
        let (admin, token) = harness.admin().await;
        let session_id = admin.session_id.expect("admin tokens are session bound");

        harness
            .services
            .repo
            .revoke_session(&session_id, Some(&admin.user_id), Utc::now())
            .await
            .unwrap();

        let err = CheckSessionUseCase::new(harness.services.clone())
            .authenticate(&token, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_buyer_token_refused_on_admin_routes() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        active_user(&mut harness, &admin, "buyer@example.com").await;
        let router = harness.router();

        let token = match harness.login("buyer@example.com", PASSWORD).await.unwrap() {
            crate::application::SignInOutput::Authenticated { token, session_id, .. } => {
                assert!(session_id.is_none());
                token.token
            }
            other => panic!("unexpected {other:?}"),
        };

        let (status, _, _) = call(&router, "GET", "/users", "198.51.100.31", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_role_change_revokes_admin_sessions() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        let buyer = active_user(&mut harness, &admin, "promote@example.com").await;
        let users = UserAdminUseCase::new(harness.services.clone());

        let promoted = users
            .change_role(&admin, &buyer.user_id, "admin", Some("ops".to_string()), &client())
            .await
            .unwrap();
        assert_eq!(promoted.role, UserRole::Admin);

        let session_id = match harness.login("promote@example.com", PASSWORD).await.unwrap() {
            crate::application::SignInOutput::Authenticated { session_id, .. } => {
                session_id.expect("administrators get a session")
            }
            other => panic!("unexpected {other:?}"),
        };

        users
            .change_role(&admin, &buyer.user_id, "user", None, &client())
            .await
            .unwrap();
        let session = harness.services.repo.find_session(&session_id).await.unwrap().unwrap();
        assert!(!session.is_active);

        let err = users
            .change_role(&admin, &buyer.user_id, "superuser", None, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidRole(_)));
    }
}

#[cfg(test)]
mod two_factor_tests {
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::support::*;
    use crate::application::sign_in::SignInOutput;
    use crate::application::{CheckSessionUseCase, SignInUseCase, TotpSetupUseCase};
    use crate::domain::entity::user::User;
    use crate::domain::repository::UserRepository;
    use crate::domain::value_object::totp_secret::{TotpLabel, TotpSecret};
    use crate::error::IdentityError;

    /// Turn on the second factor without the enrollment round trip
    async fn with_two_factor(harness: &Harness, user: &User) -> TotpSecret {
        let secret = TotpSecret::generate();
        let mut stored = harness.services.repo.find_user(&user.user_id).await.unwrap().unwrap();
        stored.begin_two_factor_setup(secret.clone(), Utc::now());
        stored.confirm_two_factor(Utc::now()).unwrap();
        harness.services.repo.update_user(&stored).await.unwrap();
        secret
    }

    #[tokio::test]
    async fn test_enrollment_and_two_step_login() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        let user = active_user(&mut harness, &admin, "otp@example.com").await;

        let token = match harness.login("otp@example.com", PASSWORD).await.unwrap() {
            SignInOutput::Authenticated { token, .. } => token.token,
            other => panic!("unexpected {other:?}"),
        };
        let principal = CheckSessionUseCase::new(harness.services.clone())
            .authenticate(&token, &client())
            .await
            .unwrap();

        let totp = TotpSetupUseCase::new(harness.services.clone());
        let provisioning = totp.setup(&principal).await.unwrap();
        assert!(provisioning.otpauth_url.starts_with("otpauth://totp/"));

        // Malformed codes never match; the pending secret survives
        let err = totp.confirm(&principal, "12345", &client()).await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidTwoFactorCode));
        let stored = harness.services.repo.find_user(&user.user_id).await.unwrap().unwrap();
        assert!(stored.pending_totp_secret.is_some());
        assert!(!stored.two_factor_enabled());

        let issuer = harness.services.config.totp_issuer.clone();
        let label = TotpLabel {
            issuer: &issuer,
            account: "otp@example.com",
        };
        let pending = stored.pending_totp_secret.clone().unwrap();
        let code = pending.generate_current(label).unwrap();
        totp.confirm(&principal, &code, &client()).await.unwrap();

        let stored = harness.services.repo.find_user(&user.user_id).await.unwrap().unwrap();
        assert!(stored.two_factor_enabled());
        assert!(stored.pending_totp_secret.is_none());

        // Login now stops at the second factor
        let temp_token = match harness.login("otp@example.com", PASSWORD).await.unwrap() {
            SignInOutput::TwoFactorRequired { temp_token } => temp_token.token,
            other => panic!("unexpected {other:?}"),
        };

        // The intermediate token is not a bearer credential
        let err = CheckSessionUseCase::new(harness.services.clone())
            .authenticate(&temp_token, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Unauthenticated));

        let sign_in = SignInUseCase::new(harness.services.clone());
        let err = sign_in
            .verify_two_factor(&temp_token, "abcdef", &client())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidTwoFactorCode));

        let secret = stored.totp_secret.clone().unwrap();
        let code = secret.generate_current(label).unwrap();
        let output = sign_in
            .verify_two_factor(&temp_token, &code, &client())
            .await
            .unwrap();
        let SignInOutput::Authenticated { token, .. } = output else {
            panic!("expected final token");
        };
        assert!(token.expires_at > Utc::now());

        // Each intermediate token completes at most one login
        let err = sign_in
            .verify_two_factor(&temp_token, &code, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidTwoFactorCode));
    }

    #[tokio::test]
    async fn test_verify_refuses_expired_and_final_tokens() {
        let mut harness = Harness::new();
        let (admin, admin_token) = harness.admin().await;
        let user = active_user(&mut harness, &admin, "stale-otp@example.com").await;
        let secret = with_two_factor(&harness, &user).await;
        let router = harness.router();

        let label_issuer = harness.services.config.totp_issuer.clone();
        let label = TotpLabel {
            issuer: &label_issuer,
            account: "stale-otp@example.com",
        };
        let code = secret.generate_current(label).unwrap();

        // Issued twenty minutes ago with a ten minute lifetime
        let expired = harness
            .services
            .tokens
            .issue_two_factor(
                &user,
                Duration::minutes(10),
                false,
                Utc::now() - Duration::minutes(20),
            )
            .unwrap();
        let (status, _, _) = call(
            &router,
            "POST",
            "/2fa/verify",
            "198.51.100.30",
            None,
            Some(json!({ "tempToken": expired.token, "code": code })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // A final bearer token is not an intermediate one
        let (status, _, _) = call(
            &router,
            "POST",
            "/2fa/verify",
            "198.51.100.30",
            None,
            Some(json!({ "tempToken": admin_token, "code": code })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_racing_exchanges_complete_once() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        let user = active_user(&mut harness, &admin, "race@example.com").await;
        let secret = with_two_factor(&harness, &user).await;

        let temp_token = match harness.login("race@example.com", PASSWORD).await.unwrap() {
            SignInOutput::TwoFactorRequired { temp_token } => temp_token.token,
            other => panic!("unexpected {other:?}"),
        };
        let issuer = harness.services.config.totp_issuer.clone();
        let code = secret
            .generate_current(TotpLabel {
                issuer: &issuer,
                account: "race@example.com",
            })
            .unwrap();

        let first = SignInUseCase::new(harness.services.clone());
        let second = SignInUseCase::new(harness.services.clone());
        let client = client();
        let (a, b) = tokio::join!(
            first.verify_two_factor(&temp_token, &code, &client),
            second.verify_two_factor(&temp_token, &code, &client),
        );

        let completed = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(completed, 1);
        assert!(
            [a, b]
                .into_iter()
                .any(|r| matches!(r, Err(IdentityError::InvalidTwoFactorCode)))
        );
    }

    #[tokio::test]
    async fn test_confirm_without_setup() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        active_user(&mut harness, &admin, "nosetup@example.com").await;

        let token = match harness.login("nosetup@example.com", PASSWORD).await.unwrap() {
            SignInOutput::Authenticated { token, .. } => token.token,
            other => panic!("unexpected {other:?}"),
        };
        let principal = CheckSessionUseCase::new(harness.services.clone())
            .authenticate(&token, &client())
            .await
            .unwrap();

        let err = TotpSetupUseCase::new(harness.services.clone())
            .confirm(&principal, "123456", &client())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::TwoFactorNotSetup));
    }
}

#[cfg(test)]
mod account_tests {
    use super::support::*;
    use crate::application::sign_in::SignInOutput;
    use crate::application::{CheckSessionUseCase, PasswordUseCase, SignOutUseCase};
    use crate::error::IdentityError;

    #[tokio::test]
    async fn test_password_reset_flow() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        active_user(&mut harness, &admin, "forgot@example.com").await;

        let passwords = PasswordUseCase::new(harness.services.clone());
        passwords.forgot("forgot@example.com", &client()).await.unwrap();
        // Unknown addresses look the same to the caller
        passwords.forgot("ghost@example.com", &client()).await.unwrap();

        let token = harness.last_link_token();
        passwords
            .reset(&token, "N3w!Passphrase".to_string(), &client())
            .await
            .unwrap();

        let err = harness.login("forgot@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials));
        assert!(harness.login("forgot@example.com", "N3w!Passphrase").await.is_ok());

        let err = passwords
            .reset(&token, "An0ther!Passphrase".to_string(), &client())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidResetToken));
    }

    #[tokio::test]
    async fn test_password_reset_lifts_lock() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        active_user(&mut harness, &admin, "locked-out@example.com").await;

        for _ in 0..5 {
            assert!(harness.login("locked-out@example.com", "Wr0ng!Password").await.is_err());
        }
        let err = harness.login("locked-out@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, IdentityError::AccountLocked { .. }));

        let passwords = PasswordUseCase::new(harness.services.clone());
        passwords.forgot("locked-out@example.com", &client()).await.unwrap();
        let token = harness.last_link_token();
        passwords
            .reset(&token, "N3w!Passphrase".to_string(), &client())
            .await
            .unwrap();

        assert!(harness.login("locked-out@example.com", "N3w!Passphrase").await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_denylists_token() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        active_user(&mut harness, &admin, "bye@example.com").await;

        let token = match harness.login("bye@example.com", PASSWORD).await.unwrap() {
            SignInOutput::Authenticated { token, .. } => token.token,
            other => panic!("unexpected {other:?}"),
        };
        let check = CheckSessionUseCase::new(harness.services.clone());
        let principal = check.authenticate(&token, &client()).await.unwrap();

        SignOutUseCase::new(harness.services.clone())
            .logout(&principal, &client())
            .await
            .unwrap();

        let err = check.authenticate(&token, &client()).await.unwrap_err();
        assert!(matches!(err, IdentityError::Unauthenticated));
    }
}

#[cfg(test)]
mod staged_tests {
    use super::support::*;
    use crate::application::sign_in::SignInOutput;
    use crate::application::{PendingUsersUseCase, RegisterUseCase};
    use crate::domain::entity::security_log::Page;
    use crate::domain::repository::PendingUserRepository;
    use crate::domain::value_object::user_status::UserStatus;
    use crate::error::IdentityError;

    #[tokio::test]
    async fn test_accepted_registration_can_log_in() {
        let harness = Harness::new();
        let (admin, _) = harness.admin().await;
        let register = RegisterUseCase::new(harness.services.clone());

        let pending = register
            .stage(registration("staged@example.com"), &client())
            .await
            .unwrap();
        // The staged address is reserved
        let err = register
            .register(registration("staged@example.com"), &client())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::EmailTaken));

        let staged = PendingUsersUseCase::new(harness.services.clone());
        let (rows, total) = staged.list(Page::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].pending_id, pending.pending_id);

        let user = staged
            .accept(&admin, &pending.pending_id, &client())
            .await
            .unwrap();
        assert_eq!(user.status, UserStatus::Active);
        assert!(user.email_verified);
        assert!(
            harness
                .services
                .repo
                .find_pending_user(&pending.pending_id)
                .await
                .unwrap()
                .is_none()
        );

        let output = harness.login("staged@example.com", PASSWORD).await.unwrap();
        assert!(matches!(output, SignInOutput::Authenticated { .. }));
    }

    #[tokio::test]
    async fn test_rejected_registration_leaves_review_queue() {
        let harness = Harness::new();
        let (admin, _) = harness.admin().await;
        let pending = RegisterUseCase::new(harness.services.clone())
            .stage(registration("declined@example.com"), &client())
            .await
            .unwrap();

        let staged = PendingUsersUseCase::new(harness.services.clone());
        staged
            .reject(&admin, &pending.pending_id, &client())
            .await
            .unwrap();

        let (_, total) = staged.list(Page::default()).await.unwrap();
        assert_eq!(total, 0);

        let err = staged
            .accept(&admin, &pending.pending_id, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::PendingUserNotFound));
    }
}

#[cfg(test)]
mod deletion_tests {
    use super::support::*;
    use crate::application::sign_in::SignInOutput;
    use crate::application::{AccountUseCase, CheckSessionUseCase};
    use crate::domain::repository::UserRepository;
    use crate::domain::value_object::user_status::UserStatus;
    use crate::error::IdentityError;

    #[tokio::test]
    async fn test_self_delete_anonymizes_and_ends_access() {
        let mut harness = Harness::new();
        let (admin, _) = harness.admin().await;
        let user = active_user(&mut harness, &admin, "leaving@example.com").await;

        let token = match harness.login("leaving@example.com", PASSWORD).await.unwrap() {
            SignInOutput::Authenticated { token, .. } => token.token,
            other => panic!("unexpected {other:?}"),
        };
        let check = CheckSessionUseCase::new(harness.services.clone());
        let principal = check.authenticate(&token, &client()).await.unwrap();
        let account = AccountUseCase::new(harness.services.clone());

        let err = account
            .delete_self(&principal, "Wr0ng!Password".to_string(), &client())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::IncorrectPassword));

        account
            .delete_self(&principal, PASSWORD.to_string(), &client())
            .await
            .unwrap();

        let stored = harness.services.repo.find_user(&user.user_id).await.unwrap().unwrap();
        assert_eq!(stored.status, UserStatus::Inactive);
        assert_ne!(stored.email.as_str(), "leaving@example.com");
        assert!(stored.deleted_at.is_some());

        let err = check.authenticate(&token, &client()).await.unwrap_err();
        assert!(matches!(err, IdentityError::Unauthenticated));

        let err = harness.login("leaving@example.com", PASSWORD).await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }
}
