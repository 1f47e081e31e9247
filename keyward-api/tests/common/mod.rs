/// Common test utilities for API tests
///
/// Builds the full router over in-memory stores and a manual clock, so the
/// tests need neither a database nor real time.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use keyward_api::app::{build_router, AppState};
use keyward_api::config::{ApiConfig, Config, LogFormat};
use keyward_shared::auth::password::hash_password;
use keyward_shared::clock::{Clock, ManualClock};
use keyward_shared::config::AuthConfig;
use keyward_shared::db::pool::DatabaseConfig;
use keyward_shared::models::account::{Account, CreateAccount};
use keyward_shared::session::manager::SessionManager;
use keyward_shared::store::{MemoryAccountStore, MemorySessionStore};
use serde_json::{json, Value};
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};
use tower::ServiceExt;
use uuid::Uuid;

pub const SECRET: &str = "correct horse battery staple";

/// Reverse proxy the test router trusts for `X-Forwarded-For`
pub const PROXY_IP: [u8; 4] = [10, 0, 0, 1];

fn secret_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(SECRET).expect("hash should succeed"))
        .clone()
}

/// Router plus handles on its backing state
pub struct TestApp {
    pub app: Router,
    pub accounts: MemoryAccountStore,
    pub clock: ManualClock,
    pub tenant_id: Uuid,
    pub account: Account,
}

impl TestApp {
    pub async fn new() -> Self {
        let accounts = MemoryAccountStore::new();
        let sessions = MemorySessionStore::new();
        let clock = ManualClock::starting_now();
        let tenant_id = Uuid::new_v4();

        let account = accounts
            .create(
                CreateAccount {
                    tenant_id,
                    username: "u1".to_string(),
                    email: "u1@example.com".to_string(),
                    password_hash: secret_hash(),
                },
                clock.now(),
            )
            .await
            .expect("account should be created");

        let config = Config {
            api: ApiConfig {
                trusted_proxies: vec![IpAddr::from(PROXY_IP)],
                ..Default::default()
            },
            database: DatabaseConfig::default(),
            auth: AuthConfig {
                jwt_secret: "api-test-secret-at-least-32-bytes-long".to_string(),
                max_sessions_per_account: 3,
                ..Default::default()
            },
            log_format: LogFormat::Text,
        };

        let manager = SessionManager::new(
            Arc::new(accounts.clone()),
            Arc::new(sessions),
            &config.auth,
            Arc::new(clock.clone()),
        );
        let app = build_router(AppState::new(Arc::new(manager), config, None));

        Self {
            app,
            accounts,
            clock,
            tenant_id,
            account,
        }
    }

    /// Sends one request and returns the status and JSON body
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, json)
    }

    pub async fn login_with(&self, identifier: &str, secret: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            "/v1/auth/login",
            Some(json!({
                "tenant_id": self.tenant_id,
                "identifier": identifier,
                "secret": secret,
            })),
            None,
        )
        .await
    }

    /// Logs in as u1 and returns the token pair
    pub async fn login(&self) -> Value {
        let (status, body) = self.login_with("u1", SECRET).await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body
    }

    pub async fn refresh(&self, refresh_token: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            "/v1/auth/refresh",
            Some(json!({ "refresh_token": refresh_token })),
            None,
        )
        .await
    }
}

/// String field of a JSON body
pub fn field<'a>(body: &'a Value, name: &str) -> &'a str {
    body[name]
        .as_str()
        .unwrap_or_else(|| panic!("missing field {} in {}", name, body))
}
