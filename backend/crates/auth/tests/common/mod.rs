//! Test harness: the auth router over the in-memory store, driven by a
//! manual clock.

#![allow(dead_code)]

use std::sync::Arc;

use auth::{AuthAppState, AuthConfig, InMemoryAuthRepository, auth_router};
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use chrono::{TimeZone, Utc};
use platform::clock::{Clock, ManualClock};
use serde_json::{Value, json};
use tower::ServiceExt;

pub const PASSWORD: &str = "secret1";

pub struct TestApp {
    pub app: Router,
    pub repo: Arc<InMemoryAuthRepository>,
    pub clock: Arc<ManualClock>,
    pub state: AuthAppState<InMemoryAuthRepository>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// Full `Set-Cookie` line for `name`
    pub fn set_cookie(&self, name: &str) -> Option<String> {
        let prefix = format!("{}=", name);
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with(&prefix))
            .map(str::to_string)
    }

    /// Value set for cookie `name`; `Some("")` when it is being cleared
    pub fn cookie(&self, name: &str) -> Option<String> {
        let line = self.set_cookie(name)?;
        let pair = line.split(';').next()?;
        pair.split_once('=').map(|(_, v)| v.to_string())
    }

    pub fn code(&self) -> Option<&str> {
        self.body.get("code").and_then(Value::as_str)
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AuthConfig::testing())
    }

    pub fn with_config(config: AuthConfig) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ));
        let repo = Arc::new(InMemoryAuthRepository::new());
        let state = AuthAppState::new(repo.clone(), Arc::new(config), clock.clone());
        let app = Router::new().nest("/api/auth", auth_router(state.clone()));

        Self {
            app,
            repo,
            clock,
            state,
        }
    }

    pub fn unix_now(&self) -> u64 {
        self.clock.unix_timestamp() as u64
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        cookies: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if !cookies.is_empty() {
            let cookie = cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, cookie);
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn post(&self, path: &str, body: Value, cookies: &[(&str, &str)]) -> TestResponse {
        self.send(Method::POST, path, Some(body), cookies).await
    }

    pub async fn get(&self, path: &str, cookies: &[(&str, &str)]) -> TestResponse {
        self.send(Method::GET, path, None, cookies).await
    }

    pub async fn register(&self, email: &str) -> TestResponse {
        let res = self
            .post(
                "/api/auth/register",
                json!({ "username": "alice", "email": email, "password": PASSWORD }),
                &[],
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "register failed: {}", res.body);
        res
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.post(
            "/api/auth/login",
            json!({ "email": email, "password": password }),
            &[],
        )
        .await
    }

    /// Register and log in; returns (access, refresh) cookie values
    pub async fn session(&self, email: &str) -> (String, String) {
        self.register(email).await;
        let res = self.login(email, PASSWORD).await;
        assert_eq!(res.status, StatusCode::OK, "login failed: {}", res.body);
        (
            res.cookie("accessToken").unwrap(),
            res.cookie("refreshToken").unwrap(),
        )
    }
}
