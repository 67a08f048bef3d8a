#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use foodguide::auth::oauth::{OAuthError, OAuthProfile, OAuthProvider};
use foodguide::auth::session::SessionKeys;
use foodguide::config::Config;
use foodguide::db;
use foodguide::enrich::{Describer, EnrichError, ImageHost, ImageLabeler};
use foodguide::notify::{BroadcastNotifier, Notification, Notifier, NotifyError};
use foodguide::state::AppState;

pub const BOUNDARY: &str = "----foodguide-test-boundary";

/// Hands out a fresh URL per upload without touching the network.
#[derive(Default)]
pub struct FakeImageHost {
    uploads: AtomicUsize,
}

#[async_trait]
impl ImageHost for FakeImageHost {
    async fn upload(&self, path: &Path) -> Result<String, EnrichError> {
        assert!(path.exists(), "upload should be spooled to disk");
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://images.test/{}.jpg", n))
    }
}

/// Every upload is refused upstream.
pub struct FailingImageHost;

#[async_trait]
impl ImageHost for FailingImageHost {
    async fn upload(&self, _path: &Path) -> Result<String, EnrichError> {
        Err(EnrichError::Upstream("upload rejected".into()))
    }
}

/// Accepts subscriptions but never manages to deliver anything.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn publish(&self, channel: &str, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Publish {
            channel: channel.to_string(),
            reason: "broker unreachable".into(),
        })
    }

    fn subscribe(&self, _channel: &str) -> BoxStream<'static, Notification> {
        stream::pending().boxed()
    }
}

pub struct FixedDescriber(pub Option<&'static str>);

#[async_trait]
impl Describer for FixedDescriber {
    async fn describe(&self, _heading: &str) -> Result<String, EnrichError> {
        match self.0 {
            Some(text) => Ok(text.to_string()),
            None => Err(EnrichError::Upstream("model unavailable".into())),
        }
    }
}

pub struct FixedLabeler(pub Vec<&'static str>);

#[async_trait]
impl ImageLabeler for FixedLabeler {
    async fn labels(&self, _image_url: &str) -> Result<Vec<String>, EnrichError> {
        Ok(self.0.iter().map(|s| s.to_string()).collect())
    }
}

pub struct FakeGoogle;

#[async_trait]
impl OAuthProvider for FakeGoogle {
    fn name(&self) -> &'static str {
        "google"
    }

    fn authorize_url(&self) -> Result<String, OAuthError> {
        Ok("https://accounts.google.com/o/oauth2/v2/auth?client_id=test".into())
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthProfile, OAuthError> {
        if code == "bad" {
            return Err(OAuthError::Rejected("invalid_grant".into()));
        }
        Ok(OAuthProfile {
            sub: "google-sub-123456".into(),
            name: Some("Grace".into()),
            email: Some("grace@example.com".into()),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _tmp: TempDir,
}

pub struct Adapters {
    pub image_host: Arc<dyn ImageHost>,
    pub describer: Arc<dyn Describer>,
    pub labeler: Arc<dyn ImageLabeler>,
    pub notifier: Arc<dyn Notifier>,
}

impl Default for Adapters {
    fn default() -> Self {
        Self {
            image_host: Arc::new(FakeImageHost::default()),
            describer: Arc::new(FixedDescriber(Some("High in protein."))),
            labeler: Arc::new(FixedLabeler(vec!["Food", "Noodle"])),
            notifier: Arc::new(BroadcastNotifier::new()),
        }
    }
}

pub fn test_app() -> TestApp {
    test_app_with(Adapters::default())
}

pub fn test_app_with(adapters: Adapters) -> TestApp {
    let tmp = TempDir::new().unwrap();
    let pool = db::create_pool(&tmp.path().join("test.db")).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");

    let mut config = Config::default();
    config.auth.jwt_secret = Some("test-secret".into());
    config.auth.bcrypt_cost = 4;
    config.storage.path = Some(tmp.path().join("uploads"));

    let state = AppState {
        db: pool,
        config,
        session_keys: Some(Arc::new(SessionKeys::new("test-secret"))),
        image_host: adapters.image_host,
        describer: adapters.describer,
        labeler: adapters.labeler,
        oauth: Some(Arc::new(FakeGoogle)),
        notifier: adapters.notifier,
    };

    TestApp {
        router: foodguide::routes::app(state.clone()),
        state,
        _tmp: tmp,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// `name=value` from the Set-Cookie header, ready to send back.
    pub fn cookie(&self) -> Option<String> {
        let raw = self.headers.get(header::SET_COOKIE)?.to_str().ok()?;
        Some(raw.split(';').next()?.to_string())
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
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

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Value,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.without_body(Method::GET, uri, cookie).await
    }

    pub async fn delete(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.without_body(Method::DELETE, uri, cookie).await
    }

    async fn without_body(&self, method: Method, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Sign up a new user and return their session cookie.
    pub async fn signup(&self, username: &str) -> String {
        let response = self
            .json(
                Method::POST,
                "/api/auth/signup",
                None,
                serde_json::json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "hunter2",
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        response.cookie().expect("signup should set a cookie")
    }

    pub async fn post_multipart(
        &self,
        cookie: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &str, &[u8])>,
    ) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/posts")
            .header(header::COOKIE, cookie)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(fields, file)))
            .unwrap();
        self.send(request).await
    }

    /// Create a post with a small image and return its id.
    pub async fn create_post(&self, cookie: &str, heading: &str) -> i64 {
        let response = self
            .post_multipart(
                cookie,
                &[("heading", heading), ("reviews", "Would eat again")],
                Some(("dish.jpg", "image/jpeg", &b"\xFF\xD8\xFFfake"[..])),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["id"].as_i64().unwrap()
    }

    pub async fn comment(&self, cookie: &str, post_id: Value, content: &str) -> TestResponse {
        self.json(
            Method::POST,
            "/api/comments",
            Some(cookie),
            serde_json::json!({ "content": content, "postId": post_id }),
        )
        .await
    }
}

pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, data)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, file_name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}
