//! Fixtures shared by the unit tests.

use std::sync::Mutex;

use anyhow::anyhow;
use chrono::{Duration, TimeZone, Utc};
use spin_sdk::http::{Method, Request, Response};

use crate::config::{email_index_key, username_index_key, SESSION_COOKIE};
use crate::core::errors::ApiError;
use crate::core::helpers::new_id;
use crate::core::store::{KvJson, KvStore, MemoryStore};
use crate::handlers::route;
use crate::models::models::{Post, User};
use crate::translate::{LanguageDetector, Translator};
use crate::users::{register_user, save_user};
use crate::AppState;

pub const PASSWORD: &str = "pw";

/// Tags every post with the same language.
pub struct FixedLanguage(pub &'static str);

impl LanguageDetector for FixedLanguage {
    fn detect(&self, _text: &str) -> Option<String> {
        Some(self.0.to_string())
    }
}

/// Marks the text instead of translating it.
pub struct EchoTranslator;

impl Translator for EchoTranslator {
    fn translate(&self, text: &str, source: &str, dest: &str) -> Result<String, ApiError> {
        Ok(format!("[{}->{}] {}", source, dest, text))
    }
}

/// In-memory store whose writes under one prefix can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<Option<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_under(&self, prefix: &str) {
        *self.failing.lock().unwrap() = Some(prefix.to_string());
    }

    pub fn heal(&self) {
        *self.failing.lock().unwrap() = None;
    }

    fn check(&self, key: &str) -> anyhow::Result<()> {
        match self.failing.lock().unwrap().as_deref() {
            Some(prefix) if key.starts_with(prefix) => Err(anyhow!("write to {} refused", key)),
            _ => Ok(()),
        }
    }
}

impl KvStore for FlakyStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.check(key)?;
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.inner.delete(key)
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.inner.exists(key)
    }

    fn insert_if_absent(&self, key: &str, value: &[u8]) -> anyhow::Result<bool> {
        self.check(key)?;
        self.inner.insert_if_absent(key, value)
    }

    fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        self.inner.keys_with_prefix(prefix)
    }
}

pub fn app() -> AppState {
    AppState {
        store: Box::new(MemoryStore::new()),
        translator: Box::new(EchoTranslator),
        detector: Box::new(FixedLanguage("en")),
    }
}

/// Registers through the real path, password included.
pub fn register(app: &AppState, username: &str) -> User {
    register_user(app.store.as_ref(), username, &format!("{}@example.com", username), PASSWORD).unwrap()
}

/// Writes an account directly, skipping password hashing.
pub fn seed_user(store: &dyn KvStore, username: &str) -> User {
    let user = User {
        id: new_id(),
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password_hash: "!".to_string(),
        about_me: None,
        last_seen: Utc::now(),
        token: None,
        token_expiration: None,
    };
    store.set_json(&username_index_key(&user.username), &user.id).unwrap();
    store.set_json(&email_index_key(&user.email), &user.id).unwrap();
    save_user(store, &user).unwrap();
    user
}

/// A post stamped `minutes` after a fixed instant.
pub fn post_at(author: &User, body: &str, minutes: i64) -> Post {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    Post {
        id: new_id(),
        user_id: author.id.clone(),
        body: body.to_string(),
        timestamp: base + Duration::minutes(minutes),
        language: "en".to_string(),
    }
}

pub fn request(method: &str, uri: &str, headers: &[(&str, &str)], body: Vec<u8>) -> Request {
    let method = match method {
        "POST" => Method::Post,
        "PUT" => Method::Put,
        "DELETE" => Method::Delete,
        _ => Method::Get,
    };
    let mut builder = Request::builder();
    let mut with_headers = builder.method(method).uri(uri);
    for (name, value) in headers {
        with_headers = with_headers.header(*name, *value);
    }
    with_headers.body(body).build()
}

fn cookie(session: &str) -> String {
    format!("{}={}", SESSION_COOKIE, session)
}

pub fn get(uri: &str, session: Option<&str>) -> Request {
    match session {
        Some(sid) => request("GET", uri, &[("cookie", cookie(sid).as_str())], Vec::new()),
        None => request("GET", uri, &[], Vec::new()),
    }
}

pub fn with_bearer(uri: &str, token: &str) -> Request {
    request("GET", uri, &[("authorization", format!("Bearer {}", token).as_str())], Vec::new())
}

pub fn post_form(uri: &str, session: Option<&str>, body: &str) -> Request {
    let mut headers = vec![("content-type", "application/x-www-form-urlencoded".to_string())];
    if let Some(sid) = session {
        headers.push(("cookie", cookie(sid)));
    }
    let headers: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (*k, v.as_str())).collect();
    request("POST", uri, &headers, body.as_bytes().to_vec())
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request {
    let mut headers = vec![("content-type", "application/json".to_string())];
    if let Some(token) = token {
        headers.push(("authorization", format!("Bearer {}", token)));
    }
    let headers: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (*k, v.as_str())).collect();
    request(method, uri, &headers, body.to_string().into_bytes())
}

pub fn post_json(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request {
    json_request("POST", uri, token, body)
}

pub fn put_json(uri: &str, token: &str, body: serde_json::Value) -> Request {
    json_request("PUT", uri, Some(token), body)
}

/// Response header lookup that does not care how the name was cased when set.
pub fn header(resp: &Response, name: &str) -> Option<String> {
    resp.header(name)
        .or_else(|| resp.header(&name.to_lowercase()))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Session id handed out in `Set-Cookie`.
pub fn session_from(resp: &Response) -> Option<String> {
    let set_cookie = header(resp, "Set-Cookie")?;
    let (name, rest) = set_cookie.split_once('=')?;
    (name == SESSION_COOKIE).then(|| rest.split(';').next().unwrap_or_default().to_string())
}

pub fn body_text(resp: &Response) -> String {
    String::from_utf8_lossy(resp.body()).into_owned()
}

/// Logs in through the form and returns the session id.
pub fn login(app: &AppState, username: &str) -> String {
    let body = format!("username={}&password={}", username, PASSWORD);
    let resp = route(app, post_form("/login", None, &body));
    assert_eq!(*resp.status(), 303, "login for {} failed", username);
    session_from(&resp).unwrap()
}
