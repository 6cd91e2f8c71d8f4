use chrono::{Duration, Utc};
use spin_sdk::http::{Request, Response};

use crate::config::{session_key, session_lifetime_hours, SESSION_COOKIE};
use crate::core::helpers::{header_value, random_hex};
use crate::core::store::{KvJson, KvStore};
use crate::models::models::{SessionData, User};
use crate::users::{find_user_by_id, save_user};
use crate::AppState;

/// Per-request view of the browser session and the user it is logged in as.
pub struct WebContext {
    pub session_id: String,
    pub session: SessionData,
    pub user: Option<User>,
    retired_id: Option<String>,
    had_cookie: bool,
}

/// Shown on the login page when a visitor was bounced there from a protected page.
pub const LOGIN_REQUIRED: &str = "Please log in to access this page.";

impl WebContext {
    pub fn load(app: &AppState, req: &Request) -> anyhow::Result<Self> {
        let store = app.store.as_ref();
        let cookie = session_cookie(req);
        let had_cookie = cookie.is_some();
        let existing = match cookie {
            Some(sid) => match store.get_json::<SessionData>(&session_key(&sid))? {
                Some(data) if expired(&data) => {
                    store.delete(&session_key(&sid))?;
                    None
                }
                Some(data) => Some((sid, data)),
                None => None,
            },
            None => None,
        };

        let (session_id, session) = existing.unwrap_or_else(|| {
            (
                random_hex(16),
                SessionData {
                    created_at: Some(Utc::now()),
                    ..SessionData::default()
                },
            )
        });

        let mut user = match &session.user_id {
            Some(id) => find_user_by_id(store, id)?,
            None => None,
        };
        if let Some(u) = user.as_mut() {
            u.last_seen = Utc::now();
            save_user(store, u)?;
        }

        Ok(WebContext { session_id, session, user, retired_id: None, had_cookie })
    }

    /// Binds the session to `user` under a fresh id.
    pub fn login(&mut self, user: &User) {
        self.retired_id = Some(std::mem::replace(&mut self.session_id, random_hex(16)));
        self.session.user_id = Some(user.id.clone());
        self.session.created_at = Some(Utc::now());
        self.user = Some(user.clone());
    }

    pub fn logout(&mut self) {
        self.session.user_id = None;
        self.user = None;
    }

    pub fn flash(&mut self, message: impl Into<String>) {
        self.session.flashes.push(message.into());
    }

    pub fn take_flashes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.session.flashes)
    }

    /// Nothing worth keeping: no login and no pending flashes.
    fn is_blank(&self) -> bool {
        self.session.user_id.is_none() && self.session.flashes.is_empty()
    }

    /// Writes the session, or removes it when it is blank. Returns whether a row exists afterwards.
    pub fn save(&self, store: &dyn KvStore) -> anyhow::Result<bool> {
        if let Some(old) = &self.retired_id {
            store.delete(&session_key(old))?;
        }
        if self.is_blank() {
            store.delete(&session_key(&self.session_id))?;
            return Ok(false);
        }
        store.set_json(&session_key(&self.session_id), &self.session)?;
        Ok(true)
    }

    pub fn cookie(&self) -> String {
        format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, self.session_id)
    }

    /// Persists the session and picks the `Set-Cookie` value to send, if any.
    fn store_and_cookie(&self, store: &dyn KvStore) -> anyhow::Result<Option<String>> {
        if self.save(store)? {
            Ok(Some(self.cookie()))
        } else if self.had_cookie {
            Ok(Some(format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", SESSION_COOKIE)))
        } else {
            Ok(None)
        }
    }

    /// Persists the session and answers with a 303 to `location`.
    pub fn redirect(&self, store: &dyn KvStore, location: &str) -> anyhow::Result<Response> {
        let cookie = self.store_and_cookie(store)?;
        let mut builder = Response::builder();
        builder.status(303).header("Location", location);
        if let Some(cookie) = cookie {
            builder.header("Set-Cookie", cookie);
        }
        Ok(builder.body(Vec::new()).build())
    }

    /// Persists the session and answers with an HTML page.
    pub fn html(&self, store: &dyn KvStore, status: u16, page: String) -> anyhow::Result<Response> {
        let cookie = self.store_and_cookie(store)?;
        let mut builder = Response::builder();
        builder.status(status).header("Content-Type", "text/html; charset=utf-8");
        if let Some(cookie) = cookie {
            builder.header("Set-Cookie", cookie);
        }
        Ok(builder.body(page.into_bytes()).build())
    }

    /// Sends an anonymous visitor to the login page, remembering where they were going.
    /// The login page shows [`LOGIN_REQUIRED`] because of `next`, so nothing is stored.
    pub fn login_redirect(&self, store: &dyn KvStore, req: &Request) -> anyhow::Result<Response> {
        let next = request_target(req);
        self.redirect(store, &format!("/login?next={}", urlencoding::encode(&next)))
    }
}

fn expired(data: &SessionData) -> bool {
    match data.created_at {
        Some(created) => Utc::now() - created > Duration::hours(session_lifetime_hours()),
        None => true,
    }
}

fn session_cookie(req: &Request) -> Option<String> {
    let header = header_value(req, "cookie")?;
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Path plus query of the request, e.g. `/explore?page=2`.
pub fn request_target(req: &Request) -> String {
    let uri = req.uri().to_string();
    match uri.split_once("://") {
        Some((_, rest)) => match rest.find('/') {
            Some(idx) => rest[idx..].to_string(),
            None => "/".to_string(),
        },
        None => uri,
    }
}
