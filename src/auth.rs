use chrono::{Duration, Utc};
use spin_sdk::http::{Request, Response};

use crate::config::{token_expiration_secs, token_key};
use crate::core::errors::ApiError;
use crate::core::helpers::{header_value, json_body, json_response, random_hex, verify_password};
use crate::core::query_params::{get_string, parse_form, parse_query_params};
use crate::core::store::{KvJson, KvStore};
use crate::models::models::User;
use crate::session::{WebContext, LOGIN_REQUIRED};
use crate::templates::{render_login, LoginView};
use crate::users::{find_user_by_id, find_user_by_username, save_user};
use crate::AppState;

/// Seconds of validity below which an existing token is replaced instead of reused.
const TOKEN_REUSE_MARGIN_SECS: i64 = 60;

pub fn authenticate(store: &dyn KvStore, username: &str, password: &str) -> anyhow::Result<Option<User>> {
    Ok(find_user_by_username(store, username)?.filter(|u| verify_password(password, &u.password_hash)))
}

/// Returns the user's live token, minting a new one when it is missing or about to lapse.
pub fn get_token(store: &dyn KvStore, user: &mut User) -> anyhow::Result<String> {
    let now = Utc::now();
    if let (Some(token), Some(expiration)) = (&user.token, user.token_expiration) {
        if expiration > now + Duration::seconds(TOKEN_REUSE_MARGIN_SECS) {
            return Ok(token.clone());
        }
    }

    if let Some(old) = user.token.take() {
        store.delete(&token_key(&old))?;
    }
    let token = random_hex(16);
    user.token = Some(token.clone());
    user.token_expiration = Some(now + Duration::seconds(token_expiration_secs()));
    save_user(store, user)?;
    store.set_json(&token_key(&token), &user.id)?;
    Ok(token)
}

pub fn revoke_token(store: &dyn KvStore, user: &mut User) -> anyhow::Result<()> {
    if let Some(token) = &user.token {
        store.delete(&token_key(token))?;
    }
    user.token_expiration = Some(Utc::now() - Duration::seconds(1));
    save_user(store, user)
}

pub fn check_token(store: &dyn KvStore, token: &str) -> anyhow::Result<Option<User>> {
    let user_id = match store.get_json::<String>(&token_key(token))? {
        Some(id) => id,
        None => return Ok(None),
    };
    let user = match find_user_by_id(store, &user_id)? {
        Some(u) => u,
        None => return Ok(None),
    };
    let live = user.token.as_deref() == Some(token)
        && user.token_expiration.map(|exp| exp > Utc::now()).unwrap_or(false);
    Ok(live.then_some(user))
}

/// The user named by `Authorization: Bearer <token>`, if the token is live.
pub fn token_user(store: &dyn KvStore, req: &Request) -> anyhow::Result<Option<User>> {
    let token = match header_value(req, "authorization").and_then(|h| h.strip_prefix("Bearer ")) {
        Some(t) if !t.trim().is_empty() => t.trim(),
        _ => return Ok(None),
    };
    check_token(store, token)
}

// === API Handlers ===

/// POST /tokens
pub fn create_token(app: &AppState, req: &Request) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let creds = match json_body(req) {
        Ok(v) => v,
        Err(e) => return Ok(e.into()),
    };
    let username = creds["username"].as_str().unwrap_or_default();
    let password = creds["password"].as_str().unwrap_or_default();

    let mut user = match authenticate(store, username, password)? {
        Some(u) => u,
        None => {
            log::warn!("token request with bad credentials for {:?}", username);
            return Ok(ApiError::Unauthorized.into());
        }
    };
    let token = get_token(store, &mut user)?;
    Ok(json_response(200, &serde_json::json!({ "token": token })))
}

/// DELETE /tokens
pub fn delete_token(app: &AppState, req: &Request) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let mut user = match token_user(store, req)? {
        Some(u) => u,
        None => return Ok(ApiError::Unauthorized.into()),
    };
    revoke_token(store, &mut user)?;
    Ok(Response::builder().status(204).body(Vec::new()).build())
}

// === Web Handlers ===

/// Only same-site paths are honoured as login targets.
fn safe_next(next: Option<String>) -> String {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") => n,
        _ => "/index".to_string(),
    }
}

/// GET|POST /login
pub fn login(app: &AppState, req: &Request) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let mut ctx = WebContext::load(app, req)?;
    if ctx.user.is_some() {
        return ctx.redirect(store, "/index");
    }
    let next = get_string(&parse_query_params(&req.uri().to_string()), "next", None);

    let mut view = LoginView::default();
    if req.method().to_string() == "POST" {
        let form = parse_form(req.body());
        view.username = get_string(&form, "username", Some("")).unwrap_or_default();
        let password = get_string(&form, "password", Some("")).unwrap_or_default();

        match authenticate(store, &view.username, &password)? {
            Some(user) => {
                log::info!("{} logged in", user.username);
                ctx.login(&user);
                return ctx.redirect(store, &safe_next(next.clone()));
            }
            None => view.error = Some("Invalid username or password".to_string()),
        }
    }

    view.flashes = ctx.take_flashes();
    if next.is_some() && view.error.is_none() {
        view.flashes.push(LOGIN_REQUIRED.to_string());
    }
    let page = render_login(&view)?;
    ctx.html(store, 200, page)
}

/// GET /logout
pub fn logout(app: &AppState, req: &Request) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let mut ctx = WebContext::load(app, req)?;
    ctx.logout();
    ctx.redirect(store, "/index")
}
