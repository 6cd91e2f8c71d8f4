use chrono::Utc;
use spin_sdk::http::{Request, Response};

use crate::api::{to_collection_dict, ApiResource};
use crate::auth::token_user;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{hash_password, json_body, new_id, validate_uuid};
use crate::core::pagination::PageRequest;
use crate::core::store::{KvJson, KvStore};
use crate::models::models::User;
use crate::AppState;

// === Lookups ===

pub fn find_user_by_id(store: &dyn KvStore, id: &str) -> anyhow::Result<Option<User>> {
    if !validate_uuid(id) {
        return Ok(None);
    }
    store.get_json(&user_key(id))
}

pub fn find_user_by_username(store: &dyn KvStore, username: &str) -> anyhow::Result<Option<User>> {
    match store.get_json::<String>(&username_index_key(username))? {
        Some(id) => find_user_by_id(store, &id),
        None => Ok(None),
    }
}

pub fn save_user(store: &dyn KvStore, user: &User) -> anyhow::Result<()> {
    store.set_json(&user_key(&user.id), user)
}

/// Every account, ordered by username.
pub fn all_users(store: &dyn KvStore) -> anyhow::Result<Vec<User>> {
    let mut users = Vec::new();
    for key in store.keys_with_prefix(USER_PREFIX)? {
        if let Some(u) = store.get_json::<User>(&key)? {
            users.push(u);
        }
    }
    sort_by_username(&mut users);
    Ok(users)
}

pub fn sort_by_username(users: &mut [User]) {
    users.sort_by(|a, b| a.username.cmp(&b.username).then_with(|| a.id.cmp(&b.id)));
}

// === Validation ===

fn clean_username(raw: &str) -> Result<String, ApiError> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(ApiError::BadRequest("username is required".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "username must be at most {} characters",
            MAX_USERNAME_LENGTH
        )));
    }
    if username.chars().any(|c| c.is_whitespace() || c == '/' || c == '?' || c == '#') {
        return Err(ApiError::BadRequest("username may not contain spaces, '/', '?' or '#'".to_string()));
    }
    Ok(username.to_string())
}

fn clean_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim();
    let valid = email.len() <= MAX_EMAIL_LENGTH
        && email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'))
            .unwrap_or(false);
    if !valid {
        return Err(ApiError::BadRequest("invalid email address".to_string()));
    }
    Ok(email.to_string())
}

fn clean_about_me(raw: &str) -> Result<Option<String>, ApiError> {
    let about_me = raw.trim();
    if about_me.chars().count() > MAX_ABOUT_ME_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "about_me must be at most {} characters",
            MAX_ABOUT_ME_LENGTH
        )));
    }
    Ok((!about_me.is_empty()).then(|| about_me.to_string()))
}

fn duplicate_username() -> ApiError {
    ApiError::BadRequest("please use a different username".to_string())
}

fn duplicate_email() -> ApiError {
    ApiError::BadRequest("please use a different email".to_string())
}

// === Registration & updates ===

/// Creates an account. The index keys are the authoritative uniqueness guard;
/// the lookups before them only produce the early, friendlier error.
pub fn register_user(store: &dyn KvStore, username: &str, email: &str, password: &str) -> Result<User, ApiError> {
    register_user_with(store, username, email, password, None)
}

/// [`register_user`] with an initial `about_me`. Every field is checked
/// before anything is written.
pub fn register_user_with(
    store: &dyn KvStore,
    username: &str,
    email: &str,
    password: &str,
    about_me: Option<&str>,
) -> Result<User, ApiError> {
    let username = clean_username(username)?;
    let email = clean_email(email)?;
    if password.is_empty() {
        return Err(ApiError::BadRequest("password is required".to_string()));
    }
    let about_me = about_me.map(clean_about_me).transpose()?.flatten();

    if store.exists(&username_index_key(&username))? {
        return Err(duplicate_username());
    }
    if store.exists(&email_index_key(&email))? {
        return Err(duplicate_email());
    }
    let password_hash = hash_password(password)?;

    let id = new_id();
    if !store.insert_json_if_absent(&username_index_key(&username), &id)? {
        return Err(duplicate_username());
    }
    if !store.insert_json_if_absent(&email_index_key(&email), &id)? {
        store.delete(&username_index_key(&username))?;
        return Err(duplicate_email());
    }

    let user = User {
        id,
        username,
        email,
        password_hash,
        about_me,
        last_seen: Utc::now(),
        token: None,
        token_expiration: None,
    };
    if let Err(e) = save_user(store, &user) {
        release_indexes(store, &user);
        return Err(e.into());
    }
    log::info!("registered user {} ({})", user.username, user.id);
    Ok(user)
}

/// Frees the index keys of an account that was never stored.
fn release_indexes(store: &dyn KvStore, user: &User) {
    for key in [username_index_key(&user.username), email_index_key(&user.email)] {
        if let Err(e) = store.delete(&key) {
            log::warn!("could not release {}: {:#}", key, e);
        }
    }
}

#[derive(Debug, Default)]
pub struct ProfileChanges<'a> {
    pub username: Option<&'a str>,
    pub email: Option<&'a str>,
    pub about_me: Option<&'a str>,
}

/// Applies `changes` to `user` and persists it. Nothing is written when a
/// field is rejected.
pub fn update_profile(store: &dyn KvStore, user: &mut User, changes: ProfileChanges<'_>) -> Result<(), ApiError> {
    let username = changes.username.map(clean_username).transpose()?;
    let email = changes.email.map(clean_email).transpose()?;
    let about_me = changes.about_me.map(clean_about_me).transpose()?;

    let new_username = username.filter(|u| *u != user.username);
    let new_email = email.filter(|e| e.to_lowercase() != user.email.to_lowercase());

    if let Some(u) = &new_username {
        if !store.insert_json_if_absent(&username_index_key(u), &user.id)? {
            return Err(duplicate_username());
        }
    }
    if let Some(e) = &new_email {
        if !store.insert_json_if_absent(&email_index_key(e), &user.id)? {
            if let Some(u) = &new_username {
                store.delete(&username_index_key(u))?;
            }
            return Err(duplicate_email());
        }
    }

    if let Some(u) = new_username {
        store.delete(&username_index_key(&user.username))?;
        user.username = u;
    }
    if let Some(e) = new_email {
        store.delete(&email_index_key(&user.email))?;
        user.email = e;
    }
    if let Some(a) = about_me {
        user.about_me = a;
    }

    save_user(store, user)?;
    Ok(())
}

// === HTTP Handlers ===

fn item_response(store: &dyn KvStore, user: &User, viewer: Option<&User>) -> anyhow::Result<Response> {
    Ok(Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .body(user.to_item_dict(store, viewer)?.to_string().into_bytes())
        .build())
}

/// GET /users/{id}
pub fn get_user(app: &AppState, req: &Request, id: &str) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let actor = match token_user(store, req)? {
        Some(u) => u,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    match find_user_by_id(store, id)? {
        Some(user) => item_response(store, &user, Some(&actor)),
        None => Ok(ApiError::NotFound("User not found".to_string()).into()),
    }
}

/// GET /users
pub fn get_users(app: &AppState, req: &Request) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let actor = match token_user(store, req)? {
        Some(u) => u,
        None => return Ok(ApiError::Unauthorized.into()),
    };
    let request = match PageRequest::from_uri(&req.uri().to_string()) {
        Ok(r) => r,
        Err(e) => return Ok(e.into()),
    };

    let users = all_users(store)?;
    let body = to_collection_dict(store, Some(&actor), users, request, "/users")?;
    Ok(crate::core::helpers::json_response(200, &body))
}

/// POST /users
pub fn create_user(app: &AppState, req: &Request) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let data = match json_body(req) {
        Ok(v) => v,
        Err(e) => return Ok(e.into()),
    };

    let (username, email, password) = match (
        data["username"].as_str(),
        data["email"].as_str(),
        data["password"].as_str(),
    ) {
        (Some(u), Some(e), Some(p)) => (u, e, p),
        _ => {
            return Ok(ApiError::BadRequest(
                "must include username, email and password fields".to_string(),
            )
            .into())
        }
    };

    let user = match register_user_with(store, username, email, password, data["about_me"].as_str()) {
        Ok(u) => u,
        Err(e) => return Ok(e.into()),
    };

    Ok(Response::builder()
        .status(201)
        .header("Content-Type", "application/json")
        .header("Location", &format!("/users/{}", user.id))
        .body(user.to_item_dict(store, Some(&user))?.to_string().into_bytes())
        .build())
}

/// PUT /users/{id}
pub fn update_user(app: &AppState, req: &Request, id: &str) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let mut actor = match token_user(store, req)? {
        Some(u) => u,
        None => return Ok(ApiError::Unauthorized.into()),
    };
    if actor.id != id {
        log::warn!("user {} tried to modify user {}", actor.id, id);
        return Ok(ApiError::Forbidden.into());
    }

    let data = match json_body(req) {
        Ok(v) => v,
        Err(e) => return Ok(e.into()),
    };
    let changes = ProfileChanges {
        username: data["username"].as_str(),
        email: data["email"].as_str(),
        about_me: data["about_me"].as_str(),
    };
    if let Err(e) = update_profile(store, &mut actor, changes) {
        return Ok(e.into());
    }

    item_response(store, &actor, Some(&actor))
}
