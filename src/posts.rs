use chrono::Utc;
use spin_sdk::http::{Request, Response};

use crate::api::{to_collection_dict, ApiResource};
use crate::auth::token_user;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_body, json_response, new_id, validate_uuid};
use crate::core::pagination::PageRequest;
use crate::core::store::{KvJson, KvStore};
use crate::feed::{explore_feed, home_feed};
use crate::models::models::{Post, User};
use crate::translate::{detect_language, LanguageDetector};
use crate::AppState;

/// Stores a post together with its author index entry.
pub fn insert_post(store: &dyn KvStore, post: &Post) -> anyhow::Result<()> {
    store.set_json(&post_key(&post.id), post)?;
    store.set(&authored_key(&post.user_id, &post.id), b"")?;
    Ok(())
}

pub fn find_post(store: &dyn KvStore, id: &str) -> anyhow::Result<Option<Post>> {
    if !validate_uuid(id) {
        return Ok(None);
    }
    store.get_json(&post_key(id))
}

pub fn validate_body(body: &str) -> Result<String, ApiError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ApiError::BadRequest("post body is required".to_string()));
    }
    if body.chars().count() > MAX_POST_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "post body must be at most {} characters",
            MAX_POST_LENGTH
        )));
    }
    Ok(body.to_string())
}

pub fn create_post(
    store: &dyn KvStore,
    detector: &dyn LanguageDetector,
    author: &User,
    body: &str,
) -> Result<Post, ApiError> {
    let body = validate_body(body)?;
    let post = Post {
        id: new_id(),
        user_id: author.id.clone(),
        language: detect_language(detector, &body),
        body,
        timestamp: Utc::now(),
    };
    insert_post(store, &post)?;
    log::info!("{} posted {} ({})", author.username, post.id, post.language);
    Ok(post)
}

// === HTTP Handlers ===

/// POST /posts
pub fn create_post_api(app: &AppState, req: &Request) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let author = match token_user(store, req)? {
        Some(u) => u,
        None => return Ok(ApiError::Unauthorized.into()),
    };
    let data = match json_body(req) {
        Ok(v) => v,
        Err(e) => return Ok(e.into()),
    };
    let body = match data["body"].as_str() {
        Some(b) => b,
        None => return Ok(ApiError::BadRequest("must include body field".to_string()).into()),
    };

    let post = match create_post(store, app.detector.as_ref(), &author, body) {
        Ok(p) => p,
        Err(e) => return Ok(e.into()),
    };

    Ok(Response::builder()
        .status(201)
        .header("Content-Type", "application/json")
        .header("Location", &format!("/posts/{}", post.id))
        .body(post.to_item_dict(store, Some(&author))?.to_string().into_bytes())
        .build())
}

/// GET /posts/{id}
pub fn get_post(app: &AppState, req: &Request, id: &str) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let viewer = match token_user(store, req)? {
        Some(u) => u,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    match find_post(store, id)? {
        Some(post) => Ok(json_response(200, &post.to_item_dict(store, Some(&viewer))?)),
        None => Ok(ApiError::NotFound("Post not found".to_string()).into()),
    }
}

/// GET /posts: every post, newest first.
pub fn list_posts(app: &AppState, req: &Request) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let viewer = match token_user(store, req)? {
        Some(u) => u,
        None => return Ok(ApiError::Unauthorized.into()),
    };
    let request = match PageRequest::from_uri(&req.uri().to_string()) {
        Ok(r) => r,
        Err(e) => return Ok(e.into()),
    };

    let body = to_collection_dict(store, Some(&viewer), explore_feed(store)?, request, "/posts")?;
    Ok(json_response(200, &body))
}

/// GET /feed: the caller's home feed.
pub fn get_feed(app: &AppState, req: &Request) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let viewer = match token_user(store, req)? {
        Some(u) => u,
        None => return Ok(ApiError::Unauthorized.into()),
    };
    let request = match PageRequest::from_uri(&req.uri().to_string()) {
        Ok(r) => r,
        Err(e) => return Ok(e.into()),
    };

    let posts = home_feed(store, &viewer.id)?;
    let body = to_collection_dict(store, Some(&viewer), posts, request, "/feed")?;
    Ok(json_response(200, &body))
}
