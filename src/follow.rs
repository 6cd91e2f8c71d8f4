use chrono::Utc;
use spin_sdk::http::{Request, Response};

use crate::api::to_collection_dict;
use crate::auth::token_user;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::json_response;
use crate::core::pagination::PageRequest;
use crate::core::store::{KvJson, KvStore};
use crate::models::models::{FollowEdge, User};
use crate::session::WebContext;
use crate::users::{find_user_by_id, find_user_by_username, sort_by_username};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    AlreadyFollowing,
    Unfollowed,
    NotFollowing,
}

/// Adds the edge `actor -> target`. Following twice is not an error.
pub fn follow(store: &dyn KvStore, actor: &User, target: &User) -> Result<FollowOutcome, ApiError> {
    if actor.id == target.id {
        return Err(ApiError::BadRequest("You cannot follow yourself!".to_string()));
    }

    let edge = FollowEdge {
        follower_id: actor.id.clone(),
        followee_id: target.id.clone(),
        created_at: Utc::now(),
    };
    let reverse = follower_key(&target.id, &actor.id);
    if !store.insert_json_if_absent(&follow_key(&actor.id, &target.id), &edge)? {
        // An earlier follow may have stopped before writing the reverse key.
        if !store.exists(&reverse)? {
            let stored = store
                .get_json::<FollowEdge>(&follow_key(&actor.id, &target.id))?
                .unwrap_or(edge);
            store.set_json(&reverse, &stored)?;
        }
        return Ok(FollowOutcome::AlreadyFollowing);
    }
    store.set_json(&reverse, &edge)?;

    log::info!("{} now follows {}", actor.username, target.username);
    Ok(FollowOutcome::Followed)
}

/// Removes the edge `actor -> target` if it exists.
pub fn unfollow(store: &dyn KvStore, actor: &User, target: &User) -> Result<FollowOutcome, ApiError> {
    if actor.id == target.id {
        return Err(ApiError::BadRequest("You cannot unfollow yourself!".to_string()));
    }

    let existed = store.exists(&follow_key(&actor.id, &target.id))?;
    store.delete(&follow_key(&actor.id, &target.id))?;
    store.delete(&follower_key(&target.id, &actor.id))?;

    if existed {
        log::info!("{} stopped following {}", actor.username, target.username);
        Ok(FollowOutcome::Unfollowed)
    } else {
        Ok(FollowOutcome::NotFollowing)
    }
}

pub fn is_following(store: &dyn KvStore, actor_id: &str, target_id: &str) -> anyhow::Result<bool> {
    store.exists(&follow_key(actor_id, target_id))
}

/// Ids at the far end of every edge stored under `prefix`.
fn edge_ids(store: &dyn KvStore, prefix: &str) -> anyhow::Result<Vec<String>> {
    Ok(store
        .keys_with_prefix(prefix)?
        .into_iter()
        .filter_map(|key| key.strip_prefix(prefix).map(str::to_string))
        .collect())
}

pub fn following_ids(store: &dyn KvStore, user_id: &str) -> anyhow::Result<Vec<String>> {
    edge_ids(store, &format!("{}{}:", FOLLOW_PREFIX, user_id))
}

pub fn follower_ids(store: &dyn KvStore, user_id: &str) -> anyhow::Result<Vec<String>> {
    edge_ids(store, &format!("{}{}:", FOLLOWER_PREFIX, user_id))
}

fn load_users(store: &dyn KvStore, ids: Vec<String>) -> anyhow::Result<Vec<User>> {
    let mut users = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(u) = find_user_by_id(store, &id)? {
            users.push(u);
        }
    }
    sort_by_username(&mut users);
    Ok(users)
}

/// Users `user_id` follows, ordered by username.
pub fn following_of(store: &dyn KvStore, user_id: &str) -> anyhow::Result<Vec<User>> {
    load_users(store, following_ids(store, user_id)?)
}

/// Users following `user_id`, ordered by username.
pub fn followers_of(store: &dyn KvStore, user_id: &str) -> anyhow::Result<Vec<User>> {
    load_users(store, follower_ids(store, user_id)?)
}

pub fn following_count(store: &dyn KvStore, user_id: &str) -> anyhow::Result<usize> {
    Ok(following_ids(store, user_id)?.len())
}

pub fn follower_count(store: &dyn KvStore, user_id: &str) -> anyhow::Result<usize> {
    Ok(follower_ids(store, user_id)?.len())
}

// === HTTP Handlers ===

#[derive(Clone, Copy)]
enum Direction {
    Follow,
    Unfollow,
}

/// POST /follow/{username}
pub fn handle_follow(app: &AppState, req: &Request, username: &str) -> anyhow::Result<Response> {
    toggle(app, req, username, Direction::Follow)
}

/// POST /unfollow/{username}
pub fn handle_unfollow(app: &AppState, req: &Request, username: &str) -> anyhow::Result<Response> {
    toggle(app, req, username, Direction::Unfollow)
}

fn toggle(app: &AppState, req: &Request, username: &str, direction: Direction) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let mut ctx = WebContext::load(app, req)?;
    let actor = match ctx.user.clone() {
        Some(u) => u,
        None => return ctx.login_redirect(store, req),
    };

    let target = match find_user_by_username(store, username)? {
        Some(u) => u,
        None => {
            ctx.flash(format!("User {} not found.", username));
            return ctx.redirect(store, "/index");
        }
    };

    let result = match direction {
        Direction::Follow => follow(store, &actor, &target),
        Direction::Unfollow => unfollow(store, &actor, &target),
    };
    match result {
        Ok(FollowOutcome::Followed) | Ok(FollowOutcome::AlreadyFollowing) => {
            ctx.flash(format!("You are following {}!", username));
        }
        Ok(FollowOutcome::Unfollowed) | Ok(FollowOutcome::NotFollowing) => {
            ctx.flash(format!("You are not following {}.", username));
        }
        Err(ApiError::BadRequest(msg)) => ctx.flash(msg),
        Err(e) => return Err(e.into()),
    }

    let location = format!("/user/{}", urlencoding::encode(username));
    // The edge is already stored; losing the flash is acceptable.
    match ctx.redirect(store, &location) {
        Ok(resp) => Ok(resp),
        Err(e) => {
            log::warn!("could not persist session after follow change: {:#}", e);
            Ok(Response::builder().status(303).header("Location", &location).body(Vec::new()).build())
        }
    }
}

/// GET /users/{id}/followers
pub fn get_followers(app: &AppState, req: &Request, id: &str) -> anyhow::Result<Response> {
    list_edges(app, req, id, "followers")
}

/// GET /users/{id}/following
pub fn get_following(app: &AppState, req: &Request, id: &str) -> anyhow::Result<Response> {
    list_edges(app, req, id, "following")
}

fn list_edges(app: &AppState, req: &Request, id: &str, which: &str) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let actor = match token_user(store, req)? {
        Some(u) => u,
        None => return Ok(ApiError::Unauthorized.into()),
    };
    let user = match find_user_by_id(store, id)? {
        Some(u) => u,
        None => return Ok(ApiError::NotFound("User not found".to_string()).into()),
    };
    let request = match PageRequest::from_uri(&req.uri().to_string()) {
        Ok(r) => r,
        Err(e) => return Ok(e.into()),
    };

    let users = if which == "followers" {
        followers_of(store, &user.id)?
    } else {
        following_of(store, &user.id)?
    };
    let endpoint = format!("/users/{}/{}", user.id, which);
    let body = to_collection_dict(store, Some(&actor), users, request, &endpoint)?;
    Ok(json_response(200, &body))
}
