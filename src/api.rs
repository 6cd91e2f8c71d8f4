//! JSON representations shared by the API handlers.
//!
//! Single entities go through [`ApiResource::to_item_dict`]; lists go through
//! [`to_collection_dict`], which paginates and adds `_meta` and `_links`.

use chrono::SecondsFormat;
use serde_json::{json, Value};

use crate::core::pagination::{paginate, PageRequest};
use crate::core::store::KvStore;
use crate::feed::post_count;
use crate::follow::{follower_count, following_count};
use crate::models::models::{Post, User};
use crate::users::find_user_by_id;

pub trait ApiResource {
    /// Public fields plus a `_links.self` entry. Secrets never appear.
    fn to_item_dict(&self, store: &dyn KvStore, viewer: Option<&User>) -> anyhow::Result<Value>;
}

impl ApiResource for User {
    fn to_item_dict(&self, store: &dyn KvStore, viewer: Option<&User>) -> anyhow::Result<Value> {
        let mut data = json!({
            "id": self.id,
            "username": self.username,
            "last_seen": self.last_seen.to_rfc3339_opts(SecondsFormat::Secs, true),
            "about_me": self.about_me,
            "post_count": post_count(store, &self.id)?,
            "follower_count": follower_count(store, &self.id)?,
            "following_count": following_count(store, &self.id)?,
            "_links": {
                "self": format!("/users/{}", self.id),
                "followers": format!("/users/{}/followers", self.id),
                "following": format!("/users/{}/following", self.id),
                "avatar": self.avatar(128),
            }
        });
        // Only the account owner sees the address.
        if viewer.map(|v| v.id == self.id).unwrap_or(false) {
            data["email"] = Value::String(self.email.clone());
        }
        Ok(data)
    }
}

impl ApiResource for Post {
    fn to_item_dict(&self, store: &dyn KvStore, _viewer: Option<&User>) -> anyhow::Result<Value> {
        let author = find_user_by_id(store, &self.user_id)?;
        Ok(json!({
            "id": self.id,
            "body": self.body,
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            "language": self.language,
            "author": {
                "id": self.user_id,
                "username": author.map(|a| a.username),
            },
            "_links": {
                "self": format!("/posts/{}", self.id),
                "author": format!("/users/{}", self.user_id),
            }
        }))
    }
}

fn page_link(endpoint: &str, page: usize, per_page: usize) -> String {
    format!("{}?page={}&per_page={}", endpoint, page, per_page)
}

/// Paginates `items` (already ordered) and wraps the page as
/// `{items, _meta, _links}`. `endpoint` is the path the links point back to.
pub fn to_collection_dict<T: ApiResource>(
    store: &dyn KvStore,
    viewer: Option<&User>,
    items: Vec<T>,
    request: PageRequest,
    endpoint: &str,
) -> anyhow::Result<Value> {
    let page = paginate(items, request);
    let per_page = page.per_page;

    let items = page
        .items
        .iter()
        .map(|item| item.to_item_dict(store, viewer))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(json!({
        "items": items,
        "_meta": {
            "page": page.page,
            "per_page": per_page,
            "total_pages": page.total_pages(),
            "total_items": page.total_items,
        },
        "_links": {
            "self": page_link(endpoint, page.page, per_page),
            "next": page.next_num().map(|n| page_link(endpoint, n, per_page)),
            "prev": page.prev_num().map(|n| page_link(endpoint, n, per_page)),
            "first": page_link(endpoint, 1, per_page),
            "last": page_link(endpoint, page.total_pages().max(1), per_page),
        }
    }))
}
