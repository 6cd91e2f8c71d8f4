use spin_sdk::http::{Request, Response};

use crate::core::errors::ApiError;
use crate::core::static_server::serve_static;
use crate::{auth, follow, posts, translate, users, views, AppState};

fn decoded_segments(path: &str) -> Vec<String> {
    path.trim_matches('/')
        .split('/')
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect()
}

/// Dispatches one request. Shared by the Spin component and the native server.
pub fn route(app: &AppState, req: Request) -> Response {
    let method = req.method().to_string();
    let path = req.path().to_string();
    log::debug!("{} {}", method, path);

    let segments = decoded_segments(&path);
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

    let result = match (method.as_str(), segments.as_slice()) {
        // JSON API
        ("GET", ["users"]) => users::get_users(app, &req),
        ("POST", ["users"]) => users::create_user(app, &req),
        ("GET", ["users", id]) => users::get_user(app, &req, id),
        ("PUT", ["users", id]) => users::update_user(app, &req, id),
        ("GET", ["users", id, "followers"]) => follow::get_followers(app, &req, id),
        ("GET", ["users", id, "following"]) => follow::get_following(app, &req, id),
        ("POST", ["tokens"]) => auth::create_token(app, &req),
        ("DELETE", ["tokens"]) => auth::delete_token(app, &req),
        ("GET", ["posts"]) => posts::list_posts(app, &req),
        ("POST", ["posts"]) => posts::create_post_api(app, &req),
        ("GET", ["posts", id]) => posts::get_post(app, &req, id),
        ("GET", ["feed"]) => posts::get_feed(app, &req),

        // Session-backed web surface
        ("GET" | "POST", [""]) | ("GET" | "POST", ["index"]) => views::index(app, &req),
        ("GET", ["explore"]) => views::explore(app, &req),
        ("GET", ["user", username]) => views::user_page(app, &req, username),
        ("GET" | "POST", ["edit_profile"]) => views::edit_profile(app, &req),
        ("POST", ["follow", username]) => follow::handle_follow(app, &req, username),
        ("POST", ["unfollow", username]) => follow::handle_unfollow(app, &req, username),
        ("POST", ["translate"]) => translate::translate_text(app, &req),
        ("GET" | "POST", ["login"]) => auth::login(app, &req),
        ("GET", ["logout"]) => auth::logout(app, &req),
        ("GET" | "POST", ["register"]) => views::register(app, &req),
        ("GET", ["static", file]) => Ok(serve_static(file)),

        _ => Ok(ApiError::NotFound("No route found".to_string()).into()),
    };

    match result {
        Ok(resp) => resp,
        Err(e) => {
            log::error!("{} {} failed: {:#}", method, path, e);
            ApiError::Internal(e).into()
        }
    }
}
