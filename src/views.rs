use std::collections::HashMap;

use spin_sdk::http::{Request, Response};

use crate::config::posts_per_page;
use crate::core::errors::ApiError;
use crate::core::pagination::{paginate, Page, PageRequest};
use crate::core::query_params::{get_int, get_string, parse_form, parse_query_params};
use crate::core::store::KvStore;
use crate::feed::{explore_feed, home_feed, user_feed};
use crate::follow::{follower_count, following_count, is_following};
use crate::models::models::{Post, User};
use crate::posts::create_post;
use crate::session::WebContext;
use crate::templates::*;
use crate::users::{find_user_by_id, find_user_by_username, register_user, update_profile, ProfileChanges};
use crate::AppState;

fn is_post(req: &Request) -> bool {
    req.method().to_string() == "POST"
}

/// The web pages never reject a page number; they clamp it.
fn web_page(req: &Request) -> PageRequest {
    let params = parse_query_params(&req.uri().to_string());
    PageRequest::clamped(get_int(&params, "page", 1), posts_per_page())
}

fn post_views(store: &dyn KvStore, posts: &[Post]) -> anyhow::Result<Vec<PostView>> {
    let mut authors: HashMap<String, Option<User>> = HashMap::new();
    let mut views = Vec::with_capacity(posts.len());
    for post in posts {
        if !authors.contains_key(&post.user_id) {
            authors.insert(post.user_id.clone(), find_user_by_id(store, &post.user_id)?);
        }
        let author = authors.get(&post.user_id).and_then(|a| a.as_ref());
        views.push(PostView::new(post, author));
    }
    Ok(views)
}

fn pager(page: &Page<Post>, base: &str) -> Pager {
    Pager {
        next_url: page.next_num().map(|n| format!("{}?page={}", base, n)),
        prev_url: page.prev_num().map(|n| format!("{}?page={}", base, n)),
    }
}

/// GET|POST / and /index
pub fn index(app: &AppState, req: &Request) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let mut ctx = WebContext::load(app, req)?;
    let user = match ctx.user.clone() {
        Some(u) => u,
        None => return ctx.login_redirect(store, req),
    };

    let mut draft = String::new();
    let mut errors = Vec::new();
    if is_post(req) {
        let form = parse_form(req.body());
        let body = get_string(&form, "post", Some("")).unwrap_or_default();
        match create_post(store, app.detector.as_ref(), &user, &body) {
            Ok(_) => {
                ctx.flash("Your post is now live!");
                return ctx.redirect(store, "/index");
            }
            Err(ApiError::BadRequest(msg)) => {
                draft = body;
                errors.push(msg);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let page = paginate(home_feed(store, &user.id)?, web_page(req));
    let view = FeedView {
        title: "Home".to_string(),
        viewer: Some(user.username.clone()),
        flashes: ctx.take_flashes(),
        show_form: true,
        draft,
        errors,
        posts: post_views(store, &page.items)?,
        pager: pager(&page, "/index"),
    };
    let status = if view.errors.is_empty() { 200 } else { 400 };
    ctx.html(store, status, render_feed(&view)?)
}

/// GET /explore
pub fn explore(app: &AppState, req: &Request) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let mut ctx = WebContext::load(app, req)?;
    let user = match ctx.user.clone() {
        Some(u) => u,
        None => return ctx.login_redirect(store, req),
    };

    let page = paginate(explore_feed(store)?, web_page(req));
    let view = FeedView {
        title: "Explore".to_string(),
        viewer: Some(user.username),
        flashes: ctx.take_flashes(),
        posts: post_views(store, &page.items)?,
        pager: pager(&page, "/explore"),
        ..FeedView::default()
    };
    ctx.html(store, 200, render_feed(&view)?)
}

/// GET /user/{username}
pub fn user_page(app: &AppState, req: &Request, username: &str) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let mut ctx = WebContext::load(app, req)?;
    let viewer = match ctx.user.clone() {
        Some(u) => u,
        None => return ctx.login_redirect(store, req),
    };

    let user = match find_user_by_username(store, username)? {
        Some(u) => u,
        None => {
            let html = render_not_found(Some(&viewer.username), &format!("User {} not found.", username))?;
            return ctx.html(store, 404, html);
        }
    };

    let page = paginate(user_feed(store, &user.id)?, web_page(req));
    let base = format!("/user/{}", urlencoding::encode(&user.username));
    let view = ProfileView {
        viewer: viewer.username.clone(),
        flashes: ctx.take_flashes(),
        followers: follower_count(store, &user.id)?,
        following: following_count(store, &user.id)?,
        is_self: viewer.id == user.id,
        is_following: is_following(store, &viewer.id, &user.id)?,
        posts: post_views(store, &page.items)?,
        pager: pager(&page, &base),
        user,
    };
    ctx.html(store, 200, render_profile(&view)?)
}

/// GET|POST /edit_profile
pub fn edit_profile(app: &AppState, req: &Request) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let mut ctx = WebContext::load(app, req)?;
    let mut user = match ctx.user.clone() {
        Some(u) => u,
        None => return ctx.login_redirect(store, req),
    };

    let mut view = EditProfileView {
        viewer: user.username.clone(),
        username: user.username.clone(),
        about_me: user.about_me.clone().unwrap_or_default(),
        ..EditProfileView::default()
    };

    if is_post(req) {
        let form = parse_form(req.body());
        view.username = get_string(&form, "username", Some("")).unwrap_or_default();
        view.about_me = get_string(&form, "about_me", Some("")).unwrap_or_default();
        let changes = ProfileChanges {
            username: Some(&view.username),
            about_me: Some(&view.about_me),
            ..ProfileChanges::default()
        };
        match update_profile(store, &mut user, changes) {
            Ok(()) => {
                ctx.flash("Your changes have been saved.");
                return ctx.redirect(store, "/edit_profile");
            }
            Err(ApiError::BadRequest(msg)) => view.errors.push(msg),
            Err(e) => return Err(e.into()),
        }
    }

    view.flashes = ctx.take_flashes();
    let status = if view.errors.is_empty() { 200 } else { 400 };
    ctx.html(store, status, render_edit_profile(&view)?)
}

/// GET|POST /register
pub fn register(app: &AppState, req: &Request) -> anyhow::Result<Response> {
    let store = app.store.as_ref();
    let mut ctx = WebContext::load(app, req)?;
    if ctx.user.is_some() {
        return ctx.redirect(store, "/index");
    }

    let mut view = RegisterView::default();
    if is_post(req) {
        let form = parse_form(req.body());
        view.username = get_string(&form, "username", Some("")).unwrap_or_default();
        view.email = get_string(&form, "email", Some("")).unwrap_or_default();
        let password = get_string(&form, "password", Some("")).unwrap_or_default();
        let password2 = get_string(&form, "password2", Some("")).unwrap_or_default();

        if password != password2 {
            view.errors.push("Passwords must match.".to_string());
        } else {
            match register_user(store, &view.username, &view.email, &password) {
                Ok(_) => {
                    ctx.flash("Congratulations, you are now a registered user!");
                    return ctx.redirect(store, "/login");
                }
                Err(ApiError::BadRequest(msg)) => view.errors.push(msg),
                Err(e) => return Err(e.into()),
            }
        }
    }

    view.flashes = ctx.take_flashes();
    let status = if view.errors.is_empty() { 200 } else { 400 };
    ctx.html(store, status, render_register(&view)?)
}
