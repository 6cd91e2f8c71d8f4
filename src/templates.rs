use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, SecondsFormat, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::{Captures, Regex};
use rust_embed::RustEmbed;

use crate::config::{MAX_ABOUT_ME_LENGTH, MAX_POST_LENGTH};
use crate::models::models::{Post, User};

#[derive(RustEmbed)]
#[folder = "templates"]
struct Templates;

// === View models ===

#[derive(Debug, Clone, PartialEq)]
pub struct PostView {
    pub id: String,
    pub author: String,
    pub avatar: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub language: String,
}

impl PostView {
    pub fn new(post: &Post, author: Option<&User>) -> Self {
        PostView {
            id: post.id.clone(),
            author: author.map(|a| a.username.clone()).unwrap_or_else(|| "[deleted]".to_string()),
            avatar: author.map(|a| a.avatar(36)).unwrap_or_default(),
            body: post.body.clone(),
            timestamp: post.timestamp,
            language: post.language.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pager {
    pub next_url: Option<String>,
    pub prev_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FeedView {
    pub title: String,
    pub viewer: Option<String>,
    pub flashes: Vec<String>,
    /// Only the home page carries the form.
    pub show_form: bool,
    pub draft: String,
    pub errors: Vec<String>,
    pub posts: Vec<PostView>,
    pub pager: Pager,
}

#[derive(Debug, Clone)]
pub struct ProfileView {
    pub viewer: String,
    pub flashes: Vec<String>,
    pub user: User,
    pub followers: usize,
    pub following: usize,
    pub is_self: bool,
    pub is_following: bool,
    pub posts: Vec<PostView>,
    pub pager: Pager,
}

#[derive(Debug, Clone, Default)]
pub struct EditProfileView {
    pub viewer: String,
    pub flashes: Vec<String>,
    pub username: String,
    pub about_me: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoginView {
    pub flashes: Vec<String>,
    pub username: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterView {
    pub flashes: Vec<String>,
    pub username: String,
    pub email: String,
    pub errors: Vec<String>,
}

// === Rendering ===

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("Regex should compile"))
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"https?://[^\s<>]+").expect("Regex should compile"))
}

fn load(name: &str) -> anyhow::Result<String> {
    let file = Templates::get(name)
        .ok_or_else(|| anyhow::anyhow!("template {} not found", name))?;
    Ok(String::from_utf8(file.data.to_vec())?)
}

/// Substitutes `{{name}}` slots in one pass; inserted text is never rescanned.
/// Values are inserted verbatim and must already be escaped.
fn fill(template: &str, values: &HashMap<&str, String>) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &Captures| values.get(&caps[1]).cloned().unwrap_or_default())
        .into_owned()
}

fn render(name: &str, values: &[(&str, String)]) -> anyhow::Result<String> {
    Ok(fill(&load(name)?, &values.iter().cloned().collect()))
}

fn page(title: &str, viewer: Option<&str>, flashes: &[String], content: String) -> anyhow::Result<String> {
    render(
        "base.html",
        &[
            ("title", encode_text(title).into_owned()),
            ("nav", nav(viewer)),
            ("flashes", flash_list(flashes)),
            ("content", content),
        ],
    )
}

fn nav(viewer: Option<&str>) -> String {
    match viewer {
        Some(username) => format!(
            r#"<a href="/index">Home</a> <a href="/explore">Explore</a> <a href="/user/{}">Profile</a> <a href="/logout">Logout</a>"#,
            encode_double_quoted_attribute(&urlencoding::encode(username))
        ),
        None => r#"<a href="/explore">Explore</a> <a href="/login">Login</a>"#.to_string(),
    }
}

fn flash_list(flashes: &[String]) -> String {
    flashes
        .iter()
        .map(|f| format!(r#"<div class="flash">{}</div>"#, encode_text(f)))
        .collect()
}

fn error_list(errors: &[String]) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let items: String = errors.iter().map(|e| format!("<li>{}</li>", encode_text(e))).collect();
    format!(r#"<ul class="errors">{}</ul>"#, items)
}

/// Escapes a post body and turns bare http(s) URLs into links.
pub fn linkify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in url_regex().find_iter(text) {
        out.push_str(&encode_text(&text[last..m.start()]));
        let url = m.as_str();
        out.push_str(&format!(
            r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
            encode_double_quoted_attribute(url),
            encode_text(url)
        ));
        last = m.end();
    }
    out.push_str(&encode_text(&text[last..]));
    out
}

fn human_time(ts: &DateTime<Utc>) -> String {
    ts.format("%b %-d, %Y %H:%M UTC").to_string()
}

fn render_post(post: &PostView) -> anyhow::Result<String> {
    let translate = if post.language.is_empty() || post.language == "en" {
        String::new()
    } else {
        format!(
            r#"<span id="post{id}-translate"><a href="javascript:translate('post{id}', '{lang}', 'en');">Translate</a></span>"#,
            id = encode_double_quoted_attribute(&post.id),
            lang = encode_double_quoted_attribute(&post.language)
        )
    };
    render(
        "post.html",
        &[
            ("avatar", encode_double_quoted_attribute(&post.avatar).into_owned()),
            ("author_path", encode_double_quoted_attribute(&urlencoding::encode(&post.author)).into_owned()),
            ("author", encode_text(&post.author).into_owned()),
            ("timestamp", post.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("when", human_time(&post.timestamp)),
            ("id", encode_double_quoted_attribute(&post.id).into_owned()),
            ("body", linkify(&post.body)),
            ("translate", translate),
        ],
    )
}

fn render_posts(posts: &[PostView]) -> anyhow::Result<String> {
    posts.iter().map(render_post).collect()
}

fn render_pager(pager: &Pager) -> String {
    let link = |url: &Option<String>, label: &str| match url {
        Some(u) => format!(r#"<a href="{}">{}</a>"#, encode_double_quoted_attribute(u), label),
        None => "<span></span>".to_string(),
    };
    format!(
        r#"<nav class="pager">{}{}</nav>"#,
        link(&pager.prev_url, "&larr; Newer posts"),
        link(&pager.next_url, "Older posts &rarr;")
    )
}

pub fn render_feed(view: &FeedView) -> anyhow::Result<String> {
    let post_form = if view.show_form {
        render(
            "post_form.html",
            &[
                ("max_length", MAX_POST_LENGTH.to_string()),
                ("draft", encode_text(&view.draft).into_owned()),
                ("errors", error_list(&view.errors)),
            ],
        )?
    } else {
        String::new()
    };
    let content = render(
        "feed.html",
        &[
            ("heading", encode_text(&view.title).into_owned()),
            ("post_form", post_form),
            ("posts", render_posts(&view.posts)?),
            ("pager", render_pager(&view.pager)),
        ],
    )?;
    page(&view.title, view.viewer.as_deref(), &view.flashes, content)
}

pub fn render_profile(view: &ProfileView) -> anyhow::Result<String> {
    let user = &view.user;
    let path = encode_double_quoted_attribute(&urlencoding::encode(&user.username)).into_owned();
    let action = if view.is_self {
        r#"<p><a href="/edit_profile">Edit your profile</a></p>"#.to_string()
    } else if view.is_following {
        format!(r#"<form method="post" action="/unfollow/{}"><button type="submit">Unfollow</button></form>"#, path)
    } else {
        format!(r#"<form method="post" action="/follow/{}"><button type="submit">Follow</button></form>"#, path)
    };
    let about_me = user
        .about_me
        .as_ref()
        .map(|a| format!("<p>{}</p>", encode_text(a)))
        .unwrap_or_default();

    let content = render(
        "user.html",
        &[
            ("avatar", encode_double_quoted_attribute(&user.avatar(128)).into_owned()),
            ("username", encode_text(&user.username).into_owned()),
            ("about_me", about_me),
            ("last_seen", user.last_seen.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("followers", view.followers.to_string()),
            ("following", view.following.to_string()),
            ("action", action),
            ("posts", render_posts(&view.posts)?),
            ("pager", render_pager(&view.pager)),
        ],
    )?;
    page(&format!("User {}", user.username), Some(&view.viewer), &view.flashes, content)
}

pub fn render_edit_profile(view: &EditProfileView) -> anyhow::Result<String> {
    let content = render(
        "edit_profile.html",
        &[
            ("username", encode_double_quoted_attribute(&view.username).into_owned()),
            ("about_me", encode_text(&view.about_me).into_owned()),
            ("max_length", MAX_ABOUT_ME_LENGTH.to_string()),
            ("errors", error_list(&view.errors)),
        ],
    )?;
    page("Edit Profile", Some(&view.viewer), &view.flashes, content)
}

pub fn render_login(view: &LoginView) -> anyhow::Result<String> {
    let errors: Vec<String> = view.error.iter().cloned().collect();
    let content = render(
        "login.html",
        &[
            ("username", encode_double_quoted_attribute(&view.username).into_owned()),
            ("errors", error_list(&errors)),
        ],
    )?;
    page("Sign In", None, &view.flashes, content)
}

pub fn render_register(view: &RegisterView) -> anyhow::Result<String> {
    let content = render(
        "register.html",
        &[
            ("username", encode_double_quoted_attribute(&view.username).into_owned()),
            ("email", encode_double_quoted_attribute(&view.email).into_owned()),
            ("errors", error_list(&view.errors)),
        ],
    )?;
    page("Register", None, &view.flashes, content)
}

pub fn render_not_found(viewer: Option<&str>, message: &str) -> anyhow::Result<String> {
    let content = render("not_found.html", &[("message", encode_text(message).into_owned())])?;
    page("Not Found", viewer, &[], content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linkify_escapes_and_links() {
        let html = linkify("<b>see</b> https://example.com/a?b=1&c=2 now");
        assert!(html.starts_with("&lt;b&gt;see&lt;/b&gt; "));
        assert!(html.contains(r#"<a href="https://example.com/a?b=1&amp;c=2" target="_blank""#));
        assert!(html.ends_with("</a> now"));
    }

    #[test]
    fn fill_does_not_rescan_inserted_text() {
        let mut values = HashMap::new();
        values.insert("a", "{{b}}".to_string());
        values.insert("b", "oops".to_string());
        assert_eq!(fill("[{{a}}] [{{missing}}]", &values), "[{{b}}] []");
    }

    #[test]
    fn feed_page_escapes_user_content() {
        let view = FeedView {
            title: "Home".to_string(),
            viewer: Some("ann".to_string()),
            flashes: vec!["Your post is now live!".to_string()],
            show_form: true,
            posts: vec![PostView {
                id: "1".to_string(),
                author: "mallory".to_string(),
                avatar: String::new(),
                body: "<script>alert(1)</script>".to_string(),
                timestamp: Utc::now(),
                language: "es".to_string(),
            }],
            pager: Pager { next_url: Some("/index?page=2".to_string()), prev_url: None },
            ..FeedView::default()
        };
        let html = render_feed(&view).unwrap();
        assert!(html.contains("<title>Home - Murmur</title>"));
        assert!(html.contains("Your post is now live!"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
        assert!(html.contains(r#"action="/index""#));
        assert!(html.contains("translate('post1', 'es', 'en')"));
        assert!(html.contains(r#"<a href="/index?page=2">Older posts"#));
        assert!(html.contains(r#"href="/user/ann""#));
    }

    #[test]
    fn login_page_shows_error() {
        let view = LoginView { username: "ann\"".to_string(), error: Some("Invalid username or password".to_string()), ..Default::default() };
        let html = render_login(&view).unwrap();
        assert!(html.contains("Invalid username or password"));
        assert!(html.contains(r#"value="ann&quot;""#));
    }
}
