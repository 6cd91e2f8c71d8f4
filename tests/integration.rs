#![cfg(not(target_arch = "wasm32"))]

use actix_web::dev::ServiceResponse;
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use serde_json::{json, Value};

use murmur::core::store::MemoryStore;
use murmur::server::configure;
use murmur::AppState;

// Helpers are macros because the test service type cannot be named without
// depending on actix-http directly.
macro_rules! service {
    () => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new(MemoryStore::new())))
                .configure(configure),
        )
        .await
    };
}

fn location(resp: &ServiceResponse) -> String {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn session_cookie(resp: &ServiceResponse) -> String {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("murmur_session="))
        .and_then(|v| v.split(';').next())
        .expect("session cookie")
        .to_string()
}

macro_rules! create_user {
    ($app:expr, $username:expr) => {{
        let username: &str = $username;
        let req = test::TestRequest::post()
            .uri("/users")
            .set_json(json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "test",
            }))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        body
    }};
}

macro_rules! token {
    ($app:expr, $username:expr) => {{
        let req = test::TestRequest::post()
            .uri("/tokens")
            .set_json(json!({"username": $username, "password": "test"}))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        body["token"].as_str().unwrap().to_string()
    }};
}

macro_rules! login {
    ($app:expr, $username:expr) => {{
        let req = test::TestRequest::post()
            .uri("/login")
            .insert_header((header::CONTENT_TYPE, "application/x-www-form-urlencoded"))
            .set_payload(format!("username={}&password=test", $username))
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        session_cookie(&resp)
    }};
}

#[actix_web::test]
async fn test_full_user_flow() {
    let app = service!();

    // 1. Register
    let req = test::TestRequest::post()
        .uri("/users")
        .set_json(json!({"username": "flow", "email": "flow@example.com", "password": "test"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created_at = location(&resp);
    let user: Value = test::read_body_json(resp).await;
    let user_id = user["id"].as_str().unwrap().to_string();
    assert_eq!(created_at, format!("/users/{}", user_id));
    assert!(user.get("password_hash").is_none());

    // 2. Token
    let token = token!(app, "flow");

    // 3. Read back
    let req = test::TestRequest::get()
        .uri(&created_at)
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let fetched: Value = test::read_body_json(resp).await;
    assert_eq!(fetched["username"], "flow");
    assert!(!fetched.to_string().contains(&token));

    // 4. Post and see it in the feed
    let req = test::TestRequest::post()
        .uri("/posts")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .set_json(json!({"body": "Test post from integration test!"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri("/feed")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    let feed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(feed["_meta"]["total_items"], 1);
    assert_eq!(feed["items"][0]["body"], "Test post from integration test!");
    assert_eq!(feed["items"][0]["author"]["id"], user_id);

    // 5. Revoke
    let req = test::TestRequest::delete()
        .uri("/tokens")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
    let req = test::TestRequest::get()
        .uri("/feed")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_duplicate_registration() {
    let app = service!();
    create_user!(app, "dupe");

    let req = test::TestRequest::post()
        .uri("/users")
        .set_json(json!({"username": "dupe", "email": "other@example.com", "password": "test"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Bad Request");
    assert_eq!(body["message"], "please use a different username");
}

#[actix_web::test]
async fn test_cannot_modify_other_users() {
    let app = service!();
    create_user!(app, "mallory");
    let victim = create_user!(app, "victim");
    let token = token!(app, "mallory");

    let req = test::TestRequest::put()
        .uri(&format!("/users/{}", victim["id"].as_str().unwrap()))
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .set_json(json!({"about_me": "owned"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri(&format!("/users/{}", victim["id"].as_str().unwrap()))
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    let fetched: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(fetched["about_me"], Value::Null);
}

#[actix_web::test]
async fn test_follow_through_the_web_pages() {
    let app = service!();
    create_user!(app, "ann");
    let bob = create_user!(app, "bob");
    let cookie = login!(app, "ann");

    let req = test::TestRequest::post()
        .uri("/follow/bob")
        .insert_header((header::COOKIE, cookie.clone()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/user/bob");

    let req = test::TestRequest::get()
        .uri("/user/bob")
        .insert_header((header::COOKIE, cookie.clone()))
        .to_request();
    let page = test::call_and_read_body(&app, req).await;
    let page = String::from_utf8_lossy(&page);
    assert!(page.contains("You are following bob!"));

    let token = token!(app, "ann");
    let req = test::TestRequest::get()
        .uri(&format!("/users/{}/followers", bob["id"].as_str().unwrap()))
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    let followers: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(followers["_meta"]["total_items"], 1);
    assert_eq!(followers["items"][0]["username"], "ann");
}

#[actix_web::test]
async fn test_anonymous_pages_redirect_to_login() {
    let app = service!();
    let req = test::TestRequest::get().uri("/index").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login?next=%2Findex");

    let req = test::TestRequest::get().uri("/login").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_translation_is_unavailable_without_a_key() {
    let app = service!();
    create_user!(app, "ann");
    let cookie = login!(app, "ann");

    let req = test::TestRequest::post()
        .uri("/translate")
        .insert_header((header::COOKIE, cookie))
        .set_json(json!({"text": "hola", "source_language": "es", "dest_language": "en"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn test_static_and_unknown_routes() {
    let app = service!();
    let req = test::TestRequest::get().uri("/static/style.css").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "text/css");

    let req = test::TestRequest::get().uri("/does/not/exist").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}
