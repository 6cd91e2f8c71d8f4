// === Limits ===
pub const MAX_POST_LENGTH: usize = 140;
pub const MAX_ABOUT_ME_LENGTH: usize = 140;
pub const MAX_USERNAME_LENGTH: usize = 64;
pub const MAX_EMAIL_LENGTH: usize = 120;

// === Pagination ===
pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PER_PAGE: i64 = 10;
pub const MAX_PER_PAGE: usize = 100;

// === Sessions ===
pub const SESSION_COOKIE: &str = "murmur_session";

// === Store keys ===
pub const USER_PREFIX: &str = "user:";
pub const POST_PREFIX: &str = "post:";
pub const FOLLOW_PREFIX: &str = "follow:";
pub const FOLLOWER_PREFIX: &str = "follower:";
pub const AUTHORED_PREFIX: &str = "authored:";

pub fn user_key(id: &str) -> String {
    format!("{}{}", USER_PREFIX, id)
}

pub fn post_key(id: &str) -> String {
    format!("{}{}", POST_PREFIX, id)
}

/// Author index entry, `authored:{user}:{post}`.
pub fn authored_key(user_id: &str, post_id: &str) -> String {
    format!("{}{}:{}", AUTHORED_PREFIX, user_id, post_id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn session_key(id: &str) -> String {
    format!("session:{}", id)
}

pub fn username_index_key(username: &str) -> String {
    format!("idx:username:{}", username)
}

pub fn email_index_key(email: &str) -> String {
    format!("idx:email:{}", email.to_lowercase())
}

/// Edge owned by the follower, `follow:{follower}:{followee}`.
pub fn follow_key(follower_id: &str, followee_id: &str) -> String {
    format!("{}{}:{}", FOLLOW_PREFIX, follower_id, followee_id)
}

/// Reverse edge owned by the followee, `follower:{followee}:{follower}`.
pub fn follower_key(followee_id: &str, follower_id: &str) -> String {
    format!("{}{}:{}", FOLLOWER_PREFIX, followee_id, follower_id)
}

// === Environment ===
pub fn token_expiration_secs() -> i64 {
    std::env::var("MURMUR_TOKEN_EXPIRATION_SECS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(3600)
}

pub fn session_lifetime_hours() -> i64 {
    std::env::var("MURMUR_SESSION_LIFETIME_HOURS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(24 * 14)
}

pub fn posts_per_page() -> usize {
    std::env::var("MURMUR_POSTS_PER_PAGE")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(25)
}
