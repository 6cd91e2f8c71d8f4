use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub about_me: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub token: Option<String>,
    pub token_expiration: Option<DateTime<Utc>>,
}

impl User {
    /// Key Gravatar uses to look up the avatar: SHA-256 of the normalized email.
    pub fn avatar_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.email.trim().to_lowercase().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn avatar(&self, size: u32) -> String {
        format!(
            "https://www.gravatar.com/avatar/{}?d=identicon&s={}",
            self.avatar_key(),
            size
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub language: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FollowEdge {
    pub follower_id: String,
    pub followee_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SessionData {
    pub user_id: Option<String>,
    #[serde(default)]
    pub flashes: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}
