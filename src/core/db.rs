use crate::core::store::KvStore;
use crate::follow::follow;
use crate::models::models::User;
use crate::posts::create_post;
use crate::translate::LanguageDetector;
use crate::users::{find_user_by_username, register_user_with};

struct DemoUser {
    username: &'static str,
    about_me: &'static str,
    posts: &'static [&'static str],
}

const DEMO_USERS: &[DemoUser] = &[
    DemoUser {
        username: "test",
        about_me: "Test user bio",
        posts: &["This is my first post on Murmur!"],
    },
    DemoUser {
        username: "alice",
        about_me: "Hello, I'm Alice!",
        posts: &[
            "Welcome to my corner! Excited to share thoughts here.",
            "Just finished an amazing project. Feeling productive today!",
        ],
    },
    DemoUser {
        username: "bob",
        about_me: "Bob's corner of the internet",
        posts: &["Hey everyone! Just joined, looking forward to connecting with you all."],
    },
];

fn ensure_user(store: &dyn KvStore, detector: &dyn LanguageDetector, demo: &DemoUser) -> anyhow::Result<User> {
    if let Some(existing) = find_user_by_username(store, demo.username)? {
        return Ok(existing);
    }

    let email = format!("{}@example.com", demo.username);
    // Demo passwords equal the username.
    let user = register_user_with(store, demo.username, &email, demo.username, Some(demo.about_me))?;
    for body in demo.posts {
        create_post(store, detector, &user, body)?;
    }
    log::info!("seeded demo user {}", user.username);
    Ok(user)
}

/// Creates the demo accounts with a few posts and makes `test` follow `bob`.
/// Running it again leaves existing accounts alone.
pub fn seed_demo_data(store: &dyn KvStore, detector: &dyn LanguageDetector) -> anyhow::Result<()> {
    let mut users = Vec::with_capacity(DEMO_USERS.len());
    for demo in DEMO_USERS {
        users.push(ensure_user(store, detector, demo)?);
    }

    if let (Some(test), Some(bob)) = (
        users.iter().find(|u| u.username == "test"),
        users.iter().find(|u| u.username == "bob"),
    ) {
        follow(store, test, bob)?;
    }
    Ok(())
}
