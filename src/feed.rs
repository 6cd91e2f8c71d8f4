use std::collections::BTreeSet;

use crate::config::*;
use crate::core::store::{KvJson, KvStore};
use crate::follow::following_ids;
use crate::models::models::Post;

/// Newest first; equal timestamps fall back to id so pages never overlap.
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
}

fn authored_ids(store: &dyn KvStore, user_id: &str) -> anyhow::Result<Vec<String>> {
    let prefix = format!("{}{}:", AUTHORED_PREFIX, user_id);
    Ok(store
        .keys_with_prefix(&prefix)?
        .into_iter()
        .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
        .collect())
}

fn load_posts(store: &dyn KvStore, ids: impl IntoIterator<Item = String>) -> anyhow::Result<Vec<Post>> {
    let mut posts = Vec::new();
    for id in ids {
        if let Some(p) = store.get_json::<Post>(&post_key(&id))? {
            posts.push(p);
        }
    }
    Ok(posts)
}

pub fn post_count(store: &dyn KvStore, user_id: &str) -> anyhow::Result<usize> {
    Ok(authored_ids(store, user_id)?.len())
}

/// Posts written by one author.
pub fn user_feed(store: &dyn KvStore, author_id: &str) -> anyhow::Result<Vec<Post>> {
    let mut posts = load_posts(store, authored_ids(store, author_id)?)?;
    sort_newest_first(&mut posts);
    Ok(posts)
}

/// Posts by `user_id` and by everyone they follow.
pub fn home_feed(store: &dyn KvStore, user_id: &str) -> anyhow::Result<Vec<Post>> {
    let mut authors: BTreeSet<String> = following_ids(store, user_id)?.into_iter().collect();
    authors.insert(user_id.to_string());

    let mut posts = Vec::new();
    for author in &authors {
        posts.extend(load_posts(store, authored_ids(store, author)?)?);
    }
    sort_newest_first(&mut posts);
    Ok(posts)
}

/// Every post on the site.
pub fn explore_feed(store: &dyn KvStore) -> anyhow::Result<Vec<Post>> {
    let mut posts = Vec::new();
    for key in store.keys_with_prefix(POST_PREFIX)? {
        if let Some(p) = store.get_json::<Post>(&key)? {
            posts.push(p);
        }
    }
    sort_newest_first(&mut posts);
    Ok(posts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pagination::{paginate, PageRequest};
    use crate::core::store::MemoryStore;
    use crate::follow::{follow, is_following, unfollow};
    use crate::posts::insert_post;
    use crate::testing::{post_at, seed_user};

    #[test]
    fn home_feed_is_self_plus_followees() {
        let store = MemoryStore::new();
        let ann = seed_user(&store, "ann");
        let bob = seed_user(&store, "bob");
        let cat = seed_user(&store, "cat");
        follow(&store, &ann, &bob).unwrap();

        for (i, author) in [&ann, &bob, &cat, &bob, &ann, &cat].iter().enumerate() {
            insert_post(&store, &post_at(author, &format!("post {}", i), i as i64)).unwrap();
        }

        let feed = home_feed(&store, &ann.id).unwrap();
        assert_eq!(feed.len(), 4);
        for post in &feed {
            assert!(post.user_id == ann.id || is_following(&store, &ann.id, &post.user_id).unwrap());
        }
        let bodies: Vec<_> = feed.iter().map(|p| p.body.as_str()).collect();
        assert_eq!(bodies, vec!["post 4", "post 3", "post 1", "post 0"]);

        unfollow(&store, &ann, &bob).unwrap();
        assert_eq!(home_feed(&store, &ann.id).unwrap().len(), 2);
        assert_eq!(home_feed(&store, &cat.id).unwrap().len(), 2);
    }

    #[test]
    fn explore_orders_by_time_then_id() {
        let store = MemoryStore::new();
        let ann = seed_user(&store, "ann");
        let mut tied_a = post_at(&ann, "a", 5);
        tied_a.id = "00000000-0000-4000-8000-00000000000a".to_string();
        let mut tied_b = post_at(&ann, "b", 5);
        tied_b.id = "00000000-0000-4000-8000-00000000000b".to_string();
        insert_post(&store, &tied_a).unwrap();
        insert_post(&store, &tied_b).unwrap();
        insert_post(&store, &post_at(&ann, "old", 1)).unwrap();
        insert_post(&store, &post_at(&ann, "new", 9)).unwrap();

        let bodies: Vec<_> = explore_feed(&store).unwrap().into_iter().map(|p| p.body).collect();
        assert_eq!(bodies, vec!["new", "b", "a", "old"]);
        assert_eq!(user_feed(&store, &ann.id).unwrap().len(), 4);
        assert_eq!(post_count(&store, &ann.id).unwrap(), 4);
    }

    #[test]
    fn pages_partition_the_feed() {
        let store = MemoryStore::new();
        let ann = seed_user(&store, "ann");
        for i in 0..25 {
            // Pairs of posts share a timestamp.
            insert_post(&store, &post_at(&ann, &format!("p{}", i), i / 2)).unwrap();
        }
        let feed = explore_feed(&store).unwrap();
        let mut seen = Vec::new();
        for page in 1..=3 {
            let slice = paginate(feed.clone(), PageRequest::new(page, 10).unwrap());
            seen.extend(slice.items.into_iter().map(|p| p.id));
        }
        let mut expected: Vec<_> = feed.iter().map(|p| p.id.clone()).collect();
        assert_eq!(seen, expected);
        expected.dedup();
        assert_eq!(expected.len(), 25);
    }
}
