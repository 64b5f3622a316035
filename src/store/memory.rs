//! In-process storage behind a single mutex, with optional JSON snapshots so
//! the tables survive a restart.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Notify;
use uuid::Uuid;

use super::{FeedStore, StoreError};
use crate::models::{FeedFollow, NewPost, Post, Source, User};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Tables {
    users: Vec<User>,
    sources: Vec<Source>,
    follows: Vec<FeedFollow>,
    posts: Vec<Post>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
    // bumped after every successful write
    revision: AtomicU64,
    changed: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load tables from a snapshot written by [`MemoryStore::save_snapshot`].
    /// A missing file yields an empty store.
    pub async fn load_snapshot(path: &Path) -> Result<Self> {
        let data = match fs::read_to_string(path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no snapshot found, starting empty");
                return Ok(Self::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading snapshot {}", path.display()))
            }
        };
        let tables: Tables = serde_json::from_str(&data)
            .with_context(|| format!("parsing snapshot {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            sources = tables.sources.len(),
            posts = tables.posts.len(),
            "snapshot loaded"
        );
        Ok(Self {
            inner: Mutex::new(tables),
            ..Self::default()
        })
    }

    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let body = {
            let tables = self.tables().map_err(anyhow::Error::from)?;
            serde_json::to_vec_pretty(&*tables).context("serializing snapshot")?
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        // write-then-rename so a kill mid-write leaves the previous snapshot intact
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing snapshot {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("replacing snapshot {}", path.display()))
    }

    /// Count of successful writes since this store was built.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Resolves once a write lands after the previous call returned. Writes
    /// made while nobody waits are remembered, so none is missed.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    fn touch(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
        self.changed.notify_one();
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_string()))
    }

    pub fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            name: name.to_string(),
            api_key: generate_api_key(),
        };
        self.tables()?.users.push(user.clone());
        self.touch();
        Ok(user)
    }

    pub fn user_by_api_key(&self, api_key: &str) -> Result<User, StoreError> {
        self.tables()?
            .users
            .iter()
            .find(|u| u.api_key == api_key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "user",
                key: "api key".to_string(),
            })
    }

    pub fn create_source(&self, name: &str, url: &str, user_id: Uuid) -> Result<Source, StoreError> {
        let mut tables = self.tables()?;
        if tables.sources.iter().any(|s| s.url == url) {
            return Err(StoreError::Duplicate {
                entity: "source",
                key: url.to_string(),
            });
        }
        let now = Utc::now();
        let source = Source {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            name: name.to_string(),
            url: url.to_string(),
            user_id,
            last_fetched_at: None,
        };
        tables.sources.push(source.clone());
        self.touch();
        Ok(source)
    }

    pub fn list_sources(&self) -> Result<Vec<Source>, StoreError> {
        Ok(self.tables()?.sources.clone())
    }

    pub fn source(&self, source_id: Uuid) -> Result<Source, StoreError> {
        self.tables()?
            .sources
            .iter()
            .find(|s| s.id == source_id)
            .cloned()
            .ok_or_else(|| source_not_found(source_id))
    }

    pub fn follow(&self, user_id: Uuid, source_id: Uuid) -> Result<FeedFollow, StoreError> {
        let mut tables = self.tables()?;
        if !tables.sources.iter().any(|s| s.id == source_id) {
            return Err(source_not_found(source_id));
        }
        if tables
            .follows
            .iter()
            .any(|f| f.user_id == user_id && f.source_id == source_id)
        {
            return Err(StoreError::Duplicate {
                entity: "feed follow",
                key: source_id.to_string(),
            });
        }
        let now = Utc::now();
        let follow = FeedFollow {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            user_id,
            source_id,
        };
        tables.follows.push(follow.clone());
        self.touch();
        Ok(follow)
    }

    /// Remove a follow owned by `user_id`; another user's follow id is reported
    /// as not found.
    pub fn unfollow(&self, follow_id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let before = tables.follows.len();
        tables
            .follows
            .retain(|f| !(f.id == follow_id && f.user_id == user_id));
        if tables.follows.len() == before {
            return Err(StoreError::NotFound {
                entity: "feed follow",
                key: follow_id.to_string(),
            });
        }
        self.touch();
        Ok(())
    }

    pub fn follows_for_user(&self, user_id: Uuid) -> Result<Vec<FeedFollow>, StoreError> {
        Ok(self
            .tables()?
            .follows
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect())
    }

    /// Newest posts across every source `user_id` follows. Posts without a
    /// publish date sort after dated ones.
    pub fn posts_for_user(&self, user_id: Uuid, limit: usize) -> Result<Vec<Post>, StoreError> {
        let tables = self.tables()?;
        let followed: HashSet<Uuid> = tables
            .follows
            .iter()
            .filter(|f| f.user_id == user_id)
            .map(|f| f.source_id)
            .collect();
        let mut posts: Vec<Post> = tables
            .posts
            .iter()
            .filter(|p| followed.contains(&p.source_id))
            .cloned()
            .collect();
        posts.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        posts.truncate(limit);
        Ok(posts)
    }

    pub fn posts_for_source(&self, source_id: Uuid) -> Result<Vec<Post>, StoreError> {
        Ok(self
            .tables()?
            .posts
            .iter()
            .filter(|p| p.source_id == source_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn select_stale_sources(&self, limit: usize) -> Result<Vec<Source>, StoreError> {
        let mut sources = self.tables()?.sources.clone();
        // `None` orders before any `Some`, so never-fetched sources lead.
        sources.sort_by_key(|s| (s.last_fetched_at, s.created_at));
        sources.truncate(limit);
        Ok(sources)
    }

    async fn mark_fetched(
        &self,
        source_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Source, StoreError> {
        let mut tables = self.tables()?;
        let source = tables
            .sources
            .iter_mut()
            .find(|s| s.id == source_id)
            .ok_or_else(|| source_not_found(source_id))?;
        source.last_fetched_at = Some(at);
        source.updated_at = at;
        let source = source.clone();
        self.touch();
        Ok(source)
    }

    async fn insert_post(&self, post: NewPost) -> Result<Post, StoreError> {
        let mut tables = self.tables()?;
        if !tables.sources.iter().any(|s| s.id == post.source_id) {
            return Err(source_not_found(post.source_id));
        }
        if tables
            .posts
            .iter()
            .any(|p| p.source_id == post.source_id && p.url == post.url)
        {
            return Err(StoreError::Duplicate {
                entity: "post",
                key: post.url,
            });
        }
        let now = Utc::now();
        let stored = Post {
            id: post.id,
            created_at: now,
            updated_at: now,
            title: post.title,
            url: post.url,
            description: post.description,
            published_at: post.published_at,
            source_id: post.source_id,
        };
        tables.posts.push(stored.clone());
        self.touch();
        Ok(stored)
    }
}

fn source_not_found(source_id: Uuid) -> StoreError {
    StoreError::NotFound {
        entity: "source",
        key: source_id.to_string(),
    }
}

/// 64 hex chars derived from a random UUID and the current time.
fn generate_api_key() -> String {
    use std::fmt::Write as _;

    let mut hasher = Sha256::new();
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(
        Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_le_bytes(),
    );
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_post(source_id: Uuid, url: &str) -> NewPost {
        NewPost {
            id: Uuid::new_v4(),
            title: "t".into(),
            url: url.into(),
            description: None,
            published_at: None,
            source_id,
        }
    }

    #[test]
    fn api_keys_are_unique_hex() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn duplicate_link_is_rejected_per_source_only() {
        let store = MemoryStore::new();
        let user = store.create_user("u").unwrap();
        let a = store.create_source("a", "https://a.test/rss", user.id).unwrap();
        let b = store.create_source("b", "https://b.test/rss", user.id).unwrap();

        store.insert_post(new_post(a.id, "https://x/1")).await.unwrap();
        let err = store
            .insert_post(new_post(a.id, "https://x/1"))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());

        // same link under another source is a different row
        store.insert_post(new_post(b.id, "https://x/1")).await.unwrap();
    }

    #[tokio::test]
    async fn stale_selection_puts_never_fetched_first() {
        let store = MemoryStore::new();
        let user = store.create_user("u").unwrap();
        let old = store.create_source("old", "https://old.test", user.id).unwrap();
        let recent = store.create_source("recent", "https://recent.test", user.id).unwrap();
        let never = store.create_source("never", "https://never.test", user.id).unwrap();

        let now = Utc::now();
        store
            .mark_fetched(old.id, now - Duration::hours(2))
            .await
            .unwrap();
        store.mark_fetched(recent.id, now).await.unwrap();

        let picked = store.select_stale_sources(10).await.unwrap();
        let ids: Vec<Uuid> = picked.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![never.id, old.id, recent.id]);

        let one = store.select_stale_sources(1).await.unwrap();
        assert_eq!(one[0].id, never.id);
    }

    #[tokio::test]
    async fn only_successful_writes_bump_the_revision() {
        let store = MemoryStore::new();
        assert_eq!(store.revision(), 0);

        let user = store.create_user("u").unwrap();
        let source = store.create_source("a", "https://a.test/rss", user.id).unwrap();
        assert_eq!(store.revision(), 2);

        assert!(store.create_source("a", "https://a.test/rss", user.id).is_err());
        assert!(store.unfollow(Uuid::new_v4(), user.id).is_err());
        assert_eq!(store.revision(), 2);

        store.insert_post(new_post(source.id, "https://x/1")).await.unwrap();
        assert!(store.insert_post(new_post(source.id, "https://x/1")).await.is_err());
        assert_eq!(store.revision(), 3);

        // a write made before anyone waited is still observed
        tokio::time::timeout(std::time::Duration::from_secs(1), store.changed())
            .await
            .expect("pending change");
    }

    #[tokio::test]
    async fn snapshot_round_trip_keeps_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("store.json");

        let store = MemoryStore::new();
        let user = store.create_user("u").unwrap();
        let src = store.create_source("s", "https://s.test", user.id).unwrap();
        store.insert_post(new_post(src.id, "https://s/1")).await.unwrap();
        store.save_snapshot(&path).await.unwrap();

        let loaded = MemoryStore::load_snapshot(&path).await.unwrap();
        assert_eq!(loaded.user_by_api_key(&user.api_key).unwrap().id, user.id);
        assert_eq!(loaded.posts_for_source(src.id).unwrap().len(), 1);

        let missing = MemoryStore::load_snapshot(&dir.path().join("nope.json"))
            .await
            .unwrap();
        assert!(missing.list_sources().unwrap().is_empty());
    }
}
