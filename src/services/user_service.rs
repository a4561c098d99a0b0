//! User lookups with a read-through cache in front of the database.

use crate::cache::CachePool;
use crate::database::{Context, DbError};
use crate::db::UserStore;
use crate::models::User;
use std::sync::Arc;

pub struct UserService {
    store: Arc<dyn UserStore>,
    cache: Option<Arc<CachePool>>,
    cache_ttl_secs: u64,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, cache: Option<Arc<CachePool>>, cache_ttl_secs: u64) -> Self {
        Self {
            store,
            cache,
            cache_ttl_secs,
        }
    }

    pub fn cache_key(uid: i64) -> String {
        format!("user:{}", uid)
    }

    /// Cache first, then the database. A database hit is written back to
    /// the cache. Cache trouble is logged and never fails the lookup.
    #[tracing::instrument(name = "Get user info", skip(self, ctx))]
    pub async fn user_info(&self, ctx: &Context, uid: i64) -> Result<Option<User>, DbError> {
        let key = Self::cache_key(uid);

        if let Some(cache) = &self.cache {
            if let Some(raw) = cache.get(&key).await {
                match serde_json::from_str::<User>(&raw) {
                    Ok(user) => return Ok(Some(user)),
                    Err(err) => tracing::warn!("Cached user {} is unreadable: {}", key, err),
                }
            }
        }

        let user = self.store.fetch(ctx, uid).await?;

        if let (Some(cache), Some(user)) = (&self.cache, &user) {
            match serde_json::to_string(user) {
                Ok(raw) => {
                    if !cache.set_ex(&key, raw, self.cache_ttl_secs).await {
                        tracing::debug!("User {} was not cached", key);
                    }
                }
                Err(err) => tracing::warn!("Failed to serialize user {}: {}", key, err),
            }
        }

        Ok(user)
    }
}
