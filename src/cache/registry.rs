use super::error::CacheError;
use super::pool::{CachePool, PoolStatus};
use super::transport::Dialer;
use crate::configuration::RedisSettings;
use std::sync::Arc;

/// Named cache pools, built once at start-up and shared by reference.
///
/// Pools keep the order they were configured in; the first one is the
/// service's default store.
#[derive(Default)]
pub struct CacheRegistry {
    pools: Vec<Arc<CachePool>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens every configured pool. If one fails, the pools opened before it
    /// are closed again and the error is returned.
    pub async fn connect_all(
        settings: &[RedisSettings],
        dialer: Arc<dyn Dialer>,
    ) -> Result<Self, CacheError> {
        let mut registry = Self::new();
        for pool_settings in settings {
            match CachePool::connect(pool_settings, dialer.clone()).await {
                Ok(pool) => {
                    registry.insert(pool);
                }
                Err(err) => {
                    registry.close().await;
                    return Err(err);
                }
            }
        }
        Ok(registry)
    }

    /// Adds a pool, replacing any pool registered under the same name.
    /// The replaced pool is returned so the caller can close it.
    pub fn insert(&mut self, pool: CachePool) -> Option<Arc<CachePool>> {
        let pool = Arc::new(pool);
        match self.pools.iter_mut().find(|p| p.name() == pool.name()) {
            Some(existing) => Some(std::mem::replace(existing, pool)),
            None => {
                self.pools.push(pool);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<CachePool>> {
        self.pools.iter().find(|p| p.name() == name).cloned()
    }

    pub fn primary(&self) -> Option<Arc<CachePool>> {
        self.pools.first().cloned()
    }

    pub fn pools(&self) -> impl Iterator<Item = &Arc<CachePool>> {
        self.pools.iter()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn status(&self) -> Vec<PoolStatus> {
        self.pools.iter().map(|p| p.status()).collect()
    }

    pub async fn close(&self) {
        futures::future::join_all(self.pools.iter().map(|p| p.close())).await;
    }
}
