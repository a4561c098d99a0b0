use super::models::{ComponentHealth, HealthReport};
use crate::cache::{CachePool, CacheRegistry};
use crate::database::{Backend, Context, DbGroup};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const SLOW_RESPONSE_THRESHOLD_MS: u64 = 1000;

pub struct HealthChecker<B: Backend> {
    db: DbGroup<B>,
    caches: Arc<CacheRegistry>,
    start_time: Instant,
}

impl<B: Backend> HealthChecker<B> {
    pub fn new(db: DbGroup<B>, caches: Arc<CacheRegistry>) -> Self {
        Self {
            db,
            caches,
            start_time: Instant::now(),
        }
    }

    pub async fn check_all(&self) -> HealthReport {
        let version = env!("CARGO_PKG_VERSION").to_string();
        let uptime = self.start_time.elapsed().as_secs();
        let mut report = HealthReport::new(version, uptime);

        let db_check = timeout(CHECK_TIMEOUT, self.check_database());
        let cache_checks = futures::future::join_all(
            self.caches
                .pools()
                .map(|pool| timeout(CHECK_TIMEOUT, check_cache(pool.clone()))),
        );
        let (db_result, cache_results) = tokio::join!(db_check, cache_checks);

        report.add_component(
            "database".to_string(),
            db_result.unwrap_or_else(|_| ComponentHealth::unhealthy("Timeout".to_string())),
        );
        for (pool, result) in self.caches.pools().zip(cache_results) {
            let health = result.unwrap_or_else(|_| {
                ComponentHealth::degraded("Timeout".to_string(), None)
            });
            report.add_component(format!("cache:{}", pool.name()), health);
        }

        report
    }

    #[tracing::instrument(name = "Check database health", skip(self))]
    async fn check_database(&self) -> ComponentHealth {
        let start = Instant::now();
        let ctx = Context::with_timeout(CHECK_TIMEOUT);

        match self.db.ping(&ctx).await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                let health = if elapsed > SLOW_RESPONSE_THRESHOLD_MS {
                    ComponentHealth::degraded("Database responding slowly".to_string(), Some(elapsed))
                } else {
                    ComponentHealth::healthy(elapsed)
                };
                health
                    .detail("write", self.db.write_addr())
                    .detail("replicas", self.db.replica_count())
            }
            Err(e) => {
                tracing::error!("Database health check failed: {}", e);
                ComponentHealth::unhealthy(format!("Database error: {}", e))
                    .detail("write", self.db.write_addr())
            }
        }
    }
}

/// The service keeps answering without its cache, so cache trouble only
/// degrades the report.
#[tracing::instrument(name = "Check cache health", skip(pool), fields(pool = %pool.name()))]
async fn check_cache(pool: Arc<CachePool>) -> ComponentHealth {
    let status = pool.status();
    if status.connected == 0 {
        return ComponentHealth::degraded("No cache connection is up".to_string(), None)
            .detail("capacity", status.capacity);
    }

    let start = Instant::now();
    let health = match pool.exec::<String>(&redis::cmd("PING")).await {
        Ok(_) => {
            let elapsed = start.elapsed().as_millis() as u64;
            if elapsed > SLOW_RESPONSE_THRESHOLD_MS {
                ComponentHealth::degraded("Cache responding slowly".to_string(), Some(elapsed))
            } else if status.connected < status.capacity {
                ComponentHealth::degraded(
                    format!("{} of {} cache connections up", status.connected, status.capacity),
                    Some(elapsed),
                )
            } else {
                ComponentHealth::healthy(elapsed)
            }
        }
        Err(e) => {
            tracing::warn!("Cache PING failed: {}", e);
            ComponentHealth::degraded(format!("Cache unavailable: {}", e), None)
        }
    };

    health
        .detail("addr", pool.addr())
        .detail("capacity", status.capacity)
        .detail("connected", status.connected)
        .detail("idle", status.idle)
        .detail("checked_out", status.checked_out)
        .detail("skipped", status.skipped)
}
