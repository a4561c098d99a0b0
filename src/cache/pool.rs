use super::connection::{keepalive, CacheConn, Link, LinkState, Slot};
use super::error::CacheError;
use super::transport::{Dialer, Target, Transport};
use crate::configuration::RedisSettings;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Fixed-capacity pool of long-lived cache-store connections.
///
/// Every connection is dialed up front and lives as long as the pool. Each
/// one has a keepalive task that probes it on a fixed interval and redials
/// it in place when the probe fails; that task is the only thing that ever
/// brings a broken connection back.
pub struct CachePool {
    name: String,
    capacity: usize,
    target: Arc<Target>,
    acquire_timeout: Duration,
    max_acquire_retries: u32,
    returns: mpsc::Sender<Arc<Slot>>,
    available: Mutex<mpsc::Receiver<Arc<Slot>>>,
    slots: Vec<Arc<Slot>>,
    checked_out: Arc<AtomicUsize>,
    skipped: AtomicUsize,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub name: String,
    pub capacity: usize,
    pub checked_out: usize,
    /// Handles sitting in the queue right now.
    pub idle: usize,
    pub connected: usize,
    /// Disconnected handles passed over by `acquire` since the pool opened.
    pub skipped: usize,
}

impl CachePool {
    /// Dials `pool_size` connections one after another. If any dial fails the
    /// ones already open are closed and no pool is returned.
    #[tracing::instrument(name = "Open cache pool", skip(settings, dialer), fields(pool = %settings.name, addr = %settings.addr))]
    pub async fn connect(
        settings: &RedisSettings,
        dialer: Arc<dyn Dialer>,
    ) -> Result<Self, CacheError> {
        let target = Arc::new(Target::from(settings));
        let capacity = settings.pool_size.max(1);

        let mut opened: Vec<Box<dyn Transport>> = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            match dialer.dial(&target).await {
                Ok(transport) => opened.push(transport),
                Err(source) => {
                    error!(error = %source, opened = opened.len(), "Connect cache store failed");
                    for transport in opened {
                        transport.close().await;
                    }
                    return Err(CacheError::ConnectionSetupFailed {
                        addr: target.addr.clone(),
                        source,
                    });
                }
            }
        }

        let (returns, available) = mpsc::channel(capacity);
        let (shutdown, _) = watch::channel(false);

        let slots: Vec<Arc<Slot>> = opened
            .into_iter()
            .enumerate()
            .map(|(id, transport)| Arc::new(Slot::new(id, Link::connected(transport))))
            .collect();

        let tasks = slots
            .iter()
            .map(|slot| {
                tokio::spawn(keepalive(
                    slot.clone(),
                    target.clone(),
                    dialer.clone(),
                    settings.keepalive_interval(),
                    shutdown.subscribe(),
                ))
            })
            .collect();

        for slot in &slots {
            // The channel was sized for exactly these slots.
            let _ = returns.try_send(slot.clone());
        }

        info!(capacity, "Cache pool ready");

        Ok(Self {
            name: settings.name.clone(),
            capacity,
            target,
            acquire_timeout: settings.acquire_timeout(),
            max_acquire_retries: settings.max_acquire_retries,
            returns,
            available: Mutex::new(available),
            slots,
            checked_out: Arc::new(AtomicUsize::new(0)),
            skipped: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            shutdown,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn addr(&self) -> &str {
        &self.target.addr
    }

    /// Takes a connected handle from the queue.
    ///
    /// Disconnected handles are put back for their keepalive task to repair
    /// and another is tried, up to `max_acquire_retries` times. `None` means
    /// the acquire window elapsed or the retries ran out; the two are not
    /// distinguished.
    pub async fn acquire(&self) -> Option<CacheConn> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }

        match tokio::time::timeout(self.acquire_timeout, self.checkout()).await {
            Ok(conn) => conn,
            Err(_) => {
                warn!(pool = %self.name, "Timed out waiting for a cache connection");
                None
            }
        }
    }

    async fn checkout(&self) -> Option<CacheConn> {
        let mut failed = 0;
        loop {
            let slot = self.available.lock().await.recv().await?;
            let mut conn =
                CacheConn::detached(slot, self.returns.clone(), self.checked_out.clone());
            conn.lock().await;
            if conn.is_connected() {
                return Some(conn);
            }

            let conn_id = conn.id();
            drop(conn);
            self.skipped.fetch_add(1, Ordering::AcqRel);
            if failed >= self.max_acquire_retries {
                error!(pool = %self.name, conn_id, "Max cache acquire retries reached");
                return None;
            }
            failed += 1;
            warn!(pool = %self.name, conn_id, "Cache connection is down, trying another one");
        }
    }

    /// Hands a connection back. Same as dropping it.
    pub fn release(&self, conn: CacheConn) {
        drop(conn);
    }

    pub fn status(&self) -> PoolStatus {
        let checked_out = self.checked_out.load(Ordering::Acquire).min(self.capacity);
        PoolStatus {
            name: self.name.clone(),
            capacity: self.capacity,
            checked_out,
            idle: self.returns.max_capacity() - self.returns.capacity(),
            connected: self.slots.iter().filter(|slot| slot.is_up()).count(),
            skipped: self.skipped.load(Ordering::Acquire),
        }
    }

    /// Stops every keepalive task and closes the connections sitting in the
    /// queue. Later acquires return `None`.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.shutdown.send(true);
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        futures::future::join_all(tasks).await;

        let mut available = self.available.lock().await;
        while let Ok(slot) = available.try_recv() {
            let mut link = slot.lock().await;
            link.disconnect().await;
            slot.publish(LinkState::Disconnected);
            debug!(pool = %self.name, conn_id = slot.id, "Cache connection closed");
        }

        info!(pool = %self.name, "Cache pool closed");
    }
}
