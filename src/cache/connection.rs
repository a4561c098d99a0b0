//! One pooled cache connection and its maintenance loop.
//!
//! The link state moves `Disconnected -> Connecting -> Connected` on a
//! successful dial and back to `Disconnected` when a probe or dial fails.
//! Every transition happens while the link's lock is held; a checked-out
//! handle owns that lock for as long as it is out of the queue, so the
//! keepalive task never probes a connection someone is using.

use super::error::CacheError;
use super::transport::{unexpected_reply, Dialer, Target, Transport};
use redis::{Cmd, FromRedisValue};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

pub(crate) struct Link {
    transport: Option<Box<dyn Transport>>,
    state: LinkState,
}

impl Link {
    pub(crate) fn connected(transport: Box<dyn Transport>) -> Self {
        Self {
            transport: Some(transport),
            state: LinkState::Connected,
        }
    }

    pub(crate) fn state(&self) -> LinkState {
        self.state
    }

    async fn probe(&mut self) -> Result<(), CacheError> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| CacheError::ConnectionLost(unexpected_reply("no transport")))?;
        let reply = transport.request(&redis::cmd("PING")).await?;
        match String::from_redis_value(&reply) {
            Ok(pong) if pong == "PONG" => Ok(()),
            _ => Err(CacheError::StoreRejected(unexpected_reply(
                "unexpected PING reply",
            ))),
        }
    }

    pub(crate) async fn disconnect(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }
        self.state = LinkState::Disconnected;
    }

    async fn reconnect(&mut self, dialer: &dyn Dialer, target: &Target, id: usize) {
        self.state = LinkState::Connecting;
        match dialer.dial(target).await {
            Ok(transport) => {
                self.transport = Some(transport);
                self.state = LinkState::Connected;
                info!(conn_id = id, addr = %target.addr, "Cache reconnect succeeded");
            }
            Err(err) => {
                self.state = LinkState::Disconnected;
                error!(conn_id = id, addr = %target.addr, error = %err, "Cache reconnect failed");
            }
        }
    }

    /// One maintenance cycle: probe a live link, redial a dead one.
    /// A failed probe tears the link down and redials in the same cycle.
    pub(crate) async fn maintain(&mut self, dialer: &dyn Dialer, target: &Target, id: usize) -> LinkState {
        if self.state == LinkState::Connected {
            match self.probe().await {
                Ok(()) => return LinkState::Connected,
                Err(err) => {
                    warn!(conn_id = id, addr = %target.addr, error = %err, "Cache liveness probe failed");
                    self.disconnect().await;
                }
            }
        }
        self.reconnect(dialer, target, id).await;
        self.state
    }

    pub(crate) async fn request<T: FromRedisValue>(&mut self, cmd: &Cmd) -> Result<T, CacheError> {
        let transport = match (self.state, self.transport.as_mut()) {
            (LinkState::Connected, Some(transport)) => transport,
            _ => {
                return Err(CacheError::ConnectionLost(unexpected_reply(
                    "connection is not established",
                )))
            }
        };
        let reply = transport.request(cmd).await?;
        Ok(T::from_redis_value(&reply)?)
    }
}

/// Queue entry. The pool keeps one per connection for its whole lifetime.
pub(crate) struct Slot {
    pub(crate) id: usize,
    link: Arc<Mutex<Link>>,
    // Mirror of `link.state == Connected`, written only while the link lock is held.
    up: AtomicBool,
}

impl Slot {
    pub(crate) fn new(id: usize, link: Link) -> Self {
        let up = link.state() == LinkState::Connected;
        Self {
            id,
            link: Arc::new(Mutex::new(link)),
            up: AtomicBool::new(up),
        }
    }

    pub(crate) fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, Link> {
        self.link.lock().await
    }

    pub(crate) fn publish(&self, state: LinkState) {
        self.up.store(state == LinkState::Connected, Ordering::Release);
    }
}

/// Periodic health maintenance for one connection, until the pool shuts down.
pub(crate) async fn keepalive(
    slot: Arc<Slot>,
    target: Arc<Target>,
    dialer: Arc<dyn Dialer>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; the connection was just dialed.
    ticker.tick().await;

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let mut link = tokio::select! {
            _ = shutdown.changed() => break,
            link = slot.link.lock() => link,
        };
        let state = link.maintain(dialer.as_ref(), &target, slot.id).await;
        slot.publish(state);
    }

    debug!(conn_id = slot.id, "Cache keepalive stopped");
}

/// A connection checked out of the pool.
///
/// Holds the connection's lock while out. Dropping it (or passing it to
/// `CachePool::release`) unlocks the link and puts it back at the tail of
/// the queue.
pub struct CacheConn {
    slot: Option<Arc<Slot>>,
    guard: Option<OwnedMutexGuard<Link>>,
    returns: mpsc::Sender<Arc<Slot>>,
    checked_out: Arc<AtomicUsize>,
}

impl CacheConn {
    pub(crate) fn detached(
        slot: Arc<Slot>,
        returns: mpsc::Sender<Arc<Slot>>,
        checked_out: Arc<AtomicUsize>,
    ) -> Self {
        checked_out.fetch_add(1, Ordering::AcqRel);
        Self {
            slot: Some(slot),
            guard: None,
            returns,
            checked_out,
        }
    }

    pub(crate) async fn lock(&mut self) {
        if self.guard.is_none() {
            if let Some(slot) = &self.slot {
                self.guard = Some(slot.link.clone().lock_owned().await);
            }
        }
    }

    pub fn id(&self) -> usize {
        self.slot.as_ref().map(|slot| slot.id).unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.guard
            .as_ref()
            .map(|link| link.state() == LinkState::Connected)
            .unwrap_or(false)
    }

    /// Sends one command and decodes the reply.
    pub async fn query<T: FromRedisValue>(&mut self, cmd: &Cmd) -> Result<T, CacheError> {
        match self.guard.as_mut() {
            Some(link) => link.request(cmd).await,
            None => Err(CacheError::ConnectionLost(unexpected_reply(
                "connection is not checked out",
            ))),
        }
    }
}

impl Drop for CacheConn {
    fn drop(&mut self) {
        drop(self.guard.take());
        if let Some(slot) = self.slot.take() {
            // Capacity equals the number of slots, so the queue always has room.
            if self.returns.try_send(slot).is_err() {
                debug!("Cache pool closed, connection not requeued");
            }
        }
        self.checked_out.fetch_sub(1, Ordering::AcqRel);
    }
}
