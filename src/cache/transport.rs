//! The seam between the pool and the cache store's wire protocol.
//!
//! The pool only ever dials, sends a command, and drops a connection, so
//! those are the only operations a transport has to provide.

use crate::configuration::RedisSettings;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Cmd, ErrorKind, RedisError, RedisResult, Value};
use std::time::Duration;

/// Where and how to dial. Fixed at pool creation.
#[derive(Debug, Clone)]
pub struct Target {
    pub addr: String,
    pub password: Option<String>,
    pub db: i64,
    pub dial_timeout: Duration,
    pub io_timeout: Duration,
}

impl Target {
    pub fn connection_string(&self) -> String {
        match self.password.as_deref() {
            Some(password) if !password.is_empty() => format!(
                "redis://:{}@{}/{}",
                urlencoding::encode(password),
                self.addr,
                self.db
            ),
            _ => format!("redis://{}/{}", self.addr, self.db),
        }
    }
}

impl From<&RedisSettings> for Target {
    fn from(settings: &RedisSettings) -> Self {
        Self {
            addr: settings.addr.clone(),
            password: settings.password.clone(),
            db: settings.db,
            dial_timeout: settings.dial_timeout(),
            io_timeout: settings.io_timeout(),
        }
    }
}

#[async_trait]
pub trait Transport: Send {
    async fn request(&mut self, cmd: &Cmd) -> RedisResult<Value>;

    async fn close(self: Box<Self>) {}
}

#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, target: &Target) -> RedisResult<Box<dyn Transport>>;
}

/// Dials real cache-store connections. Password and database index are
/// applied during the handshake (AUTH / SELECT).
#[derive(Debug, Default, Clone, Copy)]
pub struct RedisDialer;

#[async_trait]
impl Dialer for RedisDialer {
    async fn dial(&self, target: &Target) -> RedisResult<Box<dyn Transport>> {
        let client = redis::Client::open(target.connection_string())?;
        let conn = tokio::time::timeout(target.dial_timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| timed_out("dial timed out"))??;

        Ok(Box::new(RedisTransport {
            conn,
            io_timeout: target.io_timeout,
        }))
    }
}

pub struct RedisTransport {
    conn: MultiplexedConnection,
    io_timeout: Duration,
}

#[async_trait]
impl Transport for RedisTransport {
    async fn request(&mut self, cmd: &Cmd) -> RedisResult<Value> {
        tokio::time::timeout(self.io_timeout, cmd.query_async(&mut self.conn))
            .await
            .map_err(|_| timed_out("request timed out"))?
    }
}

fn timed_out(what: &'static str) -> RedisError {
    RedisError::from(std::io::Error::new(std::io::ErrorKind::TimedOut, what))
}

pub(crate) fn unexpected_reply(what: &'static str) -> RedisError {
    RedisError::from((ErrorKind::ResponseError, what))
}
