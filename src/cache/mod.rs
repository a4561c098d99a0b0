//! Cache-store connection pooling.

mod commands;
mod connection;
mod error;
mod pool;
mod registry;
mod transport;

pub use commands::BitOp;
pub use connection::{CacheConn, LinkState};
pub use error::{CacheError, CacheErrorKind};
pub use pool::{CachePool, PoolStatus};
pub use registry::CacheRegistry;
pub use transport::{Dialer, RedisDialer, RedisTransport, Target, Transport};
