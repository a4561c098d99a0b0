use redis::RedisError;

/// Coarse classification of a cache failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheErrorKind {
    Timeout,
    PoolExhausted,
    ConnectionLost,
    StoreRejected,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to open cache connection to {addr}")]
    ConnectionSetupFailed {
        addr: String,
        #[source]
        source: RedisError,
    },
    /// Either the queue stayed empty for the whole acquire window or every
    /// handle popped was disconnected; callers cannot tell which.
    #[error("no cache connection available")]
    PoolExhausted,
    #[error("cache request timed out")]
    Timeout(#[source] RedisError),
    #[error("cache connection lost")]
    ConnectionLost(#[source] RedisError),
    #[error("cache store rejected the command")]
    StoreRejected(#[source] RedisError),
}

impl CacheError {
    pub fn kind(&self) -> CacheErrorKind {
        match self {
            Self::ConnectionSetupFailed { .. } | Self::ConnectionLost(_) => {
                CacheErrorKind::ConnectionLost
            }
            Self::PoolExhausted => CacheErrorKind::PoolExhausted,
            Self::Timeout(_) => CacheErrorKind::Timeout,
            Self::StoreRejected(_) => CacheErrorKind::StoreRejected,
        }
    }
}

impl From<RedisError> for CacheError {
    fn from(err: RedisError) -> Self {
        if err.is_timeout() {
            Self::Timeout(err)
        } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal()
        {
            Self::ConnectionLost(err)
        } else {
            Self::StoreRejected(err)
        }
    }
}
