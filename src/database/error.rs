use super::args::Args;
use sqlx::mysql::MySqlDatabaseError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The query matched nothing. Never wrapped, so callers can match on it.
    #[error("sql: no rows in result set")]
    NoRows,
    #[error("sql: prepare failed and stmt nil")]
    StmtNotReady,
    #[error("mysql must be set query/execute/transaction timeout")]
    TimeoutConfigMissing,
    #[error("open database {addr} failed")]
    ConnectionSetupFailed {
        addr: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("query:{query}, args:{args}")]
    Query {
        query: String,
        args: Args,
        #[source]
        source: sqlx::Error,
    },
    #[error("exec:{query}, args:{args}")]
    Exec {
        query: String,
        args: Args,
        #[source]
        source: sqlx::Error,
    },
    #[error("scan:{query}, args:{args}")]
    Scan {
        query: String,
        args: Args,
        #[source]
        source: sqlx::Error,
    },
    #[error("prepare {query}")]
    Prepare {
        query: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("{query}, args:{args}: timed out after {after:?}")]
    Timeout {
        query: String,
        args: Args,
        after: Duration,
    },
    #[error("begin transaction on {addr}")]
    Begin {
        addr: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("commit transaction")]
    Commit(#[source] sqlx::Error),
    #[error("rollback transaction")]
    Rollback(#[source] sqlx::Error),
    #[error("ping {addr}")]
    Ping {
        addr: String,
        #[source]
        source: sqlx::Error,
    },
}

impl DbError {
    pub fn is_no_rows(&self) -> bool {
        matches!(self, DbError::NoRows)
    }

    /// Failures of the connection rather than of the statement. A read that
    /// hits one of these moves on to the next replica. Pools connect lazily,
    /// so a server refusing the handshake counts as one too.
    pub fn is_connection_level(&self) -> bool {
        match self {
            DbError::Timeout { .. } => true,
            DbError::Query { source, .. }
            | DbError::Exec { source, .. }
            | DbError::Ping { source, .. }
            | DbError::Begin { source, .. } => is_connection_error(source),
            _ => false,
        }
    }
}

/// Server error numbers sent while a new connection is being set up: too many
/// connections, access denied, host blocked and host not allowed.
const HANDSHAKE_REJECTIONS: [u16; 4] = [1040, 1045, 1129, 1130];

pub fn is_handshake_rejection(number: u16) -> bool {
    HANDSHAKE_REJECTIONS.contains(&number)
}

pub fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .try_downcast_ref::<MySqlDatabaseError>()
            .map_or(false, |db| is_handshake_rejection(db.number())),
        _ => false,
    }
}
