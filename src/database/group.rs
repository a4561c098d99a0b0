use super::args::Arg;
use super::backend::{Backend, Connector, ExecResult};
use super::conn::{scan_row, Conn, Timeouts};
use super::context::Context;
use super::error::DbError;
use super::mysql::{MySqlBackend, MySqlConnector};
use super::statement::Stmt;
use super::transaction::Tx;
use crate::configuration::DatabaseSettings;
use crate::helpers::Backoff;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub type MySqlGroup = DbGroup<MySqlBackend>;

/// One write connection and any number of read replicas.
///
/// Writes, transactions, multi-row queries and statements go to the write
/// connection. Single-row reads rotate across the replicas and fall back to
/// the write connection when every replica fails at the connection level.
pub struct DbGroup<B: Backend> {
    write: Arc<Conn<B>>,
    read: Arc<[Arc<Conn<B>>]>,
    idx: Arc<AtomicU64>,
    backoff: Backoff,
    shutdown: Arc<watch::Sender<bool>>,
}

impl<B: Backend> Clone for DbGroup<B> {
    fn clone(&self) -> Self {
        Self {
            write: self.write.clone(),
            read: self.read.clone(),
            idx: self.idx.clone(),
            backoff: self.backoff,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl MySqlGroup {
    pub async fn open_mysql(settings: &DatabaseSettings) -> Result<Self, DbError> {
        Self::open(settings, &MySqlConnector).await
    }
}

impl<B: Backend> DbGroup<B> {
    /// Opens the write connection, then every replica in order. Fails as a
    /// whole if any of them cannot be opened, closing what was opened.
    pub async fn open<C>(settings: &DatabaseSettings, connector: &C) -> Result<Self, DbError>
    where
        C: Connector<Backend = B>,
    {
        if !settings.has_timeouts() {
            return Err(DbError::TimeoutConfigMissing);
        }
        let timeouts = Timeouts::from(settings);

        let write = Arc::new(Conn::new(
            connect(connector, &settings.dsn, settings).await?,
            timeouts,
        ));

        let mut read = Vec::with_capacity(settings.read_dsn.len());
        for dsn in &settings.read_dsn {
            match connect(connector, dsn, settings).await {
                Ok(backend) => read.push(Arc::new(Conn::new(backend, timeouts))),
                Err(err) => {
                    write.backend.close().await;
                    for conn in &read {
                        conn.backend.close().await;
                    }
                    return Err(err);
                }
            }
        }

        info!(
            write = %write.addr(),
            replicas = read.len(),
            "Database group ready"
        );

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            write,
            read: read.into(),
            idx: Arc::new(AtomicU64::new(0)),
            backoff: Backoff::new(
                Duration::from_millis(settings.prepare_retry_initial_ms),
                Duration::from_millis(settings.prepare_retry_max_ms),
            ),
            shutdown: Arc::new(shutdown),
        })
    }

    /// This group without replicas, for reads that must see the latest write.
    pub fn master(&self) -> Self {
        Self {
            read: Arc::from(Vec::new()),
            ..self.clone()
        }
    }

    pub fn write_addr(&self) -> &str {
        self.write.addr()
    }

    pub fn read_addrs(&self) -> Vec<&str> {
        self.read.iter().map(|conn| conn.addr()).collect()
    }

    pub fn replica_count(&self) -> usize {
        self.read.len()
    }

    pub async fn exec(&self, ctx: &Context, query: &str, args: &[Arg]) -> Result<ExecResult, DbError> {
        self.write.exec(ctx, query, args).await
    }

    pub async fn query(&self, ctx: &Context, query: &str, args: &[Arg]) -> Result<Vec<B::Row>, DbError> {
        self.write.query(ctx, query, args).await
    }

    /// Single-row read. Replicas are tried in rotation from the next index;
    /// [`DbError::NoRows`] and statement errors are final, connection-level
    /// failures move on. The write connection answers if no replica does.
    pub async fn query_row(&self, ctx: &Context, query: &str, args: &[Arg]) -> Result<B::Row, DbError> {
        let start = self.read_index();
        let count = self.read.len();
        for i in 0..count {
            let conn = &self.read[(start + i) % count];
            match conn.query_row(ctx, query, args).await {
                Err(err) if err.is_connection_level() && !ctx.is_expired() => {
                    warn!(addr = %conn.addr(), error = %err, "Read replica failed, trying next");
                }
                outcome => return outcome,
            }
        }
        self.write.query_row(ctx, query, args).await
    }

    pub async fn query_row_map<T, F>(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Arg],
        scan: F,
    ) -> Result<T, DbError>
    where
        F: FnOnce(&B::Row) -> Result<T, sqlx::Error>,
    {
        let row = self.query_row(ctx, query, args).await?;
        scan_row(&row, query, args, scan)
    }

    pub async fn begin(&self, ctx: &Context) -> Result<Tx<B>, DbError> {
        self.write.begin(ctx).await
    }

    /// Prepares on the write connection or fails.
    pub async fn prepare(&self, query: &str) -> Result<Stmt<B>, DbError> {
        let prepared = self.write.prepare(query).await?;
        Ok(Stmt::ready(self.write.clone(), query, prepared))
    }

    /// Always returns a statement. If the first attempt fails it is prepared
    /// again in the background until it works or the group is closed.
    pub async fn prepared(&self, query: &str) -> Stmt<B> {
        match self.write.prepare(query).await {
            Ok(prepared) => Stmt::ready(self.write.clone(), query, prepared),
            Err(err) => {
                error!(addr = %self.write.addr(), query, error = %err, "Prepare statement failed, retrying in background");
                Stmt::healing(
                    self.write.clone(),
                    query,
                    self.backoff,
                    self.shutdown.subscribe(),
                )
            }
        }
    }

    /// Checks the write connection, then every replica. Stops at the first failure.
    pub async fn ping(&self, ctx: &Context) -> Result<(), DbError> {
        self.write.ping(ctx).await?;
        for conn in self.read.iter() {
            conn.ping(ctx).await?;
        }
        Ok(())
    }

    /// Stops every background preparation and closes all connections.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        self.write.backend.close().await;
        for conn in self.read.iter() {
            conn.backend.close().await;
        }
        info!(write = %self.write.addr(), "Database group closed");
    }

    fn read_index(&self) -> usize {
        let count = self.read.len() as u64;
        if count == 0 {
            return 0;
        }
        let next = self.idx.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        (next % count) as usize
    }
}

async fn connect<C: Connector>(
    connector: &C,
    dsn: &str,
    settings: &DatabaseSettings,
) -> Result<C::Backend, DbError> {
    connector
        .connect(dsn, settings)
        .await
        .map_err(|source| DbError::ConnectionSetupFailed {
            addr: super::mysql::parse_dsn_addr(dsn),
            source,
        })
}
