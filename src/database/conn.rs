use super::args::Arg;
use super::backend::{Backend, ExecResult};
use super::context::Context;
use super::error::DbError;
use super::transaction::Tx;
use crate::configuration::DatabaseSettings;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Timeouts {
    pub query: Duration,
    pub exec: Duration,
    pub tran: Duration,
}

impl From<&DatabaseSettings> for Timeouts {
    fn from(settings: &DatabaseSettings) -> Self {
        Self {
            query: settings.query_timeout(),
            exec: settings.exec_timeout(),
            tran: settings.tran_timeout(),
        }
    }
}

/// Runs `fut` until the context's deadline.
pub(crate) async fn bounded<F: Future>(
    ctx: Context,
    query: &str,
    args: &[Arg],
    fut: F,
) -> Result<F::Output, DbError> {
    match ctx.remaining() {
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| DbError::Timeout {
                query: query.to_string(),
                args: args.into(),
                after,
            }),
        None => Ok(fut.await),
    }
}

pub(crate) fn query_err(query: &str, args: &[Arg], source: sqlx::Error) -> DbError {
    DbError::Query {
        query: query.to_string(),
        args: args.into(),
        source,
    }
}

pub(crate) fn exec_err(query: &str, args: &[Arg], source: sqlx::Error) -> DbError {
    DbError::Exec {
        query: query.to_string(),
        args: args.into(),
        source,
    }
}

/// Runs `scan` over a fetched row. A scan failure keeps the query and
/// arguments; a missing row stays [`DbError::NoRows`].
pub(crate) fn scan_row<R, T, F>(row: &R, query: &str, args: &[Arg], scan: F) -> Result<T, DbError>
where
    F: FnOnce(&R) -> Result<T, sqlx::Error>,
{
    scan(row).map_err(|source| match source {
        sqlx::Error::RowNotFound => DbError::NoRows,
        source => DbError::Scan {
            query: query.to_string(),
            args: args.into(),
            source,
        },
    })
}

/// One backend plus the timeouts applied to every call made through it.
pub(crate) struct Conn<B: Backend> {
    pub backend: B,
    pub timeouts: Timeouts,
}

impl<B: Backend> Conn<B> {
    pub fn new(backend: B, timeouts: Timeouts) -> Self {
        Self { backend, timeouts }
    }

    pub fn addr(&self) -> &str {
        self.backend.addr()
    }

    pub async fn exec(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Arg],
    ) -> Result<ExecResult, DbError> {
        let ctx = ctx.shrink(self.timeouts.exec);
        bounded(ctx, query, args, self.backend.exec(query, args))
            .await?
            .map_err(|source| exec_err(query, args, source))
    }

    pub async fn query(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Arg],
    ) -> Result<Vec<B::Row>, DbError> {
        let ctx = ctx.shrink(self.timeouts.query);
        bounded(ctx, query, args, self.backend.fetch_all(query, args))
            .await?
            .map_err(|source| query_err(query, args, source))
    }

    pub async fn query_row(
        &self,
        ctx: &Context,
        query: &str,
        args: &[Arg],
    ) -> Result<B::Row, DbError> {
        let ctx = ctx.shrink(self.timeouts.query);
        bounded(ctx, query, args, self.backend.fetch_optional(query, args))
            .await?
            .map_err(|source| query_err(query, args, source))?
            .ok_or(DbError::NoRows)
    }

    pub async fn prepare(&self, query: &str) -> Result<B::Prepared, DbError> {
        let ctx = Context::background().shrink(self.timeouts.query);
        bounded(ctx, query, &[], self.backend.prepare(query))
            .await?
            .map_err(|source| DbError::Prepare {
                query: query.to_string(),
                source,
            })
    }

    pub async fn begin(&self, ctx: &Context) -> Result<Tx<B>, DbError> {
        let ctx = ctx.shrink(self.timeouts.tran);
        let tx = bounded(ctx, "BEGIN", &[], self.backend.begin())
            .await?
            .map_err(|source| DbError::Begin {
                addr: self.addr().to_string(),
                source,
            })?;
        Ok(Tx::new(tx, ctx))
    }

    pub async fn ping(&self, ctx: &Context) -> Result<(), DbError> {
        let ctx = ctx.shrink(self.timeouts.query);
        bounded(ctx, "PING", &[], self.backend.ping())
            .await?
            .map_err(|source| DbError::Ping {
                addr: self.addr().to_string(),
                source,
            })
    }
}
