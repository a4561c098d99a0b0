//! Prepared statements that can be handed out before they are usable.
//!
//! A statement whose first preparation failed keeps retrying in the
//! background with capped backoff. The prepared form is published exactly
//! once through a `OnceLock`, so a reader either finds nothing or the whole
//! statement.

use super::args::Arg;
use super::backend::{Backend, ExecResult};
use super::conn::{bounded, exec_err, query_err, scan_row, Conn};
use super::context::Context;
use super::error::DbError;
use crate::helpers::Backoff;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Stmt<B: Backend> {
    inner: Arc<StmtInner<B>>,
}

struct StmtInner<B: Backend> {
    conn: Arc<Conn<B>>,
    query: String,
    prepared: OnceLock<B::Prepared>,
    heal: Mutex<Option<JoinHandle<()>>>,
}

impl<B: Backend> Clone for Stmt<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: Backend> Stmt<B> {
    fn new(conn: Arc<Conn<B>>, query: &str) -> Self {
        Self {
            inner: Arc::new(StmtInner {
                conn,
                query: query.to_string(),
                prepared: OnceLock::new(),
                heal: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn ready(conn: Arc<Conn<B>>, query: &str, prepared: B::Prepared) -> Self {
        let stmt = Self::new(conn, query);
        let _ = stmt.inner.prepared.set(prepared);
        stmt
    }

    /// A statement that is not usable yet. A background task keeps preparing
    /// it until that succeeds, the statement is closed or dropped, or
    /// `shutdown` fires.
    pub(crate) fn healing(
        conn: Arc<Conn<B>>,
        query: &str,
        backoff: Backoff,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let stmt = Self::new(conn, query);
        let task = tokio::spawn(heal(Arc::downgrade(&stmt.inner), backoff, shutdown));
        if let Ok(mut slot) = stmt.inner.heal.lock() {
            *slot = Some(task);
        }
        stmt
    }

    pub fn query_text(&self) -> &str {
        &self.inner.query
    }

    pub fn is_ready(&self) -> bool {
        self.inner.prepared.get().is_some()
    }

    fn prepared(&self) -> Result<&B::Prepared, DbError> {
        self.inner.prepared.get().ok_or(DbError::StmtNotReady)
    }

    pub async fn exec(&self, ctx: &Context, args: &[Arg]) -> Result<ExecResult, DbError> {
        let stmt = self.prepared()?;
        let conn = &self.inner.conn;
        let query = self.query_text();
        let ctx = ctx.shrink(conn.timeouts.exec);
        bounded(ctx, query, args, conn.backend.exec_prepared(stmt, args))
            .await?
            .map_err(|source| exec_err(query, args, source))
    }

    pub async fn query(&self, ctx: &Context, args: &[Arg]) -> Result<Vec<B::Row>, DbError> {
        let stmt = self.prepared()?;
        let conn = &self.inner.conn;
        let query = self.query_text();
        let ctx = ctx.shrink(conn.timeouts.query);
        bounded(ctx, query, args, conn.backend.fetch_all_prepared(stmt, args))
            .await?
            .map_err(|source| query_err(query, args, source))
    }

    pub async fn query_row(&self, ctx: &Context, args: &[Arg]) -> Result<B::Row, DbError> {
        let stmt = self.prepared()?;
        let conn = &self.inner.conn;
        let query = self.query_text();
        let ctx = ctx.shrink(conn.timeouts.query);
        bounded(ctx, query, args, conn.backend.fetch_optional_prepared(stmt, args))
            .await?
            .map_err(|source| query_err(query, args, source))?
            .ok_or(DbError::NoRows)
    }

    pub async fn query_row_map<T, F>(&self, ctx: &Context, args: &[Arg], scan: F) -> Result<T, DbError>
    where
        F: FnOnce(&B::Row) -> Result<T, sqlx::Error>,
    {
        let row = self.query_row(ctx, args).await?;
        scan_row(&row, self.query_text(), args, scan)
    }

    /// Stops a pending background preparation. A statement that is already
    /// prepared stays usable.
    pub fn close(&self) {
        if let Ok(mut slot) = self.inner.heal.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

async fn heal<B: Backend>(
    stmt: Weak<StmtInner<B>>,
    backoff: Backoff,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(backoff.delay(attempt)) => {}
        }

        let Some(inner) = stmt.upgrade() else {
            break;
        };
        match inner.conn.prepare(&inner.query).await {
            Ok(prepared) => {
                let _ = inner.prepared.set(prepared);
                info!(addr = %inner.conn.addr(), query = %inner.query, attempt, "Statement prepared");
                break;
            }
            Err(err) => {
                warn!(addr = %inner.conn.addr(), query = %inner.query, attempt, error = %err, "Prepare statement failed, will retry");
            }
        }
        attempt = attempt.saturating_add(1);
    }
}
