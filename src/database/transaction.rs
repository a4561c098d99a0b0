use super::args::Arg;
use super::backend::{Backend, BackendTx, ExecResult};
use super::conn::{bounded, exec_err, query_err, scan_row};
use super::context::Context;
use super::error::DbError;

/// A transaction on the write connection.
///
/// Every statement runs under the deadline fixed when it began. `commit`
/// and `rollback` consume it; dropping it unfinished rolls back.
pub struct Tx<B: Backend> {
    tx: B::Tx,
    ctx: Context,
}

impl<B: Backend> Tx<B> {
    pub(crate) fn new(tx: B::Tx, ctx: Context) -> Self {
        Self { tx, ctx }
    }

    pub fn context(&self) -> Context {
        self.ctx
    }

    pub async fn exec(&mut self, query: &str, args: &[Arg]) -> Result<ExecResult, DbError> {
        bounded(self.ctx, query, args, self.tx.exec(query, args))
            .await?
            .map_err(|source| exec_err(query, args, source))
    }

    pub async fn query(&mut self, query: &str, args: &[Arg]) -> Result<Vec<B::Row>, DbError> {
        bounded(self.ctx, query, args, self.tx.fetch_all(query, args))
            .await?
            .map_err(|source| query_err(query, args, source))
    }

    pub async fn query_row(&mut self, query: &str, args: &[Arg]) -> Result<B::Row, DbError> {
        bounded(self.ctx, query, args, self.tx.fetch_optional(query, args))
            .await?
            .map_err(|source| query_err(query, args, source))?
            .ok_or(DbError::NoRows)
    }

    pub async fn query_row_map<T, F>(
        &mut self,
        query: &str,
        args: &[Arg],
        scan: F,
    ) -> Result<T, DbError>
    where
        F: FnOnce(&B::Row) -> Result<T, sqlx::Error>,
    {
        let row = self.query_row(query, args).await?;
        scan_row(&row, query, args, scan)
    }

    pub async fn commit(self) -> Result<(), DbError> {
        bounded(self.ctx, "COMMIT", &[], self.tx.commit())
            .await?
            .map_err(DbError::Commit)
    }

    pub async fn rollback(self) -> Result<(), DbError> {
        bounded(self.ctx, "ROLLBACK", &[], self.tx.rollback())
            .await?
            .map_err(DbError::Rollback)
    }
}
