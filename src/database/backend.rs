//! What the router needs from one relational connection (pool).
//!
//! The router, statement and transaction types are generic over these
//! traits; [`super::mysql`] provides the production implementation.

use super::args::Arg;
use crate::configuration::DatabaseSettings;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: u64,
}

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Row: Send + 'static;
    /// A statement prepared on this backend, ready to be run with arguments.
    type Prepared: Send + Sync + 'static;
    type Tx: BackendTx<Row = Self::Row>;

    /// `host:port` for logs. Never carries credentials.
    fn addr(&self) -> &str;

    async fn exec(&self, query: &str, args: &[Arg]) -> Result<ExecResult, sqlx::Error>;

    async fn fetch_all(&self, query: &str, args: &[Arg]) -> Result<Vec<Self::Row>, sqlx::Error>;

    async fn fetch_optional(
        &self,
        query: &str,
        args: &[Arg],
    ) -> Result<Option<Self::Row>, sqlx::Error>;

    async fn prepare(&self, query: &str) -> Result<Self::Prepared, sqlx::Error>;

    async fn exec_prepared(
        &self,
        stmt: &Self::Prepared,
        args: &[Arg],
    ) -> Result<ExecResult, sqlx::Error>;

    async fn fetch_all_prepared(
        &self,
        stmt: &Self::Prepared,
        args: &[Arg],
    ) -> Result<Vec<Self::Row>, sqlx::Error>;

    async fn fetch_optional_prepared(
        &self,
        stmt: &Self::Prepared,
        args: &[Arg],
    ) -> Result<Option<Self::Row>, sqlx::Error>;

    async fn begin(&self) -> Result<Self::Tx, sqlx::Error>;

    async fn ping(&self) -> Result<(), sqlx::Error>;

    async fn close(&self);
}

/// An open transaction. Dropping it without committing rolls it back.
#[async_trait]
pub trait BackendTx: Send + 'static {
    type Row: Send + 'static;

    async fn exec(&mut self, query: &str, args: &[Arg]) -> Result<ExecResult, sqlx::Error>;

    async fn fetch_all(
        &mut self,
        query: &str,
        args: &[Arg],
    ) -> Result<Vec<Self::Row>, sqlx::Error>;

    async fn fetch_optional(
        &mut self,
        query: &str,
        args: &[Arg],
    ) -> Result<Option<Self::Row>, sqlx::Error>;

    async fn commit(self) -> Result<(), sqlx::Error>;

    async fn rollback(self) -> Result<(), sqlx::Error>;
}

/// Opens one backend per data source name.
#[async_trait]
pub trait Connector: Send + Sync {
    type Backend: Backend;

    async fn connect(
        &self,
        dsn: &str,
        settings: &DatabaseSettings,
    ) -> Result<Self::Backend, sqlx::Error>;
}
