use super::args::Arg;
use super::backend::{Backend, BackendTx, Connector, ExecResult};
use crate::configuration::DatabaseSettings;
use async_trait::async_trait;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlQueryResult,
    MySqlRow, MySqlStatement,
};
use sqlx::query::Query;
use sqlx::{Connection, Executor, Statement, Transaction};
use std::str::FromStr;

/// Opens lazily-connecting MySQL pools. A malformed DSN fails straight
/// away; an unreachable server only shows up on first use.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlConnector;

#[async_trait]
impl Connector for MySqlConnector {
    type Backend = MySqlBackend;

    async fn connect(
        &self,
        dsn: &str,
        settings: &DatabaseSettings,
    ) -> Result<MySqlBackend, sqlx::Error> {
        let options = MySqlConnectOptions::from_str(&normalize_dsn(dsn))?;
        let max = settings.active.max(1);
        let pool = MySqlPoolOptions::new()
            .max_connections(max)
            .min_connections(settings.idle.min(max))
            .max_lifetime(settings.idle_timeout())
            .connect_lazy_with(options);

        Ok(MySqlBackend {
            pool,
            addr: parse_dsn_addr(dsn),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MySqlBackend {
    pool: MySqlPool,
    addr: String,
}

impl MySqlBackend {
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl Backend for MySqlBackend {
    type Row = MySqlRow;
    type Prepared = MySqlStatement<'static>;
    type Tx = MySqlTx;

    fn addr(&self) -> &str {
        &self.addr
    }

    async fn exec(&self, query: &str, args: &[Arg]) -> Result<ExecResult, sqlx::Error> {
        let done = bind_args(sqlx::query(query), args)
            .execute(&self.pool)
            .await?;
        Ok(exec_result(done))
    }

    async fn fetch_all(&self, query: &str, args: &[Arg]) -> Result<Vec<MySqlRow>, sqlx::Error> {
        bind_args(sqlx::query(query), args)
            .fetch_all(&self.pool)
            .await
    }

    async fn fetch_optional(
        &self,
        query: &str,
        args: &[Arg],
    ) -> Result<Option<MySqlRow>, sqlx::Error> {
        bind_args(sqlx::query(query), args)
            .fetch_optional(&self.pool)
            .await
    }

    async fn prepare(&self, query: &str) -> Result<MySqlStatement<'static>, sqlx::Error> {
        let stmt = (&self.pool).prepare(query).await?;
        Ok(Statement::to_owned(&stmt))
    }

    async fn exec_prepared(
        &self,
        stmt: &MySqlStatement<'static>,
        args: &[Arg],
    ) -> Result<ExecResult, sqlx::Error> {
        let done = bind_args(stmt.query(), args).execute(&self.pool).await?;
        Ok(exec_result(done))
    }

    async fn fetch_all_prepared(
        &self,
        stmt: &MySqlStatement<'static>,
        args: &[Arg],
    ) -> Result<Vec<MySqlRow>, sqlx::Error> {
        bind_args(stmt.query(), args).fetch_all(&self.pool).await
    }

    async fn fetch_optional_prepared(
        &self,
        stmt: &MySqlStatement<'static>,
        args: &[Arg],
    ) -> Result<Option<MySqlRow>, sqlx::Error> {
        bind_args(stmt.query(), args)
            .fetch_optional(&self.pool)
            .await
    }

    async fn begin(&self) -> Result<MySqlTx, sqlx::Error> {
        Ok(MySqlTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

pub struct MySqlTx {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl BackendTx for MySqlTx {
    type Row = MySqlRow;

    async fn exec(&mut self, query: &str, args: &[Arg]) -> Result<ExecResult, sqlx::Error> {
        let done = bind_args(sqlx::query(query), args)
            .execute(&mut *self.tx)
            .await?;
        Ok(exec_result(done))
    }

    async fn fetch_all(&mut self, query: &str, args: &[Arg]) -> Result<Vec<MySqlRow>, sqlx::Error> {
        bind_args(sqlx::query(query), args)
            .fetch_all(&mut *self.tx)
            .await
    }

    async fn fetch_optional(
        &mut self,
        query: &str,
        args: &[Arg],
    ) -> Result<Option<MySqlRow>, sqlx::Error> {
        bind_args(sqlx::query(query), args)
            .fetch_optional(&mut *self.tx)
            .await
    }

    async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}

fn exec_result(done: MySqlQueryResult) -> ExecResult {
    ExecResult {
        rows_affected: done.rows_affected(),
        last_insert_id: done.last_insert_id(),
    }
}

fn bind_args<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    args: &'q [Arg],
) -> Query<'q, MySql, MySqlArguments> {
    for arg in args {
        query = match arg {
            Arg::Null => query.bind(Option::<String>::None),
            Arg::Bool(v) => query.bind(*v),
            Arg::Int(v) => query.bind(*v),
            Arg::UInt(v) => query.bind(*v),
            Arg::Float(v) => query.bind(*v),
            Arg::Text(v) => query.bind(v.as_str()),
            Arg::Bytes(v) => query.bind(v.as_slice()),
        };
    }
    query
}

/// Accepts both `mysql://` URLs and the `user:pass@tcp(host:port)/db?params`
/// form, returning a URL.
pub fn normalize_dsn(dsn: &str) -> String {
    if dsn.starts_with("mysql://") || dsn.starts_with("mariadb://") {
        return dsn.to_string();
    }

    let (credentials, rest) = match dsn.rsplit_once('@') {
        Some((credentials, rest)) => (Some(credentials), rest),
        None => (None, dsn),
    };

    let rest = match rest.strip_prefix("tcp(") {
        Some(stripped) => match stripped.split_once(')') {
            Some((host, tail)) => format!("{}{}", host, tail),
            None => stripped.to_string(),
        },
        None => rest.to_string(),
    };

    match credentials {
        Some(credentials) => {
            let (user, password) = match credentials.split_once(':') {
                Some((user, password)) => (user, Some(password)),
                None => (credentials, None),
            };
            match password {
                Some(password) => format!(
                    "mysql://{}:{}@{}",
                    urlencoding::encode(user),
                    urlencoding::encode(password),
                    rest
                ),
                None => format!("mysql://{}@{}", urlencoding::encode(user), rest),
            }
        }
        None => format!("mysql://{}", rest),
    }
}

/// The `host:port` part of a DSN, safe to log.
pub fn parse_dsn_addr(dsn: &str) -> String {
    let rest = match dsn.rsplit_once('@') {
        Some((_, rest)) => rest,
        None => dsn.strip_prefix("mysql://").unwrap_or(dsn),
    };
    let rest = rest.split(['?', '/']).next().unwrap_or_default();
    let rest = rest.strip_prefix("tcp(").unwrap_or(rest);
    rest.trim_end_matches(')').to_string()
}
