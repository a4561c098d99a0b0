//! Relational store access: a write connection with read replicas.

mod args;
mod backend;
mod conn;
mod context;
mod error;
mod group;
pub mod mysql;
mod statement;
mod transaction;

pub use args::{Arg, Args};
pub use backend::{Backend, BackendTx, Connector, ExecResult};
pub use context::Context;
pub use error::{is_connection_error, DbError};
pub use group::{DbGroup, MySqlGroup};
pub use mysql::{MySqlBackend, MySqlConnector};
pub use statement::Stmt;
pub use transaction::Tx;
