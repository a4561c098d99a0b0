use crate::database::{Context, DbError, MySqlGroup};
use crate::models::User;
use async_trait::async_trait;
use sqlx::FromRow;
use tracing::Instrument;

/// User rows are spread over this many tables, picked by `uid % USER_SHARDS`.
pub const USER_SHARDS: i64 = 10;

pub fn user_table(uid: i64) -> String {
    format!("dd_user{}", uid.rem_euclid(USER_SHARDS))
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// `Ok(None)` when no row matches.
    async fn fetch(&self, ctx: &Context, uid: i64) -> Result<Option<User>, DbError>;
}

#[async_trait]
impl UserStore for MySqlGroup {
    async fn fetch(&self, ctx: &Context, uid: i64) -> Result<Option<User>, DbError> {
        let query = format!(
            "SELECT `uid`, `appid`, `tel`, `nickname`, `headimgurl`, `sex` FROM {} WHERE uid=?",
            user_table(uid)
        );
        let query_span = tracing::info_span!("Fetching user by uid", uid);
        self.query_row_map(ctx, &query, &[uid.into()], |row| User::from_row(row))
            .instrument(query_span)
            .await
            .map(Some)
            .or_else(|err| match err {
                DbError::NoRows => Ok(None),
                err => {
                    tracing::error!("Failed to fetch user: {}", err);
                    Err(err)
                }
            })
    }
}
