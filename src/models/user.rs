use serde::{Deserialize, Serialize};

/// A row of the sharded `dd_user*` tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub uid: i64,
    pub appid: i64,
    pub tel: String,
    pub nickname: String,
    pub headimgurl: String,
    pub sex: i32,
}
