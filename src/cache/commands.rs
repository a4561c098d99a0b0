//! Keyed command facade over [`CachePool`].
//!
//! Each call acquires a connection, sends one command and releases it.
//! Failures of any kind are logged and come back as `false`, `None`, an
//! empty collection or zero. [`CachePool::exec`] is the path for callers
//! that need to know what went wrong.

use super::error::CacheError;
use super::pool::CachePool;
use redis::{Cmd, FromRedisValue, ToRedisArgs};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
    Not,
}

impl fmt::Display for BitOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            BitOp::And => "AND",
            BitOp::Or => "OR",
            BitOp::Xor => "XOR",
            BitOp::Not => "NOT",
        };
        write!(f, "{}", op)
    }
}

impl CachePool {
    /// Acquire, send `cmd`, release. Pool exhaustion and acquire timeouts
    /// both surface as [`CacheError::PoolExhausted`].
    pub async fn exec<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T, CacheError> {
        let mut conn = self.acquire().await.ok_or(CacheError::PoolExhausted)?;
        conn.query(cmd).await
    }

    async fn run<T: FromRedisValue>(&self, op: &'static str, key: &str, cmd: &Cmd) -> Option<T> {
        match self.exec(cmd).await {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(pool = %self.name(), op, key, kind = ?err.kind(), error = %err, "Cache command failed");
                None
            }
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if key.is_empty() {
            return None;
        }
        self.run::<Option<String>>("GET", key, redis::cmd("GET").arg(key))
            .await
            .flatten()
    }

    pub async fn set<V: ToRedisArgs>(&self, key: &str, value: V) -> bool {
        if key.is_empty() {
            return false;
        }
        self.run::<()>("SET", key, redis::cmd("SET").arg(key).arg(value))
            .await
            .is_some()
    }

    /// Sets `key` with a time-to-live of `seconds`, relative to now.
    pub async fn set_ex<V: ToRedisArgs>(&self, key: &str, value: V, seconds: u64) -> bool {
        if key.is_empty() || seconds == 0 {
            return false;
        }
        self.run::<()>(
            "SETEX",
            key,
            redis::cmd("SETEX").arg(key).arg(seconds).arg(value),
        )
        .await
        .is_some()
    }

    /// `true` only if the key did not exist and was written.
    pub async fn set_nx<V: ToRedisArgs>(&self, key: &str, value: V) -> bool {
        if key.is_empty() {
            return false;
        }
        self.run::<bool>("SETNX", key, redis::cmd("SETNX").arg(key).arg(value))
            .await
            .unwrap_or(false)
    }

    /// `true` if the key existed.
    pub async fn del(&self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        self.run::<i64>("DEL", key, redis::cmd("DEL").arg(key))
            .await
            .map_or(false, |removed| removed > 0)
    }

    pub async fn expire(&self, key: &str, seconds: i64) -> bool {
        if key.is_empty() || seconds <= 0 {
            return false;
        }
        self.run::<bool>("EXPIRE", key, redis::cmd("EXPIRE").arg(key).arg(seconds))
            .await
            .unwrap_or(false)
    }

    /// Remaining time-to-live in seconds; the store's negative sentinels
    /// pass through, and any failure reads as 0.
    pub async fn ttl(&self, key: &str) -> i64 {
        if key.is_empty() {
            return 0;
        }
        self.run("TTL", key, redis::cmd("TTL").arg(key))
            .await
            .unwrap_or(0)
    }

    pub async fn mget(&self, keys: &[&str]) -> Vec<Option<String>> {
        if keys.is_empty() || keys.iter().any(|key| key.is_empty()) {
            return Vec::new();
        }
        self.run("MGET", keys[0], redis::cmd("MGET").arg(keys))
            .await
            .unwrap_or_default()
    }

    pub async fn incr_by(&self, key: &str, delta: i64) -> i64 {
        if key.is_empty() {
            return 0;
        }
        self.run("INCRBY", key, redis::cmd("INCRBY").arg(key).arg(delta))
            .await
            .unwrap_or(0)
    }

    pub async fn incr_by_float(&self, key: &str, delta: f64) -> f64 {
        if key.is_empty() {
            return 0.0;
        }
        self.run(
            "INCRBYFLOAT",
            key,
            redis::cmd("INCRBYFLOAT").arg(key).arg(delta),
        )
        .await
        .unwrap_or(0.0)
    }

    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        if pattern.is_empty() {
            return Vec::new();
        }
        self.run("KEYS", pattern, redis::cmd("KEYS").arg(pattern))
            .await
            .unwrap_or_default()
    }

    pub async fn hset<V: ToRedisArgs>(&self, key: &str, field: &str, value: V) -> bool {
        if key.is_empty() || field.is_empty() {
            return false;
        }
        self.run::<i64>(
            "HSET",
            key,
            redis::cmd("HSET").arg(key).arg(field).arg(value),
        )
        .await
        .is_some()
    }

    pub async fn hdel(&self, key: &str, field: &str) -> bool {
        if key.is_empty() || field.is_empty() {
            return false;
        }
        self.run::<i64>("HDEL", key, redis::cmd("HDEL").arg(key).arg(field))
            .await
            .map_or(false, |removed| removed > 0)
    }

    pub async fn hmset(&self, key: &str, fields: &HashMap<String, String>) -> bool {
        if key.is_empty() || fields.is_empty() {
            return false;
        }
        let mut cmd = redis::cmd("HMSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        self.run::<()>("HMSET", key, &cmd).await.is_some()
    }

    pub async fn hget(&self, key: &str, field: &str) -> Option<String> {
        if key.is_empty() || field.is_empty() {
            return None;
        }
        self.run::<Option<String>>("HGET", key, redis::cmd("HGET").arg(key).arg(field))
            .await
            .flatten()
    }

    /// One entry per requested field, in request order.
    pub async fn hmget(&self, key: &str, fields: &[&str]) -> Vec<Option<String>> {
        if key.is_empty() || fields.is_empty() {
            return Vec::new();
        }
        self.run("HMGET", key, redis::cmd("HMGET").arg(key).arg(fields))
            .await
            .unwrap_or_default()
    }

    pub async fn hgetall(&self, key: &str) -> HashMap<String, String> {
        if key.is_empty() {
            return HashMap::new();
        }
        self.run("HGETALL", key, redis::cmd("HGETALL").arg(key))
            .await
            .unwrap_or_default()
    }

    pub async fn hkeys(&self, key: &str) -> Vec<String> {
        if key.is_empty() {
            return Vec::new();
        }
        self.run("HKEYS", key, redis::cmd("HKEYS").arg(key))
            .await
            .unwrap_or_default()
    }

    pub async fn smembers(&self, key: &str) -> Vec<String> {
        if key.is_empty() {
            return Vec::new();
        }
        self.run("SMEMBERS", key, redis::cmd("SMEMBERS").arg(key))
            .await
            .unwrap_or_default()
    }

    /// `true` if `member` was not already in the set.
    pub async fn sadd<V: ToRedisArgs>(&self, key: &str, member: V) -> bool {
        if key.is_empty() {
            return false;
        }
        self.run::<i64>("SADD", key, redis::cmd("SADD").arg(key).arg(member))
            .await
            .map_or(false, |added| added > 0)
    }

    /// `true` if at least one of `members` was new.
    pub async fn sadd_many(&self, key: &str, members: &[&str]) -> bool {
        if key.is_empty() || members.is_empty() {
            return false;
        }
        self.run::<i64>("SADD", key, redis::cmd("SADD").arg(key).arg(members))
            .await
            .map_or(false, |added| added > 0)
    }

    pub async fn srem<V: ToRedisArgs>(&self, key: &str, member: V) -> bool {
        if key.is_empty() {
            return false;
        }
        self.run::<i64>("SREM", key, redis::cmd("SREM").arg(key).arg(member))
            .await
            .map_or(false, |removed| removed > 0)
    }

    pub async fn sismember(&self, key: &str, member: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        self.run("SISMEMBER", key, redis::cmd("SISMEMBER").arg(key).arg(member))
            .await
            .unwrap_or(false)
    }

    pub async fn llen(&self, key: &str) -> i64 {
        if key.is_empty() {
            return 0;
        }
        self.run("LLEN", key, redis::cmd("LLEN").arg(key))
            .await
            .unwrap_or(0)
    }

    pub async fn lpush<V: ToRedisArgs>(&self, key: &str, value: V) -> bool {
        self.push("LPUSH", key, value).await
    }

    pub async fn rpush<V: ToRedisArgs>(&self, key: &str, value: V) -> bool {
        self.push("RPUSH", key, value).await
    }

    async fn push<V: ToRedisArgs>(&self, op: &'static str, key: &str, value: V) -> bool {
        if key.is_empty() {
            return false;
        }
        self.run::<i64>(op, key, redis::cmd(op).arg(key).arg(value))
            .await
            .is_some()
    }

    pub async fn lpop(&self, key: &str) -> Option<String> {
        self.pop("LPOP", key).await
    }

    pub async fn rpop(&self, key: &str) -> Option<String> {
        self.pop("RPOP", key).await
    }

    async fn pop(&self, op: &'static str, key: &str) -> Option<String> {
        if key.is_empty() {
            return None;
        }
        self.run::<Option<String>>(op, key, redis::cmd(op).arg(key))
            .await
            .flatten()
    }

    /// Inclusive range; negative indexes count from the tail.
    pub async fn lrange(&self, key: &str, start: isize, stop: isize) -> Vec<String> {
        if key.is_empty() {
            return Vec::new();
        }
        self.run(
            "LRANGE",
            key,
            redis::cmd("LRANGE").arg(key).arg(start).arg(stop),
        )
        .await
        .unwrap_or_default()
    }

    pub async fn setbit(&self, key: &str, offset: usize, on: bool) -> bool {
        if key.is_empty() {
            return false;
        }
        self.run::<i64>(
            "SETBIT",
            key,
            redis::cmd("SETBIT").arg(key).arg(offset).arg(u8::from(on)),
        )
        .await
        .is_some()
    }

    pub async fn getbit(&self, key: &str, offset: usize) -> bool {
        if key.is_empty() {
            return false;
        }
        self.run::<i64>("GETBIT", key, redis::cmd("GETBIT").arg(key).arg(offset))
            .await
            .map_or(false, |bit| bit == 1)
    }

    pub async fn bitcount(&self, key: &str) -> i64 {
        if key.is_empty() {
            return 0;
        }
        self.run("BITCOUNT", key, redis::cmd("BITCOUNT").arg(key))
            .await
            .unwrap_or(0)
    }

    /// Combines `sources` into `dest`. `true` when the result is non-empty.
    pub async fn bitop(&self, op: BitOp, dest: &str, sources: &[&str]) -> bool {
        if dest.is_empty() || sources.is_empty() {
            return false;
        }
        if op == BitOp::Not && sources.len() != 1 {
            return false;
        }
        self.run::<i64>(
            "BITOP",
            dest,
            redis::cmd("BITOP").arg(op.to_string()).arg(dest).arg(sources),
        )
        .await
        .map_or(false, |len| len > 0)
    }

    pub async fn zadd(&self, key: &str, score: f64, member: &str) -> bool {
        if key.is_empty() || member.is_empty() {
            return false;
        }
        self.run::<i64>(
            "ZADD",
            key,
            redis::cmd("ZADD").arg(key).arg(score).arg(member),
        )
        .await
        .is_some()
    }

    /// Members with their scores, highest score first.
    pub async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Vec<(String, f64)> {
        if key.is_empty() {
            return Vec::new();
        }
        self.run(
            "ZREVRANGE",
            key,
            redis::cmd("ZREVRANGE")
                .arg(key)
                .arg(start)
                .arg(stop)
                .arg("WITHSCORES"),
        )
        .await
        .unwrap_or_default()
    }

    /// Score of `member`, or `default` when it is absent or the lookup fails.
    pub async fn zscore(&self, key: &str, member: &str, default: f64) -> f64 {
        if key.is_empty() || member.is_empty() {
            return default;
        }
        self.run::<Option<f64>>("ZSCORE", key, redis::cmd("ZSCORE").arg(key).arg(member))
            .await
            .flatten()
            .unwrap_or(default)
    }
}
