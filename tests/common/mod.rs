#![allow(dead_code)]

use appserver::cache::{CacheRegistry, Dialer, Target, Transport};
use appserver::configuration::{DatabaseSettings, RedisSettings, Settings};
use appserver::database::{Arg, Backend, BackendTx, Connector, ExecResult, MySqlGroup};
use async_trait::async_trait;
use redis::{Cmd, ErrorKind, RedisError, RedisResult, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Cache store fake
// ---------------------------------------------------------------------------

/// In-memory cache store shared by every connection a [`FakeDialer`] opens.
#[derive(Default)]
pub struct FakeStore {
    down: AtomicBool,
    delay_ms: AtomicU64,
    fail_dial_after: Mutex<Option<usize>>,
    refuse_dials: AtomicBool,
    broken: Mutex<HashSet<usize>>,
    pub dials: AtomicUsize,
    pub closes: AtomicUsize,
    pub requests: AtomicUsize,
    pub pings: AtomicUsize,
    data: Mutex<Data>,
}

#[derive(Default)]
struct Data {
    strings: HashMap<String, String>,
    ttls: HashMap<String, i64>,
    hashes: HashMap<String, BTreeMap<String, String>>,
    sets: HashMap<String, BTreeSet<String>>,
    lists: HashMap<String, VecDeque<String>>,
    zsets: HashMap<String, Vec<(String, f64)>>,
    bits: HashMap<String, Vec<u8>>,
}

impl Data {
    fn key_names(&self) -> BTreeSet<String> {
        self.strings
            .keys()
            .chain(self.hashes.keys())
            .chain(self.sets.keys())
            .chain(self.lists.keys())
            .chain(self.zsets.keys())
            .chain(self.bits.keys())
            .cloned()
            .collect()
    }
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// The dial after `n` successful ones fails.
    pub fn fail_dial_after(&self, n: usize) {
        *self.fail_dial_after.lock().unwrap() = Some(n);
    }

    /// Breaks the connection opened by the `dial`-th dial (zero based) and
    /// refuses new dials until [`FakeStore::heal_connections`]. Every other
    /// open connection keeps working.
    pub fn break_connection(&self, dial: usize) {
        self.broken.lock().unwrap().insert(dial);
        self.refuse_dials.store(true, Ordering::SeqCst);
    }

    pub fn heal_connections(&self) {
        self.broken.lock().unwrap().clear();
        self.refuse_dials.store(false, Ordering::SeqCst);
    }

    fn is_broken(&self, dial: usize) -> bool {
        self.broken.lock().unwrap().contains(&dial)
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap().strings.get(key).cloned()
    }

    pub fn ttl_of(&self, key: &str) -> Option<i64> {
        self.data.lock().unwrap().ttls.get(key).copied()
    }

    pub fn put_string(&self, key: &str, value: &str) {
        self.data
            .lock()
            .unwrap()
            .strings
            .insert(key.to_string(), value.to_string());
    }

    fn apply(&self, args: &[String]) -> RedisResult<Value> {
        let name = args[0].to_uppercase();
        let a = &args[1..];
        let mut d = self.data.lock().unwrap();

        let value = match name.as_str() {
            "PING" => {
                self.pings.fetch_add(1, Ordering::SeqCst);
                Value::SimpleString("PONG".to_string())
            }
            "GET" => d.strings.get(&a[0]).map_or(Value::Nil, |v| bulk(v)),
            "SET" => {
                d.strings.insert(a[0].clone(), a[1].clone());
                d.ttls.remove(&a[0]);
                Value::Okay
            }
            "SETEX" => {
                d.strings.insert(a[0].clone(), a[2].clone());
                d.ttls.insert(a[0].clone(), a[1].parse().unwrap_or(0));
                Value::Okay
            }
            "SETNX" => {
                if d.strings.contains_key(&a[0]) {
                    Value::Int(0)
                } else {
                    d.strings.insert(a[0].clone(), a[1].clone());
                    Value::Int(1)
                }
            }
            "MGET" => Value::Array(
                a.iter()
                    .map(|k| d.strings.get(k).map_or(Value::Nil, |v| bulk(v)))
                    .collect(),
            ),
            "DEL" => {
                let removed = d.strings.remove(&a[0]).is_some()
                    | d.hashes.remove(&a[0]).is_some()
                    | d.sets.remove(&a[0]).is_some()
                    | d.lists.remove(&a[0]).is_some()
                    | d.zsets.remove(&a[0]).is_some()
                    | d.bits.remove(&a[0]).is_some();
                d.ttls.remove(&a[0]);
                Value::Int(removed as i64)
            }
            "EXPIRE" => {
                if d.strings.contains_key(&a[0]) {
                    d.ttls.insert(a[0].clone(), a[1].parse().unwrap_or(0));
                    Value::Int(1)
                } else {
                    Value::Int(0)
                }
            }
            "TTL" => Value::Int(match (d.strings.contains_key(&a[0]), d.ttls.get(&a[0])) {
                (false, _) => -2,
                (true, Some(ttl)) => *ttl,
                (true, None) => -1,
            }),
            "INCRBY" => {
                let current: i64 = d.strings.get(&a[0]).and_then(|v| v.parse().ok()).unwrap_or(0);
                let next = current + a[1].parse::<i64>().unwrap_or(0);
                d.strings.insert(a[0].clone(), next.to_string());
                Value::Int(next)
            }
            "INCRBYFLOAT" => {
                let current: f64 = d.strings.get(&a[0]).and_then(|v| v.parse().ok()).unwrap_or(0.0);
                let next = current + a[1].parse::<f64>().unwrap_or(0.0);
                d.strings.insert(a[0].clone(), next.to_string());
                bulk(&next.to_string())
            }
            "KEYS" => Value::Array(
                d.key_names()
                    .iter()
                    .filter(|k| glob(&a[0], k))
                    .map(|k| bulk(k))
                    .collect(),
            ),
            "HSET" => {
                let fresh = d
                    .hashes
                    .entry(a[0].clone())
                    .or_default()
                    .insert(a[1].clone(), a[2].clone())
                    .is_none();
                Value::Int(fresh as i64)
            }
            "HGET" => d
                .hashes
                .get(&a[0])
                .and_then(|h| h.get(&a[1]))
                .map_or(Value::Nil, |v| bulk(v)),
            "HMSET" => {
                let hash = d.hashes.entry(a[0].clone()).or_default();
                for pair in a[1..].chunks(2) {
                    hash.insert(pair[0].clone(), pair[1].clone());
                }
                Value::Okay
            }
            "HMGET" => {
                let hash = d.hashes.get(&a[0]);
                Value::Array(
                    a[1..]
                        .iter()
                        .map(|f| hash.and_then(|h| h.get(f)).map_or(Value::Nil, |v| bulk(v)))
                        .collect(),
                )
            }
            "HDEL" => {
                let removed = match d.hashes.get_mut(&a[0]) {
                    Some(hash) => a[1..].iter().filter(|f| hash.remove(*f).is_some()).count(),
                    None => 0,
                };
                Value::Int(removed as i64)
            }
            "HKEYS" => Value::Array(
                d.hashes
                    .get(&a[0])
                    .map(|h| h.keys().map(|k| bulk(k)).collect())
                    .unwrap_or_default(),
            ),
            "HGETALL" => Value::Array(
                d.hashes
                    .get(&a[0])
                    .map(|h| h.iter().flat_map(|(k, v)| [bulk(k), bulk(v)]).collect())
                    .unwrap_or_default(),
            ),
            "SADD" => {
                let set = d.sets.entry(a[0].clone()).or_default();
                let added = a[1..].iter().filter(|m| set.insert((*m).clone())).count();
                Value::Int(added as i64)
            }
            "SREM" => {
                let removed = match d.sets.get_mut(&a[0]) {
                    Some(set) => a[1..].iter().filter(|m| set.remove(*m)).count(),
                    None => 0,
                };
                Value::Int(removed as i64)
            }
            "SISMEMBER" => Value::Int(
                d.sets
                    .get(&a[0])
                    .map_or(false, |s| s.contains(&a[1])) as i64,
            ),
            "SMEMBERS" => Value::Array(
                d.sets
                    .get(&a[0])
                    .map(|s| s.iter().map(|m| bulk(m)).collect())
                    .unwrap_or_default(),
            ),
            "LPUSH" | "RPUSH" => {
                let list = d.lists.entry(a[0].clone()).or_default();
                if name == "LPUSH" {
                    list.push_front(a[1].clone());
                } else {
                    list.push_back(a[1].clone());
                }
                Value::Int(list.len() as i64)
            }
            "LPOP" => d
                .lists
                .get_mut(&a[0])
                .and_then(|l| l.pop_front())
                .map_or(Value::Nil, |v| bulk(&v)),
            "RPOP" => d
                .lists
                .get_mut(&a[0])
                .and_then(|l| l.pop_back())
                .map_or(Value::Nil, |v| bulk(&v)),
            "LLEN" => Value::Int(d.lists.get(&a[0]).map_or(0, |l| l.len()) as i64),
            "LRANGE" => {
                let list: Vec<String> = d
                    .lists
                    .get(&a[0])
                    .map(|l| l.iter().cloned().collect())
                    .unwrap_or_default();
                let (start, stop) = range(list.len(), &a[1], &a[2]);
                Value::Array(list[start..stop].iter().map(|v| bulk(v)).collect())
            }
            "SETBIT" => {
                let offset: usize = a[1].parse().unwrap_or(0);
                let bytes = d.bits.entry(a[0].clone()).or_default();
                if bytes.len() <= offset / 8 {
                    bytes.resize(offset / 8 + 1, 0);
                }
                let mask = 0x80u8 >> (offset % 8);
                let old = bytes[offset / 8] & mask != 0;
                if a[2] == "1" {
                    bytes[offset / 8] |= mask;
                } else {
                    bytes[offset / 8] &= !mask;
                }
                Value::Int(old as i64)
            }
            "GETBIT" => {
                let offset: usize = a[1].parse().unwrap_or(0);
                let byte = d.bits.get(&a[0]).and_then(|b| b.get(offset / 8)).copied();
                Value::Int(byte.map_or(0, |b| (b >> (7 - offset % 8)) & 1) as i64)
            }
            "BITCOUNT" => Value::Int(
                d.bits
                    .get(&a[0])
                    .map_or(0, |b| b.iter().map(|byte| byte.count_ones()).sum::<u32>())
                    as i64,
            ),
            "BITOP" => {
                let op = a[0].to_uppercase();
                let sources: Vec<Vec<u8>> = a[2..]
                    .iter()
                    .map(|k| d.bits.get(k).cloned().unwrap_or_default())
                    .collect();
                if op == "NOT" && sources.len() != 1 {
                    return Err(RedisError::from((
                        ErrorKind::ResponseError,
                        "BITOP NOT must be called with a single source key",
                    )));
                }
                let len = sources.iter().map(Vec::len).max().unwrap_or(0);
                let byte = |src: &Vec<u8>, i: usize| src.get(i).copied().unwrap_or(0);
                let out: Vec<u8> = (0..len)
                    .map(|i| {
                        let mut bytes = sources.iter().map(|src| byte(src, i));
                        let first = bytes.next().unwrap_or(0);
                        match op.as_str() {
                            "AND" => bytes.fold(first, |acc, b| acc & b),
                            "OR" => bytes.fold(first, |acc, b| acc | b),
                            "XOR" => bytes.fold(first, |acc, b| acc ^ b),
                            _ => !first,
                        }
                    })
                    .collect();
                if out.is_empty() {
                    d.bits.remove(&a[1]);
                } else {
                    d.bits.insert(a[1].clone(), out);
                }
                Value::Int(len as i64)
            }
            "ZADD" => {
                let score: f64 = a[1].parse().unwrap_or(0.0);
                let zset = d.zsets.entry(a[0].clone()).or_default();
                let fresh = match zset.iter_mut().find(|(m, _)| *m == a[2]) {
                    Some(entry) => {
                        entry.1 = score;
                        false
                    }
                    None => {
                        zset.push((a[2].clone(), score));
                        true
                    }
                };
                Value::Int(fresh as i64)
            }
            "ZREVRANGE" => {
                let mut zset = d.zsets.get(&a[0]).cloned().unwrap_or_default();
                zset.sort_by(|x, y| y.1.total_cmp(&x.1));
                let (start, stop) = range(zset.len(), &a[1], &a[2]);
                let with_scores = a.get(3).map_or(false, |f| f.eq_ignore_ascii_case("WITHSCORES"));
                Value::Array(
                    zset[start..stop]
                        .iter()
                        .flat_map(|(m, s)| {
                            let mut out = vec![bulk(m)];
                            if with_scores {
                                out.push(bulk(&s.to_string()));
                            }
                            out
                        })
                        .collect(),
                )
            }
            "ZSCORE" => d
                .zsets
                .get(&a[0])
                .and_then(|z| z.iter().find(|(m, _)| *m == a[1]))
                .map_or(Value::Nil, |(_, s)| bulk(&s.to_string())),
            _ => return Err(RedisError::from((ErrorKind::ResponseError, "unknown command"))),
        };
        Ok(value)
    }
}

/// Store-style glob supporting `*` and `?`.
fn glob(pattern: &str, key: &str) -> bool {
    fn matches(p: &[u8], k: &[u8]) -> bool {
        match p.split_first() {
            None => k.is_empty(),
            Some((b'*', rest)) => (0..=k.len()).any(|i| matches(rest, &k[i..])),
            Some((b'?', rest)) => !k.is_empty() && matches(rest, &k[1..]),
            Some((c, rest)) => k.first() == Some(c) && matches(rest, &k[1..]),
        }
    }
    matches(pattern.as_bytes(), key.as_bytes())
}

fn bulk(value: &str) -> Value {
    Value::BulkString(value.as_bytes().to_vec())
}

/// Inclusive store-style range turned into a slice range.
fn range(len: usize, start: &str, stop: &str) -> (usize, usize) {
    let len = len as i64;
    let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i };
    let start = norm(start.parse().unwrap_or(0)).min(len);
    let stop = (norm(stop.parse().unwrap_or(-1)) + 1).min(len);
    if start >= stop {
        (0, 0)
    } else {
        (start as usize, stop as usize)
    }
}

pub struct FakeDialer {
    pub store: Arc<FakeStore>,
}

impl FakeDialer {
    pub fn new(store: Arc<FakeStore>) -> Arc<Self> {
        Arc::new(Self { store })
    }
}

#[async_trait]
impl Dialer for FakeDialer {
    async fn dial(&self, _target: &Target) -> RedisResult<Box<dyn Transport>> {
        let limit = *self.store.fail_dial_after.lock().unwrap();
        if self.store.is_down()
            || self.store.refuse_dials.load(Ordering::SeqCst)
            || limit.map_or(false, |n| self.store.dials() >= n)
        {
            return Err(RedisError::from(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )));
        }
        let dial = self.store.dials.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTransport {
            store: self.store.clone(),
            dial,
        }))
    }
}

pub struct FakeTransport {
    store: Arc<FakeStore>,
    dial: usize,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn request(&mut self, cmd: &Cmd) -> RedisResult<Value> {
        self.store.requests.fetch_add(1, Ordering::SeqCst);
        let delay = self.store.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.store.is_down() || self.store.is_broken(self.dial) {
            return Err(RedisError::from(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection reset",
            )));
        }
        let args: Vec<String> = cmd
            .args_iter()
            .map(|arg| match arg {
                redis::Arg::Simple(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                redis::Arg::Cursor => "0".to_string(),
            })
            .collect();
        self.store.apply(&args)
    }

    async fn close(self: Box<Self>) {
        self.store.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn redis_settings(name: &str, pool_size: usize) -> RedisSettings {
    RedisSettings {
        name: name.to_string(),
        addr: "cache.test:6379".to_string(),
        password: None,
        db: 0,
        pool_size,
        dial_timeout_ms: 200,
        read_timeout_ms: 200,
        write_timeout_ms: 200,
        acquire_timeout_ms: 500,
        keepalive_interval_ms: 50,
        max_acquire_retries: 3,
    }
}

/// Polls `check` every 10ms until it holds or `within` runs out.
pub async fn eventually<F: Fn() -> bool>(within: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// ---------------------------------------------------------------------------
// Relational store fake
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every query returns one row.
    Rows,
    /// Every query finds nothing.
    Empty,
    /// The server cannot be reached.
    Down,
    /// The server rejects the statement.
    BadQuery,
    /// Answers after one second.
    Slow,
}

pub struct FakeNode {
    pub name: String,
    mode: Mutex<Mode>,
    prepare_ok: AtomicBool,
    hits: AtomicUsize,
    prepare_attempts: AtomicUsize,
    closed: AtomicBool,
    log: Mutex<Vec<String>>,
}

impl FakeNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mutex::new(Mode::Rows),
            prepare_ok: AtomicBool::new(true),
            hits: AtomicUsize::new(0),
            prepare_attempts: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn mode(&self) -> Mode {
        *self.mode.lock().unwrap()
    }

    pub fn set_prepare_ok(&self, ok: bool) {
        self.prepare_ok.store(ok, Ordering::SeqCst);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn prepare_attempts(&self) -> usize {
        self.prepare_attempts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    async fn answer(&self, query: &str, args: &[Arg]) -> Result<Option<FakeRow>, sqlx::Error> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        match self.mode() {
            Mode::Rows => Ok(Some(FakeRow {
                node: self.name.clone(),
                query: query.to_string(),
                args: args.to_vec(),
            })),
            Mode::Empty => Ok(None),
            Mode::Down => Err(refused()),
            Mode::BadQuery => Err(sqlx::Error::ColumnNotFound("missing".to_string())),
            Mode::Slow => {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(None)
            }
        }
    }
}

fn refused() -> sqlx::Error {
    sqlx::Error::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "refused",
    ))
}

#[derive(Debug, Clone)]
pub struct FakeRow {
    pub node: String,
    pub query: String,
    pub args: Vec<Arg>,
}

pub struct FakeBackend {
    node: Arc<FakeNode>,
}

#[async_trait]
impl Backend for FakeBackend {
    type Row = FakeRow;
    type Prepared = String;
    type Tx = FakeTx;

    fn addr(&self) -> &str {
        &self.node.name
    }

    async fn exec(&self, query: &str, args: &[Arg]) -> Result<ExecResult, sqlx::Error> {
        self.node.record(format!("exec {}", query));
        self.node.answer(query, args).await.map(|_| ExecResult {
            rows_affected: 1,
            last_insert_id: 0,
        })
    }

    async fn fetch_all(&self, query: &str, args: &[Arg]) -> Result<Vec<FakeRow>, sqlx::Error> {
        Ok(self.node.answer(query, args).await?.into_iter().collect())
    }

    async fn fetch_optional(&self, query: &str, args: &[Arg]) -> Result<Option<FakeRow>, sqlx::Error> {
        self.node.answer(query, args).await
    }

    async fn prepare(&self, query: &str) -> Result<String, sqlx::Error> {
        self.node.prepare_attempts.fetch_add(1, Ordering::SeqCst);
        if self.node.prepare_ok.load(Ordering::SeqCst) {
            Ok(query.to_string())
        } else {
            Err(refused())
        }
    }

    async fn exec_prepared(&self, stmt: &String, args: &[Arg]) -> Result<ExecResult, sqlx::Error> {
        self.exec(stmt, args).await
    }

    async fn fetch_all_prepared(&self, stmt: &String, args: &[Arg]) -> Result<Vec<FakeRow>, sqlx::Error> {
        self.fetch_all(stmt, args).await
    }

    async fn fetch_optional_prepared(
        &self,
        stmt: &String,
        args: &[Arg],
    ) -> Result<Option<FakeRow>, sqlx::Error> {
        self.fetch_optional(stmt, args).await
    }

    async fn begin(&self) -> Result<FakeTx, sqlx::Error> {
        if self.node.mode() == Mode::Down {
            return Err(refused());
        }
        self.node.record("begin".to_string());
        Ok(FakeTx {
            node: self.node.clone(),
            finished: false,
        })
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        match self.node.mode() {
            Mode::Down => Err(refused()),
            _ => Ok(()),
        }
    }

    async fn close(&self) {
        self.node.closed.store(true, Ordering::SeqCst);
    }
}

pub struct FakeTx {
    node: Arc<FakeNode>,
    finished: bool,
}

#[async_trait]
impl BackendTx for FakeTx {
    type Row = FakeRow;

    async fn exec(&mut self, query: &str, args: &[Arg]) -> Result<ExecResult, sqlx::Error> {
        self.node.record(format!("tx exec {}", query));
        self.node.answer(query, args).await.map(|_| ExecResult {
            rows_affected: 1,
            last_insert_id: 0,
        })
    }

    async fn fetch_all(&mut self, query: &str, args: &[Arg]) -> Result<Vec<FakeRow>, sqlx::Error> {
        Ok(self.node.answer(query, args).await?.into_iter().collect())
    }

    async fn fetch_optional(&mut self, query: &str, args: &[Arg]) -> Result<Option<FakeRow>, sqlx::Error> {
        self.node.answer(query, args).await
    }

    async fn commit(mut self) -> Result<(), sqlx::Error> {
        self.finished = true;
        self.node.record("commit".to_string());
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), sqlx::Error> {
        self.finished = true;
        self.node.record("rollback".to_string());
        Ok(())
    }
}

impl Drop for FakeTx {
    fn drop(&mut self) {
        if !self.finished {
            self.node.record("rollback on drop".to_string());
        }
    }
}

/// Hands out one [`FakeNode`] per DSN; the same DSN always maps to the same node.
#[derive(Default)]
pub struct FakeConnector {
    nodes: Mutex<HashMap<String, Arc<FakeNode>>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, dsn: &str) {
        self.failing.lock().unwrap().insert(dsn.to_string());
    }

    pub fn node(&self, dsn: &str) -> Arc<FakeNode> {
        self.nodes
            .lock()
            .unwrap()
            .entry(dsn.to_string())
            .or_insert_with(|| Arc::new(FakeNode::new(dsn)))
            .clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Backend = FakeBackend;

    async fn connect(&self, dsn: &str, _settings: &DatabaseSettings) -> Result<FakeBackend, sqlx::Error> {
        if self.failing.lock().unwrap().contains(dsn) {
            return Err(refused());
        }
        Ok(FakeBackend {
            node: self.node(dsn),
        })
    }
}

pub fn db_settings(write: &str, reads: &[&str]) -> DatabaseSettings {
    DatabaseSettings {
        dsn: write.to_string(),
        read_dsn: reads.iter().map(|dsn| dsn.to_string()).collect(),
        active: 4,
        idle: 0,
        idle_timeout_secs: 0,
        query_timeout_ms: 200,
        exec_timeout_ms: 200,
        tran_timeout_ms: 500,
        prepare_retry_initial_ms: 20,
        prepare_retry_max_ms: 50,
    }
}

// ---------------------------------------------------------------------------
// HTTP app
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub address: String,
    pub db: MySqlGroup,
}

/// Starts the server on a random port against a MySQL address nothing
/// listens on, with no cache pools.
pub async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let settings = Settings {
        app_host: "127.0.0.1".to_string(),
        app_port: port,
        sid: 1,
        read_timeout_secs: 5,
        write_timeout_secs: 5,
        user_cache_ttl_secs: 60,
        database: db_settings("root:root@tcp(127.0.0.1:1)/users", &[]),
        redis: vec![],
    };

    let db = MySqlGroup::open_mysql(&settings.database)
        .await
        .expect("Failed to open lazy database group");
    let caches = Arc::new(CacheRegistry::new());

    let server = appserver::startup::run(listener, settings, db.clone(), caches)
        .await
        .expect("Failed to bind address.");
    let _ = tokio::spawn(server);

    TestApp { address, db }
}
