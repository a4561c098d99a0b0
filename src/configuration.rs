use std::time::Duration;

/// Ports below this are reserved for other services on the host.
pub const MIN_APP_PORT: u16 = 8000;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Settings {
    pub app_host: String,
    pub app_port: u16,
    #[serde(default)]
    pub sid: u32,
    #[serde(default = "default_http_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_user_cache_ttl_secs")]
    pub user_cache_ttl_secs: u64,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub redis: Vec<RedisSettings>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DatabaseSettings {
    /// Write (master) data source name.
    pub dsn: String,
    /// Read replica data source names, in rotation order.
    #[serde(default)]
    pub read_dsn: Vec<String>,
    #[serde(default = "default_active")]
    pub active: u32,
    #[serde(default = "default_idle")]
    pub idle: u32,
    #[serde(default)]
    pub idle_timeout_secs: u64,
    // Zero means "not configured"; the router refuses to start without all three.
    #[serde(default)]
    pub query_timeout_ms: u64,
    #[serde(default)]
    pub exec_timeout_ms: u64,
    #[serde(default)]
    pub tran_timeout_ms: u64,
    #[serde(default = "default_prepare_retry_initial_ms")]
    pub prepare_retry_initial_ms: u64,
    #[serde(default = "default_prepare_retry_max_ms")]
    pub prepare_retry_max_ms: u64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RedisSettings {
    pub name: String,
    /// `host:port` of the cache store.
    pub addr: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub db: i64,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_cache_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[serde(default = "default_cache_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_cache_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_cache_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default = "default_cache_timeout_ms")]
    pub keepalive_interval_ms: u64,
    #[serde(default = "default_max_acquire_retries")]
    pub max_acquire_retries: u32,
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_user_cache_ttl_secs() -> u64 {
    300
}

fn default_active() -> u32 {
    10
}

fn default_idle() -> u32 {
    5
}

fn default_prepare_retry_initial_ms() -> u64 {
    1000
}

fn default_prepare_retry_max_ms() -> u64 {
    30_000
}

fn default_pool_size() -> usize {
    5
}

fn default_cache_timeout_ms() -> u64 {
    2000
}

fn default_max_acquire_retries() -> u32 {
    3
}

impl Settings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.app_host, self.app_port)
    }
}

impl DatabaseSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_millis(self.exec_timeout_ms)
    }

    pub fn tran_timeout(&self) -> Duration {
        Duration::from_millis(self.tran_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn has_timeouts(&self) -> bool {
        self.query_timeout_ms != 0 && self.exec_timeout_ms != 0 && self.tran_timeout_ms != 0
    }
}

impl RedisSettings {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    /// A single request covers one write and one read, so the larger bound wins.
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(self.write_timeout_ms))
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    get_configuration_from("configuration")
}

pub fn get_configuration_from(name: &str) -> Result<Settings, config::ConfigError> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // `configuration.yaml` (or .json/.toml) first, then APP__SECTION__KEY overrides
    let settings = config::Config::builder()
        .add_source(config::File::with_name(name))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize()
}
