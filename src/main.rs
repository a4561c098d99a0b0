use anyhow::Context as _;
use appserver::cache::{CacheRegistry, RedisDialer};
use appserver::configuration::{get_configuration_from, MIN_APP_PORT};
use appserver::database::MySqlGroup;
use appserver::startup::run;
use appserver::telemetry::{get_subscriber, init_subscriber};
use clap::Parser;
use std::net::TcpListener;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "server", about = "User info service")]
struct Cli {
    /// Configuration file name, without extension.
    #[arg(long, default_value = "configuration")]
    config: String,
    /// Listen port; overrides the configuration file.
    #[arg(short, long)]
    port: Option<u16>,
    /// Server id.
    #[arg(short, long)]
    sid: Option<u32>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = get_subscriber("appserver".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let mut settings = get_configuration_from(&cli.config).context("Failed to read configuration.")?;
    if let Some(port) = cli.port {
        settings.app_port = port;
    }
    if let Some(sid) = cli.sid {
        settings.sid = sid;
    }
    if settings.app_port < MIN_APP_PORT {
        anyhow::bail!("port {} is reserved, use {} or above", settings.app_port, MIN_APP_PORT);
    }

    tracing::info!(
        write = %appserver::database::mysql::parse_dsn_addr(&settings.database.dsn),
        replicas = settings.database.read_dsn.len(),
        "Opening database group"
    );
    let db = MySqlGroup::open_mysql(&settings.database)
        .await
        .context("Failed to open database.")?;

    let caches = match CacheRegistry::connect_all(&settings.redis, Arc::new(RedisDialer)).await {
        Ok(caches) => Arc::new(caches),
        Err(err) => {
            db.close().await;
            return Err(err).context("Failed to open cache pools.");
        }
    };

    let address = settings.address();
    tracing::info!(sid = settings.sid, "Start server at {:?}", &address);
    let listener =
        TcpListener::bind(&address).with_context(|| format!("failed to bind to {}", address))?;

    let server = run(listener, settings, db.clone(), caches.clone()).await?;
    let served = server.await;

    caches.close().await;
    db.close().await;
    tracing::info!("Server stopped");

    served.context("Server error.")
}
