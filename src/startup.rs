use crate::cache::CacheRegistry;
use crate::configuration::Settings;
use crate::database::MySqlGroup;
use crate::health::HealthChecker;
use crate::routes;
use crate::services::UserService;
use actix_web::{dev::Server, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tracing_actix_web::TracingLogger;

pub async fn run(
    listener: TcpListener,
    settings: Settings,
    db: MySqlGroup,
    caches: Arc<CacheRegistry>,
) -> Result<Server, std::io::Error> {
    let user_service = web::Data::new(UserService::new(
        Arc::new(db.clone()),
        caches.primary(),
        settings.user_cache_ttl_secs,
    ));
    let health_checker = web::Data::new(HealthChecker::new(db, caches));

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(user_service.clone())
            .app_data(health_checker.clone())
            .service(routes::index)
            .service(routes::health_check)
            .service(routes::user_info)
    })
    .client_request_timeout(Duration::from_secs(settings.read_timeout_secs))
    .client_disconnect_timeout(Duration::from_secs(settings.write_timeout_secs))
    .listen(listener)?
    .run();

    Ok(server)
}
