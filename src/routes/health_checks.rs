use crate::database::MySqlBackend;
use crate::health::HealthChecker;
use actix_web::{get, web, HttpResponse};

#[tracing::instrument(name = "Health check", skip(checker))]
#[get("/health_check")]
pub async fn health_check(checker: web::Data<HealthChecker<MySqlBackend>>) -> HttpResponse {
    let report = checker.check_all().await;
    if report.is_serving() {
        HttpResponse::Ok().json(report)
    } else {
        HttpResponse::ServiceUnavailable().json(report)
    }
}

#[get("/")]
pub async fn index() -> HttpResponse {
    HttpResponse::Ok().body("server test")
}
