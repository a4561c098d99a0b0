use crate::database::Context;
use crate::helpers::JsonResponse;
use crate::services::UserService;
use actix_web::{get, web};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct UserInfoQuery {
    uid: Option<String>,
}

impl UserInfoQuery {
    /// Anything that is not a positive integer reads as 0.
    fn uid(&self) -> i64 {
        self.uid
            .as_deref()
            .and_then(|uid| uid.trim().parse().ok())
            .unwrap_or(0)
    }
}

#[tracing::instrument(name = "Get user info.", skip(service))]
#[get("/user/info")]
pub async fn user_info(
    query: web::Query<UserInfoQuery>,
    service: web::Data<UserService>,
) -> JsonResponse {
    let uid = query.uid();
    if uid <= 0 {
        return JsonResponse::not_found("invalid uid");
    }

    match service.user_info(&Context::background(), uid).await {
        Ok(Some(user)) => JsonResponse::ok(serde_json::json!({ "uInfo": user })),
        Ok(None) => JsonResponse::not_found("user not found"),
        Err(err) => {
            tracing::error!("Failed to get user {}: {}", uid, err);
            JsonResponse::internal_error("")
        }
    }
}
