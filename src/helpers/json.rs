use actix_web::body::BoxBody;
use actix_web::{HttpRequest, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

/// Envelope for API replies. The HTTP status is always 200; the outcome is
/// carried in `code`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonResponse<T = serde_json::Value> {
    pub code: u16,
    pub error: String,
    pub result: Option<T>,
}

impl<T> JsonResponse<T> {
    pub fn ok(result: T) -> Self {
        Self {
            code: 200,
            error: String::new(),
            result: Some(result),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self::error(404, message, "Object not found")
    }

    pub fn internal_error(message: &str) -> Self {
        Self::error(500, message, "Internal error")
    }

    fn error(code: u16, message: &str, fallback: &str) -> Self {
        let error = if message.trim().is_empty() {
            fallback.to_string()
        } else {
            message.to_string()
        };
        Self {
            code,
            error,
            result: None,
        }
    }
}

impl<T: Serialize> Responder for JsonResponse<T> {
    type Body = BoxBody;

    fn respond_to(self, _req: &HttpRequest) -> HttpResponse<Self::Body> {
        HttpResponse::Ok().json(self)
    }
}
