use actix_web::http::header::ContentType;
use actix_web::{HttpResponse, Responder, get, web};
use tracing::debug;

use crate::status::StatusSource;

macros_utils::routes! {
    route health_route,
}

/// Health check route
/// Any GET path answers 200 with a plain-text status line.
#[get("/{tail:.*}")]
pub async fn health_route(source: web::Data<dyn StatusSource>) -> impl Responder {
    let snapshot = source.snapshot().await;
    debug!(phase = %snapshot.phase, pending = snapshot.pending, "liveness probe");

    HttpResponse::Ok().content_type(ContentType::plaintext()).body(snapshot.to_string())
}
