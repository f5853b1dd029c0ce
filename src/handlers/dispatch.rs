// trigger traffic entry point
use actix_web::{web, HttpRequest, HttpResponse};

use crate::routing::function_router::FunctionRouter;
use crate::routing::router_error::RouterError;

pub async fn handle_request(
    req: HttpRequest,
    body: web::Bytes,
    router: web::Data<FunctionRouter>,
) -> Result<HttpResponse, RouterError> {
    router.dispatch(&req, body).await
}

pub async fn healthz() -> HttpResponse {
    HttpResponse::Ok().finish()
}
