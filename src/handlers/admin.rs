// controller-facing management API
use actix_web::{web, HttpResponse};
use serde::Serialize;

use super::dispatch::healthz;
use crate::routing::function_identity::FunctionIdentity;
use crate::routing::function_router::FunctionRouter;
use crate::routing::router_error::RouterError;
use crate::routing::trigger::TriggerDefinition;

#[derive(Serialize)]
struct TriggersUpdated {
    triggers: usize,
}

#[derive(Serialize)]
struct FunctionRemoved {
    removed: bool,
}

pub fn configure_admin(cfg: &mut web::ServiceConfig) {
    cfg.route("/router-healthz", web::get().to(healthz))
        .service(
            web::resource("/v1/triggers")
                .route(web::get().to(list_triggers))
                .route(web::put().to(replace_triggers)),
        )
        .route(
            "/v1/functions/{namespace}/{name}",
            web::delete().to(remove_function),
        );
}

pub async fn replace_triggers(
    payload: web::Json<Vec<TriggerDefinition>>,
    router: web::Data<FunctionRouter>,
) -> Result<HttpResponse, RouterError> {
    let triggers = router.update_triggers(payload.into_inner()).map_err(|e| {
        log::error!("rejected trigger update: {}", e);
        e
    })?;
    Ok(HttpResponse::Ok().json(TriggersUpdated { triggers }))
}

pub async fn list_triggers(router: web::Data<FunctionRouter>) -> HttpResponse {
    HttpResponse::Ok().json(router.triggers())
}

pub async fn remove_function(
    path: web::Path<(String, String)>,
    router: web::Data<FunctionRouter>,
) -> HttpResponse {
    let (namespace, name) = path.into_inner();
    let removed = router.remove_function(&FunctionIdentity::new(&name, &namespace));
    HttpResponse::Ok().json(FunctionRemoved { removed })
}
