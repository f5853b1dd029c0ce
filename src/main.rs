// HTTP entry point
use actix_web::{web, App, HttpServer};
use std::io;
use std::sync::Arc;

use function_router::handlers::{admin::configure_admin, dispatch};
use function_router::routing::backend_resolver::ExecutorClient;
use function_router::routing::function_router::FunctionRouter;
use function_router::routing::router_config::{load_triggers, RouterConfig};
use function_router::routing::router_error::RouterError;
use function_router::routing::service_cache::FunctionServiceCache;

fn startup_error(e: RouterError) -> io::Error {
    log::error!("router failed to start: {}", e);
    io::Error::new(io::ErrorKind::Other, e)
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RouterConfig::from_env().map_err(startup_error)?;
    log::info!("starting router with {:?}", config);

    let cache = Arc::new(FunctionServiceCache::new(config.cache_ttl, config.cache_capacity));
    let _sweeper = cache.spawn_sweeper(config.cache_sweep_interval);

    let executor = ExecutorClient::new(config.executor_url.clone()).map_err(startup_error)?;
    let router = web::Data::new(FunctionRouter::new(config.retry, cache, Arc::new(executor)));

    if let Some(path) = &config.triggers_file {
        let triggers = load_triggers(path).map_err(startup_error)?;
        router.update_triggers(triggers).map_err(startup_error)?;
    }

    let max_body_bytes = config.max_body_bytes;
    let ingress_router = router.clone();
    let ingress = HttpServer::new(move || {
        App::new()
            .app_data(ingress_router.clone())
            .app_data(web::PayloadConfig::new(max_body_bytes))
            .route("/router-healthz", web::get().to(dispatch::healthz))
            .default_service(web::to(dispatch::handle_request))
    })
    .bind(&config.listen_addr)? // ingress
    .run();

    let admin = HttpServer::new(move || App::new().app_data(router.clone()).configure(configure_admin))
        .workers(1)
        .bind(&config.admin_addr)?
        .run();

    log::info!(
        "serving triggers on {}, admin on {}",
        config.listen_addr,
        config.admin_addr
    );
    tokio::try_join!(ingress, admin)?;
    Ok(())
}
