#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the land impact engine.
//!
//! A thin adapter: handlers decode requests, call [`ImpactEngine`] and wrap
//! the result in the `{status, message, payload}` envelope. The compute
//! provider is built once from the environment at startup and shared by
//! every worker.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, error, middleware, web};
use land_impact_provider::config::ProviderConfig;
use land_impact_server_models::ApiEnvelope;
use land_impact_simulation::batch::ImpactEngine;

/// Shared application state.
pub struct AppState {
    /// Simulation engine over the process-wide provider.
    pub engine: Arc<ImpactEngine>,
}

/// Registers the API routes.
///
/// Malformed JSON bodies are answered with a 400 envelope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        error::InternalError::from_response(
            err,
            HttpResponse::BadRequest().json(ApiEnvelope::<()>::error(message)),
        )
        .into()
    }))
    .service(web::scope("/api").route("/health", web::get().to(handlers::health)))
    .service(
        web::scope("/geo")
            .route("/simulate", web::post().to(handlers::simulate))
            .route("/simulate-polygons", web::post().to(handlers::simulate_polygons))
            .route("/simulate-tiles", web::post().to(handlers::simulate_tiles))
            .route(
                "/get-initial-data/{layer}",
                web::get().to(handlers::initial_data),
            )
            .route("/get-kpis/{layer}", web::get().to(handlers::kpis)),
    );
}

/// Starts the land impact API server.
///
/// Builds the compute provider from `LAND_IMPACT_*` variables, loads the
/// industry model path from `INDUSTRY_MODEL_PATH` and binds to
/// `BIND_ADDR`:`PORT`. The caller provides the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the provider cannot be configured
/// or the HTTP server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    log::info!("Configuring compute provider...");
    let provider = ProviderConfig::from_env()
        .and_then(ProviderConfig::connect)
        .map_err(|e| std::io::Error::other(format!("Failed to configure provider: {e}")))?;

    let model_path = land_impact_industry::model_path_from_env();
    log::info!("Industry model path: {}", model_path.display());

    let state = web::Data::new(AppState {
        engine: Arc::new(ImpactEngine::from_provider(provider, model_path)),
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
