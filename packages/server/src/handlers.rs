//! HTTP handler functions for the land impact API.

use actix_web::{HttpResponse, web};
use land_impact_server_models::{ApiEnvelope, ApiHealth, LayerKpi, LayerQueryParams, LayerTile};
use land_impact_simulation::SimulationError;
use land_impact_simulation_models::{Layer, SimulationRequest};
use serde::Serialize;

use crate::AppState;

fn success<T: Serialize>(message: &str, payload: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiEnvelope::success(message, payload))
}

/// Maps an engine error to 400 for caller mistakes and 500 otherwise.
fn failure(what: &str, e: &SimulationError) -> HttpResponse {
    if e.is_validation() {
        log::warn!("Rejected {what} request: {e}");
        HttpResponse::BadRequest().json(ApiEnvelope::<()>::error(e.to_string()))
    } else {
        log::error!("Failed to {what}: {e}");
        HttpResponse::InternalServerError().json(ApiEnvelope::<()>::error(format!(
            "Failed to {what}: {e}"
        )))
    }
}

fn parse_layer(name: &str) -> Result<Layer, HttpResponse> {
    name.parse().map_err(|_| {
        HttpResponse::NotFound().json(ApiEnvelope::<()>::error(format!(
            "Unknown layer '{name}', expected one of temp, ndvi, aq"
        )))
    })
}

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    success(
        "ok",
        ApiHealth {
            healthy: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
            provider: state.engine.provider().name().to_string(),
        },
    )
}

/// `POST /geo/simulate`
///
/// Simulates a single geometry and returns its impact report.
pub async fn simulate(
    state: web::Data<AppState>,
    body: web::Json<SimulationRequest>,
) -> HttpResponse {
    match state.engine.simulate(&body).await {
        Ok(report) => success("Simulation complete", report),
        Err(e) => failure("simulate", &e),
    }
}

/// `POST /geo/simulate-polygons`
///
/// Simulates every geometry of the request; one `{report, error}` entry
/// per geometry.
pub async fn simulate_polygons(
    state: web::Data<AppState>,
    body: web::Json<SimulationRequest>,
) -> HttpResponse {
    match state.engine.simulate_batch(&body).await {
        Ok(entries) => success("Batch simulation complete", entries),
        Err(e) => failure("simulate polygons", &e),
    }
}

/// `POST /geo/simulate-tiles`
///
/// Like `simulate-polygons`, with simulated-layer tile URLs per entry.
pub async fn simulate_tiles(
    state: web::Data<AppState>,
    body: web::Json<SimulationRequest>,
) -> HttpResponse {
    match state.engine.simulate_tiles(&body).await {
        Ok(entries) => success("Tiled simulation complete", entries),
        Err(e) => failure("simulate tiles", &e),
    }
}

/// `GET /geo/get-initial-data/{layer}`
///
/// Tile URL of a baseline layer over the requested region.
pub async fn initial_data(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<LayerQueryParams>,
) -> HttpResponse {
    let layer = match parse_layer(&path) {
        Ok(layer) => layer,
        Err(response) => return response,
    };

    match state
        .engine
        .baseline_tile(params.latitude, params.longitude, params.buffer, layer)
        .await
    {
        Ok(url) => success("Layer rendered", LayerTile { url, layer }),
        Err(e) => failure("render layer", &e),
    }
}

/// `GET /geo/get-kpis/{layer}`
///
/// Zonal mean of a baseline layer over the requested region.
pub async fn kpis(
    state: web::Data<AppState>,
    path: web::Path<String>,
    params: web::Query<LayerQueryParams>,
) -> HttpResponse {
    let layer = match parse_layer(&path) {
        Ok(layer) => layer,
        Err(response) => return response,
    };

    match state
        .engine
        .baseline_kpi(params.latitude, params.longitude, params.buffer, layer)
        .await
    {
        Ok(value) => success("KPI computed", LayerKpi { layer, value }),
        Err(e) => failure("compute KPI", &e),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use chrono::NaiveDate;
    use land_impact_provider::local::LocalProvider;
    use land_impact_simulation::batch::ImpactEngine;
    use serde_json::{Value, json};

    use super::*;
    use crate::configure;

    fn state() -> web::Data<AppState> {
        let engine = ImpactEngine::from_provider(
            Arc::new(LocalProvider::new()),
            PathBuf::from("/nonexistent/industry_model.json"),
        )
        .with_today(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap());
        web::Data::new(AppState {
            engine: Arc::new(engine),
        })
    }

    fn polygon() -> Value {
        json!({
            "type": "Polygon",
            "coordinates": [[
                [0.0, 0.0], [0.05, 0.0], [0.05, 0.05], [0.0, 0.05], [0.0, 0.0]
            ]]
        })
    }

    #[actix_web::test]
    async fn health_reports_provider() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["payload"]["provider"], "local");
    }

    #[actix_web::test]
    async fn missing_coordinates_are_bad_requests() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/geo/simulate")
            .set_json(json!({"buffer": 1000, "geometry": polygon(), "preset": "green_area"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("latitude"));
        assert!(body["payload"].is_null());
    }

    #[actix_web::test]
    async fn malformed_json_is_a_bad_request() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/geo/simulate")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "error");
    }

    #[actix_web::test]
    async fn batch_returns_one_entry_per_geometry() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/geo/simulate-polygons")
            .set_json(json!({
                "latitude": 0.0,
                "longitude": 0.0,
                "buffer": 5000,
                "preset": "green_area",
                "geometry": [polygon(), {"type": "Point", "coordinates": [0.0, 0.0]}]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        let entries = body["payload"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0]["report"].is_object());
        assert!(entries[1]["report"].is_null());
        assert!(entries[1]["error"].is_string());
    }

    #[actix_web::test]
    async fn unknown_layer_is_not_found() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let req = test::TestRequest::get()
            .uri("/geo/get-kpis/humidity?latitude=0&longitude=0&buffer=1000")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn kpi_without_imagery_is_null() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let req = test::TestRequest::get()
            .uri("/geo/get-kpis/temp?latitude=0&longitude=0&buffer=1000")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["payload"]["layer"], "temp");
        assert!(body["payload"]["value"].is_null());
    }

    #[actix_web::test]
    async fn initial_data_returns_tile_template() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let req = test::TestRequest::get()
            .uri("/geo/get-initial-data/ndvi?latitude=0&longitude=0&buffer=1000")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["payload"]["layer"], "ndvi");
        assert!(
            body["payload"]["url"]
                .as_str()
                .unwrap()
                .starts_with("local://tiles/")
        );
    }
}
