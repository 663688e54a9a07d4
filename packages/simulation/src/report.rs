//! Zonal statistics and before/after reports.

use land_impact_expr::{Area, Image, ReduceRequest, Shape};
use land_impact_provider::{ComputeProvider, value_or_none};
use land_impact_simulation_models::{ImpactReport, Layer, MetricSet};

use crate::engine::SimulatedLayers;
use crate::region::{AnalysisRegion, BaseLayers};

/// Reduction scale for temperature, metres.
pub const TEMP_SCALE_M: f64 = 1000.0;
/// Reduction scale for vegetation, metres.
pub const NDVI_SCALE_M: f64 = 30.0;
/// Reduction scale for air quality, metres.
pub const AQ_SCALE_M: f64 = 500.0;

/// Native-resolution scale for a layer.
#[must_use]
pub const fn scale_for(layer: Layer) -> f64 {
    match layer {
        Layer::Temp => TEMP_SCALE_M,
        Layer::Ndvi => NDVI_SCALE_M,
        Layer::Aq => AQ_SCALE_M,
    }
}

async fn zonal_mean(
    provider: &dyn ComputeProvider,
    image: &Image,
    area: &Area,
    layer: Layer,
    label: &str,
) -> Option<f64> {
    let request = ReduceRequest::mean(image.clone(), area.clone(), scale_for(layer));
    value_or_none(provider, &request, &format!("{label} {layer}")).await
}

/// Zonal means of a temperature/vegetation/air-quality triple.
pub async fn measure(
    provider: &dyn ComputeProvider,
    temperature: &Image,
    ndvi: &Image,
    air_quality: &Image,
    area: &Area,
    label: &str,
) -> MetricSet {
    MetricSet {
        temp_c_mean: zonal_mean(provider, temperature, area, Layer::Temp, label).await,
        ndvi_mean: zonal_mean(provider, ndvi, area, Layer::Ndvi, label).await,
        aq_mean_0_100: zonal_mean(provider, air_quality, area, Layer::Aq, label).await,
    }
}

/// Reduces baseline and simulated layers over `geometry`, widened by
/// `report_buffer_m` when given, and computes deltas.
pub async fn assemble(
    provider: &dyn ComputeProvider,
    layers: &BaseLayers,
    simulated: &SimulatedLayers,
    geometry: &Shape,
    report_buffer_m: Option<f64>,
    preset_name: &str,
) -> ImpactReport {
    let mut area = Area::new(geometry.clone());
    if let Some(buffer) = report_buffer_m {
        area = area.buffered(buffer);
    }

    let baseline = measure(
        provider,
        &layers.temperature,
        &layers.ndvi,
        &layers.air_quality,
        &area,
        "baseline",
    )
    .await;
    let post = measure(
        provider,
        &simulated.temperature,
        &simulated.ndvi,
        &simulated.air_quality,
        &area,
        "simulated",
    )
    .await;

    ImpactReport {
        preset_name: preset_name.to_string(),
        delta: baseline.delta_to(&post),
        baseline,
        post,
        model: simulated.model,
    }
}

/// Baseline image for a named layer.
#[must_use]
pub fn baseline_image(layers: &BaseLayers, layer: Layer) -> &Image {
    match layer {
        Layer::Temp => &layers.temperature,
        Layer::Ndvi => &layers.ndvi,
        Layer::Aq => &layers.air_quality,
    }
}

/// Zonal mean of one baseline layer over the whole region.
pub async fn initial_kpi(
    provider: &dyn ComputeProvider,
    region: &AnalysisRegion,
    layers: &BaseLayers,
    layer: Layer,
) -> Option<f64> {
    zonal_mean(
        provider,
        baseline_image(layers, layer),
        &region.area(),
        layer,
        "initial",
    )
    .await
}
