//! Simulated layers and the model-selection ladder.

use land_impact_expr::{Area, Image, LinearFit, ReduceRequest, Shape};
use land_impact_provider::ComputeProvider;
use land_impact_simulation_models::{CalibrationModel, ModelPath};

use crate::region::{AnalysisRegion, BaseLayers};
use crate::scenario::ScenarioModifiers;

/// Fallback temperature model: `35 - 10·ndvi`.
pub const DEFAULT_TEMP_FIT: LinearFit = LinearFit {
    scale: -10.0,
    offset: 35.0,
};

/// Fallback air-quality model: `50 - 20·ndvi`.
pub const DEFAULT_AQ_FIT: LinearFit = LinearFit {
    scale: -20.0,
    offset: 50.0,
};

/// Temperature used where the prediction has no data, before the offset.
pub const TEMP_FILL: f64 = 25.0;

/// Air quality used where the prediction has no data, before the offset.
pub const AQ_FILL: f64 = 30.0;

/// Pixel scale of the single-variable fallback fit.
pub const SIMPLE_FIT_SCALE_M: f64 = 1000.0;

/// The model chosen for a region, from richest to simplest.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionModel {
    /// Region calibration with the built-up term.
    Calibrated(CalibrationModel),
    /// Same-session single-variable fits on vegetation.
    Simple { temp: LinearFit, aq: LinearFit },
    /// Fixed coefficients.
    Default,
}

impl RegionModel {
    /// Walks the ladder: calibration, then simple fits, then defaults.
    ///
    /// Never fails; each rung that cannot be used is logged and skipped.
    pub async fn resolve(
        provider: &dyn ComputeProvider,
        region: &AnalysisRegion,
        layers: &BaseLayers,
        calibration: Option<CalibrationModel>,
    ) -> Self {
        if let Some(model) = calibration {
            log::info!("Simulating with calibrated model");
            return Self::Calibrated(model);
        }

        let temp = simple_fit(provider, region.area(), &layers.ndvi, &layers.temperature).await;
        let aq = simple_fit(provider, region.area(), &layers.ndvi, &layers.air_quality).await;
        if let (Some(temp), Some(aq)) = (temp, aq) {
            log::info!(
                "Simulating with simple model: temp = {:.3}·ndvi + {:.3}, aq = {:.3}·ndvi + {:.3}",
                temp.scale,
                temp.offset,
                aq.scale,
                aq.offset
            );
            return Self::Simple { temp, aq };
        }

        log::info!("Simulating with default coefficients");
        Self::Default
    }

    /// The ladder rung this model sits on.
    #[must_use]
    pub const fn path(&self) -> ModelPath {
        match self {
            Self::Calibrated(_) => ModelPath::Complex,
            Self::Simple { .. } => ModelPath::Simple,
            Self::Default => ModelPath::Default,
        }
    }

    fn predict_temperature(&self, ndvi: &Image, ndbi: &Image) -> Image {
        match self {
            Self::Calibrated(model) => {
                let t = model.temperature;
                ndvi.clone() * t.b1 + ndbi.clone() * t.b2 + t.b0
            }
            Self::Simple { temp, .. } => temp.predict(ndvi.clone()),
            Self::Default => DEFAULT_TEMP_FIT.predict(ndvi.clone()),
        }
    }

    fn predict_air_quality(&self, ndvi: &Image) -> Image {
        match self {
            Self::Calibrated(model) => {
                let a = model.air_quality;
                ndvi.clone() * a.a1 + a.a0
            }
            Self::Simple { aq, .. } => aq.predict(ndvi.clone()),
            Self::Default => DEFAULT_AQ_FIT.predict(ndvi.clone()),
        }
    }
}

async fn simple_fit(
    provider: &dyn ComputeProvider,
    area: Area,
    x: &Image,
    y: &Image,
) -> Option<LinearFit> {
    let request = ReduceRequest::linear_fit(x.clone(), y.clone(), area, SIMPLE_FIT_SCALE_M);
    match provider.reduce_region(&request).await {
        Ok(out) => out
            .fit()
            .filter(|f| f.scale.is_finite() && f.offset.is_finite()),
        Err(e) => {
            log::warn!("Simple fit failed: {e}");
            None
        }
    }
}

/// Scenario layers. Only pixels inside the mask carry the scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedLayers {
    /// Temperature, °C.
    pub temperature: Image,
    /// Vegetation with the target painted into the mask.
    pub ndvi: Image,
    /// Air quality clamped to `[0, 100]`.
    pub air_quality: Image,
    /// Model rung used for the predictions.
    pub model: ModelPath,
}

/// Applies scenario modifiers inside `mask`.
///
/// Vegetation is replaced inside the mask and the chosen model re-predicts
/// temperature and air quality over the whole layer, so boundary pixels stay
/// continuous with their surroundings. Offsets are added inside the mask
/// only. Pixels without a prediction fall back to a constant plus the offset.
#[must_use]
pub fn simulate(
    layers: &BaseLayers,
    model: &RegionModel,
    mask: &Shape,
    modifiers: &ScenarioModifiers,
) -> SimulatedLayers {
    let inside = Image::paint(Area::new(mask.clone()));
    let ndvi = layers
        .ndvi
        .clone()
        .where_mask(inside.clone(), modifiers.target_ndvi.clone());

    let temp_pred = model.predict_temperature(&ndvi, &layers.ndbi);
    let temperature = temp_pred
        .clone()
        .where_mask(inside.clone(), temp_pred + modifiers.temp_offset)
        .unmask(TEMP_FILL + modifiers.temp_offset);

    let aq_pred = model.predict_air_quality(&ndvi);
    let air_quality = aq_pred
        .clone()
        .where_mask(inside, aq_pred + modifiers.aq_offset)
        .unmask(AQ_FILL + modifiers.aq_offset)
        .clamp(0.0, 100.0);

    SimulatedLayers {
        temperature,
        ndvi,
        air_quality,
        model: model.path(),
    }
}
