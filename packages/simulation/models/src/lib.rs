#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Scenario, calibration and impact report types.
//!
//! These are the values that cross the boundary of the simulation engine:
//! what a caller asks for ([`SimulationRequest`], [`ScenarioKind`], the
//! attribute bundles) and what comes back ([`ImpactReport`], [`ReportEntry`],
//! [`TiledReportEntry`]). Metric values are `Option<f64>` throughout and
//! serialize as `null` when a reduction produced nothing.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Rejected input, raised before any provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is absent.
    #[error("Missing required field: {field}")]
    Missing {
        /// Field name.
        field: &'static str,
    },

    /// A field is present but unusable.
    #[error("Invalid {field}: {message}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The scenario name is not one of the known presets.
    #[error("Unknown preset: {name}")]
    UnknownPreset {
        /// Name as supplied.
        name: String,
    },
}

/// Historical-percentile archetype.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Preset {
    /// Park or green-space conversion.
    GreenArea,
    /// Residential development.
    Residential,
    /// Industrial facility.
    Industrial,
}

impl Preset {
    /// Percentile of historical vegetation used as the target.
    #[must_use]
    pub const fn ndvi_percentile(self) -> u8 {
        match self {
            Self::GreenArea => 90,
            Self::Residential => 50,
            Self::Industrial => 10,
        }
    }
}

/// Every scenario a request may name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScenarioKind {
    /// Named green-area preset.
    GreenArea,
    /// Named residential preset.
    Residential,
    /// Named industrial preset.
    Industrial,
    /// Residential scenario driven by [`ResidentialAttributes`].
    ResidentialReal,
    /// Green scenario driven by [`GreenAttributes`].
    GreenReal,
}

impl ScenarioKind {
    /// The preset whose historical percentile anchors the target vegetation.
    #[must_use]
    pub const fn base_preset(self) -> Preset {
        match self {
            Self::GreenArea | Self::GreenReal => Preset::GreenArea,
            Self::Residential | Self::ResidentialReal => Preset::Residential,
            Self::Industrial => Preset::Industrial,
        }
    }

    /// Parses a scenario name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownPreset`] for unrecognized names.
    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        name.trim()
            .parse()
            .map_err(|_| ValidationError::UnknownPreset {
                name: name.to_string(),
            })
    }
}

/// Baseline layer names used by tile and KPI lookups.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Layer {
    /// Land surface temperature (°C).
    Temp,
    /// Vegetation index.
    Ndvi,
    /// Air-quality composite (0-100).
    Aq,
}

/// Inputs for [`ScenarioKind::ResidentialReal`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidentialAttributes {
    /// Buildings per km².
    pub density: f64,
    /// Vehicles per day.
    pub traffic: f64,
    /// Roof albedo (0-1). Takes precedence over `cool_roof_pct`.
    pub albedo: Option<f64>,
    /// Share of cool roofs in percent (0-100).
    pub cool_roof_pct: Option<f64>,
}

/// Inputs for [`ScenarioKind::GreenReal`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreenAttributes {
    /// Trees per hectare.
    pub tree_density: f64,
    /// Grass cover in percent.
    pub grass_cover: f64,
    /// Whether the site includes open water.
    pub has_water: bool,
    /// Canopy cover in percent.
    pub canopy_cover: f64,
}

/// Inputs for the industrial emissions pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionsAttributes {
    /// CO2 mass.
    pub co2: f64,
    /// CH4 mass.
    pub ch4: f64,
    /// N2O mass.
    pub n2o: f64,
    /// Industry category names.
    pub industries: Vec<String>,
}

/// Held-out fit quality. `rmse` is `NaN` (serialized `null`) when the
/// held-out split was empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    /// Coefficient of determination.
    pub r2: f64,
    /// Root mean squared error.
    pub rmse: f64,
}

/// `temperature ≈ b0 + b1·ndvi + b2·ndbi`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureFit {
    /// Intercept, °C.
    pub b0: f64,
    /// Vegetation coefficient.
    pub b1: f64,
    /// Built-up coefficient.
    pub b2: f64,
    /// Held-out scores.
    #[serde(flatten)]
    pub quality: FitQuality,
}

/// `air_quality ≈ a0 + a1·ndvi`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AirQualityFit {
    /// Intercept.
    pub a0: f64,
    /// Vegetation coefficient.
    pub a1: f64,
    /// Held-out scores.
    #[serde(flatten)]
    pub quality: FitQuality,
}

/// Region-specific regression models fitted from a pixel sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationModel {
    /// Temperature model.
    pub temperature: TemperatureFit,
    /// Air-quality model.
    pub air_quality: AirQualityFit,
    /// Rows used for fitting.
    pub train_count: usize,
    /// Rows held out for scoring.
    pub test_count: usize,
}

/// The three reported zonal means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    /// Land surface temperature, °C.
    pub temp_c_mean: Option<f64>,
    /// Vegetation index.
    pub ndvi_mean: Option<f64>,
    /// Air-quality composite, 0-100.
    pub aq_mean_0_100: Option<f64>,
}

impl MetricSet {
    /// `post - self`, metric by metric; `None` when either side is missing.
    #[must_use]
    pub fn delta_to(&self, post: &Self) -> Self {
        let diff = |a: Option<f64>, b: Option<f64>| Some(b? - a?);
        Self {
            temp_c_mean: diff(self.temp_c_mean, post.temp_c_mean),
            ndvi_mean: diff(self.ndvi_mean, post.ndvi_mean),
            aq_mean_0_100: diff(self.aq_mean_0_100, post.aq_mean_0_100),
        }
    }
}

/// Which rung of the model ladder produced the simulated layers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelPath {
    /// Region calibration.
    Complex,
    /// Same-session single-variable fit.
    Simple,
    /// Fixed coefficients.
    Default,
}

/// Before/after/delta metrics for one geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactReport {
    /// Scenario name as resolved for this geometry.
    pub preset_name: String,
    /// Means over the current landscape.
    pub baseline: MetricSet,
    /// Means over the simulated layers.
    pub post: MetricSet,
    /// `post - baseline`.
    pub delta: MetricSet,
    /// Model ladder rung used.
    pub model: ModelPath,
}

/// One batch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Report, when the geometry simulated.
    pub report: Option<ImpactReport>,
    /// Failure message otherwise.
    pub error: Option<String>,
}

impl ReportEntry {
    /// A successful entry.
    #[must_use]
    pub const fn ok(report: ImpactReport) -> Self {
        Self {
            report: Some(report),
            error: None,
        }
    }

    /// A failed entry.
    #[must_use]
    pub fn failed(error: impl ToString) -> Self {
        Self {
            report: None,
            error: Some(error.to_string()),
        }
    }
}

/// Tile URL templates for the simulated layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSet {
    /// Simulated temperature.
    pub sim_temp_url: String,
    /// Simulated vegetation.
    pub sim_ndvi_url: String,
    /// Simulated air quality.
    pub sim_aq_url: String,
}

/// One batch result with tiles. `report` and `tiles` are both present or
/// both absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiledReportEntry {
    /// Report, when the geometry simulated.
    pub report: Option<ImpactReport>,
    /// Tiles of the simulated layers.
    pub tiles: Option<TileSet>,
    /// Failure message otherwise.
    pub error: Option<String>,
}

impl TiledReportEntry {
    /// A successful entry.
    #[must_use]
    pub const fn ok(report: ImpactReport, tiles: TileSet) -> Self {
        Self {
            report: Some(report),
            tiles: Some(tiles),
            error: None,
        }
    }

    /// A failed entry.
    #[must_use]
    pub fn failed(error: impl ToString) -> Self {
        Self {
            report: None,
            tiles: None,
            error: Some(error.to_string()),
        }
    }
}

/// A simulation request as received from a caller.
///
/// Fields are optional so that missing values surface as
/// [`ValidationError`]s rather than decode failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    /// Centre latitude in degrees.
    pub latitude: Option<f64>,
    /// Centre longitude in degrees.
    pub longitude: Option<f64>,
    /// Analysis radius in metres.
    pub buffer: Option<f64>,
    /// GeoJSON geometry, Feature, `FeatureCollection` or a list of those.
    pub geometry: Option<serde_json::Value>,
    /// Scenario name; per-geometry values override it.
    #[serde(default, alias = "scenario")]
    pub preset: Option<String>,
    /// Scenario attributes; per-geometry keys override these.
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    /// Extra distance around each geometry for the report reductions.
    pub report_buffer: Option<f64>,
    /// Whether to attempt region calibration (default true).
    pub calibrate: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_names_round_trip() {
        for name in ["green_area", "residential", "industrial", "residential_real", "green_real"] {
            let kind = ScenarioKind::parse(name).unwrap();
            assert_eq!(kind.as_ref(), name);
        }
        assert_eq!(
            ScenarioKind::parse("stadium"),
            Err(ValidationError::UnknownPreset {
                name: "stadium".to_string()
            })
        );
    }

    #[test]
    fn real_scenarios_anchor_on_matching_preset() {
        assert_eq!(ScenarioKind::GreenReal.base_preset().ndvi_percentile(), 90);
        assert_eq!(ScenarioKind::ResidentialReal.base_preset().ndvi_percentile(), 50);
        assert_eq!(ScenarioKind::Industrial.base_preset().ndvi_percentile(), 10);
    }

    #[test]
    fn delta_propagates_missing_values() {
        let baseline = MetricSet {
            temp_c_mean: None,
            ndvi_mean: Some(0.3),
            aq_mean_0_100: Some(40.0),
        };
        let post = MetricSet {
            temp_c_mean: Some(28.0),
            ndvi_mean: Some(0.5),
            aq_mean_0_100: Some(35.0),
        };
        let delta = baseline.delta_to(&post);
        assert_eq!(delta.temp_c_mean, None);
        assert!((delta.ndvi_mean.unwrap() - 0.2).abs() < 1e-12);
        assert!((delta.aq_mean_0_100.unwrap() + 5.0).abs() < 1e-12);
    }

    #[test]
    fn report_serializes_nulls_and_snake_case() {
        let report = ImpactReport {
            preset_name: "green_area".to_string(),
            baseline: MetricSet::default(),
            post: MetricSet::default(),
            delta: MetricSet::default(),
            model: ModelPath::Default,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert!(value["baseline"]["temp_c_mean"].is_null());
        assert_eq!(value["model"], "default");
    }

    #[test]
    fn empty_holdout_rmse_serializes_as_null() {
        let fit = AirQualityFit {
            a0: 50.0,
            a1: -20.0,
            quality: FitQuality {
                r2: 0.0,
                rmse: f64::NAN,
            },
        };
        let value = serde_json::to_value(fit).unwrap();
        assert!(value["rmse"].is_null());
        assert_eq!(value["r2"], 0.0);
    }

    #[test]
    fn request_accepts_scenario_alias_and_defaults() {
        let request: SimulationRequest = serde_json::from_str(
            r#"{"latitude": 1.0, "longitude": 2.0, "buffer": 500, "scenario": "green_real"}"#,
        )
        .unwrap();
        assert_eq!(request.preset.as_deref(), Some("green_real"));
        assert!(request.attributes.is_empty());
        assert_eq!(request.calibrate, None);
    }

    #[test]
    fn attribute_bundles_default_missing_fields() {
        let green: GreenAttributes =
            serde_json::from_value(serde_json::json!({"tree_density": 200.0})).unwrap();
        assert!(!green.has_water);
        assert!(green.canopy_cover.abs() < f64::EPSILON);
    }
}
