//! Scenario modifiers: target vegetation and scalar offsets.
//!
//! Named presets aim vegetation at a historical percentile of the region.
//! Attribute-driven ("real") scenarios start from the same percentile as
//! their matching preset and shift it by an amount derived from normalized
//! attributes. Everything here is a pure function of its inputs.

use land_impact_expr::Image;
use land_impact_industry::IndustrialEstimate;
use land_impact_simulation_models::{GreenAttributes, Preset, ResidentialAttributes};

/// Normalization ranges for residential attributes.
pub const DENSITY_MAX: f64 = 1000.0;
pub const TRAFFIC_MAX: f64 = 20_000.0;
pub const COOL_ROOF_PCT_MAX: f64 = 100.0;

/// Normalization ranges for green attributes.
pub const TREE_DENSITY_MAX: f64 = 400.0;
pub const COVER_PCT_MAX: f64 = 100.0;

const GREEN_NDVI_RANGE: (f64, f64) = (-0.20, 0.30);
const GREEN_TEMP_RANGE: (f64, f64) = (-6.0, 6.0);
const GREEN_AQ_RANGE: (f64, f64) = (-25.0, 25.0);

/// A scenario with its inputs resolved to typed values.
#[derive(Debug, Clone, PartialEq)]
pub enum Scenario {
    /// Named preset. Industrial presets may carry an emissions estimate.
    Preset {
        preset: Preset,
        industrial: Option<IndustrialEstimate>,
    },
    /// Attribute-driven residential development.
    ResidentialReal(ResidentialAttributes),
    /// Attribute-driven green space.
    GreenReal(GreenAttributes),
}

impl Scenario {
    /// Preset whose historical percentile anchors the target.
    #[must_use]
    pub const fn base_preset(&self) -> Preset {
        match self {
            Self::Preset { preset, .. } => *preset,
            Self::ResidentialReal(_) => Preset::Residential,
            Self::GreenReal(_) => Preset::GreenArea,
        }
    }
}

/// What a scenario does to a region.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioModifiers {
    /// Vegetation index to impose inside the mask.
    pub target_ndvi: Image,
    /// Added to predicted temperature inside the mask.
    pub temp_offset: f64,
    /// Added to predicted air quality inside the mask.
    pub aq_offset: f64,
}

/// Additive scenario effects before they are applied to rasters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Adjustment {
    pub ndvi: f64,
    pub temp: f64,
    pub aq: f64,
}

/// Residential attributes scaled to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidentialNorms {
    pub density: f64,
    pub traffic: f64,
    pub albedo: f64,
}

fn unit(value: f64, max: f64) -> f64 {
    if value.is_finite() {
        (value / max).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl ResidentialNorms {
    /// Albedo wins over cool-roof percentage when both are given.
    #[must_use]
    pub fn from_attributes(attributes: &ResidentialAttributes) -> Self {
        let albedo = attributes.albedo.map_or_else(
            || unit(attributes.cool_roof_pct.unwrap_or(0.0), COOL_ROOF_PCT_MAX),
            |a| unit(a, 1.0),
        );
        Self {
            density: unit(attributes.density, DENSITY_MAX),
            traffic: unit(attributes.traffic, TRAFFIC_MAX),
            albedo,
        }
    }
}

/// Residential effects. Offsets are not clamped.
#[must_use]
pub fn residential_adjustment(attributes: &ResidentialAttributes) -> Adjustment {
    let n = ResidentialNorms::from_attributes(attributes);
    Adjustment {
        ndvi: -0.12 * n.density,
        temp: 5.0f64.mul_add(-n.albedo, 3.0f64.mul_add(n.density, 1.5 * n.traffic)),
        aq: 5.0f64.mul_add(-n.albedo, 25.0 * n.traffic),
    }
}

/// Green-space effects, each clamped to its documented range.
#[must_use]
pub fn green_adjustment(attributes: &GreenAttributes) -> Adjustment {
    let trees = unit(attributes.tree_density, TREE_DENSITY_MAX);
    let grass = unit(attributes.grass_cover, COVER_PCT_MAX);
    let canopy = unit(attributes.canopy_cover, COVER_PCT_MAX);
    let water = attributes.has_water;

    let mut ndvi = 0.18f64.mul_add(canopy, 0.10f64.mul_add(trees, 0.06 * grass));
    let mut temp = (-2.5f64).mul_add(canopy, (-2.0f64).mul_add(trees, -grass));
    let mut aq = (-8.0f64).mul_add(canopy, (-10.0f64).mul_add(trees, -4.0 * grass));
    if water {
        ndvi += 0.03;
        temp -= 1.5;
        aq -= 3.0;
    }

    Adjustment {
        ndvi: ndvi.clamp(GREEN_NDVI_RANGE.0, GREEN_NDVI_RANGE.1),
        temp: temp.clamp(GREEN_TEMP_RANGE.0, GREEN_TEMP_RANGE.1),
        aq: aq.clamp(GREEN_AQ_RANGE.0, GREEN_AQ_RANGE.1),
    }
}

/// Derives the modifiers for a scenario from the historical percentile
/// raster of its base preset.
#[must_use]
pub fn modifiers(scenario: &Scenario, historical: Image) -> ScenarioModifiers {
    let adjustment = match scenario {
        Scenario::Preset { industrial, .. } => {
            let (temp_offset, aq_offset) = industrial.map_or((0.0, 0.0), |e| {
                (e.predicted_temp_delta, e.reported_emissions_index)
            });
            return ScenarioModifiers {
                target_ndvi: historical,
                temp_offset,
                aq_offset,
            };
        }
        Scenario::ResidentialReal(attributes) => residential_adjustment(attributes),
        Scenario::GreenReal(attributes) => green_adjustment(attributes),
    };

    ScenarioModifiers {
        target_ndvi: (historical + adjustment.ndvi).clamp(0.0, 1.0),
        temp_offset: adjustment.temp,
        aq_offset: adjustment.aq,
    }
}
