#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Land-use impact simulation.
//!
//! Given a point, a buffer and one or more drawn geometries, this crate
//! estimates how a scenario (a park, housing, a factory) would change land
//! surface temperature, vegetation and air quality around it.
//!
//! The pipeline for one request:
//!
//! 1. [`region`] validates the centre and buffer and composes the baseline
//!    layers as raster expressions.
//! 2. [`calibration`] fits region-specific regressions from a pixel sample.
//!    This is best-effort.
//! 3. [`engine`] picks a model (calibrated, simple fit, or fixed defaults)
//!    and applies the scenario from [`scenario`] inside each geometry.
//! 4. [`report`] reduces baseline and simulated layers to zonal means.
//!
//! [`batch::ImpactEngine`] drives all of this for single and batch requests
//! and [`tiles`] renders layers to map tiles.

pub mod batch;
pub mod calibration;
pub mod catalog;
pub mod engine;
pub mod region;
pub mod report;
pub mod request;
pub mod scenario;
pub mod tiles;

use land_impact_expr::GeometryError;
use land_impact_provider::ProviderError;
use land_impact_simulation_models::ValidationError;
use thiserror::Error;

/// Errors raised by the simulation pipeline.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// The request was rejected before any provider call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A provider call failed on a path that cannot degrade.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// An input geometry could not be used as an area.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Region calibration could not produce a model.
    #[error("Calibration failed: {message}")]
    Calibration {
        /// Description of what went wrong.
        message: String,
    },
}

impl SimulationError {
    /// Whether the error is the caller's fault.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Geometry(_))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use land_impact_expr::{ReduceOutput, ReduceRequest, SampleRequest, SampleRow, TileRequest};
    use land_impact_provider::{ComputeProvider, ProviderError};

    /// Fails every call, as an unreachable service would.
    pub struct FailingProvider;

    fn offline() -> ProviderError {
        ProviderError::Evaluation {
            message: "offline".to_string(),
        }
    }

    #[async_trait::async_trait]
    impl ComputeProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn reduce_region(&self, _: &ReduceRequest) -> Result<ReduceOutput, ProviderError> {
            Err(offline())
        }

        async fn sample(&self, _: &SampleRequest) -> Result<Vec<SampleRow>, ProviderError> {
            Err(offline())
        }

        async fn tile_url(&self, _: &TileRequest) -> Result<String, ProviderError> {
            Err(offline())
        }
    }
}
