#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geospatial compute providers.
//!
//! The [`ComputeProvider`] trait is the evaluation half of the two-phase
//! raster model: it turns expression requests from [`land_impact_expr`] into
//! numbers, samples and tile URLs. Two implementations ship here:
//!
//! 1. [`remote::RemoteProvider`] posts expression graphs to a hosted compute
//!    service over HTTP.
//! 2. [`local::LocalProvider`] evaluates expressions in memory over
//!    registered scenes, for offline runs and tests.
//!
//! A provider handle is built once from [`config::ProviderConfig`] at process
//! start and shared as `Arc<dyn ComputeProvider>`; it holds no mutable state.
//! Nothing here retries: a failed evaluation is final for that call.

pub mod config;
pub mod local;
pub mod remote;

use land_impact_expr::{ReduceOutput, ReduceRequest, SampleRequest, SampleRow, TileRequest};
use thiserror::Error;

/// Errors raised while evaluating expressions.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote service answered with a non-success status.
    #[error("Provider returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// A payload could not be encoded or decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Reading local scene data failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The reduction would visit more pixels than allowed.
    #[error("Too many pixels: {count} exceeds maximum of {max}")]
    TooManyPixels {
        /// Pixels the request would visit.
        count: u64,
        /// Configured cap.
        max: u64,
    },

    /// The expression could not be evaluated.
    #[error("Evaluation error: {message}")]
    Evaluation {
        /// Description of what went wrong.
        message: String,
    },

    /// Provider configuration is missing or invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },
}

/// Evaluates raster expressions.
#[async_trait::async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Short provider name for log lines.
    fn name(&self) -> &'static str;

    /// Runs a zonal reduction.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if evaluation fails.
    async fn reduce_region(&self, request: &ReduceRequest) -> Result<ReduceOutput, ProviderError>;

    /// Draws a pixel sample.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if evaluation fails.
    async fn sample(&self, request: &SampleRequest) -> Result<Vec<SampleRow>, ProviderError>;

    /// Materializes a templated tile URL (`{z}/{x}/{y}` placeholders).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if rendering fails.
    async fn tile_url(&self, request: &TileRequest) -> Result<String, ProviderError>;
}

/// Runs a scalar reduction, turning any failure into `None`.
///
/// `what` names the quantity in the warning logged on failure.
pub async fn value_or_none(
    provider: &dyn ComputeProvider,
    request: &ReduceRequest,
    what: &str,
) -> Option<f64> {
    match provider.reduce_region(request).await {
        Ok(output) => {
            let value = output.value().filter(|v| v.is_finite());
            if value.is_none() {
                log::warn!("{what}: reduction returned no valid pixels");
            }
            value
        }
        Err(e) => {
            log::warn!("{what}: {} reduction failed: {e}", provider.name());
            None
        }
    }
}
