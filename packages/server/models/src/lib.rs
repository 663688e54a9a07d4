#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the land impact server.
//!
//! Every response is wrapped in an [`ApiEnvelope`]. The payload types are
//! the simulation models themselves so the wire contract follows them.

use land_impact_simulation_models::Layer;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Outcome marker of an [`ApiEnvelope`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApiStatus {
    Success,
    Error,
}

/// Response wrapper shared by every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Outcome.
    pub status: ApiStatus,
    /// Human-readable summary or error description.
    pub message: String,
    /// `null` on errors.
    pub payload: Option<T>,
}

impl<T> ApiEnvelope<T> {
    #[must_use]
    pub fn success(message: impl Into<String>, payload: T) -> Self {
        Self {
            status: ApiStatus::Success,
            message: message.into(),
            payload: Some(payload),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Error,
            message: message.into(),
            payload: None,
        }
    }
}

/// Health check payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
    /// Compute provider in use.
    pub provider: String,
}

/// Query parameters for the baseline layer endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct LayerQueryParams {
    /// Region centre latitude.
    pub latitude: Option<f64>,
    /// Region centre longitude.
    pub longitude: Option<f64>,
    /// Region radius in metres.
    pub buffer: Option<f64>,
}

/// Payload of `GET /geo/get-initial-data/{layer}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerTile {
    /// Templated tile URL with `{z}/{x}/{y}` placeholders.
    pub url: String,
    /// Layer rendered.
    pub layer: Layer,
}

/// Payload of `GET /geo/get-kpis/{layer}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerKpi {
    /// Layer reduced.
    pub layer: Layer,
    /// Zonal mean over the region, `null` when unavailable.
    pub value: Option<f64>,
}
