#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Industrial emissions feature pipeline.
//!
//! Turns a facility description (location, greenhouse-gas masses, industry
//! categories) into the two numbers the industrial scenario needs: a
//! reported-emissions index and a predicted temperature delta from the
//! pretrained model.
//!
//! Feature vector layout (53 values):
//!
//! | Slots | Meaning |
//! |---|---|
//! | 0-1 | latitude, longitude |
//! | 2 | reported emissions index |
//! | 3-49 | one-hot industry category ([`vocabulary::INDUSTRIES`]) |
//! | 50-52 | wind speed at 1, 5 and 10 km |

pub mod model;
pub mod vocabulary;
pub mod wind;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use land_impact_simulation_models::EmissionsAttributes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use model::ModelCache;
use vocabulary::INDUSTRY_COUNT;
use wind::WindService;

/// 100-year global warming potential of methane.
pub const GWP_CH4: f64 = 25.0;

/// 100-year global warming potential of nitrous oxide.
pub const GWP_N2O: f64 = 298.0;

/// Length of the predictor's feature vector.
pub const FEATURE_COUNT: usize = 2 + 1 + INDUSTRY_COUNT + 3;

/// Errors raised by the industry pipeline.
#[derive(Debug, Error)]
pub enum IndustryError {
    /// Reading the model file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The model file is not valid JSON for the expected shape.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The model is inconsistent or was called with bad input.
    #[error("Model error: {message}")]
    Model {
        /// Description of what went wrong.
        message: String,
    },
}

/// CO2-equivalent mass: `co2 + 25·ch4 + 298·n2o`.
#[must_use]
pub fn reported_emissions_index(co2: f64, ch4: f64, n2o: f64) -> f64 {
    GWP_N2O.mul_add(n2o, GWP_CH4.mul_add(ch4, co2))
}

/// Assembles the predictor input.
#[must_use]
pub fn feature_vector(
    latitude: f64,
    longitude: f64,
    emissions_index: f64,
    industries: &[String],
    wind: [f64; 3],
) -> Vec<f64> {
    let mut features = Vec::with_capacity(FEATURE_COUNT);
    features.extend([latitude, longitude, emissions_index]);
    features.extend(vocabulary::one_hot(industries).vector);
    features.extend(wind);
    features
}

/// Model file used when `INDUSTRY_MODEL_PATH` is unset.
pub const DEFAULT_MODEL_PATH: &str = "models/industry_model.json";

/// Model path from `INDUSTRY_MODEL_PATH`, or [`DEFAULT_MODEL_PATH`].
#[must_use]
pub fn model_path_from_env() -> PathBuf {
    std::env::var("INDUSTRY_MODEL_PATH")
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH), PathBuf::from)
}

/// Outputs consumed by the industrial scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndustrialEstimate {
    /// CO2-equivalent mass.
    pub reported_emissions_index: f64,
    /// Model-predicted temperature delta; `0.0` when no model is available.
    pub predicted_temp_delta: f64,
}

/// Wind lookup, feature assembly and prediction.
pub struct IndustrialPipeline {
    wind: Arc<dyn WindService>,
    models: Arc<ModelCache>,
    model_path: PathBuf,
}

impl IndustrialPipeline {
    #[must_use]
    pub fn new(wind: Arc<dyn WindService>, models: Arc<ModelCache>, model_path: PathBuf) -> Self {
        Self {
            wind,
            models,
            model_path,
        }
    }

    /// Estimates the emissions index and temperature delta of a facility.
    ///
    /// Never fails: wind failures become `0.0` per radius and a missing or
    /// broken model predicts `0.0`.
    pub async fn estimate(
        &self,
        latitude: f64,
        longitude: f64,
        attributes: &EmissionsAttributes,
        today: NaiveDate,
    ) -> IndustrialEstimate {
        let index = reported_emissions_index(attributes.co2, attributes.ch4, attributes.n2o);

        let predicted_temp_delta = match self.models.get(&self.model_path) {
            Ok(model) => {
                let wind = self.wind.wind_speeds(latitude, longitude, today).await;
                let features =
                    feature_vector(latitude, longitude, index, &attributes.industries, wind);
                model.predict(&features).unwrap_or_else(|e| {
                    log::warn!("Industry prediction failed: {e}");
                    0.0
                })
            }
            Err(e) => {
                log::warn!(
                    "Industry model {} unavailable, predicting 0: {e}",
                    self.model_path.display()
                );
                0.0
            }
        };

        log::info!(
            "Industrial estimate: emissions index {index:.2}, temperature delta {predicted_temp_delta:.3}"
        );

        IndustrialEstimate {
            reported_emissions_index: index,
            predicted_temp_delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use model::GradientBoostedModel;

    struct FixedWind {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl WindService for FixedWind {
        async fn wind_speeds(&self, _: f64, _: f64, _: NaiveDate) -> [f64; 3] {
            self.calls.fetch_add(1, Ordering::SeqCst);
            [1.5, 2.0, 2.5]
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn attributes() -> EmissionsAttributes {
        EmissionsAttributes {
            co2: 100.0,
            ch4: 2.0,
            n2o: 1.0,
            industries: vec!["Cement Production".to_string(), "Unknown Thing".to_string()],
        }
    }

    #[test]
    fn emissions_index_uses_gwp_weights() {
        assert!((reported_emissions_index(100.0, 2.0, 1.0) - 448.0).abs() < 1e-9);
    }

    #[test]
    fn feature_vector_layout() {
        let features = feature_vector(
            19.4,
            -99.1,
            448.0,
            &["Cement Production".to_string(), "Unknown Thing".to_string()],
            [1.0, 2.0, 3.0],
        );
        assert_eq!(features.len(), FEATURE_COUNT);
        assert_eq!(FEATURE_COUNT, 53);
        assert_eq!(&features[..3], &[19.4, -99.1, 448.0]);
        assert!((features[3 + 5] - 1.0).abs() < f64::EPSILON);
        assert!((features[3..50].iter().sum::<f64>() - 1.0).abs() < f64::EPSILON);
        assert_eq!(&features[50..], &[1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn missing_model_predicts_zero_without_wind_lookup() {
        let wind = Arc::new(FixedWind {
            calls: AtomicUsize::new(0),
        });
        let pipeline = IndustrialPipeline::new(
            wind.clone(),
            Arc::new(ModelCache::new()),
            PathBuf::from("/nonexistent/industry_model.json"),
        );

        let estimate = pipeline.estimate(19.4, -99.1, &attributes(), today()).await;
        assert!((estimate.reported_emissions_index - 448.0).abs() < 1e-9);
        assert!(estimate.predicted_temp_delta.abs() < f64::EPSILON);
        assert_eq!(wind.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cached_model_drives_prediction() {
        let cache = Arc::new(ModelCache::new());
        let model = GradientBoostedModel::from_json_str(&model::tests::stump_json()).unwrap();
        cache.insert("stump.json", Arc::new(model));
        let pipeline = IndustrialPipeline::new(
            Arc::new(FixedWind {
                calls: AtomicUsize::new(0),
            }),
            cache,
            PathBuf::from("stump.json"),
        );

        let estimate = pipeline.estimate(19.4, -99.1, &attributes(), today()).await;
        assert!((estimate.predicted_temp_delta - 1.5).abs() < 1e-12);
    }
}
