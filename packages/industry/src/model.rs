//! Pretrained industrial temperature predictor.
//!
//! The model is a standard scaler followed by a gradient-boosted ensemble of
//! regression trees, exported to JSON:
//!
//! ```json
//! {
//!   "feature_count": 53,
//!   "scaler": { "mean": [...], "scale": [...] },
//!   "init": 0.12,
//!   "learning_rate": 0.1,
//!   "trees": [
//!     { "nodes": [
//!       { "feature": 2, "threshold": 0.5, "left": 1, "right": 2 },
//!       { "value": -0.3 },
//!       { "value": 0.8 }
//!     ] }
//!   ]
//! }
//! ```
//!
//! A split sends a sample left when `x[feature] <= threshold`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Deserialize;

use crate::{FEATURE_COUNT, IndustryError};

/// Maps a feature vector to a scalar.
pub trait Predictor: Send + Sync {
    /// Predicts from a feature vector of the model's length.
    ///
    /// # Errors
    ///
    /// Returns [`IndustryError::Model`] if the vector length is wrong.
    fn predict(&self, features: &[f64]) -> Result<f64, IndustryError>;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Scaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn evaluate(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if x.get(*feature).copied().unwrap_or(0.0) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                Some(Node::Leaf { value }) => return *value,
                None => return 0.0,
            }
        }
    }
}

/// Scaler + gradient-boosted regression trees.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GradientBoostedModel {
    feature_count: usize,
    scaler: Scaler,
    init: f64,
    learning_rate: f64,
    trees: Vec<Tree>,
}

impl GradientBoostedModel {
    /// Parses and validates a JSON export.
    ///
    /// # Errors
    ///
    /// Returns [`IndustryError::Parse`] for malformed JSON and
    /// [`IndustryError::Model`] for an inconsistent model.
    pub fn from_json_str(text: &str) -> Result<Self, IndustryError> {
        let model: Self = serde_json::from_str(text)?;
        model.validate()?;
        Ok(model)
    }

    /// Loads a model file.
    ///
    /// # Errors
    ///
    /// Returns [`IndustryError`] if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self, IndustryError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    fn validate(&self) -> Result<(), IndustryError> {
        let invalid = |message: String| Err(IndustryError::Model { message });

        if self.feature_count != FEATURE_COUNT {
            return invalid(format!(
                "expected {FEATURE_COUNT} features, model has {}",
                self.feature_count
            ));
        }
        if self.scaler.mean.len() != self.feature_count
            || self.scaler.scale.len() != self.feature_count
        {
            return invalid("scaler length does not match feature count".to_string());
        }
        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return invalid(format!("tree {t} has no nodes"));
            }
            for (i, node) in tree.nodes.iter().enumerate() {
                if let Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } = node
                {
                    let in_range = |child: usize| child > i && child < tree.nodes.len();
                    if *feature >= self.feature_count || !in_range(*left) || !in_range(*right) {
                        return invalid(format!("tree {t} node {i} is out of range"));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Predictor for GradientBoostedModel {
    fn predict(&self, features: &[f64]) -> Result<f64, IndustryError> {
        if features.len() != self.feature_count {
            return Err(IndustryError::Model {
                message: format!(
                    "expected {} features, got {}",
                    self.feature_count,
                    features.len()
                ),
            });
        }

        let scaled: Vec<f64> = features
            .iter()
            .zip(self.scaler.mean.iter().zip(&self.scaler.scale))
            .map(|(x, (mean, scale))| {
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect();

        let boost: f64 = self.trees.iter().map(|t| t.evaluate(&scaled)).sum();
        Ok(self.learning_rate.mul_add(boost, self.init))
    }
}

/// Loaded models keyed by path. Models are read-only after loading.
#[derive(Default)]
pub struct ModelCache {
    models: Mutex<HashMap<PathBuf, Arc<dyn Predictor>>>,
}

impl ModelCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an already-built predictor under a path.
    pub fn insert(&self, path: impl Into<PathBuf>, predictor: Arc<dyn Predictor>) {
        if let Ok(mut models) = self.models.lock() {
            models.insert(path.into(), predictor);
        }
    }

    /// Returns the model at `path`, loading it on first use.
    ///
    /// Failed loads are not cached, so a model placed later is picked up.
    ///
    /// # Errors
    ///
    /// Returns [`IndustryError`] if the model cannot be loaded.
    pub fn get(&self, path: &Path) -> Result<Arc<dyn Predictor>, IndustryError> {
        if let Some(model) = self
            .models
            .lock()
            .ok()
            .and_then(|models| models.get(path).cloned())
        {
            return Ok(model);
        }

        let model: Arc<dyn Predictor> = Arc::new(GradientBoostedModel::load(path)?);
        log::info!("Loaded industry model from {}", path.display());
        if let Ok(mut models) = self.models.lock() {
            models.insert(path.to_path_buf(), Arc::clone(&model));
        }
        Ok(model)
    }
}
