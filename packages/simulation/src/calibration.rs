//! Region calibration: least-squares models fitted from a pixel sample.
//!
//! The fitted models are
//!
//! * `temperature ≈ b0 + b1·ndvi + b2·ndbi`
//! * `air_quality ≈ a0 + a1·ndvi`
//!
//! trained on a seeded random split of the sample and scored on the rest.
//! Calibration is best-effort: every failure is logged and reported as
//! "no calibration" so the simulation can fall back to simpler models.

use land_impact_expr::{Image, SampleBand, SampleRequest, SampleRow};
use land_impact_provider::ComputeProvider;
use land_impact_simulation_models::{AirQualityFit, CalibrationModel, FitQuality, TemperatureFit};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::SimulationError;
use crate::region::{AnalysisRegion, BaseLayers};

const NDVI: &str = "ndvi";
const NDBI: &str = "ndbi";
const CONSTANT: &str = "constant";
const TEMP: &str = "temp";
const AQ: &str = "aq";

/// Sampling and split settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOptions {
    /// Share of rows used for fitting.
    pub train_fraction: f64,
    /// Sample pixel size in metres.
    pub scale_m: f64,
    /// Maximum sampled pixels.
    pub num_pixels: usize,
    /// Seed for pixel selection and the split.
    pub seed: u64,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            train_fraction: 0.7,
            scale_m: 250.0,
            num_pixels: 8000,
            seed: 42,
        }
    }
}

/// Fits the region models, or returns `None` if anything goes wrong.
pub async fn calibrate(
    provider: &dyn ComputeProvider,
    region: &AnalysisRegion,
    layers: &BaseLayers,
    options: &CalibrationOptions,
) -> Option<CalibrationModel> {
    let request = SampleRequest {
        bands: vec![
            SampleBand::new(NDVI, layers.ndvi.clone()),
            SampleBand::new(NDBI, layers.ndbi.clone()),
            SampleBand::new(CONSTANT, Image::constant(1.0)),
            SampleBand::new(TEMP, layers.temperature.clone()),
            SampleBand::new(AQ, layers.air_quality.clone()),
        ],
        area: region.area(),
        scale_m: options.scale_m,
        num_pixels: options.num_pixels,
        seed: options.seed,
    };

    let result = match provider.sample(&request).await {
        Ok(rows) => fit(&rows, options),
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(model) => {
            log::info!(
                "Calibrated on {} rows (held out {}): temperature r2={:.3}, air quality r2={:.3}",
                model.train_count,
                model.test_count,
                model.temperature.quality.r2,
                model.air_quality.quality.r2
            );
            Some(model)
        }
        Err(e) => {
            log::warn!("Calibration unavailable: {e}");
            None
        }
    }
}

/// Splits sampled rows and fits both models.
///
/// # Errors
///
/// Returns [`SimulationError::Calibration`] when a row lacks a column, the
/// training split is too small, or the normal equations are singular.
pub fn fit(
    rows: &[SampleRow],
    options: &CalibrationOptions,
) -> Result<CalibrationModel, SimulationError> {
    let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for row in rows {
        let point = Point::from_row(row)?;
        if rng.r#gen::<f64>() < options.train_fraction {
            train.push(point);
        } else {
            test.push(point);
        }
    }

    if train.len() < 3 {
        return Err(calibration_error(format!(
            "only {} training rows after split",
            train.len()
        )));
    }

    let temp_x: Vec<[f64; 3]> = train.iter().map(|p| [p.constant, p.ndvi, p.ndbi]).collect();
    let temp_y: Vec<f64> = train.iter().map(|p| p.temp).collect();
    let [b0, b1, b2] = least_squares(&temp_x, &temp_y)
        .ok_or_else(|| calibration_error("temperature design matrix is singular"))?;

    let aq_x: Vec<[f64; 2]> = train.iter().map(|p| [p.constant, p.ndvi]).collect();
    let aq_y: Vec<f64> = train.iter().map(|p| p.aq).collect();
    let [a0, a1] = least_squares(&aq_x, &aq_y)
        .ok_or_else(|| calibration_error("air quality design matrix is singular"))?;

    let temp_quality = score(test.iter().map(|p| {
        (
            b2.mul_add(p.ndbi, b1.mul_add(p.ndvi, b0 * p.constant)),
            p.temp,
        )
    }));
    let aq_quality = score(
        test.iter()
            .map(|p| (a1.mul_add(p.ndvi, a0 * p.constant), p.aq)),
    );

    Ok(CalibrationModel {
        temperature: TemperatureFit {
            b0,
            b1,
            b2,
            quality: temp_quality,
        },
        air_quality: AirQualityFit {
            a0,
            a1,
            quality: aq_quality,
        },
        train_count: train.len(),
        test_count: test.len(),
    })
}

fn calibration_error(message: impl Into<String>) -> SimulationError {
    SimulationError::Calibration {
        message: message.into(),
    }
}

struct Point {
    ndvi: f64,
    ndbi: f64,
    constant: f64,
    temp: f64,
    aq: f64,
}

impl Point {
    fn from_row(row: &SampleRow) -> Result<Self, SimulationError> {
        let get = |name: &str| {
            row.get(name)
                .copied()
                .filter(|v| v.is_finite())
                .ok_or_else(|| calibration_error(format!("sample row missing '{name}'")))
        };
        Ok(Self {
            ndvi: get(NDVI)?,
            ndbi: get(NDBI)?,
            constant: get(CONSTANT)?,
            temp: get(TEMP)?,
            aq: get(AQ)?,
        })
    }
}

/// Ordinary least squares via the normal equations `XᵀX·β = Xᵀy`.
#[allow(clippy::needless_range_loop)]
fn least_squares<const K: usize>(x: &[[f64; K]], y: &[f64]) -> Option<[f64; K]> {
    if x.len() < K {
        return None;
    }

    let mut xtx = [[0.0; K]; K];
    let mut xty = [0.0; K];
    for (row, target) in x.iter().zip(y) {
        for i in 0..K {
            xty[i] = row[i].mul_add(*target, xty[i]);
            for j in 0..K {
                xtx[i][j] = row[i].mul_add(row[j], xtx[i][j]);
            }
        }
    }

    solve(xtx, xty)
}

/// Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve<const K: usize>(mut a: [[f64; K]; K], mut b: [f64; K]) -> Option<[f64; K]> {
    for col in 0..K {
        let pivot = (col..K).max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..K {
            let factor = a[row][col] / a[col][col];
            for k in col..K {
                a[row][k] = factor.mul_add(-a[col][k], a[row][k]);
            }
            b[row] = factor.mul_add(-b[col], b[row]);
        }
    }

    let mut beta = [0.0; K];
    for row in (0..K).rev() {
        let tail: f64 = (row + 1..K).map(|k| a[row][k] * beta[k]).sum();
        beta[row] = (b[row] - tail) / a[row][row];
    }
    beta.iter().all(|v| v.is_finite()).then_some(beta)
}

/// R² and RMSE over `(predicted, observed)` pairs.
///
/// An empty set scores `r2 = 0`, `rmse = NaN`. A constant observed series
/// scores `r2 = 1` when predicted exactly, else `0`.
#[allow(clippy::cast_precision_loss)]
fn score(pairs: impl Iterator<Item = (f64, f64)>) -> FitQuality {
    let pairs: Vec<(f64, f64)> = pairs.collect();
    if pairs.is_empty() {
        return FitQuality {
            r2: 0.0,
            rmse: f64::NAN,
        };
    }

    let n = pairs.len() as f64;
    let mean = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let ss_res: f64 = pairs.iter().map(|(p, y)| (y - p).powi(2)).sum();
    let ss_tot: f64 = pairs.iter().map(|(_, y)| (y - mean).powi(2)).sum();

    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };

    FitQuality {
        r2,
        rmse: (ss_res / n).sqrt(),
    }
}
