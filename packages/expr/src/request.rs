//! Evaluation requests: the only values a provider turns into numbers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Area, Image};

/// Pixel cap applied to zonal reductions unless a caller overrides it.
pub const DEFAULT_MAX_PIXELS: u64 = 1_000_000_000_000;

/// Zonal reducer and its inputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reducer", rename_all = "snake_case")]
pub enum Reduction {
    /// Mean of the unmasked pixels.
    Mean {
        /// Input image.
        image: Image,
    },
    /// Nearest-rank percentile of the unmasked pixels.
    Percentile {
        /// Input image.
        image: Image,
        /// Percentile rank (0-100).
        p: u8,
    },
    /// Ordinary least squares `y ≈ offset + scale·x` over pixels where both
    /// inputs are unmasked.
    LinearFit {
        /// Independent variable.
        x: Image,
        /// Dependent variable.
        y: Image,
    },
}

/// A zonal reduction over an area at a given pixel scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReduceRequest {
    /// What to reduce.
    pub reduction: Reduction,
    /// Where to reduce.
    pub area: Area,
    /// Pixel size in metres.
    pub scale_m: f64,
    /// Maximum number of pixels the provider may visit.
    pub max_pixels: u64,
    /// Coarsen the scale instead of failing when `max_pixels` is exceeded.
    pub best_effort: bool,
}

impl ReduceRequest {
    fn new(reduction: Reduction, area: Area, scale_m: f64) -> Self {
        Self {
            reduction,
            area,
            scale_m,
            max_pixels: DEFAULT_MAX_PIXELS,
            best_effort: true,
        }
    }

    /// Zonal mean.
    #[must_use]
    pub fn mean(image: Image, area: Area, scale_m: f64) -> Self {
        Self::new(Reduction::Mean { image }, area, scale_m)
    }

    /// Zonal percentile.
    #[must_use]
    pub fn percentile(image: Image, p: u8, area: Area, scale_m: f64) -> Self {
        Self::new(Reduction::Percentile { image, p }, area, scale_m)
    }

    /// Zonal simple linear regression of `y` on `x`.
    #[must_use]
    pub fn linear_fit(x: Image, y: Image, area: Area, scale_m: f64) -> Self {
        Self::new(Reduction::LinearFit { x, y }, area, scale_m)
    }

    /// Overrides the pixel cap.
    #[must_use]
    pub const fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }
}

/// Coefficients of `y ≈ offset + scale·x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    /// Slope.
    pub scale: f64,
    /// Intercept.
    pub offset: f64,
}

impl LinearFit {
    /// Applies the fit to an image.
    #[must_use]
    pub fn predict(&self, x: Image) -> Image {
        x * self.scale + self.offset
    }
}

/// Result of a [`ReduceRequest`]. `None` means no valid pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReduceOutput {
    /// Mean or percentile result.
    Value(Option<f64>),
    /// Linear fit result.
    Fit(Option<LinearFit>),
}

impl ReduceOutput {
    /// The scalar result, if this was a scalar reduction with data.
    #[must_use]
    pub const fn value(self) -> Option<f64> {
        match self {
            Self::Value(v) => v,
            Self::Fit(_) => None,
        }
    }

    /// The fit result, if this was a linear fit with data.
    #[must_use]
    pub const fn fit(self) -> Option<LinearFit> {
        match self {
            Self::Fit(f) => f,
            Self::Value(_) => None,
        }
    }
}

/// A named band in a [`SampleRequest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleBand {
    /// Column name in the returned rows.
    pub name: String,
    /// Band expression.
    pub image: Image,
}

impl SampleBand {
    /// Names an image for sampling.
    #[must_use]
    pub fn new(name: impl Into<String>, image: Image) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }
}

/// Draws up to `num_pixels` pixel rows from an area.
///
/// Rows where any band is masked are dropped. The selection is
/// deterministic for a given `seed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRequest {
    /// Columns to evaluate.
    pub bands: Vec<SampleBand>,
    /// Where to sample.
    pub area: Area,
    /// Pixel size in metres.
    pub scale_m: f64,
    /// Maximum number of rows.
    pub num_pixels: usize,
    /// Selection seed.
    pub seed: u64,
}

/// One sampled pixel, keyed by band name.
pub type SampleRow = BTreeMap<String, f64>;

/// Visualization stretch and colour ramp for tile rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisParams {
    /// Value mapped to the first palette colour.
    pub min: f64,
    /// Value mapped to the last palette colour.
    pub max: f64,
    /// Hex colours.
    pub palette: Vec<String>,
}

/// Renders an image clipped to an area as a templated tile URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileRequest {
    /// Image to render.
    pub image: Image,
    /// Clip area.
    pub area: Area,
    /// Visualization parameters.
    pub vis: VisParams,
}
