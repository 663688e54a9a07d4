//! Raster algebra expressions.
//!
//! An [`Image`] describes how to compute a single-band raster. Building one
//! never touches the network: operators return new expression values, and
//! only a [`crate::ReduceRequest`], [`crate::SampleRequest`] or
//! [`crate::TileRequest`] handed to a provider causes evaluation.
//!
//! Arithmetic uses the standard operator traits, so a scaled band reads as
//! `Image::band("LST_Day_1km") * 0.02 - 273.15`.

use std::ops::{Add, Div, Mul, Sub};

use serde::Serialize;

use crate::{Area, Collection};

/// Per-pixel reducer applied across the scenes of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemporalReducer {
    /// Per-pixel median of the unmasked scene values.
    Median,
    /// Per-pixel mean of the unmasked scene values.
    Mean,
    /// Per-pixel nearest-rank percentile (0-100).
    Percentile {
        /// Percentile rank.
        p: u8,
    },
}

/// Pixel-wise binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    /// `left + right`
    Add,
    /// `left - right`
    Subtract,
    /// `left * right`
    Multiply,
    /// `left / right`, masked where `right` is zero.
    Divide,
    /// `1` where `left > right`, else `0`.
    GreaterThan,
    /// `1` where `left < right`, else `0`.
    LessThan,
}

impl BinaryOp {
    /// Applies the operator to two pixel values.
    #[must_use]
    pub fn apply(self, left: f64, right: f64) -> Option<f64> {
        match self {
            Self::Add => Some(left + right),
            Self::Subtract => Some(left - right),
            Self::Multiply => Some(left * right),
            Self::Divide => (right != 0.0).then(|| left / right),
            Self::GreaterThan => Some(if left > right { 1.0 } else { 0.0 }),
            Self::LessThan => Some(if left < right { 1.0 } else { 0.0 }),
        }
    }
}

/// A lazily-evaluated single-band raster.
///
/// A pixel is either a value or masked (no data). Masks propagate through
/// arithmetic: any masked operand masks the result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Image {
    /// The same value everywhere.
    Constant {
        /// Pixel value.
        value: f64,
    },
    /// A band of the scene currently being composited.
    ///
    /// Only meaningful inside [`Image::Composite`].
    Band {
        /// Band name.
        name: String,
    },
    /// Like [`Image::Band`], but yields `default` when the scene lacks the
    /// band entirely.
    OptionalBand {
        /// Band name.
        name: String,
        /// Value used for scenes without the band.
        default: f64,
    },
    /// Evaluates `image` against every scene of `collection` and reduces the
    /// per-scene values pixel by pixel.
    Composite {
        /// Source scenes.
        collection: Collection,
        /// How scene values are combined.
        reducer: TemporalReducer,
        /// Per-scene expression.
        image: Box<Self>,
    },
    /// Pixel-wise binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Self>,
        /// Right operand.
        right: Box<Self>,
    },
    /// `(a - b) / (a + b)`.
    NormalizedDifference {
        /// First band (e.g. near infrared).
        a: Box<Self>,
        /// Second band (e.g. red).
        b: Box<Self>,
    },
    /// Clamps values into `[min, max]`.
    Clamp {
        /// Input.
        image: Box<Self>,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// `1` where the value equals one of `values`, else `0`.
    AnyOf {
        /// Input.
        image: Box<Self>,
        /// Accepted values.
        values: Vec<f64>,
    },
    /// Masks `image` wherever `mask` is zero or masked.
    UpdateMask {
        /// Input.
        image: Box<Self>,
        /// Mask image.
        mask: Box<Self>,
    },
    /// Takes `replacement` wherever `mask` is non-zero, `image` elsewhere.
    Where {
        /// Input.
        image: Box<Self>,
        /// Selector.
        mask: Box<Self>,
        /// Value used where the selector is set.
        replacement: Box<Self>,
    },
    /// Square root; negative values are masked.
    Sqrt {
        /// Input.
        image: Box<Self>,
    },
    /// Replaces masked pixels with `fill`.
    Unmask {
        /// Input.
        image: Box<Self>,
        /// Fill value.
        fill: f64,
    },
    /// `1` inside the area, `0` elsewhere.
    Paint {
        /// Painted area.
        area: Area,
    },
    /// Pixel-wise mean of the unmasked inputs.
    MeanOf {
        /// Inputs.
        images: Vec<Self>,
    },
}

impl Image {
    /// A constant image.
    #[must_use]
    pub const fn constant(value: f64) -> Self {
        Self::Constant { value }
    }

    /// A band of the scene being composited.
    #[must_use]
    pub fn band(name: impl Into<String>) -> Self {
        Self::Band { name: name.into() }
    }

    /// A band that falls back to `default` on scenes without it.
    #[must_use]
    pub fn optional_band(name: impl Into<String>, default: f64) -> Self {
        Self::OptionalBand {
            name: name.into(),
            default,
        }
    }

    /// Composites a per-scene expression over a collection.
    #[must_use]
    pub fn composite(collection: Collection, reducer: TemporalReducer, image: Self) -> Self {
        Self::Composite {
            collection,
            reducer,
            image: Box::new(image),
        }
    }

    /// Binary mask of an area.
    #[must_use]
    pub const fn paint(area: Area) -> Self {
        Self::Paint { area }
    }

    /// Pixel-wise mean of several images.
    #[must_use]
    pub const fn mean_of(images: Vec<Self>) -> Self {
        Self::MeanOf { images }
    }

    /// `(a - b) / (a + b)`.
    #[must_use]
    pub fn normalized_difference(a: Self, b: Self) -> Self {
        Self::NormalizedDifference {
            a: Box::new(a),
            b: Box::new(b),
        }
    }

    fn binary(self, op: BinaryOp, right: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    /// `1` where `self > other`.
    #[must_use]
    pub fn greater_than(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::GreaterThan, other.into())
    }

    /// `1` where `self < other`.
    #[must_use]
    pub fn less_than(self, other: impl Into<Self>) -> Self {
        self.binary(BinaryOp::LessThan, other.into())
    }

    /// Clamps into `[min, max]`.
    #[must_use]
    pub fn clamp(self, min: f64, max: f64) -> Self {
        Self::Clamp {
            image: Box::new(self),
            min,
            max,
        }
    }

    /// `1` where the value is one of `values`.
    #[must_use]
    pub fn any_of(self, values: Vec<f64>) -> Self {
        Self::AnyOf {
            image: Box::new(self),
            values,
        }
    }

    /// Masks pixels where `mask` is zero.
    #[must_use]
    pub fn update_mask(self, mask: Self) -> Self {
        Self::UpdateMask {
            image: Box::new(self),
            mask: Box::new(mask),
        }
    }

    /// Takes `replacement` where `mask` is set.
    #[must_use]
    pub fn where_mask(self, mask: Self, replacement: impl Into<Self>) -> Self {
        Self::Where {
            image: Box::new(self),
            mask: Box::new(mask),
            replacement: Box::new(replacement.into()),
        }
    }

    /// Pixel-wise square root.
    #[must_use]
    pub fn sqrt(self) -> Self {
        Self::Sqrt {
            image: Box::new(self),
        }
    }

    /// Fills masked pixels.
    #[must_use]
    pub fn unmask(self, fill: f64) -> Self {
        Self::Unmask {
            image: Box::new(self),
            fill,
        }
    }
}

impl From<f64> for Image {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

macro_rules! impl_arith {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<T: Into<Image>> $trait<T> for Image {
            type Output = Self;

            fn $method(self, rhs: T) -> Self {
                self.binary($op, rhs.into())
            }
        }
    };
}

impl_arith!(Add, add, BinaryOp::Add);
impl_arith!(Sub, sub, BinaryOp::Subtract);
impl_arith!(Mul, mul, BinaryOp::Multiply);
impl_arith!(Div, div, BinaryOp::Divide);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_build_binary_nodes() {
        let image = Image::band("LST_Day_1km") * 0.02 - 273.15;
        let Image::Binary { op, left, right } = image else {
            panic!("expected binary node");
        };
        assert_eq!(op, BinaryOp::Subtract);
        assert_eq!(*right, Image::constant(273.15));
        assert!(matches!(
            *left,
            Image::Binary {
                op: BinaryOp::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn building_is_pure() {
        let a = (Image::band("B8") + Image::band("B4")).clamp(0.0, 1.0);
        let b = (Image::band("B8") + Image::band("B4")).clamp(0.0, 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn divide_masks_zero_denominator() {
        assert_eq!(BinaryOp::Divide.apply(1.0, 0.0), None);
        assert_eq!(BinaryOp::Divide.apply(1.0, 4.0), Some(0.25));
        assert_eq!(BinaryOp::GreaterThan.apply(0.8, 0.75), Some(1.0));
    }

    #[test]
    fn serializes_with_kind_tag() {
        let value = serde_json::to_value(Image::constant(1.5).unmask(0.0)).unwrap();
        assert_eq!(value["kind"], "unmask");
        assert_eq!(value["image"]["kind"], "constant");
        assert_eq!(value["image"]["value"], 1.5);
    }
}
