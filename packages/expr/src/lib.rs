#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raster expression types for the land impact engine.
//!
//! Geospatial work is split into two phases. This crate covers the first:
//! building [`Image`] expressions, which is cheap, synchronous and has no
//! side effects. The second phase, evaluation, happens only when one of the
//! request types here ([`ReduceRequest`], [`SampleRequest`],
//! [`TileRequest`]) is handed to a compute provider.

pub mod collection;
pub mod geometry;
pub mod image;
pub mod request;

pub use collection::{Collection, Filter};
pub use geometry::{Area, Bounds, GeometryError, Shape};
pub use image::{BinaryOp, Image, TemporalReducer};
pub use request::{
    LinearFit, ReduceOutput, ReduceRequest, Reduction, SampleBand, SampleRequest, SampleRow,
    TileRequest, VisParams,
};
