//! In-memory compute provider.
//!
//! Scenes are registered per collection id, each with an acquisition date,
//! numeric properties, an optional footprint and per-band data (a constant
//! or a north-up grid with `null` as no-data). Reductions enumerate pixel
//! centres on a metric grid at the requested scale over the area's bounds
//! and keep the centres that fall inside the area.

use std::collections::BTreeMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use land_impact_expr::{
    Area, Bounds, Collection, Filter, Image, LinearFit, ReduceOutput, ReduceRequest, Reduction,
    SampleRequest, SampleRow, Shape, TemporalReducer, TileRequest, geometry::METERS_PER_DEGREE,
};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{ComputeProvider, ProviderError};

/// Upper bound on the candidate grid of a sample; finer grids are coarsened.
const MAX_SAMPLE_CANDIDATES: u64 = 1_000_000;

/// A north-up raster grid in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    /// Longitude of the west edge.
    pub west: f64,
    /// Latitude of the north edge.
    pub north: f64,
    /// Pixel size in degrees.
    pub pixel_deg: f64,
    /// Columns.
    pub width: usize,
    /// Rows.
    pub height: usize,
    /// Row-major values starting at the north-west corner. `None` (JSON
    /// `null`) is no data.
    pub values: Vec<Option<f64>>,
}

impl Grid {
    /// Value of the pixel containing the point.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn value_at(&self, longitude: f64, latitude: f64) -> Option<f64> {
        let col = ((longitude - self.west) / self.pixel_deg).floor();
        let row = ((self.north - latitude) / self.pixel_deg).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        if col >= self.width || row >= self.height {
            return None;
        }
        self.values
            .get(row * self.width + col)
            .copied()
            .flatten()
            .filter(|v| !v.is_nan())
    }
}

/// Data backing one band of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BandData {
    /// The same value everywhere.
    Constant(f64),
    /// Gridded values.
    Grid(Grid),
}

impl BandData {
    fn value_at(&self, longitude: f64, latitude: f64) -> Option<f64> {
        match self {
            Self::Constant(v) => Some(*v),
            Self::Grid(grid) => grid.value_at(longitude, latitude),
        }
    }
}

/// One acquisition in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Acquisition date.
    pub date: NaiveDate,
    /// Numeric metadata (e.g. cloud percentage).
    #[serde(default)]
    pub properties: BTreeMap<String, f64>,
    /// Scene footprint; `None` covers the whole globe.
    #[serde(default)]
    pub footprint: Option<Shape>,
    /// Band data keyed by band name.
    #[serde(default)]
    pub bands: BTreeMap<String, BandData>,
}

impl Scene {
    /// A scene with no bands.
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            properties: BTreeMap::new(),
            footprint: None,
            bands: BTreeMap::new(),
        }
    }

    /// Adds a band.
    #[must_use]
    pub fn with_band(mut self, name: impl Into<String>, data: BandData) -> Self {
        self.bands.insert(name.into(), data);
        self
    }

    /// Adds a constant band.
    #[must_use]
    pub fn with_constant(self, name: impl Into<String>, value: f64) -> Self {
        self.with_band(name, BandData::Constant(value))
    }

    /// Adds a numeric property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: f64) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Restricts the scene to a footprint.
    #[must_use]
    pub fn with_footprint(mut self, footprint: Shape) -> Self {
        self.footprint = Some(footprint);
        self
    }

    fn matches(&self, filter: &Filter) -> bool {
        match filter {
            Filter::Bounds { area } => match (&self.footprint, area.bounds()) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(footprint), Some(b)) => footprint
                    .bounds()
                    .is_some_and(|f| overlaps(&f, &b)),
            },
            Filter::Date { start, end } => *start <= self.date && self.date < *end,
            Filter::CalendarMonth { month } => self.date.month() == *month,
            Filter::PropertyLessThan { name, value } => {
                self.properties.get(name).is_some_and(|v| v < value)
            }
        }
    }
}

fn overlaps(a: &Bounds, b: &Bounds) -> bool {
    a.west <= b.east && b.west <= a.east && a.south <= b.north && b.south <= a.north
}

/// Evaluates expressions over registered scenes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalProvider {
    #[serde(default)]
    collections: BTreeMap<String, Vec<Scene>>,
}

impl LocalProvider {
    /// An empty provider. Composites over unknown collections are masked.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a scene.
    #[must_use]
    pub fn with_scene(mut self, collection: impl Into<String>, scene: Scene) -> Self {
        self.insert_scene(collection, scene);
        self
    }

    /// Registers a scene in place.
    pub fn insert_scene(&mut self, collection: impl Into<String>, scene: Scene) {
        self.collections
            .entry(collection.into())
            .or_default()
            .push(scene);
    }

    /// Loads scenes from a JSON file of the form
    /// `{"collections": {"<id>": [scene, ...]}}`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self, ProviderError> {
        let text = std::fs::read_to_string(path)?;
        let provider: Self = serde_json::from_str(&text)?;
        log::info!(
            "Loaded {} local collections from {}",
            provider.collections.len(),
            path.display()
        );
        Ok(provider)
    }

    fn filter(&self, collection: &Collection) -> Vec<&Scene> {
        self.collections
            .get(&collection.id)
            .map(|scenes| {
                scenes
                    .iter()
                    .filter(|s| collection.filters.iter().all(|f| s.matches(f)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn reduce(&self, request: &ReduceRequest) -> Result<ReduceOutput, ProviderError> {
        let pixels = pixel_centres(
            &request.area,
            request.scale_m,
            request.max_pixels,
            request.best_effort,
        )?;

        match &request.reduction {
            Reduction::Mean { image } => {
                let values = Evaluator::new(self, &[image]).values(image, &pixels)?;
                Ok(ReduceOutput::Value(mean(&values)))
            }
            Reduction::Percentile { image, p } => {
                let mut values = Evaluator::new(self, &[image]).values(image, &pixels)?;
                Ok(ReduceOutput::Value(percentile(&mut values, *p)))
            }
            Reduction::LinearFit { x, y } => {
                let evaluator = Evaluator::new(self, &[x, y]);
                let mut pairs = Vec::new();
                for &(lon, lat) in &pixels {
                    if let (Some(xv), Some(yv)) =
                        (evaluator.eval(x, lon, lat, None)?, evaluator.eval(y, lon, lat, None)?)
                    {
                        pairs.push((xv, yv));
                    }
                }
                Ok(ReduceOutput::Fit(linear_fit(&pairs)))
            }
        }
    }

    fn draw_sample(&self, request: &SampleRequest) -> Result<Vec<SampleRow>, ProviderError> {
        let mut pixels = pixel_centres(&request.area, request.scale_m, MAX_SAMPLE_CANDIDATES, true)?;
        let mut rng = ChaCha8Rng::seed_from_u64(request.seed);
        pixels.shuffle(&mut rng);

        let images: Vec<&Image> = request.bands.iter().map(|b| &b.image).collect();
        let evaluator = Evaluator::new(self, &images);

        let mut rows = Vec::with_capacity(request.num_pixels.min(pixels.len()));
        'pixels: for &(lon, lat) in &pixels {
            if rows.len() >= request.num_pixels {
                break;
            }
            let mut row = SampleRow::new();
            for band in &request.bands {
                let Some(value) = evaluator.eval(&band.image, lon, lat, None)? else {
                    continue 'pixels;
                };
                row.insert(band.name.clone(), value);
            }
            rows.push(row);
        }

        log::debug!(
            "Sampled {} of {} candidate pixels at {} m",
            rows.len(),
            pixels.len(),
            request.scale_m
        );
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl ComputeProvider for LocalProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn reduce_region(&self, request: &ReduceRequest) -> Result<ReduceOutput, ProviderError> {
        self.reduce(request)
    }

    async fn sample(&self, request: &SampleRequest) -> Result<Vec<SampleRow>, ProviderError> {
        self.draw_sample(request)
    }

    async fn tile_url(&self, request: &TileRequest) -> Result<String, ProviderError> {
        let encoded = serde_json::to_string(request)?;
        let mut hasher = DefaultHasher::new();
        encoded.hash(&mut hasher);
        Ok(format!(
            "local://tiles/{:016x}/{{z}}/{{x}}/{{y}}",
            hasher.finish()
        ))
    }
}

/// Evaluates expressions with each distinct collection's scene list
/// resolved once.
///
/// Collections are matched by value: two composites over the same id with
/// different filters get separate scene lists.
struct Evaluator<'a> {
    scenes: Vec<(&'a Collection, Vec<&'a Scene>)>,
}

impl<'a> Evaluator<'a> {
    fn new(provider: &'a LocalProvider, roots: &[&'a Image]) -> Self {
        let mut evaluator = Self { scenes: Vec::new() };
        for root in roots {
            evaluator.resolve(provider, root);
        }
        evaluator
    }

    fn resolve(&mut self, provider: &'a LocalProvider, image: &'a Image) {
        match image {
            Image::Composite {
                collection, image, ..
            } => {
                if self.scenes_for(collection).is_none() {
                    self.scenes.push((collection, provider.filter(collection)));
                }
                self.resolve(provider, image);
            }
            Image::Binary { left, right, .. } => {
                self.resolve(provider, left);
                self.resolve(provider, right);
            }
            Image::NormalizedDifference { a, b } => {
                self.resolve(provider, a);
                self.resolve(provider, b);
            }
            Image::UpdateMask { image, mask } => {
                self.resolve(provider, image);
                self.resolve(provider, mask);
            }
            Image::Where {
                image,
                mask,
                replacement,
            } => {
                self.resolve(provider, image);
                self.resolve(provider, mask);
                self.resolve(provider, replacement);
            }
            Image::Clamp { image, .. }
            | Image::AnyOf { image, .. }
            | Image::Sqrt { image }
            | Image::Unmask { image, .. } => {
                self.resolve(provider, image);
            }
            Image::MeanOf { images } => {
                for image in images {
                    self.resolve(provider, image);
                }
            }
            Image::Constant { .. }
            | Image::Band { .. }
            | Image::OptionalBand { .. }
            | Image::Paint { .. } => {}
        }
    }

    fn scenes_for(&self, collection: &Collection) -> Option<&[&'a Scene]> {
        self.scenes
            .iter()
            .find(|(resolved, _)| *resolved == collection)
            .map(|(_, scenes)| scenes.as_slice())
    }

    fn values(&self, image: &Image, pixels: &[(f64, f64)]) -> Result<Vec<f64>, ProviderError> {
        let mut values = Vec::with_capacity(pixels.len());
        for &(lon, lat) in pixels {
            if let Some(v) = self.eval(image, lon, lat, None)? {
                values.push(v);
            }
        }
        Ok(values)
    }

    fn eval(
        &self,
        image: &Image,
        lon: f64,
        lat: f64,
        scene: Option<&Scene>,
    ) -> Result<Option<f64>, ProviderError> {
        Ok(match image {
            Image::Constant { value } => Some(*value),
            Image::Band { name } => {
                let scene = scene.ok_or_else(|| outside_composite(name))?;
                scene.bands.get(name).and_then(|b| b.value_at(lon, lat))
            }
            Image::OptionalBand { name, default } => {
                let scene = scene.ok_or_else(|| outside_composite(name))?;
                match scene.bands.get(name) {
                    Some(band) => band.value_at(lon, lat),
                    None => Some(*default),
                }
            }
            Image::Composite {
                collection,
                reducer,
                image,
            } => {
                let scenes = self.scenes_for(collection).unwrap_or_default();
                let mut values = Vec::with_capacity(scenes.len());
                for &scene in scenes {
                    if let Some(v) = self.eval(image, lon, lat, Some(scene))? {
                        values.push(v);
                    }
                }
                match reducer {
                    TemporalReducer::Median => median(&mut values),
                    TemporalReducer::Mean => mean(&values),
                    TemporalReducer::Percentile { p } => percentile(&mut values, *p),
                }
            }
            Image::Binary { op, left, right } => {
                match (
                    self.eval(left, lon, lat, scene)?,
                    self.eval(right, lon, lat, scene)?,
                ) {
                    (Some(l), Some(r)) => op.apply(l, r),
                    _ => None,
                }
            }
            Image::NormalizedDifference { a, b } => {
                match (self.eval(a, lon, lat, scene)?, self.eval(b, lon, lat, scene)?) {
                    (Some(a), Some(b)) if a + b != 0.0 => Some((a - b) / (a + b)),
                    _ => None,
                }
            }
            Image::Clamp { image, min, max } => self
                .eval(image, lon, lat, scene)?
                .map(|v| v.clamp(*min, *max)),
            Image::AnyOf { image, values } => self.eval(image, lon, lat, scene)?.map(|v| {
                if values.iter().any(|x| (x - v).abs() < 1e-9) {
                    1.0
                } else {
                    0.0
                }
            }),
            Image::UpdateMask { image, mask } => match self.eval(mask, lon, lat, scene)? {
                Some(m) if m != 0.0 => self.eval(image, lon, lat, scene)?,
                _ => None,
            },
            Image::Where {
                image,
                mask,
                replacement,
            } => match self.eval(mask, lon, lat, scene)? {
                Some(m) if m != 0.0 => self.eval(replacement, lon, lat, scene)?,
                _ => self.eval(image, lon, lat, scene)?,
            },
            Image::Sqrt { image } => self
                .eval(image, lon, lat, scene)?
                .filter(|v| *v >= 0.0)
                .map(f64::sqrt),
            Image::Unmask { image, fill } => {
                Some(self.eval(image, lon, lat, scene)?.unwrap_or(*fill))
            }
            Image::Paint { area } => Some(if area.contains(lon, lat) { 1.0 } else { 0.0 }),
            Image::MeanOf { images } => {
                let mut values = Vec::with_capacity(images.len());
                for image in images {
                    if let Some(v) = self.eval(image, lon, lat, scene)? {
                        values.push(v);
                    }
                }
                mean(&values)
            }
        })
    }
}

fn outside_composite(band: &str) -> ProviderError {
    ProviderError::Evaluation {
        message: format!("band '{band}' referenced outside a composite"),
    }
}

/// Pixel centres inside the area at `scale_m`.
///
/// With `best_effort`, the scale doubles until the bounding grid fits in
/// `max_pixels`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn pixel_centres(
    area: &Area,
    scale_m: f64,
    max_pixels: u64,
    best_effort: bool,
) -> Result<Vec<(f64, f64)>, ProviderError> {
    if !(scale_m.is_finite() && scale_m > 0.0) {
        return Err(ProviderError::Evaluation {
            message: format!("invalid scale {scale_m}"),
        });
    }
    let bounds = area.bounds().ok_or_else(|| ProviderError::Evaluation {
        message: "area has no extent".to_string(),
    })?;

    let max_pixels = max_pixels.max(1);
    let cos_lat = bounds.mid_latitude().to_radians().cos().max(1e-6);
    let mut scale = scale_m;
    let (cols, rows, dlon, dlat) = loop {
        let dlat = scale / METERS_PER_DEGREE;
        let dlon = scale / (METERS_PER_DEGREE * cos_lat);
        let cols = ((bounds.east - bounds.west) / dlon).ceil().max(1.0);
        let rows = ((bounds.north - bounds.south) / dlat).ceil().max(1.0);
        let count = cols * rows;
        if count <= max_pixels as f64 {
            break (cols as usize, rows as usize, dlon, dlat);
        }
        if !best_effort {
            return Err(ProviderError::TooManyPixels {
                count: count as u64,
                max: max_pixels,
            });
        }
        scale *= 2.0;
    };
    if scale > scale_m {
        log::debug!("Coarsened reduction scale from {scale_m} m to {scale} m");
    }

    let mut pixels = Vec::new();
    for r in 0..rows {
        let lat = (r as f64 + 0.5).mul_add(-dlat, bounds.north);
        for c in 0..cols {
            let lon = (c as f64 + 0.5).mul_add(dlon, bounds.west);
            if area.contains(lon, lat) {
                pixels.push((lon, lat));
            }
        }
    }
    Ok(pixels)
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        f64::midpoint(values[mid - 1], values[mid])
    } else {
        values[mid]
    })
}

/// Nearest-rank percentile.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn percentile(values: &mut [f64], p: u8) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let rank = (f64::from(p.min(100)) / 100.0 * values.len() as f64).ceil() as usize;
    Some(values[rank.clamp(1, values.len()) - 1])
}

#[allow(clippy::cast_precision_loss)]
fn linear_fit(pairs: &[(f64, f64)]) -> Option<LinearFit> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (sxx, sxy) = pairs.iter().fold((0.0, 0.0), |(sxx, sxy), (x, y)| {
        let dx = x - mean_x;
        (dx.mul_add(dx, sxx), dx.mul_add(y - mean_y, sxy))
    });
    if sxx <= f64::EPSILON {
        return None;
    }
    let scale = sxy / sxx;
    Some(LinearFit {
        scale,
        offset: scale.mul_add(-mean_x, mean_y),
    })
}
