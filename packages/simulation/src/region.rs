//! Analysis region and base-layer expressions.
//!
//! Building a region and its layers only composes [`Image`] expressions;
//! nothing is evaluated until a reduction is requested downstream.

use chrono::{Datelike, Days, Months, NaiveDate};
use land_impact_expr::{Area, Collection, Image, Shape, TemporalReducer};
use land_impact_simulation_models::ValidationError;

use crate::catalog::{Catalog, GasSource, OpticalSource, Window};

/// Provider publication latency; trailing windows end this many days ago.
pub const LATENCY_DAYS: u64 = 7;
/// Length of the trailing month window.
pub const MONTH_DAYS: u64 = 30;
/// Length of the trailing year window.
pub const YEAR_DAYS: u64 = 365;
/// Years of same-month history behind percentile targets.
pub const HISTORY_YEARS: u32 = 5;

/// A disc around a centre point. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRegion {
    latitude: f64,
    longitude: f64,
    buffer_m: f64,
    shape: Shape,
}

impl AnalysisRegion {
    /// Validates the inputs and builds the disc.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Invalid`] for out-of-range coordinates or
    /// a buffer that is not a positive whole number of metres.
    pub fn new(latitude: f64, longitude: f64, buffer_m: f64) -> Result<Self, ValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::Invalid {
                field: "latitude",
                message: format!("{latitude} is outside [-90, 90]"),
            });
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::Invalid {
                field: "longitude",
                message: format!("{longitude} is outside [-180, 180]"),
            });
        }
        if !buffer_m.is_finite() || buffer_m <= 0.0 || buffer_m.fract() != 0.0 {
            return Err(ValidationError::Invalid {
                field: "buffer",
                message: format!("{buffer_m} is not a positive whole number of metres"),
            });
        }

        Ok(Self {
            latitude,
            longitude,
            buffer_m,
            shape: Shape::disc(latitude, longitude, buffer_m),
        })
    }

    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }

    #[must_use]
    pub const fn buffer_m(&self) -> f64 {
        self.buffer_m
    }

    /// The disc as a reduction area.
    #[must_use]
    pub fn area(&self) -> Area {
        Area::new(self.shape.clone())
    }
}

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// First day, inclusive.
    pub start: NaiveDate,
    /// Last day, exclusive.
    pub end: NaiveDate,
}

impl TimeWindow {
    /// The `days` days ending at the publication cut-off before `today`.
    #[must_use]
    pub fn trailing(today: NaiveDate, days: u64) -> Self {
        let end = today - Days::new(LATENCY_DAYS);
        Self {
            start: end - Days::new(days),
            end,
        }
    }

    fn for_gas(today: NaiveDate, window: Window) -> Self {
        match window {
            Window::Month => Self::trailing(today, MONTH_DAYS),
            Window::Year => Self::trailing(today, YEAR_DAYS),
        }
    }
}

/// The four baseline rasters of a region.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseLayers {
    /// Land surface temperature, °C.
    pub temperature: Image,
    /// Vegetation index in `[0, 1]`.
    pub ndvi: Image,
    /// Built-up index in `[-1, 1]`. Calibration only.
    pub ndbi: Image,
    /// Air-quality composite in `[0, 100]`.
    pub air_quality: Image,
}

impl BaseLayers {
    /// Composes the baseline expressions for a region.
    #[must_use]
    pub fn build(region: &AnalysisRegion, catalog: &Catalog, today: NaiveDate) -> Self {
        let area = region.area();

        let month = TimeWindow::trailing(today, MONTH_DAYS);
        let lst = &catalog.temperature;
        let temperature = Image::composite(
            Collection::new(&lst.collection)
                .filter_bounds(area.clone())
                .filter_date(month.start, month.end),
            TemporalReducer::Median,
            Image::band(&lst.band) * lst.scale + lst.offset,
        );

        let year = TimeWindow::trailing(today, YEAR_DAYS);
        let optical = optical_collection(&catalog.optical, &area, year);
        let band = |name: &str| {
            Image::composite(
                optical.clone(),
                TemporalReducer::Median,
                masked_reflectance(&catalog.optical, name),
            )
        };
        let nir = band(&catalog.optical.nir_band);
        let red = band(&catalog.optical.red_band);
        let swir = band(&catalog.optical.swir_band);

        let ndvi = Image::normalized_difference(nir.clone(), red).clamp(0.0, 1.0);
        let ndbi = Image::normalized_difference(swir, nir);

        let air_quality = Image::mean_of(
            catalog
                .gases
                .iter()
                .map(|gas| normalized_gas(gas, &area, TimeWindow::for_gas(today, gas.window)))
                .collect(),
        );

        log::debug!(
            "Built base layers around ({}, {}) r={} m for {today}",
            region.latitude,
            region.longitude,
            region.buffer_m
        );

        Self {
            temperature,
            ndvi,
            ndbi,
            air_quality,
        }
    }
}

/// Per-pixel `p`th percentile of scene vegetation index over the same
/// calendar month of the previous [`HISTORY_YEARS`] years, clamped to `[0, 1]`.
#[must_use]
pub fn historical_ndvi(
    region: &AnalysisRegion,
    catalog: &Catalog,
    today: NaiveDate,
    p: u8,
) -> Image {
    let end = today - Days::new(LATENCY_DAYS);
    let start = today
        .checked_sub_months(Months::new(12 * HISTORY_YEARS))
        .unwrap_or(today);
    let window = TimeWindow { start, end };

    let optical = &catalog.optical;
    let collection = optical_collection(optical, &region.area(), window)
        .filter_calendar_month(today.month());
    let per_scene = Image::normalized_difference(
        masked_reflectance(optical, &optical.nir_band),
        masked_reflectance(optical, &optical.red_band),
    );

    Image::composite(collection, TemporalReducer::Percentile { p }, per_scene).clamp(0.0, 1.0)
}

fn optical_collection(optical: &OpticalSource, area: &Area, window: TimeWindow) -> Collection {
    Collection::new(&optical.collection)
        .filter_bounds(area.clone())
        .filter_date(window.start, window.end)
        .filter_property_lt(&optical.cloud_property, optical.max_cloud_pct)
}

/// Reflectance of one band with non-surface scene classes masked out.
fn masked_reflectance(optical: &OpticalSource, band: &str) -> Image {
    let keep = Image::band(&optical.scene_class_band).any_of(optical.keep_classes.clone());
    (Image::band(band) * optical.reflectance_scale).update_mask(keep)
}

/// Mean gas column rescaled from `[min, max]` to `[0, 100]`.
fn normalized_gas(gas: &GasSource, area: &Area, window: TimeWindow) -> Image {
    let quality = Image::optional_band(&gas.qa_band, 1.0).greater_than(gas.qa_min);
    let mean = Image::composite(
        Collection::new(&gas.collection)
            .filter_bounds(area.clone())
            .filter_date(window.start, window.end),
        TemporalReducer::Mean,
        Image::band(&gas.band).update_mask(quality),
    );
    ((mean - gas.min) / (gas.max - gas.min) * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use land_impact_expr::ReduceRequest;
    use land_impact_provider::ComputeProvider;
    use land_impact_provider::local::{LocalProvider, Scene};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2025, 6, 15)
    }

    fn region() -> AnalysisRegion {
        AnalysisRegion::new(20.0, -100.0, 2000.0).unwrap()
    }

    async fn mean(provider: &dyn ComputeProvider, image: Image, scale: f64) -> Option<f64> {
        provider
            .reduce_region(&ReduceRequest::mean(image, region().area(), scale))
            .await
            .unwrap()
            .value()
    }

    #[test]
    fn rejects_bad_region_inputs() {
        assert!(AnalysisRegion::new(95.0, 0.0, 100.0).is_err());
        assert!(AnalysisRegion::new(0.0, 200.0, 100.0).is_err());
        assert!(AnalysisRegion::new(0.0, 0.0, 0.0).is_err());
        assert!(AnalysisRegion::new(0.0, 0.0, 10.5).is_err());
        assert!(AnalysisRegion::new(0.0, 0.0, f64::NAN).is_err());
        assert!(AnalysisRegion::new(0.0, 0.0, 500.0).is_ok());
    }

    #[test]
    fn trailing_windows_end_before_latency() {
        let month = TimeWindow::trailing(today(), MONTH_DAYS);
        assert_eq!(month.end, date(2025, 6, 8));
        assert_eq!(month.start, date(2025, 5, 9));
    }

    #[test]
    fn building_layers_is_pure() {
        let catalog = Catalog::builtin();
        let a = BaseLayers::build(&region(), &catalog, today());
        let b = BaseLayers::build(&region(), &catalog, today());
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn temperature_converts_to_celsius() {
        let catalog = Catalog::builtin();
        let provider = LocalProvider::new()
            .with_scene(
                "MODIS/061/MOD11A1",
                Scene::new(date(2025, 6, 1)).with_constant("LST_Day_1km", 15_000.0),
            )
            .with_scene(
                "MODIS/061/MOD11A1",
                Scene::new(date(2025, 6, 10)).with_constant("LST_Day_1km", 1.0),
            );
        let layers = BaseLayers::build(&region(), &catalog, today());

        let t = mean(&provider, layers.temperature, 1000.0).await.unwrap();
        assert!((t - 26.85).abs() < 1e-9, "{t}");
    }

    #[tokio::test]
    async fn vegetation_masks_clouds_and_classes() {
        let catalog = Catalog::builtin();
        let s2 = "COPERNICUS/S2_SR_HARMONIZED";
        let provider = LocalProvider::new()
            .with_scene(
                s2,
                Scene::new(date(2025, 3, 1))
                    .with_constant("B8", 3000.0)
                    .with_constant("B4", 1000.0)
                    .with_constant("B11", 1500.0)
                    .with_constant("SCL", 4.0)
                    .with_property("CLOUDY_PIXEL_PERCENTAGE", 5.0),
            )
            .with_scene(
                s2,
                Scene::new(date(2025, 3, 2))
                    .with_constant("B8", 100.0)
                    .with_constant("B4", 3000.0)
                    .with_constant("B11", 100.0)
                    .with_constant("SCL", 9.0)
                    .with_property("CLOUDY_PIXEL_PERCENTAGE", 5.0),
            )
            .with_scene(
                s2,
                Scene::new(date(2025, 3, 3))
                    .with_constant("B8", 100.0)
                    .with_constant("B4", 3000.0)
                    .with_constant("B11", 100.0)
                    .with_constant("SCL", 4.0)
                    .with_property("CLOUDY_PIXEL_PERCENTAGE", 60.0),
            );
        let layers = BaseLayers::build(&region(), &catalog, today());

        let ndvi = mean(&provider, layers.ndvi, 500.0).await.unwrap();
        assert!((ndvi - 0.5).abs() < 1e-9, "{ndvi}");
        let ndbi = mean(&provider, layers.ndbi, 500.0).await.unwrap();
        assert!((ndbi + 1.0 / 3.0).abs() < 1e-9, "{ndbi}");
    }

    #[tokio::test]
    async fn air_quality_normalizes_each_gas() {
        let catalog = Catalog::builtin();
        let mut provider = LocalProvider::new();
        let recent = date(2025, 6, 1);
        for (collection, band, value) in [
            ("COPERNICUS/S5P/NRTI/L3_NO2", "NO2_column_number_density", 1e-4),
            ("COPERNICUS/S5P/NRTI/L3_SO2", "SO2_column_number_density", 5e-4),
            ("COPERNICUS/S5P/NRTI/L3_O3", "O3_column_number_density", 0.0),
            ("COPERNICUS/S5P/NRTI/L3_CO", "CO_column_number_density", 1.5e-2),
            ("COPERNICUS/S5P/NRTI/L3_AER_AI", "absorbing_aerosol_index", 0.5),
        ] {
            provider.insert_scene(
                collection,
                Scene::new(recent)
                    .with_constant(band, value)
                    .with_constant("qa_value", 0.9),
            );
        }
        provider.insert_scene(
            "COPERNICUS/S5P/NRTI/L3_NO2",
            Scene::new(recent)
                .with_constant("NO2_column_number_density", 1.0)
                .with_constant("qa_value", 0.2),
        );
        let layers = BaseLayers::build(&region(), &catalog, today());

        // 50, 100 (clamped), 0, 50, 50
        let aq = mean(&provider, layers.air_quality, 1000.0).await.unwrap();
        assert!((aq - 50.0).abs() < 1e-9, "{aq}");
    }

    #[tokio::test]
    async fn historical_percentile_uses_same_month() {
        let catalog = Catalog::builtin();
        let s2 = "COPERNICUS/S2_SR_HARMONIZED";
        let scene = |d: NaiveDate, nir: f64| {
            Scene::new(d)
                .with_constant("B8", nir)
                .with_constant("B4", 1000.0)
                .with_constant("SCL", 4.0)
                .with_property("CLOUDY_PIXEL_PERCENTAGE", 1.0)
        };
        let provider = Arc::new(
            LocalProvider::new()
                .with_scene(s2, scene(date(2021, 6, 10), 1000.0))
                .with_scene(s2, scene(date(2022, 6, 10), 2000.0))
                .with_scene(s2, scene(date(2023, 6, 10), 3000.0))
                .with_scene(s2, scene(date(2024, 1, 10), 9000.0)),
        );

        let p90 = historical_ndvi(&region(), &catalog, today(), 90);
        let p10 = historical_ndvi(&region(), &catalog, today(), 10);
        let high = mean(provider.as_ref(), p90, 500.0).await.unwrap();
        let low = mean(provider.as_ref(), p10, 500.0).await.unwrap();
        assert!((high - 0.5).abs() < 1e-9, "{high}");
        assert!(low.abs() < 1e-9, "{low}");
    }
}
