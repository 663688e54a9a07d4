//! Multi-radius wind speed around a facility.

use std::sync::Arc;

use chrono::{Datelike, Months, NaiveDate};
use land_impact_expr::{Area, Collection, Image, ReduceRequest, Shape, TemporalReducer};
use land_impact_provider::ComputeProvider;
use serde::{Deserialize, Serialize};

/// Dispersion radii in metres.
pub const WIND_RADII_M: [f64; 3] = [1000.0, 5000.0, 10_000.0];

const WIND_SCALE_M: f64 = 1000.0;
const WIND_MAX_PIXELS: u64 = 10_000_000_000_000;

/// Reanalysis dataset holding 10 m wind components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindSource {
    /// Collection id.
    pub collection: String,
    /// Eastward component band.
    pub u_band: String,
    /// Northward component band.
    pub v_band: String,
}

/// Mean wind magnitude at [`WIND_RADII_M`].
#[async_trait::async_trait]
pub trait WindService: Send + Sync {
    /// Wind speed in m/s for each radius. Failed radii are `0.0`.
    async fn wind_speeds(&self, latitude: f64, longitude: f64, today: NaiveDate) -> [f64; 3];
}

/// Wind service backed by a compute provider.
pub struct ProviderWind {
    provider: Arc<dyn ComputeProvider>,
    source: WindSource,
}

impl ProviderWind {
    #[must_use]
    pub fn new(provider: Arc<dyn ComputeProvider>, source: WindSource) -> Self {
        Self { provider, source }
    }

    /// Magnitude of the monthly mean wind vector for the calendar month one
    /// year before `today`.
    #[must_use]
    pub fn speed_image(&self, today: NaiveDate) -> Image {
        let (start, end) = month_a_year_ago(today);
        let collection = Collection::new(&self.source.collection).filter_date(start, end);
        let u = Image::composite(
            collection.clone(),
            TemporalReducer::Mean,
            Image::band(&self.source.u_band),
        );
        let v = Image::composite(collection, TemporalReducer::Mean, Image::band(&self.source.v_band));
        (u.clone() * u + v.clone() * v).sqrt()
    }
}

#[async_trait::async_trait]
impl WindService for ProviderWind {
    async fn wind_speeds(&self, latitude: f64, longitude: f64, today: NaiveDate) -> [f64; 3] {
        let image = self.speed_image(today);
        let mut speeds = [0.0; 3];

        for (slot, radius) in speeds.iter_mut().zip(WIND_RADII_M) {
            let area = Area::new(Shape::disc(latitude, longitude, radius));
            let request = ReduceRequest::mean(image.clone(), area, WIND_SCALE_M)
                .with_max_pixels(WIND_MAX_PIXELS);

            match self.provider.reduce_region(&request).await {
                Ok(out) => match out.value().filter(|v| v.is_finite()) {
                    Some(speed) => {
                        *slot = round2(speed);
                        log::debug!("Wind speed within {radius} m: {slot} m/s");
                    }
                    None => log::warn!("No wind data within {radius} m; using 0.0"),
                },
                Err(e) => log::warn!("Wind lookup within {radius} m failed: {e}"),
            }
        }

        speeds
    }
}

/// `[first day of the month one year ago, first day of the following month)`.
fn month_a_year_ago(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let target = today
        .checked_sub_months(Months::new(12))
        .unwrap_or(today);
    let start = target.with_day(1).unwrap_or(target);
    let end = start
        .checked_add_months(Months::new(1))
        .unwrap_or(start);
    (start, end)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use land_impact_expr::geometry::METERS_PER_DEGREE;
    use land_impact_expr::{ReduceOutput, SampleRequest, SampleRow, TileRequest};
    use land_impact_provider::ProviderError;
    use land_impact_provider::local::{LocalProvider, Scene};

    /// Serves reductions whose area fits in `max_span_m` north to south and
    /// fails the rest.
    struct ShortRange {
        inner: LocalProvider,
        max_span_m: f64,
    }

    #[async_trait::async_trait]
    impl ComputeProvider for ShortRange {
        fn name(&self) -> &'static str {
            "short_range"
        }

        async fn reduce_region(
            &self,
            request: &ReduceRequest,
        ) -> Result<ReduceOutput, ProviderError> {
            let span = request
                .area
                .bounds()
                .map_or(f64::INFINITY, |b| (b.north - b.south) * METERS_PER_DEGREE);
            if span > self.max_span_m {
                return Err(ProviderError::Evaluation {
                    message: format!("area spans {span:.0} m"),
                });
            }
            self.inner.reduce_region(request).await
        }

        async fn sample(&self, request: &SampleRequest) -> Result<Vec<SampleRow>, ProviderError> {
            self.inner.sample(request).await
        }

        async fn tile_url(&self, request: &TileRequest) -> Result<String, ProviderError> {
            self.inner.tile_url(request).await
        }
    }

    fn steady_wind() -> LocalProvider {
        LocalProvider::new().with_scene(
            "ECMWF/ERA5_LAND/HOURLY",
            Scene::new(date(2024, 3, 5))
                .with_constant("u_component_of_wind_10m", 3.0)
                .with_constant("v_component_of_wind_10m", 4.0),
        )
    }

    fn era5() -> WindSource {
        WindSource {
            collection: "ECMWF/ERA5_LAND/HOURLY".to_string(),
            u_band: "u_component_of_wind_10m".to_string(),
            v_band: "v_component_of_wind_10m".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn window_is_previous_years_month() {
        assert_eq!(
            month_a_year_ago(date(2025, 3, 18)),
            (date(2024, 3, 1), date(2024, 4, 1))
        );
        assert_eq!(
            month_a_year_ago(date(2025, 12, 31)),
            (date(2024, 12, 1), date(2025, 1, 1))
        );
    }

    #[tokio::test]
    async fn speeds_from_mean_components() {
        let provider = LocalProvider::new()
            .with_scene(
                "ECMWF/ERA5_LAND/HOURLY",
                Scene::new(date(2024, 3, 5))
                    .with_constant("u_component_of_wind_10m", 2.0)
                    .with_constant("v_component_of_wind_10m", 3.0),
            )
            .with_scene(
                "ECMWF/ERA5_LAND/HOURLY",
                Scene::new(date(2024, 3, 20))
                    .with_constant("u_component_of_wind_10m", 4.0)
                    .with_constant("v_component_of_wind_10m", 5.0),
            );
        let wind = ProviderWind::new(Arc::new(provider), era5());

        let speeds = wind.wind_speeds(19.43, -99.13, date(2025, 3, 18)).await;
        assert_eq!(speeds, [5.0, 5.0, 5.0]);
    }

    #[tokio::test]
    async fn missing_data_degrades_to_zero() {
        let wind = ProviderWind::new(Arc::new(LocalProvider::new()), era5());
        let speeds = wind.wind_speeds(19.43, -99.13, date(2025, 3, 18)).await;
        assert_eq!(speeds, [0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn failed_radius_keeps_siblings() {
        let provider = ShortRange {
            inner: steady_wind(),
            max_span_m: 12_000.0,
        };
        let wind = ProviderWind::new(Arc::new(provider), era5());

        let speeds = wind.wind_speeds(19.43, -99.13, date(2025, 3, 18)).await;
        assert_eq!(speeds, [5.0, 5.0, 0.0]);
    }

    #[tokio::test]
    async fn only_the_smallest_radius_answers() {
        let provider = ShortRange {
            inner: steady_wind(),
            max_span_m: 3_000.0,
        };
        let wind = ProviderWind::new(Arc::new(provider), era5());

        let speeds = wind.wind_speeds(19.43, -99.13, date(2025, 3, 18)).await;
        assert_eq!(speeds, [5.0, 0.0, 0.0]);
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert!((round2(3.14159) - 3.14).abs() < 1e-12);
    }
}
