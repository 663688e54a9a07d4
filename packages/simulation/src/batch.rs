//! Request orchestration for single, batch and tiled simulations.
//!
//! One request opens one session: the region is validated, its base layers
//! are composed, calibration is attempted and the model ladder is resolved.
//! Every geometry of the request then shares that session. Geometries run
//! one after another and a failure in one is recorded in its own entry.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use land_impact_expr::Shape;
use land_impact_industry::IndustrialPipeline;
use land_impact_industry::model::ModelCache;
use land_impact_industry::wind::ProviderWind;
use land_impact_provider::ComputeProvider;
use land_impact_simulation_models::{
    EmissionsAttributes, GreenAttributes, ImpactReport, Layer, Preset, ReportEntry,
    ResidentialAttributes, ScenarioKind, SimulationRequest, TiledReportEntry, ValidationError,
};

use crate::SimulationError;
use crate::calibration::{CalibrationOptions, calibrate};
use crate::catalog::Catalog;
use crate::engine::{RegionModel, SimulatedLayers, simulate};
use crate::region::{AnalysisRegion, BaseLayers, historical_ndvi};
use crate::report::{assemble, initial_kpi};
use crate::request::{parse_geometries, resolve, typed_attributes};
use crate::scenario::{Scenario, modifiers};
use crate::tiles::{baseline_tile, simulated_tiles};

/// A scenario whose attributes have been decoded but whose industrial
/// estimate, if any, is still to be computed.
#[derive(Debug, Clone, PartialEq)]
enum Plan {
    Preset(Preset),
    Industrial(Option<EmissionsAttributes>),
    ResidentialReal(ResidentialAttributes),
    GreenReal(GreenAttributes),
}

impl Plan {
    fn from_request(
        kind: ScenarioKind,
        attributes: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, ValidationError> {
        Ok(match kind {
            ScenarioKind::GreenArea | ScenarioKind::Residential => Self::Preset(kind.base_preset()),
            ScenarioKind::Industrial if attributes.is_empty() => Self::Industrial(None),
            ScenarioKind::Industrial => Self::Industrial(Some(typed_attributes(attributes)?)),
            ScenarioKind::ResidentialReal => Self::ResidentialReal(typed_attributes(attributes)?),
            ScenarioKind::GreenReal => Self::GreenReal(typed_attributes(attributes)?),
        })
    }
}

/// A validated geometry ready to simulate.
#[derive(Debug, Clone)]
struct Item {
    shape: Shape,
    name: String,
    plan: Plan,
}

/// Runs simulations against a shared provider.
pub struct ImpactEngine {
    provider: Arc<dyn ComputeProvider>,
    catalog: Catalog,
    industry: Arc<IndustrialPipeline>,
    calibration: CalibrationOptions,
    today: Option<NaiveDate>,
}

impl ImpactEngine {
    #[must_use]
    pub fn new(provider: Arc<dyn ComputeProvider>, industry: Arc<IndustrialPipeline>) -> Self {
        Self {
            provider,
            catalog: Catalog::builtin(),
            industry,
            calibration: CalibrationOptions::default(),
            today: None,
        }
    }

    /// Engine whose industrial pipeline looks up wind through `provider`
    /// and loads its predictor from `model_path` on first use.
    #[must_use]
    pub fn from_provider(provider: Arc<dyn ComputeProvider>, model_path: PathBuf) -> Self {
        let catalog = Catalog::builtin();
        let wind = ProviderWind::new(provider.clone(), catalog.wind.clone());
        let industry =
            IndustrialPipeline::new(Arc::new(wind), Arc::new(ModelCache::new()), model_path);
        Self {
            provider,
            catalog,
            industry: Arc::new(industry),
            calibration: CalibrationOptions::default(),
            today: None,
        }
    }

    /// Pins "today" instead of reading the clock.
    #[must_use]
    pub const fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    #[must_use]
    pub const fn with_calibration(mut self, options: CalibrationOptions) -> Self {
        self.calibration = options;
        self
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ComputeProvider> {
        &self.provider
    }

    #[must_use]
    pub fn industry(&self) -> &IndustrialPipeline {
        &self.industry
    }

    /// The pinned date, or today's UTC date.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Simulates exactly one geometry.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Validation`] if the request is malformed
    /// or does not hold exactly one usable geometry.
    pub async fn simulate(
        &self,
        request: &SimulationRequest,
    ) -> Result<ImpactReport, SimulationError> {
        let region = region_from(request.latitude, request.longitude, request.buffer)?;
        let mut items = plan_items(request)?;
        if items.len() != 1 {
            return Err(ValidationError::Invalid {
                field: "geometry",
                message: format!("expected exactly one geometry, got {}", items.len()),
            }
            .into());
        }
        let item = items.remove(0)?;

        let session = self.open(request, region).await;
        Ok(session.run(&item).await.0)
    }

    /// Simulates every geometry of a request, one entry per geometry.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Validation`] only for request-level
    /// problems; per-geometry problems land in the entries.
    pub async fn simulate_batch(
        &self,
        request: &SimulationRequest,
    ) -> Result<Vec<ReportEntry>, SimulationError> {
        let region = region_from(request.latitude, request.longitude, request.buffer)?;
        let items = plan_items(request)?;

        let session = self.open(request, region).await;
        let mut entries = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            entries.push(match item {
                Ok(item) => ReportEntry::ok(session.run(&item).await.0),
                Err(e) => {
                    log::warn!("Geometry {i} rejected: {e}");
                    ReportEntry::failed(e)
                }
            });
        }
        Ok(entries)
    }

    /// Like [`Self::simulate_batch`], pairing each report with tile URLs
    /// for its simulated layers.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Validation`] only for request-level
    /// problems.
    pub async fn simulate_tiles(
        &self,
        request: &SimulationRequest,
    ) -> Result<Vec<TiledReportEntry>, SimulationError> {
        let region = region_from(request.latitude, request.longitude, request.buffer)?;
        let items = plan_items(request)?;

        let session = self.open(request, region).await;
        let mut entries = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    log::warn!("Geometry {i} rejected: {e}");
                    entries.push(TiledReportEntry::failed(e));
                    continue;
                }
            };
            let (report, simulated) = session.run(&item).await;
            entries.push(
                match simulated_tiles(self.provider.as_ref(), &session.region, &simulated).await {
                    Ok(tiles) => TiledReportEntry::ok(report, tiles),
                    Err(e) => {
                        log::warn!("Geometry {i} tiles failed: {e}");
                        TiledReportEntry::failed(e)
                    }
                },
            );
        }
        Ok(entries)
    }

    /// Tile URL of one baseline layer over a region.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] for invalid coordinates or if rendering
    /// fails.
    pub async fn baseline_tile(
        &self,
        latitude: Option<f64>,
        longitude: Option<f64>,
        buffer: Option<f64>,
        layer: Layer,
    ) -> Result<String, SimulationError> {
        let region = region_from(latitude, longitude, buffer)?;
        let layers = BaseLayers::build(&region, &self.catalog, self.today());
        Ok(baseline_tile(self.provider.as_ref(), &region, &layers, layer).await?)
    }

    /// Zonal mean of one baseline layer over a region; `None` if the
    /// reduction fails.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Validation`] for invalid coordinates.
    pub async fn baseline_kpi(
        &self,
        latitude: Option<f64>,
        longitude: Option<f64>,
        buffer: Option<f64>,
        layer: Layer,
    ) -> Result<Option<f64>, SimulationError> {
        let region = region_from(latitude, longitude, buffer)?;
        let layers = BaseLayers::build(&region, &self.catalog, self.today());
        Ok(initial_kpi(self.provider.as_ref(), &region, &layers, layer).await)
    }

    async fn open(&self, request: &SimulationRequest, region: AnalysisRegion) -> Session<'_> {
        let today = self.today();
        log::info!(
            "Opening session at ({:.5}, {:.5}) buffer {} m for {today}",
            region.latitude(),
            region.longitude(),
            region.buffer_m()
        );

        let layers = BaseLayers::build(&region, &self.catalog, today);
        let calibration = if request.calibrate.unwrap_or(true) {
            calibrate(self.provider.as_ref(), &region, &layers, &self.calibration).await
        } else {
            log::info!("Calibration disabled by request");
            None
        };
        let model =
            RegionModel::resolve(self.provider.as_ref(), &region, &layers, calibration).await;

        Session {
            engine: self,
            report_buffer: request.report_buffer,
            today,
            region,
            layers,
            model,
        }
    }
}

struct Session<'a> {
    engine: &'a ImpactEngine,
    report_buffer: Option<f64>,
    today: NaiveDate,
    region: AnalysisRegion,
    layers: BaseLayers,
    model: RegionModel,
}

impl Session<'_> {
    async fn run(&self, item: &Item) -> (ImpactReport, SimulatedLayers) {
        let engine = self.engine;
        let scenario = match &item.plan {
            Plan::Preset(preset) => Scenario::Preset {
                preset: *preset,
                industrial: None,
            },
            Plan::Industrial(attributes) => {
                let industrial = match attributes {
                    Some(attributes) => {
                        let (longitude, latitude) = item
                            .shape
                            .centroid()
                            .unwrap_or((self.region.longitude(), self.region.latitude()));
                        Some(
                            engine
                                .industry
                                .estimate(latitude, longitude, attributes, self.today)
                                .await,
                        )
                    }
                    None => None,
                };
                Scenario::Preset {
                    preset: Preset::Industrial,
                    industrial,
                }
            }
            Plan::ResidentialReal(attributes) => Scenario::ResidentialReal(*attributes),
            Plan::GreenReal(attributes) => Scenario::GreenReal(*attributes),
        };

        let historical = historical_ndvi(
            &self.region,
            &engine.catalog,
            self.today,
            scenario.base_preset().ndvi_percentile(),
        );
        let modifiers = modifiers(&scenario, historical);
        let simulated = simulate(&self.layers, &self.model, &item.shape, &modifiers);
        let report = assemble(
            engine.provider.as_ref(),
            &self.layers,
            &simulated,
            &item.shape,
            self.report_buffer,
            &item.name,
        )
        .await;
        (report, simulated)
    }
}

fn required(value: Option<f64>, field: &'static str) -> Result<f64, ValidationError> {
    value.ok_or(ValidationError::Missing { field })
}

fn region_from(
    latitude: Option<f64>,
    longitude: Option<f64>,
    buffer: Option<f64>,
) -> Result<AnalysisRegion, ValidationError> {
    AnalysisRegion::new(
        required(latitude, "latitude")?,
        required(longitude, "longitude")?,
        required(buffer, "buffer")?,
    )
}

/// Parses geometries and resolves their scenarios without touching the
/// provider.
fn plan_items(
    request: &SimulationRequest,
) -> Result<Vec<Result<Item, ValidationError>>, ValidationError> {
    if let Some(buffer) = request.report_buffer
        && !(buffer.is_finite() && buffer >= 0.0)
    {
        return Err(ValidationError::Invalid {
            field: "report_buffer",
            message: format!("{buffer} is not a non-negative distance"),
        });
    }

    let entries = parse_geometries(request.geometry.as_ref())?;
    Ok(entries
        .into_iter()
        .map(|entry| {
            let entry = entry?;
            let resolved = resolve(
                request.preset.as_deref(),
                &request.attributes,
                &entry.properties,
            )?;
            Ok(Item {
                shape: entry.shape,
                name: resolved.kind.to_string(),
                plan: Plan::from_request(resolved.kind, &resolved.attributes)?,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use land_impact_expr::{ReduceOutput, ReduceRequest, SampleRequest, SampleRow, TileRequest};
    use land_impact_industry::wind::WindService;
    use land_impact_provider::ProviderError;
    use land_impact_provider::local::LocalProvider;
    use land_impact_simulation_models::ModelPath;
    use serde_json::json;

    use super::*;
    use crate::testing::FailingProvider;

    struct CalmWind;

    #[async_trait::async_trait]
    impl WindService for CalmWind {
        async fn wind_speeds(&self, _: f64, _: f64, _: NaiveDate) -> [f64; 3] {
            [0.0; 3]
        }
    }

    /// Counts calls and fails them all.
    #[derive(Default)]
    struct CountingProvider {
        reductions: AtomicUsize,
        samples: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ComputeProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn reduce_region(&self, _: &ReduceRequest) -> Result<ReduceOutput, ProviderError> {
            self.reductions.fetch_add(1, Ordering::SeqCst);
            Ok(ReduceOutput::Value(None))
        }

        async fn sample(&self, _: &SampleRequest) -> Result<Vec<SampleRow>, ProviderError> {
            self.samples.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn tile_url(&self, _: &TileRequest) -> Result<String, ProviderError> {
            Ok("counting://{z}/{x}/{y}".to_string())
        }
    }

    fn engine(provider: Arc<dyn ComputeProvider>) -> ImpactEngine {
        let industry = IndustrialPipeline::new(
            Arc::new(CalmWind),
            Arc::new(ModelCache::new()),
            PathBuf::from("/nonexistent/industry_model.json"),
        );
        ImpactEngine::new(provider, Arc::new(industry))
            .with_today(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap())
    }

    fn square(offset: f64) -> serde_json::Value {
        json!({
            "type": "Polygon",
            "coordinates": [[
                [offset, 0.0], [offset + 0.05, 0.0], [offset + 0.05, 0.05],
                [offset, 0.05], [offset, 0.0]
            ]]
        })
    }

    fn request(geometry: serde_json::Value, preset: Option<&str>) -> SimulationRequest {
        SimulationRequest {
            latitude: Some(0.0),
            longitude: Some(0.0),
            buffer: Some(5000.0),
            geometry: Some(geometry),
            preset: preset.map(ToString::to_string),
            ..SimulationRequest::default()
        }
    }

    #[tokio::test]
    async fn validation_happens_before_provider_calls() {
        let provider = Arc::new(CountingProvider::default());
        let engine = engine(provider.clone());

        let mut missing_latitude = request(square(0.0), Some("green_area"));
        missing_latitude.latitude = None;
        let err = engine.simulate(&missing_latitude).await.unwrap_err();
        assert!(matches!(
            err,
            SimulationError::Validation(ValidationError::Missing { field: "latitude" })
        ));

        let mut fractional_buffer = request(square(0.0), Some("green_area"));
        fractional_buffer.buffer = Some(12.5);
        assert!(engine.simulate(&fractional_buffer).await.is_err());

        let unknown = request(square(0.0), Some("volcano"));
        assert!(matches!(
            engine.simulate(&unknown).await,
            Err(SimulationError::Validation(ValidationError::UnknownPreset { .. }))
        ));

        let no_preset = request(square(0.0), None);
        assert!(engine.simulate(&no_preset).await.is_err());

        assert_eq!(provider.reductions.load(Ordering::SeqCst), 0);
        assert_eq!(provider.samples.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_mode_needs_exactly_one_geometry() {
        let engine = engine(Arc::new(FailingProvider));
        let two = request(json!([square(0.0), square(1.0)]), Some("green_area"));
        assert!(matches!(
            engine.simulate(&two).await,
            Err(SimulationError::Validation(ValidationError::Invalid { field: "geometry", .. }))
        ));
    }

    #[tokio::test]
    async fn failing_provider_still_yields_default_report() {
        let engine = engine(Arc::new(FailingProvider));
        let report = engine
            .simulate(&request(square(0.0), Some("green_area")))
            .await
            .unwrap();
        assert_eq!(report.model, ModelPath::Default);
        assert_eq!(report.preset_name, "green_area");
        assert_eq!(report.baseline.temp_c_mean, None);
        assert_eq!(report.delta.aq_mean_0_100, None);
    }

    #[tokio::test]
    async fn batch_isolates_failures() {
        let engine = engine(Arc::new(FailingProvider));
        let geometry = json!([
            square(0.0),
            {"type": "Feature", "geometry": square(0.1), "properties": {"preset": "volcano"}},
            square(0.2)
        ]);
        let entries = engine
            .simulate_batch(&request(geometry, Some("residential")))
            .await
            .unwrap();

        assert_eq!(entries.len(), 3);
        assert!(entries[0].report.is_some() && entries[0].error.is_none());
        assert!(entries[1].report.is_none());
        assert!(entries[1].error.as_deref().unwrap().contains("volcano"));
        assert!(entries[2].report.is_some() && entries[2].error.is_none());
    }

    #[tokio::test]
    async fn calibration_can_be_disabled() {
        let provider = Arc::new(CountingProvider::default());
        let engine = engine(provider.clone());

        let mut req = request(square(0.0), Some("green_area"));
        req.calibrate = Some(false);
        engine.simulate(&req).await.unwrap();
        assert_eq!(provider.samples.load(Ordering::SeqCst), 0);

        req.calibrate = None;
        engine.simulate(&req).await.unwrap();
        assert_eq!(provider.samples.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn industrial_offsets_reach_the_report() {
        let engine = engine(Arc::new(LocalProvider::new()));
        let mut req = request(square(0.0), Some("industrial"));
        req.attributes = serde_json::from_value(json!({"co2": 10.0, "industries": []})).unwrap();

        let report = engine.simulate(&req).await.unwrap();
        assert_eq!(report.model, ModelPath::Default);
        assert_eq!(report.baseline.aq_mean_0_100, None);
        let post_aq = report.post.aq_mean_0_100.unwrap();
        assert!((post_aq - 40.0).abs() < 1e-9, "{post_aq}");
        let post_temp = report.post.temp_c_mean.unwrap();
        assert!((post_temp - 25.0).abs() < 1e-9, "{post_temp}");
    }

    #[tokio::test]
    async fn industrial_without_attributes_has_zero_offsets() {
        let engine = engine(Arc::new(LocalProvider::new()));
        let report = engine
            .simulate(&request(square(0.0), Some("industrial")))
            .await
            .unwrap();
        let post_aq = report.post.aq_mean_0_100.unwrap();
        assert!((post_aq - 30.0).abs() < 1e-9, "{post_aq}");
    }

    #[tokio::test]
    async fn tiles_are_paired_with_reports() {
        let ok = engine(Arc::new(LocalProvider::new()));
        let entries = ok
            .simulate_tiles(&request(json!([square(0.0), square(0.1)]), Some("green_area")))
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        for entry in &entries {
            assert!(entry.report.is_some() && entry.tiles.is_some());
        }

        let failing = engine(Arc::new(FailingProvider));
        let entries = failing
            .simulate_tiles(&request(square(0.0), Some("green_area")))
            .await
            .unwrap();
        assert!(entries[0].report.is_none());
        assert!(entries[0].tiles.is_none());
        assert!(entries[0].error.is_some());
    }

    #[tokio::test]
    async fn baseline_lookups() {
        let engine = engine(Arc::new(CountingProvider::default()));
        let url = engine
            .baseline_tile(Some(0.0), Some(0.0), Some(1000.0), Layer::Ndvi)
            .await
            .unwrap();
        assert!(url.contains("{z}"));

        let kpi = engine
            .baseline_kpi(Some(0.0), Some(0.0), Some(1000.0), Layer::Temp)
            .await
            .unwrap();
        assert_eq!(kpi, None);

        assert!(
            engine
                .baseline_kpi(None, Some(0.0), Some(1000.0), Layer::Temp)
                .await
                .is_err()
        );
    }
}
