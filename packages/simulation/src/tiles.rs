//! Tile rendering for baseline and simulated layers.

use land_impact_expr::{Image, TileRequest, VisParams};
use land_impact_provider::{ComputeProvider, ProviderError};
use land_impact_simulation_models::{Layer, TileSet};

use crate::engine::SimulatedLayers;
use crate::region::{AnalysisRegion, BaseLayers};
use crate::report::baseline_image;

const TEMP_PALETTE: [&str; 9] = [
    "#000080", "#0000FF", "#00FFFF", "#00FF00", "#ADFF2F", "#FFFF00", "#FFA500", "#FF4500",
    "#FF0000",
];
const NDVI_PALETTE: [&str; 4] = ["#ff0000", "#ffff00", "#00ff00", "#004d00"];
const AQ_PALETTE: [&str; 5] = ["#2DC937", "#E7B416", "#E77D11", "#CC3232", "#6B1A6B"];

/// Stretch and colour ramp for a layer.
#[must_use]
pub fn vis_params(layer: Layer) -> VisParams {
    let (min, max, palette): (f64, f64, &[&str]) = match layer {
        Layer::Temp => (-5.0, 45.0, &TEMP_PALETTE),
        Layer::Ndvi => (0.0, 0.7, &NDVI_PALETTE),
        Layer::Aq => (0.0, 100.0, &AQ_PALETTE),
    };
    VisParams {
        min,
        max,
        palette: palette.iter().map(ToString::to_string).collect(),
    }
}

async fn render(
    provider: &dyn ComputeProvider,
    region: &AnalysisRegion,
    image: &Image,
    layer: Layer,
) -> Result<String, ProviderError> {
    let request = TileRequest {
        image: image.clone(),
        area: region.area(),
        vis: vis_params(layer),
    };
    provider.tile_url(&request).await
}

/// Tile URL of a baseline layer clipped to the region.
///
/// # Errors
///
/// Returns [`ProviderError`] if the provider cannot render the layer.
pub async fn baseline_tile(
    provider: &dyn ComputeProvider,
    region: &AnalysisRegion,
    layers: &BaseLayers,
    layer: Layer,
) -> Result<String, ProviderError> {
    render(provider, region, baseline_image(layers, layer), layer).await
}

/// Tile URLs of the three simulated layers clipped to the region.
///
/// # Errors
///
/// Returns [`ProviderError`] if any layer fails to render.
pub async fn simulated_tiles(
    provider: &dyn ComputeProvider,
    region: &AnalysisRegion,
    simulated: &SimulatedLayers,
) -> Result<TileSet, ProviderError> {
    Ok(TileSet {
        sim_temp_url: render(provider, region, &simulated.temperature, Layer::Temp).await?,
        sim_ndvi_url: render(provider, region, &simulated.ndvi, Layer::Ndvi).await?,
        sim_aq_url: render(provider, region, &simulated.air_quality, Layer::Aq).await?,
    })
}

#[cfg(test)]
mod tests {
    use land_impact_provider::local::LocalProvider;
    use land_impact_simulation_models::ModelPath;

    use super::*;

    #[test]
    fn palettes_match_layers() {
        let temp = vis_params(Layer::Temp);
        assert_eq!(temp.palette.len(), 9);
        assert!((temp.min + 5.0).abs() < f64::EPSILON);
        assert!((temp.max - 45.0).abs() < f64::EPSILON);
        assert_eq!(vis_params(Layer::Ndvi).palette.len(), 4);
        assert_eq!(vis_params(Layer::Aq).palette[4], "#6B1A6B");
    }

    #[tokio::test]
    async fn simulated_tiles_are_distinct() {
        let region = AnalysisRegion::new(0.0, 0.0, 1000.0).unwrap();
        let simulated = SimulatedLayers {
            temperature: Image::constant(28.0),
            ndvi: Image::constant(0.5),
            air_quality: Image::constant(35.0),
            model: ModelPath::Default,
        };
        let tiles = simulated_tiles(&LocalProvider::new(), &region, &simulated)
            .await
            .unwrap();
        assert_ne!(tiles.sim_temp_url, tiles.sim_ndvi_url);
        assert_ne!(tiles.sim_ndvi_url, tiles.sim_aq_url);
        assert!(tiles.sim_temp_url.contains("{z}/{x}/{y}"));
    }
}
