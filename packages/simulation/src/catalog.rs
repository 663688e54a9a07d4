//! Compile-time catalog of the imagery sources behind the base layers.
//!
//! Each source is described in a TOML file under `catalog/` and embedded at
//! compile time. [`Catalog::builtin`] parses them into typed settings.

use land_impact_industry::wind::WindSource;
use serde::Deserialize;

/// Land surface temperature product.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TemperatureSource {
    pub collection: String,
    pub band: String,
    /// Multiplier from digital numbers to kelvin.
    pub scale: f64,
    /// Added after scaling (kelvin to °C).
    pub offset: f64,
}

/// Optical reflectance product used for vegetation and built-up indices.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OpticalSource {
    pub collection: String,
    pub nir_band: String,
    pub red_band: String,
    pub swir_band: String,
    /// Multiplier from digital numbers to reflectance.
    pub reflectance_scale: f64,
    /// Per-pixel scene classification band.
    pub scene_class_band: String,
    /// Classes retained by the quality mask.
    pub keep_classes: Vec<f64>,
    /// Scene-level cloud percentage property.
    pub cloud_property: String,
    /// Scenes at or above this cloud percentage are dropped.
    pub max_cloud_pct: f64,
}

/// Trailing window a gas is averaged over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    Month,
    Year,
}

/// One trace gas of the air-quality composite.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GasSource {
    pub name: String,
    pub collection: String,
    pub band: String,
    /// Physical value mapped to 0.
    pub min: f64,
    /// Physical value mapped to 100.
    pub max: f64,
    pub window: Window,
    /// Quality band, applied only when a scene carries it.
    #[serde(default = "default_qa_band")]
    pub qa_band: String,
    /// Pixels at or below this quality are masked.
    #[serde(default = "default_qa_min")]
    pub qa_min: f64,
}

fn default_qa_band() -> String {
    "qa_value".to_string()
}

const fn default_qa_min() -> f64 {
    0.75
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct AirQualitySources {
    gases: Vec<GasSource>,
}

/// All sources used by the base-layer builder and the wind lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub temperature: TemperatureSource,
    pub optical: OpticalSource,
    pub wind: WindSource,
    pub gases: Vec<GasSource>,
}

const TEMPERATURE_TOML: &str = include_str!("../catalog/temperature.toml");
const OPTICAL_TOML: &str = include_str!("../catalog/optical.toml");
const WIND_TOML: &str = include_str!("../catalog/wind.toml");
const AIR_QUALITY_TOML: &str = include_str!("../catalog/air_quality.toml");

fn parse<T: for<'de> Deserialize<'de>>(name: &str, text: &str) -> T {
    toml::de::from_str(text)
        .unwrap_or_else(|e| panic!("Failed to parse catalog entry '{name}': {e}"))
}

impl Catalog {
    /// The embedded catalog.
    ///
    /// # Panics
    ///
    /// Panics if an embedded TOML file is malformed (covered by the tests
    /// below, since the files are compiled in).
    #[must_use]
    pub fn builtin() -> Self {
        let air_quality: AirQualitySources = parse("air_quality", AIR_QUALITY_TOML);
        Self {
            temperature: parse("temperature", TEMPERATURE_TOML),
            optical: parse("optical", OPTICAL_TOML),
            wind: parse("wind", WIND_TOML),
            gases: air_quality.gases,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_parses() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.temperature.band, "LST_Day_1km");
        assert!((catalog.temperature.scale - 0.02).abs() < f64::EPSILON);
        assert_eq!(catalog.optical.keep_classes, vec![4.0, 5.0, 6.0]);
        assert_eq!(catalog.wind.collection, "ECMWF/ERA5_LAND/HOURLY");
    }

    #[test]
    fn five_gases_with_valid_ranges() {
        let gases = Catalog::builtin().gases;
        let names: Vec<&str> = gases.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["NO2", "SO2", "O3", "CO", "AER_AI"]);
        for gas in &gases {
            assert!(gas.max > gas.min, "{} has an empty range", gas.name);
            assert_eq!(gas.qa_band, "qa_value");
        }
        assert_eq!(gases[4].window, Window::Year);
        assert!(gases[..4].iter().all(|g| g.window == Window::Month));
    }
}
