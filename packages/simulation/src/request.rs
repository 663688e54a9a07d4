//! Request parsing: geometries, scenario names and attribute precedence.
//!
//! The `geometry` field of a request may be a bare geometry, a Feature, a
//! `FeatureCollection`, or a JSON array of geometries and Features. Each
//! item becomes one [`GeometryEntry`], or a per-item [`ValidationError`] so
//! that one bad geometry does not sink its siblings.

use geojson::{Feature, GeoJson};
use land_impact_expr::Shape;
use land_impact_simulation_models::{ScenarioKind, ValidationError};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Property keys naming a per-geometry scenario.
const PRESET_KEYS: [&str; 2] = ["preset", "scenario"];

/// Property key holding a nested attribute object.
const ATTRIBUTES_KEY: &str = "attributes";

/// One polygonal input geometry with its Feature properties.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryEntry {
    pub shape: Shape,
    pub properties: Map<String, Value>,
}

/// Scenario name and attributes after applying precedence rules.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedScenario {
    pub kind: ScenarioKind,
    pub attributes: Map<String, Value>,
}

fn invalid_geometry(message: impl ToString) -> ValidationError {
    ValidationError::Invalid {
        field: "geometry",
        message: message.to_string(),
    }
}

/// Splits the request geometry into entries.
///
/// # Errors
///
/// Returns [`ValidationError`] when the geometry is absent, not `GeoJSON`,
/// or holds no items. Problems with individual items are reported in the
/// returned list instead.
pub fn parse_geometries(
    geometry: Option<&Value>,
) -> Result<Vec<Result<GeometryEntry, ValidationError>>, ValidationError> {
    let geometry = geometry.ok_or(ValidationError::Missing { field: "geometry" })?;

    let entries: Vec<_> = match geometry {
        Value::Array(items) => items.iter().map(parse_item).collect(),
        Value::Object(_) => match GeoJson::from_json_value(geometry.clone()) {
            Ok(GeoJson::FeatureCollection(collection)) => {
                collection.features.into_iter().map(from_feature).collect()
            }
            Ok(GeoJson::Feature(feature)) => vec![from_feature(feature)],
            Ok(GeoJson::Geometry(geometry)) => vec![from_geometry(geometry, Map::new())],
            Err(e) => return Err(invalid_geometry(e)),
        },
        other => {
            return Err(invalid_geometry(format!(
                "expected a GeoJSON object or array, got {other}"
            )));
        }
    };

    if entries.is_empty() {
        return Err(invalid_geometry("no geometries supplied"));
    }

    Ok(entries)
}

fn parse_item(item: &Value) -> Result<GeometryEntry, ValidationError> {
    match GeoJson::from_json_value(item.clone()).map_err(invalid_geometry)? {
        GeoJson::Feature(feature) => from_feature(feature),
        GeoJson::Geometry(geometry) => from_geometry(geometry, Map::new()),
        GeoJson::FeatureCollection(_) => Err(invalid_geometry(
            "nested FeatureCollections are not supported",
        )),
    }
}

fn from_feature(feature: Feature) -> Result<GeometryEntry, ValidationError> {
    let properties = feature.properties.unwrap_or_default();
    let geometry = feature
        .geometry
        .ok_or_else(|| invalid_geometry("Feature has no geometry"))?;
    from_geometry(geometry, properties)
}

fn from_geometry(
    geometry: geojson::Geometry,
    properties: Map<String, Value>,
) -> Result<GeometryEntry, ValidationError> {
    let shape = Shape::try_from(geometry).map_err(invalid_geometry)?;
    Ok(GeometryEntry { shape, properties })
}

/// Applies precedence: a per-geometry `preset`/`scenario` overrides the
/// top-level name, and per-geometry attributes (plain properties first,
/// then a nested `attributes` object) override top-level keys one by one.
///
/// # Errors
///
/// Returns [`ValidationError::Missing`] when neither level names a preset,
/// and [`ValidationError::UnknownPreset`] for unrecognized names.
pub fn resolve(
    top_preset: Option<&str>,
    top_attributes: &Map<String, Value>,
    properties: &Map<String, Value>,
) -> Result<ResolvedScenario, ValidationError> {
    let own_preset = PRESET_KEYS
        .iter()
        .find_map(|key| properties.get(*key).and_then(Value::as_str));
    let name = own_preset
        .or(top_preset)
        .filter(|name| !name.trim().is_empty())
        .ok_or(ValidationError::Missing { field: "preset" })?;
    let kind = ScenarioKind::parse(name)?;

    let mut attributes = top_attributes.clone();
    for (key, value) in properties {
        if key != ATTRIBUTES_KEY && !PRESET_KEYS.contains(&key.as_str()) {
            attributes.insert(key.clone(), value.clone());
        }
    }
    if let Some(Value::Object(nested)) = properties.get(ATTRIBUTES_KEY) {
        for (key, value) in nested {
            attributes.insert(key.clone(), value.clone());
        }
    }

    Ok(ResolvedScenario { kind, attributes })
}

/// Decodes an attribute bundle, ignoring unrelated keys.
///
/// # Errors
///
/// Returns [`ValidationError::Invalid`] when a known key has the wrong type.
pub fn typed_attributes<T: DeserializeOwned>(
    attributes: &Map<String, Value>,
) -> Result<T, ValidationError> {
    serde_json::from_value(Value::Object(attributes.clone())).map_err(|e| {
        ValidationError::Invalid {
            field: "attributes",
            message: e.to_string(),
        }
    })
}
