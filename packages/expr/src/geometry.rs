//! Polygonal areas of interest.
//!
//! Every expression that needs a footprint (bounds filters, paint masks,
//! zonal reductions) carries a [`Shape`], a non-empty [`MultiPolygon`] that
//! travels as `GeoJSON` on the wire.

use geo::{BoundingRect, Centroid, Contains, Coord, LineString, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Metres per degree of latitude (and of longitude at the equator).
pub const METERS_PER_DEGREE: f64 = 111_320.0;

const DISC_SEGMENTS: u32 = 64;

/// Errors produced while converting input geometries.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// The input was not valid `GeoJSON`.
    #[error("Invalid GeoJSON: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// The geometry is valid but cannot act as an area.
    #[error("Unsupported geometry type {kind}: expected Polygon or MultiPolygon")]
    Unsupported {
        /// `GeoJSON` type name of the rejected geometry.
        kind: &'static str,
    },

    /// The geometry contains no polygons.
    #[error("Geometry has no polygons")]
    Empty,
}

impl From<geojson::Error> for GeometryError {
    fn from(e: geojson::Error) -> Self {
        Self::GeoJson(Box::new(e))
    }
}

/// Axis-aligned bounds in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum longitude.
    pub west: f64,
    /// Minimum latitude.
    pub south: f64,
    /// Maximum longitude.
    pub east: f64,
    /// Maximum latitude.
    pub north: f64,
}

impl Bounds {
    /// Latitude of the bounds' horizontal midline.
    #[must_use]
    pub fn mid_latitude(&self) -> f64 {
        f64::midpoint(self.south, self.north)
    }

    /// Grows the bounds by `meters` on every side.
    #[must_use]
    pub fn expand_m(self, meters: f64) -> Self {
        let dlat = meters / METERS_PER_DEGREE;
        let dlon = meters / (METERS_PER_DEGREE * self.mid_latitude().to_radians().cos().max(1e-6));
        Self {
            west: self.west - dlon,
            south: self.south - dlat,
            east: self.east + dlon,
            north: self.north + dlat,
        }
    }
}

/// A non-empty polygonal geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "geojson::Geometry", try_from = "geojson::Geometry")]
pub struct Shape(MultiPolygon<f64>);

impl Shape {
    /// Wraps a multipolygon.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Empty`] if it contains no polygons.
    pub fn new(polygons: MultiPolygon<f64>) -> Result<Self, GeometryError> {
        if polygons.0.is_empty() {
            return Err(GeometryError::Empty);
        }
        Ok(Self(polygons))
    }

    /// Builds a geodesic disc of `radius_m` around a point.
    #[must_use]
    pub fn disc(latitude: f64, longitude: f64, radius_m: f64) -> Self {
        let ring: Vec<Coord<f64>> = (0..DISC_SEGMENTS)
            .map(|i| {
                let bearing = f64::from(i) * std::f64::consts::TAU / f64::from(DISC_SEGMENTS);
                destination(latitude, longitude, bearing, radius_m)
            })
            .collect();

        Self(MultiPolygon(vec![Polygon::new(LineString::from(ring), vec![])]))
    }

    /// Parses a `GeoJSON` geometry object.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] if the value is not a polygonal `GeoJSON`
    /// geometry.
    pub fn from_geojson_value(value: &serde_json::Value) -> Result<Self, GeometryError> {
        let geometry = geojson::Geometry::from_json_value(value.clone())?;
        Self::try_from(geometry)
    }

    /// The underlying polygons.
    #[must_use]
    pub const fn polygons(&self) -> &MultiPolygon<f64> {
        &self.0
    }

    /// Whether the point lies strictly inside the shape.
    #[must_use]
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        self.0.contains(&Point::new(longitude, latitude))
    }

    /// Bounding box of the shape.
    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        self.0.bounding_rect().map(|rect| Bounds {
            west: rect.min().x,
            south: rect.min().y,
            east: rect.max().x,
            north: rect.max().y,
        })
    }

    /// Centroid as `(longitude, latitude)`.
    #[must_use]
    pub fn centroid(&self) -> Option<(f64, f64)> {
        self.0.centroid().map(|p| (p.x(), p.y()))
    }

    /// Approximate distance in metres from a point to the nearest ring edge.
    ///
    /// Uses a local equirectangular projection around the point, which is
    /// accurate to well under a percent at buffer distances.
    #[must_use]
    pub fn boundary_distance_m(&self, longitude: f64, latitude: f64) -> f64 {
        let cos_lat = latitude.to_radians().cos();
        let project = |c: Coord<f64>| {
            (
                (c.x - longitude).to_radians() * EARTH_RADIUS_M * cos_lat,
                (c.y - latitude).to_radians() * EARTH_RADIUS_M,
            )
        };

        self.0
            .iter()
            .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
            .flat_map(|ring| ring.lines())
            .map(|line| distance_to_origin(project(line.start), project(line.end)))
            .fold(f64::INFINITY, f64::min)
    }
}

impl From<Shape> for geojson::Geometry {
    fn from(shape: Shape) -> Self {
        Self::new(geojson::Value::from(&shape.0))
    }
}

impl TryFrom<geojson::Geometry> for Shape {
    type Error = GeometryError;

    fn try_from(geometry: geojson::Geometry) -> Result<Self, Self::Error> {
        let geometry: geo::Geometry<f64> = geometry.try_into()?;
        match geometry {
            geo::Geometry::Polygon(p) => Self::new(MultiPolygon(vec![p])),
            geo::Geometry::MultiPolygon(mp) => Self::new(mp),
            geo::Geometry::Rect(r) => Self::new(MultiPolygon(vec![r.to_polygon()])),
            geo::Geometry::Triangle(t) => Self::new(MultiPolygon(vec![t.to_polygon()])),
            other => Err(GeometryError::Unsupported {
                kind: geometry_kind(&other),
            }),
        }
    }
}

const fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) | geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Polygon(_) | geo::Geometry::Rect(_) | geo::Geometry::Triangle(_) => {
            "Polygon"
        }
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
    }
}

/// A shape, optionally widened by a buffer distance before reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    /// The drawn shape.
    pub shape: Shape,
    /// Extra distance around the shape that still counts as inside.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_m: Option<f64>,
}

impl Area {
    /// An unbuffered area.
    #[must_use]
    pub const fn new(shape: Shape) -> Self {
        Self {
            shape,
            buffer_m: None,
        }
    }

    /// Widens the area by `buffer_m`; non-positive buffers are ignored.
    #[must_use]
    pub fn buffered(mut self, buffer_m: f64) -> Self {
        self.buffer_m = (buffer_m > 0.0).then_some(buffer_m);
        self
    }

    /// Whether the point falls inside the shape or within its buffer.
    #[must_use]
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        if self.shape.contains(longitude, latitude) {
            return true;
        }
        self.buffer_m
            .is_some_and(|b| self.shape.boundary_distance_m(longitude, latitude) <= b)
    }

    /// Bounds of the shape grown by the buffer.
    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        let bounds = self.shape.bounds()?;
        Some(self.buffer_m.map_or(bounds, |b| bounds.expand_m(b)))
    }
}

impl From<Shape> for Area {
    fn from(shape: Shape) -> Self {
        Self::new(shape)
    }
}

/// Great-circle destination from a start point, bearing and distance.
fn destination(latitude: f64, longitude: f64, bearing: f64, distance_m: f64) -> Coord<f64> {
    let d = distance_m / EARTH_RADIUS_M;
    let lat1 = latitude.to_radians();
    let lon1 = longitude.to_radians();

    let lat2 = (lat1.sin() * d.cos() + lat1.cos() * d.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * d.sin() * lat1.cos()).atan2(d.cos() - lat1.sin() * lat2.sin());

    Coord {
        x: lon2.to_degrees(),
        y: lat2.to_degrees(),
    }
}

/// Distance from the origin to the segment `a`-`b` in projected metres.
fn distance_to_origin(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len2 = dx.mul_add(dx, dy * dy);
    let t = if len2 <= f64::EPSILON {
        0.0
    } else {
        (-a.0.mul_add(dx, a.1 * dy) / len2).clamp(0.0, 1.0)
    };
    t.mul_add(dx, a.0).hypot(t.mul_add(dy, a.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(west: f64, south: f64, size: f64) -> serde_json::Value {
        serde_json::json!({
            "type": "Polygon",
            "coordinates": [[
                [west, south],
                [west + size, south],
                [west + size, south + size],
                [west, south + size],
                [west, south],
            ]]
        })
    }

    #[test]
    fn disc_contains_center_and_excludes_far_points() {
        let disc = Shape::disc(40.0, -3.0, 1000.0);
        assert!(disc.contains(-3.0, 40.0));
        // ~2.2 km north
        assert!(!disc.contains(-3.0, 40.02));
    }

    #[test]
    fn disc_radius_is_close_to_requested() {
        let disc = Shape::disc(0.0, 0.0, 5000.0);
        let bounds = disc.bounds().unwrap();
        let north_m = bounds.north * METERS_PER_DEGREE;
        assert!((north_m - 5000.0).abs() < 50.0, "north edge at {north_m} m");
    }

    #[test]
    fn parses_polygon_geojson() {
        let shape = Shape::from_geojson_value(&square(10.0, 10.0, 0.1)).unwrap();
        assert!(shape.contains(10.05, 10.05));
        assert!(!shape.contains(10.2, 10.05));
    }

    #[test]
    fn rejects_point_geometry() {
        let value = serde_json::json!({"type": "Point", "coordinates": [1.0, 2.0]});
        let err = Shape::from_geojson_value(&value).unwrap_err();
        assert!(matches!(err, GeometryError::Unsupported { kind: "Point" }));
    }

    #[test]
    fn rejects_malformed_geojson() {
        let value = serde_json::json!({"type": "Polygon"});
        assert!(matches!(
            Shape::from_geojson_value(&value),
            Err(GeometryError::GeoJson(_))
        ));
    }

    #[test]
    fn buffered_area_includes_nearby_points() {
        let shape = Shape::from_geojson_value(&square(0.0, 0.0, 0.01)).unwrap();
        // ~555 m east of the east edge
        let (lon, lat) = (0.015, 0.005);
        assert!(!Area::new(shape.clone()).contains(lon, lat));
        assert!(Area::new(shape.clone()).buffered(800.0).contains(lon, lat));
        assert!(!Area::new(shape).buffered(300.0).contains(lon, lat));
    }

    #[test]
    fn boundary_distance_matches_projection() {
        let shape = Shape::from_geojson_value(&square(0.0, 0.0, 0.01)).unwrap();
        let d = shape.boundary_distance_m(0.02, 0.005);
        let expected = 0.01_f64.to_radians() * EARTH_RADIUS_M;
        assert!((d - expected).abs() < 1.0, "{d} vs {expected}");
    }

    #[test]
    fn shape_serializes_as_geojson() {
        let shape = Shape::from_geojson_value(&square(0.0, 0.0, 1.0)).unwrap();
        let value = serde_json::to_value(&shape).unwrap();
        assert_eq!(value["type"], "MultiPolygon");
        let back: Shape = serde_json::from_value(value).unwrap();
        assert_eq!(back, shape);
    }
}
