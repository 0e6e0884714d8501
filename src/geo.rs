//! Geographic primitives and distance calculations.
//!
//! All distances are great-circle distances in kilometres on a spherical
//! Earth; bearings are initial bearings in degrees clockwise from north.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns true if both components are finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Haversine distance to `other` in kilometres.
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        // Clamp guards against rounding pushing `a` slightly above 1.0
        let c = 2.0 * a.sqrt().min(1.0).asin();
        EARTH_RADIUS_KM * c
    }

    /// Initial bearing towards `other`, in degrees within `[0, 360)`.
    pub fn bearing_to(&self, other: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let y = d_lon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
        (y.atan2(x).to_degrees() + 360.0) % 360.0
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

/// Distance and bearing from `from` to `to`.
pub fn distance_and_bearing(from: &Coordinates, to: &Coordinates) -> (f64, f64) {
    (from.distance_to(to), from.bearing_to(to))
}

/// A polygon given as a ring of vertices. The ring may or may not repeat
/// its first vertex at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<Coordinates>,
}

impl Polygon {
    pub fn new(points: Vec<Coordinates>) -> Self {
        Self { points }
    }

    /// Arithmetic mean of the distinct vertices.
    pub fn centroid(&self) -> Option<Coordinates> {
        let vertices = self.distinct_vertices();
        if vertices.is_empty() {
            return None;
        }
        let n = vertices.len() as f64;
        let (lat, lon) = vertices.iter().fold((0.0, 0.0), |(lat, lon), p| {
            (lat + p.latitude, lon + p.longitude)
        });
        Some(Coordinates::new(lat / n, lon / n))
    }

    /// Ray-casting point-in-polygon test in the lat/lon plane.
    pub fn contains(&self, point: &Coordinates) -> bool {
        let vertices = self.distinct_vertices();
        if vertices.len() < 3 {
            return false;
        }

        let (x, y) = (point.longitude, point.latitude);
        let mut inside = false;
        let mut j = vertices.len() - 1;
        for i in 0..vertices.len() {
            let (xi, yi) = (vertices[i].longitude, vertices[i].latitude);
            let (xj, yj) = (vertices[j].longitude, vertices[j].latitude);
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Distance in kilometres from `home` to this polygon: zero when inside,
    /// otherwise the distance to the nearest edge.
    pub fn distance_from(&self, home: &Coordinates) -> Option<f64> {
        let vertices = self.distinct_vertices();
        match vertices.len() {
            0 => return None,
            1 => return Some(home.distance_to(&vertices[0])),
            _ => {}
        }
        if self.contains(home) {
            return Some(0.0);
        }

        let mut nearest = f64::INFINITY;
        for (i, start) in vertices.iter().enumerate() {
            let end = &vertices[(i + 1) % vertices.len()];
            let closest = closest_point_on_segment(home, start, end);
            nearest = nearest.min(home.distance_to(&closest));
        }
        Some(nearest)
    }

    fn distinct_vertices(&self) -> &[Coordinates] {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) if self.points.len() > 1 && first == last => {
                &self.points[..self.points.len() - 1]
            }
            _ => &self.points,
        }
    }
}

/// Closest point to `home` on the segment `start`-`end`, found in an
/// equirectangular projection centred on `home`.
fn closest_point_on_segment(
    home: &Coordinates,
    start: &Coordinates,
    end: &Coordinates,
) -> Coordinates {
    let scale = home.latitude.to_radians().cos();
    let project = |p: &Coordinates| {
        (
            (p.longitude - home.longitude) * scale,
            p.latitude - home.latitude,
        )
    };

    let (ax, ay) = project(start);
    let (bx, by) = project(end);
    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return *start;
    }

    let t = (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0);
    Coordinates::new(
        start.latitude + t * (end.latitude - start.latitude),
        start.longitude + t * (end.longitude - start.longitude),
    )
}

/// Location attached to a feed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Coordinates),
    Polygon(Polygon),
}

impl Geometry {
    /// Distance in kilometres from `home`, `None` for an empty polygon.
    pub fn distance_from(&self, home: &Coordinates) -> Option<f64> {
        match self {
            Geometry::Point(point) => Some(home.distance_to(point)),
            Geometry::Polygon(polygon) => polygon.distance_from(home),
        }
    }

    /// Representative position: the point itself or the polygon centroid.
    pub fn reference_point(&self) -> Option<Coordinates> {
        match self {
            Geometry::Point(point) => Some(*point),
            Geometry::Polygon(polygon) => polygon.centroid(),
        }
    }
}
