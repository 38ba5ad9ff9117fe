//! Geographic utilities: distance, bearing and turn angle between GPS points.
//!
//! Two distance formulas are available. A session records the one it was
//! started with and never mixes them, so cumulative distance stays comparable
//! along the whole path.

use geo::{Bearing, Distance, Geodesic, Haversine, Point};
use serde::{Deserialize, Serialize};

use crate::{Bounds, GpsPoint};

/// Distance formula used for a session's incremental accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "snake_case")]
pub enum DistanceFormula {
    /// Great-circle distance on a sphere of mean Earth radius.
    #[default]
    Haversine,
    /// Geodesic distance on the WGS-84 ellipsoid.
    Geodesic,
}

impl DistanceFormula {
    /// Tag used when the formula is persisted with a session.
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceFormula::Haversine => "haversine",
            DistanceFormula::Geodesic => "geodesic",
        }
    }

    /// Parse a persisted tag. Unknown tags fall back to haversine.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "geodesic" => DistanceFormula::Geodesic,
            _ => DistanceFormula::Haversine,
        }
    }

    /// Distance in meters between two points using this formula.
    pub fn distance(&self, a: &GpsPoint, b: &GpsPoint) -> f64 {
        match self {
            DistanceFormula::Haversine => haversine_distance(a, b),
            DistanceFormula::Geodesic => geodesic_distance(a, b),
        }
    }
}

fn to_point(p: &GpsPoint) -> Point<f64> {
    Point::new(p.longitude, p.latitude)
}

/// Great-circle distance in meters (spherical Earth).
pub fn haversine_distance(a: &GpsPoint, b: &GpsPoint) -> f64 {
    if a == b {
        return 0.0;
    }
    Haversine::distance(to_point(a), to_point(b))
}

/// Geodesic distance in meters on the WGS-84 ellipsoid.
pub fn geodesic_distance(a: &GpsPoint, b: &GpsPoint) -> f64 {
    if a == b {
        return 0.0;
    }
    Geodesic::distance(to_point(a), to_point(b))
}

/// Distance in meters using the default (haversine) formula.
pub fn distance(a: &GpsPoint, b: &GpsPoint) -> f64 {
    haversine_distance(a, b)
}

/// Initial bearing from `a` to `b` in degrees, normalized to [0, 360).
///
/// Identical coordinates have no defined bearing; 0.0 is returned instead.
pub fn bearing(a: &GpsPoint, b: &GpsPoint) -> f64 {
    if a == b {
        return 0.0;
    }
    let deg = Haversine::bearing(to_point(a), to_point(b));
    if !deg.is_finite() {
        return 0.0;
    }
    let normalized = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

/// Absolute turn angle at `b` travelling a -> b -> c, in degrees [0, 180].
///
/// A straight continuation is 0, a right-angle turn is 90 and a full
/// reversal is 180.
pub fn bearing_change(a: &GpsPoint, b: &GpsPoint, c: &GpsPoint) -> f64 {
    let incoming = bearing(a, b);
    let outgoing = bearing(b, c);
    let diff = (outgoing - incoming).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Total length of a path in meters, summing consecutive segments.
pub fn polyline_length(points: &[GpsPoint], formula: DistanceFormula) -> f64 {
    points
        .windows(2)
        .map(|w| formula.distance(&w[0], &w[1]))
        .sum()
}

/// Bounding box of a path, or `None` for an empty path.
pub fn compute_bounds(points: &[GpsPoint]) -> Option<Bounds> {
    Bounds::from_points(points)
}
