//! # Geographic Utilities
//!
//! Distance primitives and small numeric helpers shared by the pipeline stages.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`geodesic_distance`] | WGS84 distance in meters, for segmentation and k-gap |
//! | [`haversine_angle`] | Great-circle central angle in radians, the consolidation metric |
//! | [`centroid`] | Arithmetic-mean centroid of a set of points |
//! | [`round_to`] | Round a coordinate to a fixed number of decimals |
//! | [`floor_to_grid`] | Floor a unix timestamp onto a shared time grid |
//!
//! ## Example
//!
//! ```rust
//! use stayprint::{GpsPoint, geo_utils};
//!
//! let a = GpsPoint::new(38.0336, -78.5080);
//! let b = GpsPoint::new(38.0346, -78.5080);
//!
//! let d = geo_utils::geodesic_distance(&a, &b);
//! assert!((d - 111.0).abs() < 1.0);
//! ```

use geo::{Distance, Geodesic, Point};

use crate::GpsPoint;

/// Mean Earth radius in meters (IUGG), the radius the great-circle metric assumes.
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

// =============================================================================
// Distance Functions
// =============================================================================

/// Geodesic distance between two points on the WGS84 ellipsoid, in meters.
///
/// This is the distance primitive behind the segmenter's range test and the
/// spatial stretch of k-gap.
#[inline]
pub fn geodesic_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Geodesic::distance(point1, point2)
}

/// Great-circle central angle between two points, in radians.
///
/// Equivalent to the haversine metric on radian coordinates; multiply by
/// [`EARTH_RADIUS_METERS`] to get meters.
#[inline]
pub fn haversine_angle(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlng = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * a.sqrt().min(1.0).asin()
}

/// Convert a ground distance in meters to a great-circle angle in radians.
#[inline]
pub fn meters_to_radians(meters: f64) -> f64 {
    meters / EARTH_RADIUS_METERS
}

// =============================================================================
// Centroids
// =============================================================================

/// Arithmetic-mean centroid (mean latitude, mean longitude).
///
/// A planar approximation, fine for the small radii of a stay cluster.
/// Returns `None` for empty input.
pub fn centroid<I>(points: I) -> Option<GpsPoint>
where
    I: IntoIterator<Item = GpsPoint>,
{
    let mut sum_lat = 0.0;
    let mut sum_lng = 0.0;
    let mut n = 0usize;

    for p in points {
        sum_lat += p.latitude;
        sum_lng += p.longitude;
        n += 1;
    }

    if n == 0 {
        return None;
    }

    Some(GpsPoint::new(sum_lat / n as f64, sum_lng / n as f64))
}

// =============================================================================
// Rounding / Time Grid
// =============================================================================

/// Round a value to `precision` decimal places (half away from zero).
///
/// The scale factor overflows to infinity past 308 decimals; callers cap
/// `precision` well below that.
#[inline]
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Round both coordinates of a point to `precision` decimal places.
#[inline]
pub fn round_point(point: &GpsPoint, precision: u32) -> GpsPoint {
    GpsPoint::new(
        round_to(point.latitude, precision),
        round_to(point.longitude, precision),
    )
}

/// Floor a timestamp to the nearest lower multiple of `grid` seconds.
///
/// Uses Euclidean division so pre-epoch timestamps floor downwards too.
/// `grid` must be positive.
#[inline]
pub fn floor_to_grid(timestamp: i64, grid: i64) -> i64 {
    timestamp.div_euclid(grid) * grid
}
