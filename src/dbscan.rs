//! Density clustering used to consolidate jittered stay locations.
//!
//! [`DensityClusterer`] is the contract the consolidator depends on; [`Dbscan`]
//! is the default implementation. It is a DBSCAN over the great-circle metric
//! with an R-tree for neighbour candidates and a union-find to join core points.
//!
//! Each group also gets a canonical representative: the member whose distance
//! to the group's arithmetic-mean centroid is smallest. Representatives are
//! returned as indices into the input, so they are always real input points.

use log::debug;
use rstar::{RTree, RTreeObject, AABB};

use crate::error::{Result, StayError};
use crate::geo_utils::{centroid, haversine_angle, meters_to_radians};
use crate::union_find::UnionFind;
use crate::GpsPoint;

/// Output of a density clustering run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clustering {
    /// Group per input point; `None` marks noise.
    /// Groups are numbered in order of first appearance.
    pub labels: Vec<Option<usize>>,
    /// Per group, the index of its canonical representative point
    pub representatives: Vec<usize>,
}

impl Clustering {
    /// Number of groups found.
    pub fn group_count(&self) -> usize {
        self.representatives.len()
    }

    /// Number of points labelled as noise.
    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_none()).count()
    }

    /// Index of the representative for the point at `index`, if it belongs to a group.
    pub fn representative_of(&self, index: usize) -> Option<usize> {
        let group = (*self.labels.get(index)?)?;
        self.representatives.get(group).copied()
    }
}

/// Contract for a density-clustering engine.
///
/// `cluster(points, radius, min_group_size)` labels every point and picks one
/// representative per group. With `min_group_size = 1` no point may be noise.
pub trait DensityClusterer {
    /// Convert a ground distance in meters into the radius unit `cluster` expects.
    fn radius_from_meters(&self, meters: f64) -> f64;

    fn cluster(&self, points: &[GpsPoint], radius: f64, min_group_size: usize)
        -> Result<Clustering>;
}

/// A point with its input index, for R-tree candidate queries.
#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    idx: usize,
    lat: f64,
    lng: f64,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lng])
    }
}

/// DBSCAN with the haversine metric. The radius is a central angle in radians.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dbscan;

impl Dbscan {
    pub fn new() -> Self {
        Self
    }

    /// All points within `radius` (inclusive) of `points[i]`, itself included, in index order.
    fn neighbours(
        points: &[GpsPoint],
        rtree: &RTree<IndexedPoint>,
        i: usize,
        radius: f64,
    ) -> Vec<usize> {
        let p = &points[i];

        // Degree box around p; a little padding so the box never clips the circle
        let dlat = radius.to_degrees() * 1.001 + 1e-9;
        let max_abs_lat = (p.latitude.abs() + dlat).min(90.0);
        let cos_lat = max_abs_lat.to_radians().cos();
        let dlng = if cos_lat > 1e-6 { dlat / cos_lat } else { f64::INFINITY };

        let wraps = max_abs_lat >= 90.0
            || p.longitude - dlng < -180.0
            || p.longitude + dlng > 180.0;

        let mut result: Vec<usize> = if wraps {
            // Box crosses a pole or the antimeridian: scan everything
            (0..points.len()).collect()
        } else {
            let envelope = AABB::from_corners(
                [p.latitude - dlat, p.longitude - dlng],
                [p.latitude + dlat, p.longitude + dlng],
            );
            rtree
                .locate_in_envelope(&envelope)
                .map(|ip| ip.idx)
                .collect()
        };

        result.retain(|&j| j == i || haversine_angle(p, &points[j]) <= radius);
        result.sort_unstable();
        result
    }

    /// Index of the member closest to the members' arithmetic-mean centroid.
    /// Ties go to the lowest index.
    fn centermost(points: &[GpsPoint], members: &[usize]) -> Option<usize> {
        let center = centroid(members.iter().map(|&i| points[i]))?;

        let mut best: Option<(usize, f64)> = None;
        for &i in members {
            let d = haversine_angle(&points[i], &center);
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((i, d)),
            }
        }
        best.map(|(i, _)| i)
    }
}

impl DensityClusterer for Dbscan {
    fn radius_from_meters(&self, meters: f64) -> f64 {
        meters_to_radians(meters)
    }

    fn cluster(
        &self,
        points: &[GpsPoint],
        radius: f64,
        min_group_size: usize,
    ) -> Result<Clustering> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(StayError::Config {
                message: format!("clustering radius must be finite and >= 0, got {}", radius),
            });
        }
        if min_group_size == 0 {
            return Err(StayError::Config {
                message: "minimum group size must be at least 1".to_string(),
            });
        }
        if let Some(i) = points.iter().position(|p| !p.is_valid()) {
            return Err(StayError::InvalidCoordinates {
                index: i,
                message: format!("{:?} cannot be clustered", points[i]),
            });
        }

        let n = points.len();
        let rtree = RTree::bulk_load(
            points
                .iter()
                .enumerate()
                .map(|(idx, p)| IndexedPoint {
                    idx,
                    lat: p.latitude,
                    lng: p.longitude,
                })
                .collect(),
        );

        let neighbourhoods: Vec<Vec<usize>> = (0..n)
            .map(|i| Self::neighbours(points, &rtree, i, radius))
            .collect();
        let is_core: Vec<bool> = neighbourhoods
            .iter()
            .map(|nb| nb.len() >= min_group_size)
            .collect();

        // Core points within reach of each other are density-connected
        let mut uf = UnionFind::new(n);
        for i in 0..n {
            if !is_core[i] {
                continue;
            }
            for &j in &neighbourhoods[i] {
                if j > i && is_core[j] {
                    uf.union(i, j);
                }
            }
        }

        // Border points join their lowest-indexed core neighbour; the rest is noise
        let anchors: Vec<Option<usize>> = (0..n)
            .map(|i| {
                if is_core[i] {
                    Some(i)
                } else {
                    neighbourhoods[i].iter().copied().find(|&j| is_core[j])
                }
            })
            .collect();

        let mut root_to_label: Vec<Option<usize>> = vec![None; n];
        let mut members: Vec<Vec<usize>> = Vec::new();
        let mut labels: Vec<Option<usize>> = Vec::with_capacity(n);

        for (i, anchor) in anchors.iter().enumerate() {
            let label = match anchor {
                Some(a) => {
                    let root = uf.find(*a);
                    let label = *root_to_label[root].get_or_insert_with(|| {
                        members.push(Vec::new());
                        members.len() - 1
                    });
                    members[label].push(i);
                    Some(label)
                }
                None => None,
            };
            labels.push(label);
        }

        let representatives = members
            .iter()
            .map(|m| Self::centermost(points, m))
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(|| StayError::Clustering {
                message: "group without members".to_string(),
            })?;

        let clustering = Clustering {
            labels,
            representatives,
        };

        debug!(
            "[Dbscan] {} points -> {} groups ({} noise)",
            n,
            clustering.group_count(),
            clustering.noise_count()
        );

        Ok(clustering)
    }
}
