//! Consolidation of candidate stays into canonical places.
//!
//! GPS jitter makes repeated visits to one place land on slightly different
//! centroids. The consolidator runs a density clustering over one subject's
//! candidate centroids (minimum group size 1, so nothing is noise) and snaps
//! every stay to its group's canonical representative. Times are floored
//! onto a shared grid so stays from different subjects line up.

use log::debug;

use crate::dbscan::DensityClusterer;
use crate::error::{OptionExt, Result, StayError};
use crate::geo_utils::{floor_to_grid, round_point};
use crate::{CandidateCluster, ConsolidationConfig, GpsPoint, StayRecord};

/// Every point forms or joins a group; no noise.
const MIN_GROUP_SIZE: usize = 1;

/// Most decimals a coordinate may be rounded to; f64 holds about 15 for degrees.
pub const MAX_PRECISION: u32 = 15;

fn validate_config(config: &ConsolidationConfig) -> Result<()> {
    if !config.epsilon_meters.is_finite() || config.epsilon_meters < 0.0 {
        return Err(StayError::Config {
            message: format!(
                "epsilon must be finite and >= 0 meters, got {}",
                config.epsilon_meters
            ),
        });
    }
    if config.time_grid <= 0 {
        return Err(StayError::Config {
            message: format!("time grid must be positive, got {}", config.time_grid),
        });
    }
    if config.precision > MAX_PRECISION {
        return Err(StayError::Config {
            message: format!(
                "precision must be at most {} decimals, got {}",
                MAX_PRECISION, config.precision
            ),
        });
    }
    Ok(())
}

/// Consolidate one subject's candidate stays into stay records.
///
/// The output has one record per input cluster, in input order. Each record's
/// `location` is exactly (after rounding) the centroid of some input cluster.
pub fn consolidate_clusters<C>(
    clusters: &[CandidateCluster],
    config: &ConsolidationConfig,
    clusterer: &C,
) -> Result<Vec<StayRecord>>
where
    C: DensityClusterer + ?Sized,
{
    validate_config(config)?;

    if clusters.is_empty() {
        return Ok(Vec::new());
    }

    let centroids: Vec<GpsPoint> = clusters.iter().map(|c| c.centroid).collect();
    let radius = clusterer.radius_from_meters(config.epsilon_meters);
    let clustering = clusterer.cluster(&centroids, radius, MIN_GROUP_SIZE)?;

    if clustering.labels.len() != clusters.len() {
        return Err(StayError::Clustering {
            message: format!(
                "expected {} labels, got {}",
                clusters.len(),
                clustering.labels.len()
            ),
        });
    }

    let records = clusters
        .iter()
        .enumerate()
        .map(|(i, cluster)| {
            let group = clustering.labels[i]
                .ok_or_clustering("point labelled as noise with minimum group size 1")?;
            let representative = clustering
                .representatives
                .get(group)
                .and_then(|&r| centroids.get(r))
                .ok_or_clustering("group has no representative")?;

            let start = floor_to_grid(cluster.start_time, config.time_grid);
            let end = floor_to_grid(cluster.end_time(), config.time_grid);

            Ok(StayRecord {
                location: round_point(representative, config.precision),
                raw_centroid: round_point(&cluster.centroid, config.precision),
                group,
                start_time: start,
                duration: end - start,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        "[Consolidator] {} stays -> {} places",
        records.len(),
        clustering.group_count()
    );

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbscan::{Clustering, Dbscan};
    use crate::Sample;

    fn candidate(lat: f64, lng: f64, start: i64, duration: i64) -> CandidateCluster {
        CandidateCluster {
            members: vec![
                Sample::new(lat, lng, start),
                Sample::new(lat, lng, start + duration),
            ],
            centroid: GpsPoint::new(lat, lng),
            start_time: start,
            duration,
        }
    }

    fn config(epsilon: f64, grid: i64) -> ConsolidationConfig {
        ConsolidationConfig {
            epsilon_meters: epsilon,
            time_grid: grid,
            precision: 6,
        }
    }

    #[test]
    fn test_empty_input() {
        let records = consolidate_clusters(&[], &config(40.0, 60), &Dbscan).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_jittered_visits_snap_to_one_place() {
        let clusters = vec![
            candidate(38.033600, -78.508000, 0, 4000),
            candidate(38.033650, -78.508000, 10_000, 4000),
            candidate(38.033700, -78.508000, 20_000, 4000),
            candidate(38.050000, -78.508000, 30_000, 4000),
        ];

        let records = consolidate_clusters(&clusters, &config(40.0, 3600), &Dbscan).unwrap();
        assert_eq!(records.len(), 4);

        // The middle visit is the most central of the first three
        for record in &records[..3] {
            assert_eq!(record.group, 0);
            assert_eq!(record.location, GpsPoint::new(38.033650, -78.508000));
        }
        assert_eq!(records[3].group, 1);
        assert_eq!(records[3].location, GpsPoint::new(38.050000, -78.508000));

        // Raw centroids survive untouched
        assert_eq!(records[0].raw_centroid, GpsPoint::new(38.033600, -78.508000));
    }

    #[test]
    fn test_times_floored_to_grid() {
        let clusters = vec![candidate(38.0336, -78.5080, 3_700, 3_000)];
        let records = consolidate_clusters(&clusters, &config(40.0, 3600), &Dbscan).unwrap();

        // start 3700 -> 3600, end 6700 -> 3600
        assert_eq!(records[0].start_time, 3600);
        assert_eq!(records[0].duration, 0);
        assert_eq!(records[0].end_time(), 3600);
    }

    #[test]
    fn test_coordinates_rounded() {
        let clusters = vec![candidate(38.033_649_9, -78.508_049_9, 0, 100)];
        let cfg = ConsolidationConfig {
            precision: 3,
            ..config(40.0, 60)
        };
        let records = consolidate_clusters(&clusters, &cfg, &Dbscan).unwrap();
        assert_eq!(records[0].location, GpsPoint::new(38.034, -78.508));
    }

    #[test]
    fn test_rejects_bad_config() {
        let clusters = vec![candidate(38.0336, -78.5080, 0, 100)];
        assert!(matches!(
            consolidate_clusters(&clusters, &config(40.0, 0), &Dbscan),
            Err(StayError::Config { .. })
        ));
        assert!(matches!(
            consolidate_clusters(&clusters, &config(f64::NAN, 60), &Dbscan),
            Err(StayError::Config { .. })
        ));
    }

    #[test]
    fn test_rejects_excessive_precision() {
        let clusters = vec![candidate(38.0336, -78.5080, 0, 100)];
        let cfg = ConsolidationConfig {
            precision: 400,
            ..config(40.0, 60)
        };
        assert!(matches!(
            consolidate_clusters(&clusters, &cfg, &Dbscan),
            Err(StayError::Config { .. })
        ));

        // The cap itself still rounds to finite coordinates
        let cfg = ConsolidationConfig {
            precision: MAX_PRECISION,
            ..config(40.0, 60)
        };
        let records = consolidate_clusters(&clusters, &cfg, &Dbscan).unwrap();
        assert!(records[0].location.is_valid());
        assert!(records[0].raw_centroid.is_valid());
    }

    /// Clusterer that breaks the no-noise contract.
    struct NoisyClusterer;

    impl DensityClusterer for NoisyClusterer {
        fn radius_from_meters(&self, meters: f64) -> f64 {
            meters
        }

        fn cluster(&self, points: &[GpsPoint], _: f64, _: usize) -> Result<Clustering> {
            Ok(Clustering {
                labels: vec![None; points.len()],
                representatives: Vec::new(),
            })
        }
    }

    #[test]
    fn test_noise_is_a_contract_violation() {
        let clusters = vec![candidate(38.0336, -78.5080, 0, 100)];
        assert!(matches!(
            consolidate_clusters(&clusters, &config(40.0, 60), &NoisyClusterer),
            Err(StayError::Clustering { .. })
        ));
    }
}
