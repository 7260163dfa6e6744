//! Integration tests for stay consolidation

use stayprint::geo_utils::round_point;
use stayprint::{
    consolidate_clusters, CandidateCluster, ConsolidationConfig, Dbscan, GpsPoint, Sample,
};

fn candidate(lat: f64, lng: f64, start: i64) -> CandidateCluster {
    CandidateCluster {
        members: vec![Sample::new(lat, lng, start), Sample::new(lat, lng, start + 5400)],
        centroid: GpsPoint::new(lat, lng),
        start_time: start,
        duration: 5400,
    }
}

/// A mix of near-duplicates and far-apart places.
fn visits() -> Vec<CandidateCluster> {
    vec![
        candidate(38.033_612, -78.508_031, 0),
        candidate(38.043_644, -78.508_012, 10_000),
        candidate(38.033_655, -78.507_978, 20_000),
        candidate(38.043_601, -78.508_044, 30_000),
        candidate(38.033_580, -78.508_002, 40_000),
        candidate(38.060_000, -78.470_000, 50_000),
    ]
}

#[test]
fn test_locations_are_real_centroids() {
    let clusters = visits();
    let config = ConsolidationConfig {
        epsilon_meters: 50.0,
        time_grid: 3600,
        precision: 6,
    };

    let records = consolidate_clusters(&clusters, &config, &Dbscan).unwrap();
    assert_eq!(records.len(), clusters.len());

    let inputs: Vec<GpsPoint> = clusters
        .iter()
        .map(|c| round_point(&c.centroid, config.precision))
        .collect();
    for record in &records {
        assert!(
            inputs.contains(&record.location),
            "{:?} is not an input centroid",
            record.location
        );
    }

    // Home, library and the far place
    let mut groups: Vec<usize> = records.iter().map(|r| r.group).collect();
    groups.sort();
    groups.dedup();
    assert_eq!(groups, vec![0, 1, 2]);
    assert_eq!(records[0].group, records[2].group);
    assert_eq!(records[0].group, records[4].group);
    assert_eq!(records[1].group, records[3].group);
}

#[test]
fn test_tiny_epsilon_is_identity() {
    let clusters = visits();
    let config = ConsolidationConfig {
        epsilon_meters: 0.5,
        time_grid: 3600,
        precision: 6,
    };

    let records = consolidate_clusters(&clusters, &config, &Dbscan).unwrap();
    for (i, (record, cluster)) in records.iter().zip(&clusters).enumerate() {
        assert_eq!(record.group, i);
        assert_eq!(record.location, round_point(&cluster.centroid, 6));
    }
}

#[test]
fn test_times_share_grid() {
    let records = consolidate_clusters(
        &visits(),
        &ConsolidationConfig {
            epsilon_meters: 50.0,
            time_grid: 3600,
            precision: 3,
        },
        &Dbscan,
    )
    .unwrap();

    for record in &records {
        assert_eq!(record.start_time % 3600, 0);
        assert_eq!(record.end_time() % 3600, 0);
        assert!(record.duration >= 0);
    }
    // 10_000 -> 7_200, 15_400 -> 14_400
    assert_eq!(records[1].start_time, 7200);
    assert_eq!(records[1].duration, 7200);
}
