//! Integration tests for k-gap similarity

use stayprint::{
    build_similarity_matrix, k_gap, ordered_k_gap, Fingerprint, GpsPoint, SimilarityConfig,
    StayError, StayRecord,
};

fn stay(lat: f64, lng: f64, start: i64, duration: i64) -> StayRecord {
    StayRecord {
        location: GpsPoint::new(lat, lng),
        raw_centroid: GpsPoint::new(lat, lng),
        group: 0,
        start_time: start,
        duration,
    }
}

fn fingerprints() -> Vec<Fingerprint> {
    vec![
        Fingerprint::new("alice", vec![stay(38.0336, -78.5080, 0, 3600)]),
        Fingerprint::new(
            "bob",
            vec![
                stay(38.0336, -78.5080, 0, 1800),
                stay(38.0436, -78.5080, 7200, 3600),
            ],
        ),
        Fingerprint::new(
            "carol",
            vec![
                stay(38.0340, -78.5085, 3600, 7200),
                stay(38.0436, -78.4953, 14_400, 3600),
                stay(38.0336, -78.5080, 28_800, 3600),
            ],
        ),
        Fingerprint::new("dave", vec![]),
    ]
}

#[test]
fn test_identical_stays_score_one_half() {
    // Known quirk kept on purpose: a full overlap of exactly the window
    // scores the maximal temporal stretch, so identical stays give 0.5.
    let config = SimilarityConfig {
        max_distance: 100.0,
        max_overlap_window: 3600.0,
    };
    let a = Fingerprint::new("a", vec![stay(38.0336, -78.5080, 0, 3600)]);
    let b = Fingerprint::new("b", vec![stay(38.0336, -78.5080, 0, 3600)]);

    assert_eq!(k_gap(&a, &b, &config).unwrap(), 0.5);
    assert_eq!(ordered_k_gap(&a, &b, &config).unwrap(), 0.5);
}

#[test]
fn test_shorter_fingerprint_is_outer_loop() {
    let config = SimilarityConfig::default();
    let fps = fingerprints();
    let (alice, carol) = (&fps[0], &fps[2]);

    let ordered = ordered_k_gap(alice, carol, &config).unwrap();
    assert_eq!(ordered, k_gap(alice, carol, &config).unwrap());
    assert_eq!(ordered, ordered_k_gap(carol, alice, &config).unwrap());
}

#[test]
fn test_empty_fingerprint_is_an_error() {
    let fps = fingerprints();
    assert!(matches!(
        k_gap(&fps[0], &fps[3], &SimilarityConfig::default()),
        Err(StayError::EmptyFingerprint { .. })
    ));
}

#[test]
fn test_matrix_symmetric_for_any_parameters() {
    let fps = fingerprints();

    for max_distance in [1.0, 50.0, 100.0, 5000.0] {
        for window in [60.0, 1800.0, 3600.0, 86_400.0] {
            let config = SimilarityConfig {
                max_distance,
                max_overlap_window: window,
            };
            let matrix = build_similarity_matrix(&fps, &config).unwrap();

            assert!(matrix.is_symmetric());
            for i in 0..matrix.len() {
                assert_eq!(matrix.get(i, i), None);
            }
            // Three non-empty subjects -> three pairs, both cells each
            assert_eq!(matrix.defined_count(), 6);
            assert_eq!(matrix.get_by_id("alice", "dave"), None);

            for value in matrix.row(0).iter().flatten() {
                assert!((0.0..=1.0).contains(value));
            }
        }
    }
}
