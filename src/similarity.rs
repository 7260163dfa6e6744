//! k-gap behavioural similarity between stay fingerprints.
//!
//! For every stay in the outer fingerprint, find the stay in the other one
//! with the least stretch effort, then average those minima:
//!
//! ```text
//! k_gap(f1, f2) = 1/|f1| * Σ_{s ∈ f1} min_{t ∈ f2} effort(s, t)
//! effort(s, t)  = 0.5 * spatial_stretch(s, t) + 0.5 * temporal_stretch(s, t)
//! ```
//!
//! k-gap is asymmetric. The matrix always evaluates a pair once, with the
//! shorter fingerprint as the outer loop, and writes that value to both cells.
//!
//! The temporal stretch is taken literally: an overlap inside the window scores
//! `overlap / window`, so a longer shared stay scores *higher*, and only an
//! overlap beyond the window (or none at all) collapses to 1.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StayError};
use crate::geo_utils::geodesic_distance;
use crate::{Fingerprint, SimilarityConfig, StayRecord};

// ============================================================================
// Stretch Functions
// ============================================================================

/// Spatial stretch: distance over `max_distance`, capped at 1.
pub fn spatial_stretch(a: &StayRecord, b: &StayRecord, max_distance: f64) -> f64 {
    let dist = geodesic_distance(&a.location, &b.location);
    if dist <= max_distance {
        dist / max_distance
    } else {
        1.0
    }
}

/// Temporal stretch: overlap over `max_overlap_window` when the overlap lies
/// in `[0, max_overlap_window]`, otherwise 1.
pub fn temporal_stretch(a: &StayRecord, b: &StayRecord, max_overlap_window: f64) -> f64 {
    let overlap = (a.end_time().min(b.end_time()) - a.start_time.max(b.start_time)) as f64;
    if (0.0..=max_overlap_window).contains(&overlap) {
        overlap / max_overlap_window
    } else {
        1.0
    }
}

/// Equal-weight blend of spatial and temporal stretch.
pub fn sample_stretch_effort(a: &StayRecord, b: &StayRecord, config: &SimilarityConfig) -> f64 {
    0.5 * spatial_stretch(a, b, config.max_distance)
        + 0.5 * temporal_stretch(a, b, config.max_overlap_window)
}

// ============================================================================
// k-gap
// ============================================================================

fn validate_config(config: &SimilarityConfig) -> Result<()> {
    if !(config.max_distance.is_finite() && config.max_distance > 0.0) {
        return Err(StayError::Config {
            message: format!("max distance must be positive, got {}", config.max_distance),
        });
    }
    if !(config.max_overlap_window.is_finite() && config.max_overlap_window > 0.0) {
        return Err(StayError::Config {
            message: format!(
                "max overlap window must be positive, got {}",
                config.max_overlap_window
            ),
        });
    }
    Ok(())
}

/// k-gap from `f1` (outer loop) to `f2`.
///
/// Both fingerprints must be non-empty.
pub fn k_gap(f1: &Fingerprint, f2: &Fingerprint, config: &SimilarityConfig) -> Result<f64> {
    validate_config(config)?;
    for f in [f1, f2] {
        if f.is_empty() {
            return Err(StayError::EmptyFingerprint {
                subject_id: f.subject_id.clone(),
            });
        }
    }

    let total: f64 = f1
        .records
        .iter()
        .map(|s| {
            f2.records
                .iter()
                .map(|t| sample_stretch_effort(s, t, config))
                .fold(f64::INFINITY, f64::min)
        })
        .sum();

    Ok(total / f1.len() as f64)
}

/// k-gap with the shorter fingerprint as the outer loop.
///
/// On equal lengths `b` is the outer loop.
pub fn ordered_k_gap(a: &Fingerprint, b: &Fingerprint, config: &SimilarityConfig) -> Result<f64> {
    if a.len() < b.len() {
        k_gap(a, b, config)
    } else {
        k_gap(b, a, config)
    }
}

// ============================================================================
// Similarity Matrix
// ============================================================================

/// Square, subject-indexed k-gap matrix. Symmetric; the diagonal is never set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatrix {
    subject_ids: Vec<String>,
    /// Row-major, `None` = undefined
    values: Vec<Option<f64>>,
}

impl SimilarityMatrix {
    /// An all-undefined matrix over `subject_ids`.
    pub fn new(subject_ids: Vec<String>) -> Self {
        let n = subject_ids.len();
        Self {
            subject_ids,
            values: vec![None; n * n],
        }
    }

    pub fn subject_ids(&self) -> &[String] {
        &self.subject_ids
    }

    pub fn len(&self) -> usize {
        self.subject_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subject_ids.is_empty()
    }

    /// Value at row `i`, column `j`.
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        let n = self.len();
        if i >= n || j >= n {
            return None;
        }
        self.values[i * n + j]
    }

    /// Value for a pair of subject ids.
    pub fn get_by_id(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.index_of(a)?;
        let j = self.index_of(b)?;
        self.get(i, j)
    }

    pub fn index_of(&self, subject_id: &str) -> Option<usize> {
        self.subject_ids.iter().position(|s| s == subject_id)
    }

    /// Write `value` to both `[i, j]` and `[j, i]`.
    ///
    /// Diagonal and out-of-range writes are ignored; returns whether the write happened.
    pub fn set(&mut self, i: usize, j: usize, value: f64) -> bool {
        let n = self.len();
        if i == j || i >= n || j >= n {
            return false;
        }
        self.values[i * n + j] = Some(value);
        self.values[j * n + i] = Some(value);
        true
    }

    /// Row `i` as a slice of cells.
    pub fn row(&self, i: usize) -> &[Option<f64>] {
        let n = self.len();
        &self.values[i * n..(i + 1) * n]
    }

    /// Number of defined off-diagonal cells (each pair counts twice).
    pub fn defined_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.len();
        (0..n).all(|i| (0..n).all(|j| self.get(i, j) == self.get(j, i)))
    }
}

/// Value for one unordered pair, or `None` when either side has no stays.
fn pair_value(
    a: &Fingerprint,
    b: &Fingerprint,
    config: &SimilarityConfig,
) -> Result<Option<f64>> {
    if a.is_empty() || b.is_empty() {
        warn!(
            "[Similarity] Skipping pair ({}, {}): no stay records",
            a.subject_id, b.subject_id
        );
        return Ok(None);
    }
    ordered_k_gap(a, b, config).map(Some)
}

fn pairs(n: usize) -> Vec<(usize, usize)> {
    (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .collect()
}

/// Build the k-gap matrix for every unordered pair of fingerprints.
pub fn build_similarity_matrix(
    fingerprints: &[Fingerprint],
    config: &SimilarityConfig,
) -> Result<SimilarityMatrix> {
    validate_config(config)?;

    let mut matrix =
        SimilarityMatrix::new(fingerprints.iter().map(|f| f.subject_id.clone()).collect());

    for (i, j) in pairs(fingerprints.len()) {
        if let Some(value) = pair_value(&fingerprints[i], &fingerprints[j], config)? {
            matrix.set(i, j, value);
        }
    }

    info!(
        "[Similarity] {} subjects, {} pairs evaluated",
        matrix.len(),
        matrix.defined_count() / 2
    );

    Ok(matrix)
}

/// Build the k-gap matrix using parallel processing (one task per pair).
///
/// Same result as [`build_similarity_matrix`]; cells are written after all
/// pairs have been evaluated.
#[cfg(feature = "parallel")]
pub fn build_similarity_matrix_parallel(
    fingerprints: &[Fingerprint],
    config: &SimilarityConfig,
) -> Result<SimilarityMatrix> {
    use rayon::prelude::*;

    validate_config(config)?;

    let values: Vec<(usize, usize, Option<f64>)> = pairs(fingerprints.len())
        .into_par_iter()
        .map(|(i, j)| pair_value(&fingerprints[i], &fingerprints[j], config).map(|v| (i, j, v)))
        .collect::<Result<Vec<_>>>()?;

    let mut matrix =
        SimilarityMatrix::new(fingerprints.iter().map(|f| f.subject_id.clone()).collect());
    for (i, j, value) in values {
        if let Some(value) = value {
            matrix.set(i, j, value);
        }
    }

    info!(
        "[Similarity] {} subjects, {} pairs evaluated (parallel)",
        matrix.len(),
        matrix.defined_count() / 2
    );

    Ok(matrix)
}
