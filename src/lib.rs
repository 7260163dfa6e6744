//! # stayprint
//!
//! Stay-point extraction, place consolidation and behavioural similarity for
//! multi-subject GPS traces.
//!
//! This library provides:
//! - Single-pass stay-point segmentation with one-sample noise tolerance
//! - Density-based consolidation of jittered stays into canonical places
//! - k-gap similarity between subjects' stay fingerprints
//! - A batch pipeline with CSV input/output per parameter set
//!
//! ## Features
//!
//! - **`parallel`** - Per-subject and per-pair parallelism with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use stayprint::{Sample, SegmentationConfig, segment_trace};
//!
//! let trace = vec![
//!     Sample::new(38.0336, -78.5080, 0),
//!     Sample::new(38.0336, -78.5080, 10),
//!     Sample::new(38.0336, -78.5080, 20),
//! ];
//!
//! let config = SegmentationConfig {
//!     distance_threshold: 50.0,
//!     time_threshold: 10,
//!     flush_trailing: true,
//! };
//! let clusters = segment_trace(&trace, &config).unwrap();
//! assert_eq!(clusters.len(), 1);
//! assert_eq!(clusters[0].duration, 20);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, StayError};

// Geographic utilities (distance, centroid, rounding, time grid)
pub mod geo_utils;

// Disjoint sets over point indices
pub mod union_find;
pub use union_find::UnionFind;

// Density clustering contract and the default DBSCAN implementation
pub mod dbscan;
pub use dbscan::{Clustering, Dbscan, DensityClusterer};

// Stay-point segmentation
pub mod segmentation;
pub use segmentation::{segment_trace, validate_trace, SegmenterState, StaySegmenter};

// Consolidation of candidate stays into canonical places
pub mod consolidation;
pub use consolidation::consolidate_clusters;

// k-gap similarity
pub mod similarity;
pub use similarity::{build_similarity_matrix, k_gap, ordered_k_gap, SimilarityMatrix};
#[cfg(feature = "parallel")]
pub use similarity::build_similarity_matrix_parallel;

// Batch pipeline per parameter set
pub mod pipeline;
pub use pipeline::{
    extract_stays, fingerprint_trace, group_by_subject, run_parameter_set, ParameterSet,
    PipelineOutput,
};
#[cfg(feature = "parallel")]
pub use pipeline::{extract_stays_parallel, run_parameter_set_parallel};

// CSV and JSON input/output
pub mod io;
pub use io::SampleRow;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Largest accepted distance of a timestamp from the epoch, in seconds
/// (a little over 3000 years either way).
pub const MAX_ABS_TIMESTAMP: i64 = 100_000_000_000;

/// One raw GPS reading for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub latitude: f64,
    pub longitude: f64,
    /// Unix timestamp (seconds since epoch)
    pub timestamp: i64,
}

impl Sample {
    pub fn new(latitude: f64, longitude: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
        }
    }

    /// The sample's location.
    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }

    /// Whether the timestamp lies within [`MAX_ABS_TIMESTAMP`] of the epoch.
    pub fn has_valid_time(&self) -> bool {
        (-MAX_ABS_TIMESTAMP..=MAX_ABS_TIMESTAMP).contains(&self.timestamp)
    }
}

/// All samples of one subject, in time order.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub subject_id: String,
    pub samples: Vec<Sample>,
}

/// A contiguous run of samples judged spatially close, emitted by the segmenter.
///
/// Never empty; `members` is time-monotonic.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateCluster {
    /// Samples absorbed into this visit, in time order
    pub members: Vec<Sample>,
    /// Arithmetic-mean centroid of the members
    pub centroid: GpsPoint,
    /// Timestamp of the first member
    pub start_time: i64,
    /// Last member time minus first member time, in seconds
    pub duration: i64,
}

impl CandidateCluster {
    pub fn end_time(&self) -> i64 {
        self.start_time + self.duration
    }
}

/// A consolidated, time-bucketed stay at a canonical place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StayRecord {
    /// Canonical representative of the consolidation group (a real centroid, never a blend)
    pub location: GpsPoint,
    /// Pre-consolidation centroid of the visit
    pub raw_centroid: GpsPoint,
    /// Consolidation group label
    pub group: usize,
    /// Start of the stay, floored to the time grid
    pub start_time: i64,
    /// Floored end minus floored start, in seconds (never negative)
    pub duration: i64,
}

impl StayRecord {
    pub fn end_time(&self) -> i64 {
        self.start_time + self.duration
    }
}

/// A subject's full ordered sequence of stay records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub subject_id: String,
    pub records: Vec<StayRecord>,
}

impl Fingerprint {
    pub fn new(subject_id: impl Into<String>, records: Vec<StayRecord>) -> Self {
        Self {
            subject_id: subject_id.into(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for stay-point segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Maximum distance from the running centroid for a sample to join the cluster.
    /// Default: 100.0 meters
    pub distance_threshold: f64,

    /// A visit must last strictly longer than this to be emitted.
    /// Default: 3600 seconds
    pub time_threshold: i64,

    /// Emit the visit still open at the end of the trace (subject to `time_threshold`).
    /// Default: false, the trailing visit is dropped
    #[serde(default)]
    pub flush_trailing: bool,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 100.0,
            time_threshold: 3600,
            flush_trailing: false,
        }
    }
}

/// Configuration for consolidating candidate stays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Neighbour radius for density clustering.
    /// Default: 100.0 meters
    pub epsilon_meters: f64,

    /// Width of the shared time grid; normally the segmentation time threshold.
    /// Default: 3600 seconds
    pub time_grid: i64,

    /// Decimal places kept on output coordinates.
    /// Default: 3
    pub precision: u32,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            epsilon_meters: 100.0,
            time_grid: 3600,
            precision: 3,
        }
    }
}

/// Configuration for k-gap similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Spatial cap; farther pairs get the maximal stretch of 1.
    /// Default: 100.0 meters
    pub max_distance: f64,

    /// Temporal cap; overlaps beyond it get the maximal stretch of 1.
    /// Default: 3600.0 seconds
    pub max_overlap_window: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            max_distance: 100.0,
            max_overlap_window: 3600.0,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
