//! Batch pipeline for one parameter set.
//!
//! raw samples → traces per subject → candidate stays → stay records
//! (fingerprints) → k-gap matrix.
//!
//! Every stage is all-or-nothing: the first error aborts the run.

use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::consolidation::consolidate_clusters;
use crate::dbscan::DensityClusterer;
use crate::error::Result;
use crate::io::SampleRow;
use crate::segmentation::segment_trace;
use crate::similarity::{build_similarity_matrix, SimilarityMatrix};
use crate::{ConsolidationConfig, Fingerprint, Sample, SegmentationConfig, SimilarityConfig, Trace};

/// One full set of pipeline parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSet {
    /// Segmentation radius in meters.
    /// Default: 100.0
    pub distance_threshold: f64,

    /// Minimum stay duration in seconds; also the width of the output time grid.
    /// Default: 3600
    pub time_threshold: i64,

    /// Consolidation radius in meters. Falls back to `distance_threshold`.
    pub epsilon_meters: Option<f64>,

    /// k-gap spatial cap in meters.
    /// Default: 100.0
    pub max_distance: f64,

    /// k-gap temporal cap in seconds.
    /// Default: 3600.0
    pub max_overlap_window: f64,

    /// Decimal places kept on output coordinates.
    /// Default: 3
    pub precision: u32,

    /// Only the first N subjects with stays enter the similarity matrix (None = all).
    pub subject_limit: Option<usize>,

    /// Emit the visit still open at the end of each trace.
    /// Default: false
    pub flush_trailing: bool,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            distance_threshold: 100.0,
            time_threshold: 3600,
            epsilon_meters: None,
            max_distance: 100.0,
            max_overlap_window: 3600.0,
            precision: 3,
            subject_limit: None,
            flush_trailing: false,
        }
    }
}

impl ParameterSet {
    pub fn segmentation(&self) -> SegmentationConfig {
        SegmentationConfig {
            distance_threshold: self.distance_threshold,
            time_threshold: self.time_threshold,
            flush_trailing: self.flush_trailing,
        }
    }

    pub fn consolidation(&self) -> ConsolidationConfig {
        ConsolidationConfig {
            epsilon_meters: self.epsilon_meters.unwrap_or(self.distance_threshold),
            time_grid: self.time_threshold,
            precision: self.precision,
        }
    }

    pub fn similarity(&self) -> SimilarityConfig {
        SimilarityConfig {
            max_distance: self.max_distance,
            max_overlap_window: self.max_overlap_window,
        }
    }

    /// `{time_threshold}_{distance_threshold}`, used to name output files.
    pub fn label(&self) -> String {
        format!("{}_{}", self.time_threshold, self.distance_threshold)
    }
}

/// Everything one parameter set produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub params: ParameterSet,
    /// One fingerprint per subject, in subject order (possibly empty)
    pub fingerprints: Vec<Fingerprint>,
    pub matrix: SimilarityMatrix,
}

impl PipelineOutput {
    pub fn stay_count(&self) -> usize {
        self.fingerprints.iter().map(|f| f.len()).sum()
    }
}

/// Split input rows into one trace per subject.
///
/// Subjects come out in lexicographic order; samples within a subject are
/// stably sorted by time.
pub fn group_by_subject<I>(rows: I) -> Vec<Trace>
where
    I: IntoIterator<Item = SampleRow>,
{
    let mut by_subject: BTreeMap<String, Vec<Sample>> = BTreeMap::new();
    for row in rows {
        let sample = row.sample();
        by_subject.entry(row.subject_id).or_default().push(sample);
    }

    by_subject
        .into_iter()
        .map(|(subject_id, mut samples)| {
            samples.sort_by_key(|s| s.timestamp);
            Trace {
                subject_id,
                samples,
            }
        })
        .collect()
}

/// Segment and consolidate one subject.
pub fn fingerprint_trace<C>(
    trace: &Trace,
    params: &ParameterSet,
    clusterer: &C,
) -> Result<Fingerprint>
where
    C: DensityClusterer + ?Sized,
{
    let clusters = segment_trace(&trace.samples, &params.segmentation())?;
    let records = consolidate_clusters(&clusters, &params.consolidation(), clusterer)?;
    Ok(Fingerprint::new(trace.subject_id.clone(), records))
}

/// Stay records for every subject.
pub fn extract_stays<C>(
    traces: &[Trace],
    params: &ParameterSet,
    clusterer: &C,
) -> Result<Vec<Fingerprint>>
where
    C: DensityClusterer + ?Sized,
{
    traces
        .iter()
        .map(|trace| fingerprint_trace(trace, params, clusterer))
        .collect()
}

/// Stay records for every subject, one rayon task per subject.
#[cfg(feature = "parallel")]
pub fn extract_stays_parallel<C>(
    traces: &[Trace],
    params: &ParameterSet,
    clusterer: &C,
) -> Result<Vec<Fingerprint>>
where
    C: DensityClusterer + Sync + ?Sized,
{
    use rayon::prelude::*;

    traces
        .par_iter()
        .map(|trace| fingerprint_trace(trace, params, clusterer))
        .collect()
}

/// Subjects that enter the similarity matrix: those with at least one stay,
/// cut to `subject_limit`.
fn matrix_subjects(fingerprints: &[Fingerprint], params: &ParameterSet) -> Vec<Fingerprint> {
    let with_stays = fingerprints.iter().filter(|f| !f.is_empty());
    match params.subject_limit {
        Some(limit) => with_stays.take(limit).cloned().collect(),
        None => with_stays.cloned().collect(),
    }
}

fn log_summary(params: &ParameterSet, fingerprints: &[Fingerprint], matrix: &SimilarityMatrix) {
    info!(
        "[Pipeline] {}: {} subjects, {} stays, {}x{} matrix",
        params.label(),
        fingerprints.len(),
        fingerprints.iter().map(|f| f.len()).sum::<usize>(),
        matrix.len(),
        matrix.len()
    );
}

/// Run one parameter set over all traces.
pub fn run_parameter_set<C>(
    traces: &[Trace],
    params: &ParameterSet,
    clusterer: &C,
) -> Result<PipelineOutput>
where
    C: DensityClusterer + ?Sized,
{
    let fingerprints = extract_stays(traces, params, clusterer)?;
    let matrix =
        build_similarity_matrix(&matrix_subjects(&fingerprints, params), &params.similarity())?;

    log_summary(params, &fingerprints, &matrix);

    Ok(PipelineOutput {
        params: params.clone(),
        fingerprints,
        matrix,
    })
}

/// Run one parameter set with per-subject and per-pair parallelism.
#[cfg(feature = "parallel")]
pub fn run_parameter_set_parallel<C>(
    traces: &[Trace],
    params: &ParameterSet,
    clusterer: &C,
) -> Result<PipelineOutput>
where
    C: DensityClusterer + Sync + ?Sized,
{
    use crate::similarity::build_similarity_matrix_parallel;

    let fingerprints = extract_stays_parallel(traces, params, clusterer)?;
    let matrix = build_similarity_matrix_parallel(
        &matrix_subjects(&fingerprints, params),
        &params.similarity(),
    )?;

    log_summary(params, &fingerprints, &matrix);

    Ok(PipelineOutput {
        params: params.clone(),
        fingerprints,
        matrix,
    })
}
