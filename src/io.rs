//! CSV and JSON input/output.
//!
//! - Merged GPS samples in: `SubjectID,lat,lon,time`
//! - Stay records out (and back in for re-running k-gap)
//! - Similarity matrix out, subject ids as row and column headers
//! - Parameter sets from a JSON array

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, Result, StayError};
use crate::pipeline::{ParameterSet, PipelineOutput};
use crate::similarity::SimilarityMatrix;
use crate::{Fingerprint, GpsPoint, Sample, StayRecord};

/// Directory (under the output root) holding stay record files.
pub const STAY_DIR: &str = "cluster";
/// Directory (under the output root) holding similarity matrices.
pub const KGAP_DIR: &str = "k-gap";

// ============================================================================
// Samples
// ============================================================================

/// One input row of merged GPS samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    #[serde(rename = "SubjectID", alias = "subject_id")]
    pub subject_id: String,
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lon: f64,
    /// Unix seconds; fractional parts are truncated
    #[serde(alias = "timestamp")]
    pub time: f64,
}

impl SampleRow {
    pub fn sample(&self) -> Sample {
        Sample::new(self.lat, self.lon, self.time as i64)
    }
}

/// Read merged GPS samples. Any malformed row aborts the read.
pub fn read_samples<R: Read>(reader: R) -> Result<Vec<SampleRow>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();

    for (i, record) in csv_reader.deserialize::<SampleRow>().enumerate() {
        let row = record?;
        if !(row.time.is_finite() && row.sample().has_valid_time()) {
            return Err(StayError::InvalidInput {
                message: format!("row {}: time '{}' is out of range", i + 1, row.time),
            });
        }
        if !GpsPoint::new(row.lat, row.lon).is_valid() {
            return Err(StayError::InvalidInput {
                message: format!(
                    "row {}: invalid coordinates ({}, {})",
                    i + 1,
                    row.lat,
                    row.lon
                ),
            });
        }
        rows.push(row);
    }

    Ok(rows)
}

pub fn read_samples_path(path: &Path) -> Result<Vec<SampleRow>> {
    let rows = read_samples(File::open(path)?)?;
    info!("[IO] Read {} samples from {}", rows.len(), path.display());
    Ok(rows)
}

// ============================================================================
// Stay Records
// ============================================================================

/// Persisted form of one stay record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StayRow {
    #[serde(rename = "SubjectID")]
    pub subject_id: String,
    /// Pre-consolidation centroid
    pub lat: f64,
    pub lon: f64,
    /// Canonical representative
    pub canonical_lat: f64,
    pub canonical_lon: f64,
    pub group: usize,
    pub start_time: i64,
    pub duration: i64,
    pub end_time: i64,
}

impl StayRow {
    fn new(subject_id: &str, record: &StayRecord) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            lat: record.raw_centroid.latitude,
            lon: record.raw_centroid.longitude,
            canonical_lat: record.location.latitude,
            canonical_lon: record.location.longitude,
            group: record.group,
            start_time: record.start_time,
            duration: record.duration,
            end_time: record.end_time(),
        }
    }

    fn record(&self) -> Result<StayRecord> {
        if self.end_time - self.start_time != self.duration || self.duration < 0 {
            return Err(StayError::InvalidInput {
                message: format!(
                    "stay of '{}' at {}: duration {} does not match end time {}",
                    self.subject_id, self.start_time, self.duration, self.end_time
                ),
            });
        }
        Ok(StayRecord {
            location: GpsPoint::new(self.canonical_lat, self.canonical_lon),
            raw_centroid: GpsPoint::new(self.lat, self.lon),
            group: self.group,
            start_time: self.start_time,
            duration: self.duration,
        })
    }
}

/// Write every subject's stay records as one CSV table.
pub fn write_stay_records<W: Write>(writer: W, fingerprints: &[Fingerprint]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for fingerprint in fingerprints {
        for record in &fingerprint.records {
            csv_writer.serialize(StayRow::new(&fingerprint.subject_id, record))?;
        }
    }
    csv_writer.flush()?;
    Ok(())
}

/// Read stay records back into fingerprints, one per subject in first-seen order.
pub fn read_stay_records<R: Read>(reader: R) -> Result<Vec<Fingerprint>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut fingerprints: Vec<Fingerprint> = Vec::new();

    for row in csv_reader.deserialize::<StayRow>() {
        let row = row?;
        let record = row.record()?;
        match fingerprints.last_mut() {
            Some(f) if f.subject_id == row.subject_id => f.records.push(record),
            _ => {
                if fingerprints.iter().any(|f| f.subject_id == row.subject_id) {
                    return Err(StayError::InvalidInput {
                        message: format!(
                            "rows of subject '{}' are not contiguous",
                            row.subject_id
                        ),
                    });
                }
                fingerprints.push(Fingerprint::new(row.subject_id, vec![record]));
            }
        }
    }

    Ok(fingerprints)
}

// ============================================================================
// Similarity Matrix
// ============================================================================

/// Write the matrix with subject ids as headers; undefined cells are left empty.
pub fn write_similarity_matrix<W: Write>(writer: W, matrix: &SimilarityMatrix) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec![String::new()];
    header.extend(matrix.subject_ids().iter().cloned());
    csv_writer.write_record(&header)?;

    for (i, subject_id) in matrix.subject_ids().iter().enumerate() {
        let mut record = vec![subject_id.clone()];
        record.extend(
            matrix
                .row(i)
                .iter()
                .map(|v| v.map(|v| v.to_string()).unwrap_or_default()),
        );
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}

// ============================================================================
// Parameter Sets / Output Layout
// ============================================================================

/// Read a JSON array of parameter sets. Missing fields take their defaults.
pub fn read_parameter_sets<R: Read>(reader: R) -> Result<Vec<ParameterSet>> {
    let sets: Vec<ParameterSet> = serde_json::from_reader(reader)?;
    sets.first()
        .ok_or_config("parameter file lists no parameter sets")?;
    Ok(sets)
}

pub fn stay_records_path(output_dir: &Path, params: &ParameterSet) -> PathBuf {
    output_dir
        .join(STAY_DIR)
        .join(format!("{}.csv", params.label()))
}

pub fn similarity_path(output_dir: &Path, params: &ParameterSet) -> PathBuf {
    output_dir
        .join(KGAP_DIR)
        .join(format!("{}.csv", params.label()))
}

/// Persist one parameter set's stays and matrix under `output_dir`.
///
/// Returns the paths written (stay records, matrix).
pub fn write_outputs(output_dir: &Path, output: &PipelineOutput) -> Result<(PathBuf, PathBuf)> {
    let stays_path = stay_records_path(output_dir, &output.params);
    let matrix_path = similarity_path(output_dir, &output.params);

    for path in [&stays_path, &matrix_path] {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
    }

    write_stay_records(File::create(&stays_path)?, &output.fingerprints)?;
    write_similarity_matrix(File::create(&matrix_path)?, &output.matrix)?;

    info!(
        "[IO] Wrote {} and {}",
        stays_path.display(),
        matrix_path.display()
    );

    Ok((stays_path, matrix_path))
}
