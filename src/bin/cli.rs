//! stayprint CLI - batch stay extraction and k-gap similarity
//!
//! Usage:
//!   stayprint-cli run <samples.csv> --output <dir> [--params <sets.json>]
//!   stayprint-cli kgap <stays.csv> --output <matrix.csv>
//!
//! `run` writes `<dir>/cluster/<label>.csv` and `<dir>/k-gap/<label>.csv`
//! for every parameter set, where label is `{time_threshold}_{distance_threshold}`.

use clap::{Args, Parser, Subcommand};
use log::{error, info};
use stayprint::io::{
    read_parameter_sets, read_samples_path, read_stay_records, write_outputs,
    write_similarity_matrix,
};
use stayprint::{
    build_similarity_matrix, group_by_subject, Dbscan, ParameterSet, Result, SimilarityConfig,
};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "stayprint-cli")]
#[command(about = "Stay-point extraction and k-gap similarity for GPS traces", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract stays and build the similarity matrix for each parameter set
    Run {
        /// Merged samples CSV (SubjectID,lat,lon,time)
        input: PathBuf,

        /// Output root directory
        #[arg(short, long)]
        output: PathBuf,

        /// JSON array of parameter sets (overrides the flags below)
        #[arg(short, long)]
        params: Option<PathBuf>,

        #[command(flatten)]
        flags: ParameterFlags,
    },

    /// Rebuild a similarity matrix from an existing stay records CSV
    Kgap {
        /// Stay records CSV written by `run`
        input: PathBuf,

        /// Matrix CSV to write
        #[arg(short, long)]
        output: PathBuf,

        /// Spatial cap in meters
        #[arg(long, default_value = "100")]
        max_distance: f64,

        /// Temporal cap in seconds
        #[arg(long, default_value = "3600")]
        max_overlap_window: f64,

        /// Only the first N subjects with stays enter the matrix
        #[arg(long)]
        subjects: Option<usize>,
    },
}

/// A single parameter set given on the command line.
#[derive(Args)]
struct ParameterFlags {
    /// Segmentation radius in meters
    #[arg(long, default_value = "100")]
    distance_threshold: f64,

    /// Minimum stay duration (and time grid) in seconds
    #[arg(long, default_value = "3600")]
    time_threshold: i64,

    /// Consolidation radius in meters (defaults to the segmentation radius)
    #[arg(long)]
    epsilon: Option<f64>,

    /// k-gap spatial cap in meters
    #[arg(long, default_value = "100")]
    max_distance: f64,

    /// k-gap temporal cap in seconds
    #[arg(long, default_value = "3600")]
    max_overlap_window: f64,

    /// Decimal places kept on output coordinates
    #[arg(long, default_value = "3")]
    precision: u32,

    /// Only the first N subjects with stays enter the matrix
    #[arg(long)]
    subjects: Option<usize>,

    /// Emit the visit still open at the end of each trace
    #[arg(long)]
    flush_trailing: bool,
}

impl From<ParameterFlags> for ParameterSet {
    fn from(flags: ParameterFlags) -> Self {
        ParameterSet {
            distance_threshold: flags.distance_threshold,
            time_threshold: flags.time_threshold,
            epsilon_meters: flags.epsilon,
            max_distance: flags.max_distance,
            max_overlap_window: flags.max_overlap_window,
            precision: flags.precision,
            subject_limit: flags.subjects,
            flush_trailing: flags.flush_trailing,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let result = match cli.command {
        Commands::Run {
            input,
            output,
            params,
            flags,
        } => run(&input, &output, params.as_deref(), flags),
        Commands::Kgap {
            input,
            output,
            max_distance,
            max_overlap_window,
            subjects,
        } => kgap(
            &input,
            &output,
            &SimilarityConfig {
                max_distance,
                max_overlap_window,
            },
            subjects,
        ),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(input: &Path, output: &Path, params: Option<&Path>, flags: ParameterFlags) -> Result<()> {
    let parameter_sets = match params {
        Some(path) => read_parameter_sets(File::open(path)?)?,
        None => vec![ParameterSet::from(flags)],
    };

    let traces = group_by_subject(read_samples_path(input)?);
    info!("Loaded {} subjects, {} parameter sets", traces.len(), parameter_sets.len());

    for params in &parameter_sets {
        #[cfg(feature = "parallel")]
        let result = stayprint::run_parameter_set_parallel(&traces, params, &Dbscan)?;
        #[cfg(not(feature = "parallel"))]
        let result = stayprint::run_parameter_set(&traces, params, &Dbscan)?;

        let (stays_path, matrix_path) = write_outputs(output, &result)?;
        println!(
            "{}: {} stays -> {}, matrix -> {}",
            params.label(),
            result.stay_count(),
            stays_path.display(),
            matrix_path.display()
        );
    }

    Ok(())
}

fn kgap(
    input: &Path,
    output: &Path,
    config: &SimilarityConfig,
    subjects: Option<usize>,
) -> Result<()> {
    // Only subjects with stays appear in the file, as in `run`'s matrix
    let mut fingerprints = read_stay_records(File::open(input)?)?;
    fingerprints.sort_by(|a, b| a.subject_id.cmp(&b.subject_id));
    if let Some(limit) = subjects {
        fingerprints.truncate(limit);
    }

    let matrix = build_similarity_matrix(&fingerprints, config)?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_similarity_matrix(File::create(output)?, &matrix)?;
    println!("{} subjects -> {}", matrix.len(), output.display());

    Ok(())
}
