//! Configuration types for sv-scatter
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Run-mode resolution from input extensions and flags
//! - Validated, immutable runtime configuration
//!
//! Everything here runs before any worker starts; a configuration error
//! aborts the process with no partial output.

use crate::error::{ConfigError, ConfigResult};
use crate::input::{read_manifest, ManifestEntry};
use clap::{Args, Parser, Subcommand};
use std::fmt;
use std::path::{Path, PathBuf};

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Task scheduling and result merging for structural-variant calling
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sv-scatter",
    version,
    about = "Task scheduling and result merging for structural-variant calling pipelines",
    long_about = "Partitions an analysis job into independent spatial tasks, drives a pool of \
                  workers to completion, and reassembles partial results into one ordered call \
                  stream and one consolidated candidate container.\n\n\
                  The detection engine plugs in as a library; this binary exposes the \
                  self-contained operations: configuration checking, plan inspection, and \
                  container maintenance.",
    after_help = "EXAMPLES:\n    \
        sv-scatter check sample.bam --vcf-out calls.vcf --snf-out sample.snf -t 8\n    \
        sv-scatter plan --contigs contigs.tsv -t 8\n    \
        sv-scatter merge shard1.snf shard2.snf -o sample.snf\n    \
        sv-scatter inspect sample.snf --blocks"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (show debug-level events)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Validate a run configuration without starting any workers
    Check(PipelineArgs),

    /// Print the task partition the planner would produce
    Plan(PlanArgs),

    /// Merge candidate containers of one sample into a single container
    Merge(MergeArgs),

    /// Print a container's header summary
    Inspect(InspectArgs),
}

/// The full pipeline argument surface
///
/// Embedded under `check` here; callers that link the detection engine
/// flatten this into their own CLI and hand the result to
/// [`RunConfig::from_args`].
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Input files: one alignment container (.bam/.cram), or
    /// serialized-candidate containers (.snf) / a sample manifest (.tsv)
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output path for the ordered call stream
    #[arg(long, value_name = "FILE")]
    pub vcf_out: Option<PathBuf>,

    /// Output path for the serialized-candidate container
    #[arg(long, value_name = "FILE")]
    pub snf_out: Option<PathBuf>,

    /// Genotype the calls in FILE against the alignment input
    #[arg(long, value_name = "FILE")]
    pub genotype_vcf: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short = 't', long, default_value_t = default_workers(), value_name = "NUM")]
    pub threads: usize,

    /// Target task count per worker (0 disables contig splitting)
    #[arg(long, default_value = "3", value_name = "NUM")]
    pub task_count_multiplier: u64,

    /// Memory-constrained scheduling: keep splitting with one worker and
    /// spread tasks pseudo-randomly across the run
    #[arg(long)]
    pub low_memory: bool,

    /// Emit calls in completion order instead of sorting
    #[arg(long)]
    pub no_sort: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Overwrite pre-existing output files
    #[arg(long)]
    pub force: bool,

    /// Sample id recorded in serialized output (defaults to the input stem)
    #[arg(long, value_name = "ID")]
    pub sample_id: Option<String>,

    /// Tandem-repeat annotations (BED-like), passed through to workers
    #[arg(long, value_name = "FILE")]
    pub tandem_repeats: Option<PathBuf>,
}

/// Arguments for the `plan` subcommand
#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Contig table TSV (name, length, optional mapped-unit count)
    #[arg(long, value_name = "FILE", required_unless_present = "inputs")]
    pub contigs: Option<PathBuf>,

    /// Serialized containers whose headers supply the contig list
    #[arg(value_name = "CONTAINER", conflicts_with = "contigs")]
    pub inputs: Vec<PathBuf>,

    /// Number of worker threads the plan targets
    #[arg(short = 't', long, default_value_t = default_workers(), value_name = "NUM")]
    pub threads: usize,

    /// Target task count per worker (0 disables contig splitting)
    #[arg(long, default_value = "3", value_name = "NUM")]
    pub task_count_multiplier: u64,

    /// Memory-constrained scheduling policy
    #[arg(long)]
    pub low_memory: bool,
}

/// Arguments for the `merge` subcommand
#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    /// Containers to merge, in task order
    #[arg(value_name = "CONTAINER", required = true)]
    pub parts: Vec<PathBuf>,

    /// Output container path
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: PathBuf,

    /// Overwrite a pre-existing output file
    #[arg(long)]
    pub force: bool,

    /// Quiet mode - suppress the progress bar
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Sample id for the merged container (defaults to the first input's)
    #[arg(long, value_name = "ID")]
    pub sample_id: Option<String>,
}

/// Arguments for the `inspect` subcommand
#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Container to inspect
    #[arg(value_name = "CONTAINER")]
    pub container: PathBuf,

    /// Also print the per-contig block table
    #[arg(long)]
    pub blocks: bool,
}

fn default_workers() -> usize {
    // Tasks are CPU-bound; one worker per core
    num_cpus::get()
}

/// The three mutually exclusive run modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Call variants on a single alignment container
    CallSample,

    /// Genotype externally supplied calls against an alignment container
    GenotypeVcf,

    /// Combine pre-serialized candidate containers into multi-sample calls
    Combine,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunMode::CallSample => "call_sample",
            RunMode::GenotypeVcf => "genotype_vcf",
            RunMode::Combine => "combine",
        };
        f.write_str(name)
    }
}

/// Input file classification by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Alignment,
    Serialized,
    Manifest,
}

fn classify_input(path: &Path) -> ConfigResult<InputKind> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("bam") | Some("cram") | Some("sam") => Ok(InputKind::Alignment),
        Some("snf") => Ok(InputKind::Serialized),
        Some("tsv") => Ok(InputKind::Manifest),
        _ => Err(ConfigError::UnknownInputType {
            path: path.to_path_buf(),
        }),
    }
}

/// Validated runtime configuration
///
/// Immutable; consumed read-only by every component of a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Resolved run mode
    pub mode: RunMode,

    /// The alignment container (call_sample / genotype_vcf modes)
    pub alignment_input: Option<PathBuf>,

    /// Combine-mode inputs with their sample labels, in input order
    pub combine_inputs: Vec<ManifestEntry>,

    /// `(input index, sample label)` pairs for multi-sample output columns
    pub sample_ids_vcf: Vec<(usize, String)>,

    /// Externally supplied calls to genotype
    pub genotype_vcf: Option<PathBuf>,

    /// Ordered call stream destination
    pub vcf_out: Option<PathBuf>,

    /// Serialized-candidate container destination
    pub snf_out: Option<PathBuf>,

    /// Worker count
    pub threads: usize,

    /// Target task count per worker
    pub task_count_multiplier: u64,

    /// Memory-constrained scheduling policy
    pub low_memory: bool,

    /// Sort emitted calls (reassignment + ordered emission)
    pub sort_output: bool,

    /// Show progress output
    pub show_progress: bool,

    /// Overwrite pre-existing outputs
    pub force: bool,

    /// Declared sample id
    pub sample_id: String,

    /// Tandem-repeat annotation path
    pub tandem_repeats: Option<PathBuf>,
}

impl RunConfig {
    /// Create and validate configuration from the pipeline arguments
    pub fn from_args(args: PipelineArgs) -> ConfigResult<Self> {
        if args.inputs.is_empty() {
            return Err(ConfigError::NoInputs);
        }

        if args.threads == 0 || args.threads > MAX_WORKERS {
            return Err(ConfigError::InvalidThreadCount {
                count: args.threads,
                max: MAX_WORKERS,
            });
        }

        // Classify every input; alignment and serialized kinds never mix
        let mut kinds = Vec::with_capacity(args.inputs.len());
        for path in &args.inputs {
            kinds.push(classify_input(path)?);
        }
        let alignment = args
            .inputs
            .iter()
            .zip(&kinds)
            .find(|(_, k)| **k == InputKind::Alignment);
        let serialized = args
            .inputs
            .iter()
            .zip(&kinds)
            .find(|(_, k)| **k != InputKind::Alignment);
        if let (Some((a, _)), Some((s, _))) = (alignment, serialized) {
            return Err(ConfigError::MixedInputTypes {
                alignment: a.clone(),
                serialized: s.clone(),
            });
        }

        let mode = if alignment.is_some() {
            let count = kinds.iter().filter(|k| **k == InputKind::Alignment).count();
            if count > 1 {
                return Err(ConfigError::MultipleAlignmentInputs { count });
            }
            if args.genotype_vcf.is_some() {
                RunMode::GenotypeVcf
            } else {
                RunMode::CallSample
            }
        } else {
            if args.genotype_vcf.is_some() {
                return Err(ConfigError::GenotypeRequiresAlignment);
            }
            if kinds.contains(&InputKind::Manifest) && args.inputs.len() > 1 {
                return Err(ConfigError::ManifestNotSole {
                    count: args.inputs.len(),
                });
            }
            RunMode::Combine
        };

        // Output requirements per mode
        match mode {
            RunMode::CallSample => {
                if args.vcf_out.is_none() && args.snf_out.is_none() {
                    return Err(ConfigError::MissingOutput);
                }
            }
            RunMode::GenotypeVcf | RunMode::Combine => {
                if args.snf_out.is_some() {
                    return Err(ConfigError::SnfOutNotApplicable {
                        mode: mode.to_string(),
                    });
                }
                if args.vcf_out.is_none() {
                    return Err(ConfigError::MissingOutput);
                }
            }
        }

        // Every input must be readable before workers start
        for path in &args.inputs {
            check_readable(path)?;
        }
        if let Some(path) = &args.genotype_vcf {
            check_readable(path)?;
        }
        if let Some(path) = &args.tandem_repeats {
            check_readable(path)?;
        }

        // Overwrite policy
        for out in [&args.vcf_out, &args.snf_out].into_iter().flatten() {
            if out.exists() && !args.force {
                return Err(ConfigError::OutputExists { path: out.clone() });
            }
        }

        // Combine-mode input resolution: a manifest expands to its entries,
        // bare containers become label-less entries
        let combine_inputs = match mode {
            RunMode::Combine => {
                if kinds[0] == InputKind::Manifest {
                    let entries = read_manifest(&args.inputs[0])?;
                    for entry in &entries {
                        check_readable(&entry.path)?;
                    }
                    entries
                } else {
                    args.inputs
                        .iter()
                        .map(|path| ManifestEntry {
                            path: path.clone(),
                            sample_label: None,
                        })
                        .collect()
                }
            }
            _ => Vec::new(),
        };

        let sample_ids_vcf = combine_inputs
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let label = entry
                    .sample_label
                    .clone()
                    .unwrap_or_else(|| file_stem(&entry.path));
                (i, label)
            })
            .collect();

        let alignment_input = alignment.map(|(path, _)| path.clone());
        let sample_id = args.sample_id.clone().unwrap_or_else(|| {
            file_stem(
                alignment_input
                    .as_deref()
                    .unwrap_or_else(|| args.inputs[0].as_path()),
            )
        });

        Ok(Self {
            mode,
            alignment_input,
            combine_inputs,
            sample_ids_vcf,
            genotype_vcf: args.genotype_vcf,
            vcf_out: args.vcf_out,
            snf_out: args.snf_out,
            threads: args.threads,
            task_count_multiplier: args.task_count_multiplier,
            low_memory: args.low_memory,
            sort_output: !args.no_sort,
            show_progress: !args.quiet,
            force: args.force,
            sample_id,
            tandem_repeats: args.tandem_repeats,
        })
    }
}

fn check_readable(path: &Path) -> ConfigResult<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(ConfigError::UnreadableInput {
            path: path.to_path_buf(),
            reason: "not a regular file".into(),
        }),
        Err(e) => Err(ConfigError::UnreadableInput {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("sample")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        File::create(&path).unwrap();
        path
    }

    fn base_args(inputs: Vec<PathBuf>) -> PipelineArgs {
        PipelineArgs {
            inputs,
            vcf_out: None,
            snf_out: None,
            genotype_vcf: None,
            threads: 4,
            task_count_multiplier: 3,
            low_memory: false,
            no_sort: false,
            quiet: true,
            force: false,
            sample_id: None,
            tandem_repeats: None,
        }
    }

    #[test]
    fn test_call_sample_mode() {
        let dir = TempDir::new().unwrap();
        let bam = touch(&dir, "sample.bam");

        let mut args = base_args(vec![bam]);
        args.vcf_out = Some(dir.path().join("calls.vcf"));
        args.snf_out = Some(dir.path().join("sample.snf"));

        let config = RunConfig::from_args(args).unwrap();
        assert_eq!(config.mode, RunMode::CallSample);
        assert_eq!(config.sample_id, "sample");
        assert!(config.alignment_input.is_some());
        assert!(config.combine_inputs.is_empty());
    }

    #[test]
    fn test_genotype_mode() {
        let dir = TempDir::new().unwrap();
        let bam = touch(&dir, "sample.bam");
        let vcf = touch(&dir, "targets.vcf");

        let mut args = base_args(vec![bam]);
        args.genotype_vcf = Some(vcf);
        args.vcf_out = Some(dir.path().join("genotyped.vcf"));

        let config = RunConfig::from_args(args).unwrap();
        assert_eq!(config.mode, RunMode::GenotypeVcf);
    }

    #[test]
    fn test_combine_mode_bare_containers() {
        let dir = TempDir::new().unwrap();
        let a = touch(&dir, "s1.snf");
        let b = touch(&dir, "s2.snf");

        let mut args = base_args(vec![a, b]);
        args.vcf_out = Some(dir.path().join("multi.vcf"));

        let config = RunConfig::from_args(args).unwrap();
        assert_eq!(config.mode, RunMode::Combine);
        assert_eq!(config.combine_inputs.len(), 2);
        assert_eq!(
            config.sample_ids_vcf,
            vec![(0, "s1".to_string()), (1, "s2".to_string())]
        );
    }

    #[test]
    fn test_combine_mode_manifest() {
        let dir = TempDir::new().unwrap();
        let part_a = touch(&dir, "partA.snf");
        let part_b = touch(&dir, "partB.snf");

        let manifest = dir.path().join("samples.tsv");
        let mut f = File::create(&manifest).unwrap();
        writeln!(f, "{}\tS1", part_a.display()).unwrap();
        writeln!(f, "{}\tS2", part_b.display()).unwrap();
        drop(f);

        let mut args = base_args(vec![manifest]);
        args.vcf_out = Some(dir.path().join("multi.vcf"));

        let config = RunConfig::from_args(args).unwrap();
        assert_eq!(config.mode, RunMode::Combine);
        assert_eq!(
            config.sample_ids_vcf,
            vec![(0, "S1".to_string()), (1, "S2".to_string())]
        );
    }

    #[test]
    fn test_mixed_inputs_rejected() {
        let dir = TempDir::new().unwrap();
        let bam = touch(&dir, "sample.bam");
        let snf = touch(&dir, "other.snf");

        let mut args = base_args(vec![bam, snf]);
        args.vcf_out = Some(dir.path().join("calls.vcf"));

        assert!(matches!(
            RunConfig::from_args(args),
            Err(ConfigError::MixedInputTypes { .. })
        ));
    }

    #[test]
    fn test_missing_output_rejected() {
        let dir = TempDir::new().unwrap();
        let bam = touch(&dir, "sample.bam");

        assert!(matches!(
            RunConfig::from_args(base_args(vec![bam])),
            Err(ConfigError::MissingOutput)
        ));
    }

    #[test]
    fn test_snf_out_rejected_in_combine() {
        let dir = TempDir::new().unwrap();
        let snf = touch(&dir, "s1.snf");

        let mut args = base_args(vec![snf]);
        args.vcf_out = Some(dir.path().join("multi.vcf"));
        args.snf_out = Some(dir.path().join("again.snf"));

        assert!(matches!(
            RunConfig::from_args(args),
            Err(ConfigError::SnfOutNotApplicable { .. })
        ));
    }

    #[test]
    fn test_existing_output_needs_force() {
        let dir = TempDir::new().unwrap();
        let bam = touch(&dir, "sample.bam");
        let existing = touch(&dir, "calls.vcf");

        let mut args = base_args(vec![bam.clone()]);
        args.vcf_out = Some(existing.clone());

        assert!(matches!(
            RunConfig::from_args(args.clone()),
            Err(ConfigError::OutputExists { .. })
        ));

        args.force = true;
        assert!(RunConfig::from_args(args).is_ok());
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let odd = touch(&dir, "input.xyz");

        let mut args = base_args(vec![odd]);
        args.vcf_out = Some(dir.path().join("calls.vcf"));

        assert!(matches!(
            RunConfig::from_args(args),
            Err(ConfigError::UnknownInputType { .. })
        ));
    }

    #[test]
    fn test_missing_input_rejected() {
        let dir = TempDir::new().unwrap();
        let mut args = base_args(vec![dir.path().join("absent.bam")]);
        args.vcf_out = Some(dir.path().join("calls.vcf"));

        assert!(matches!(
            RunConfig::from_args(args),
            Err(ConfigError::UnreadableInput { .. })
        ));
    }

    #[test]
    fn test_thread_bounds() {
        let dir = TempDir::new().unwrap();
        let bam = touch(&dir, "sample.bam");

        let mut args = base_args(vec![bam]);
        args.vcf_out = Some(dir.path().join("calls.vcf"));
        args.threads = 0;

        assert!(matches!(
            RunConfig::from_args(args),
            Err(ConfigError::InvalidThreadCount { .. })
        ));
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        CliArgs::command().debug_assert();
    }
}
