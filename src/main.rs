//! sv-scatter - scheduling and merge core for structural-variant calling
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context, Result};
use clap::Parser;
use console::style;
use humansize::{format_size, BINARY};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use sv_scatter::config::{
    CliArgs, Command, InspectArgs, MergeArgs, PlanArgs, PipelineArgs, RunConfig, RunMode,
};
use sv_scatter::container::{
    union_contig_lengths, CandidateContainer, Combiner, ContainerMeta, ContainerPart,
};
use sv_scatter::error::ConfigError;
use sv_scatter::input::{ContigInfo, ContigTable};
use sv_scatter::progress::{format_number, merge_bar, print_header, print_merge_summary};
use sv_scatter::scheduler::{plan_per_contig, plan_tasks, PlanParams, TaskPlan};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();
    setup_logging(args.verbose)?;

    match args.command {
        Command::Check(pipeline) => run_check(pipeline),
        Command::Plan(plan) => run_plan(plan),
        Command::Merge(merge) => run_merge(merge),
        Command::Inspect(inspect) => run_inspect(inspect),
    }
}

/// Resolve and validate a run configuration without starting any workers
fn run_check(args: PipelineArgs) -> Result<()> {
    let config = RunConfig::from_args(args).context("Invalid configuration")?;

    println!();
    println!("{}", style("Configuration OK").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Mode:").bold(), config.mode);
    match config.mode {
        RunMode::Combine => {
            for (i, entry) in config.combine_inputs.iter().enumerate() {
                let label = &config.sample_ids_vcf[i].1;
                println!(
                    "  {} {} ({})",
                    style("Input:").bold(),
                    entry.path.display(),
                    label
                );
            }
        }
        _ => {
            if let Some(path) = &config.alignment_input {
                println!("  {} {}", style("Input:").bold(), path.display());
            }
            if let Some(path) = &config.genotype_vcf {
                println!("  {} {}", style("Targets:").bold(), path.display());
            }
        }
    }
    if let Some(path) = &config.vcf_out {
        println!("  {} {}", style("Calls:").bold(), path.display());
    }
    if let Some(path) = &config.snf_out {
        println!("  {} {}", style("Candidates:").bold(), path.display());
    }
    println!("  {} {}", style("Workers:").bold(), config.threads);
    println!();

    Ok(())
}

/// Print the task partition the planner would produce
fn run_plan(args: PlanArgs) -> Result<()> {
    let plan = if let Some(table_path) = &args.contigs {
        let table = ContigTable::from_tsv(table_path).context("Failed to load contig table")?;
        plan_tasks(
            &table,
            &PlanParams {
                worker_count: args.threads,
                task_count_multiplier: args.task_count_multiplier,
                low_memory: args.low_memory,
                ..Default::default()
            },
        )
    } else {
        // Re-partitioning serialized inputs: one task per contig from the
        // union of the container headers
        let contigs = contigs_from_containers(&args.inputs)?;
        plan_per_contig(&contigs, &PlanParams::default())
    };

    print_plan(&plan, args.threads);
    Ok(())
}

fn contigs_from_containers(inputs: &[std::path::PathBuf]) -> Result<Vec<ContigInfo>> {
    if inputs.is_empty() {
        bail!("supply --contigs or at least one container");
    }
    let mut metas = Vec::new();
    for path in inputs {
        let container = CandidateContainer::open(path)
            .with_context(|| format!("Failed to open '{}'", path.display()))?;
        metas.push(container.header().meta.clone());
    }
    Ok(union_contig_lengths(&metas)
        .into_iter()
        .map(|(name, length)| ContigInfo {
            name,
            length,
            mapped_units: 0,
        })
        .collect())
}

fn print_plan(plan: &TaskPlan, workers: usize) {
    println!();
    println!("{}", style("Task Plan").cyan().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Tasks:").bold(), plan.tasks.len());
    println!("  {} {}", style("Workers:").bold(), workers);
    if plan.total_units > 0 {
        println!(
            "  {} {}",
            style("Units:").bold(),
            format_number(plan.total_units)
        );
    } else {
        println!("  {} unknown", style("Units:").bold());
    }
    println!();

    for task in &plan.tasks {
        println!(
            "  {:>6}  {:<12} {:>12} - {:<12} ({} bp)",
            task.id,
            task.contig,
            task.start,
            task.end,
            format_number(task.span())
        );
    }
    println!();
}

/// Merge candidate containers of one sample into a single container
fn run_merge(args: MergeArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        return Err(ConfigError::OutputExists {
            path: args.output.clone(),
        }
        .into());
    }

    // Input order is merge order
    let mut parts = Vec::new();
    let mut metas = Vec::new();
    for (i, path) in args.parts.iter().enumerate() {
        let container = CandidateContainer::open(path)
            .with_context(|| format!("Failed to open '{}'", path.display()))?;
        metas.push(container.header().meta.clone());
        parts.push(ContainerPart::from_container(path, i)?);
    }

    let sample_id = args
        .sample_id
        .clone()
        .unwrap_or_else(|| metas[0].sample_id.clone());
    let meta = ContainerMeta::new(sample_id, union_contig_lengths(&metas));

    if !args.quiet {
        print_header(
            "merge",
            &format!("{} containers", parts.len()),
            1,
            &args.output.display().to_string(),
        );
    }

    let total_bytes: u64 = parts.iter().map(|p| p.byte_len).sum();
    let mut combiner = Combiner::new(meta, &args.output).keep_sources();
    let bar = if args.quiet {
        None
    } else {
        Some(merge_bar(total_bytes))
    };
    if let Some(bar) = bar.clone() {
        combiner = combiner.with_progress(bar);
    }

    // Allow a clean abort between parts; the partial output is removed
    let cancel = combiner.cancel_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, stopping merge...");
        cancel.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let stats = combiner.run(parts).context("Merge failed")?;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    if !args.quiet {
        print_merge_summary(
            stats.parts,
            stats.blocks,
            stats.candidates,
            stats.bytes,
            stats.duration,
            &args.output.display().to_string(),
        );
    }

    Ok(())
}

/// Print a container's header summary
fn run_inspect(args: InspectArgs) -> Result<()> {
    let container = CandidateContainer::open(&args.container)
        .with_context(|| format!("Failed to open '{}'", args.container.display()))?;
    let header = container.header();

    println!();
    println!(
        "{} {}",
        style("Container").cyan().bold(),
        args.container.display()
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Sample:").bold(), header.meta.sample_id);
    println!(
        "  {} {}",
        style("Format:").bold(),
        header.meta.format_version
    );
    println!(
        "  {} {}",
        style("Block size:").bold(),
        format_number(header.meta.block_size)
    );
    println!("  {} {}", style("Created:").bold(), header.meta.created);
    println!(
        "  {} {}",
        style("Contigs:").bold(),
        header.meta.contig_lengths.len()
    );
    println!(
        "  {} {}",
        style("Candidates:").bold(),
        format_number(header.candidate_count)
    );
    println!(
        "  {} {}",
        style("Payload:").bold(),
        format_size(container.payload_len(), BINARY)
    );

    if args.blocks {
        println!();
        for (contig, keys) in &header.index {
            let spans: usize = keys.values().map(Vec::len).sum();
            println!(
                "  {:<12} {:>6} keys {:>8} blocks",
                contig,
                keys.len(),
                spans
            );
        }
    }
    println!();

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("sv_scatter=debug,warn")
    } else {
        EnvFilter::new("sv_scatter=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
