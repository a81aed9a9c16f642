//! Progress reporting
//!
//! Real-time run status using indicatif, plus the styled header and
//! summary blocks printed around a run.

use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A snapshot of scheduler progress for display
#[derive(Debug, Clone)]
pub struct ScatterProgress {
    /// Tasks completed
    pub tasks_done: usize,

    /// Total planned tasks
    pub tasks_total: usize,

    /// Workers currently busy
    pub workers_busy: usize,

    /// Total workers
    pub workers_total: usize,

    /// Calls produced so far
    pub calls: u64,

    /// Candidates serialized so far
    pub candidates: u64,

    /// Units processed so far
    pub units_done: u64,

    /// Estimated total units
    pub units_total: u64,

    /// Elapsed time
    pub elapsed: Duration,
}

impl ScatterProgress {
    /// Throughput estimate in units per second
    pub fn units_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.units_done as f64 / secs
        } else {
            0.0
        }
    }

    /// Completed fraction of the estimated total, in percent
    pub fn percent(&self) -> u64 {
        if self.units_total > 0 {
            self.units_done * 100 / self.units_total
        } else {
            0
        }
    }
}

/// Progress reporter that displays run status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new spinner-style reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &ScatterProgress) {
        let msg = format!(
            "{}% | Tasks: {}/{} | Workers: {}/{} | Calls: {} | Candidates: {} | {:.0} units/s",
            progress.percent(),
            progress.tasks_done,
            progress.tasks_total,
            progress.workers_busy,
            progress.workers_total,
            format_number(progress.calls),
            format_number(progress.candidates),
            progress.units_per_second(),
        );
        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte-based progress bar for the container merge
pub fn merge_bar(total_bytes: u64) -> ProgressBar {
    let bar = ProgressBar::new(total_bytes);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{bar:30.cyan/dim} {bytes}/{total_bytes} ({bytes_per_sec})")
            .expect("Invalid progress template"),
    );
    bar
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of an operation
pub fn print_header(operation: &str, source: &str, workers: usize, output: &str) {
    println!();
    println!(
        "{} {}",
        style("sv-scatter").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Operation:").bold(), operation);
    println!("  {} {}", style("Source:").bold(), source);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}

/// Print a summary block after a completed merge
pub fn print_merge_summary(
    parts: usize,
    blocks: u64,
    candidates: u64,
    bytes: u64,
    duration: Duration,
    output: &str,
) {
    let duration_secs = duration.as_secs_f64();

    println!();
    println!("{}", style("Merge Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Parts:").bold(), format_number(parts as u64));
    println!("  {} {}", style("Blocks:").bold(), format_number(blocks));
    println!(
        "  {} {}",
        style("Candidates:").bold(),
        format_number(candidates)
    );
    println!(
        "  {} {}",
        style("Payload:").bold(),
        format_size(bytes, BINARY)
    );
    println!("  {} {:.1}s", style("Duration:").bold(), duration_secs);
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}
