//! Result aggregation and ordered emission
//!
//! Tasks complete out of order, and some produced calls legitimately fall
//! outside the geometric bounds of the task that produced them (an edge
//! effect at interval boundaries). This module buffers per-task results,
//! corrects misassigned calls through the interval index, and emits one
//! globally ordered call stream: tasks in creation order (ascending
//! coordinate per contig, then contig order), calls sorted by position
//! within each task.
//!
//! Everything here runs once, on the scheduler thread, after all tasks
//! complete.

use crate::error::Result;
use crate::input::TargetCallSet;
use crate::scheduler::task::{Call, IntervalIndex, OwnerLookup, Task};
use std::collections::HashMap;
use std::io::Write;
use tracing::warn;

/// Accounting for the ordered-emission path
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EmitStats {
    /// Calls written to the output stream
    pub emitted: u64,

    /// Calls copied into their owning task's buffer
    pub reassigned: u64,

    /// Out-of-bounds calls dropped from their source buffer at emission;
    /// should equal `reassigned` exactly
    pub ignored: u64,

    /// Calls with no owning interval, dropped during reassignment
    pub dropped_unowned: u64,

    /// Calls whose coordinate matched more than one interval
    pub ambiguous: u64,
}

/// Emit every buffered call in ascending `(contig order, position)` order
///
/// The reassignment pass copies each out-of-bounds call into the buffer of
/// the task owning its coordinate; the source copy is then dropped during
/// emission, which is what keeps `ignored == reassigned` a meaningful
/// self-check. A mismatch signals a planning or reassignment bug and is
/// logged, never fatal.
pub fn emit_ordered<W: Write>(
    tasks: &[Task],
    index: &IntervalIndex,
    mut results: HashMap<usize, Vec<Call>>,
    out: &mut W,
) -> Result<EmitStats> {
    let mut stats = EmitStats::default();

    // Reassignment pass
    let mut moves: Vec<(usize, Call)> = Vec::new();
    for task in tasks {
        let Some(bucket) = results.get_mut(&task.id) else {
            continue;
        };
        bucket.retain(|call| {
            if task.contains(&call.contig, call.pos) {
                return true;
            }
            match index.owner_of(&call.contig, call.pos) {
                OwnerLookup::Unique(owner) => {
                    moves.push((owner, call.clone()));
                    stats.reassigned += 1;
                    true
                }
                OwnerLookup::Ambiguous(first, count) => {
                    warn!(
                        contig = %call.contig,
                        pos = call.pos,
                        count,
                        "Ambiguous reassignment target; using first match"
                    );
                    moves.push((first, call.clone()));
                    stats.reassigned += 1;
                    stats.ambiguous += 1;
                    true
                }
                OwnerLookup::Missing => {
                    warn!(
                        contig = %call.contig,
                        pos = call.pos,
                        task = task.id,
                        "No owning task for out-of-bounds call; dropping"
                    );
                    stats.dropped_unowned += 1;
                    false
                }
            }
        });
    }
    for (owner, call) in moves {
        results.entry(owner).or_default().push(call);
    }

    // Emission pass: creation order over tasks, position order within
    for task in tasks {
        let Some(mut bucket) = results.remove(&task.id) else {
            continue;
        };
        bucket.sort_by_key(|call| call.pos);
        for call in bucket {
            if task.contains(&call.contig, call.pos) {
                writeln!(out, "{}", call.record)?;
                stats.emitted += 1;
            } else {
                stats.ignored += 1;
            }
        }
    }

    if stats.ignored != stats.reassigned {
        warn!(
            reassigned = stats.reassigned,
            ignored = stats.ignored,
            "Reassigned/ignored counts disagree; possible planning bug"
        );
    }

    Ok(stats)
}

/// Accounting for the genotype-emission path
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GenotypeStats {
    /// Record lines written (headers not counted)
    pub emitted: u64,

    /// Lines replaced by a genotype-enriched result
    pub genotyped: u64,

    /// Lines passed through unchanged
    pub passthrough: u64,

    /// Duplicate results discarded (first delivery wins)
    pub duplicates: u64,
}

/// Re-emit the genotyping input in original line order
///
/// Results are keyed by the input line index; lines without a result pass
/// through unchanged. No reassignment or positional sort applies here. A
/// line receiving more than one result is a consistency warning; the first
/// delivery (in task creation order) wins.
pub fn emit_genotyped<W: Write>(
    targets: &TargetCallSet,
    results: HashMap<usize, Vec<Call>>,
    out: &mut W,
) -> Result<GenotypeStats> {
    let mut stats = GenotypeStats::default();

    // Deterministic consumption order: task creation order
    let mut task_ids: Vec<usize> = results.keys().copied().collect();
    task_ids.sort_unstable();

    let mut by_line: HashMap<usize, String> = HashMap::new();
    let mut results = results;
    for task_id in task_ids {
        for call in results.remove(&task_id).unwrap_or_default() {
            let Some(line) = call.source_line else {
                warn!(
                    contig = %call.contig,
                    pos = call.pos,
                    "Genotype result without a source line; dropping"
                );
                continue;
            };
            if by_line.contains_key(&line) {
                warn!(line, "Duplicate genotype result for input line");
                stats.duplicates += 1;
                continue;
            }
            by_line.insert(line, call.record);
        }
    }

    for header in &targets.header_lines {
        writeln!(out, "{}", header)?;
    }
    for record in &targets.records {
        match by_line.remove(&record.line_index) {
            Some(genotyped) => {
                writeln!(out, "{}", genotyped)?;
                stats.genotyped += 1;
            }
            None => {
                writeln!(out, "{}", record.raw)?;
                stats.passthrough += 1;
            }
        }
        stats.emitted += 1;
    }

    if !by_line.is_empty() {
        warn!(
            count = by_line.len(),
            "Genotype results referenced lines beyond the input"
        );
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::TargetRecord;

    fn call(contig: &str, pos: u64, record: &str) -> Call {
        Call {
            contig: contig.into(),
            pos,
            source_line: None,
            record: record.into(),
        }
    }

    fn tasks_chr1() -> Vec<Task> {
        vec![
            Task::new(0, "chr1", 0, 332),
            Task::new(1, "chr1", 333, 665),
            Task::new(2, "chr1", 666, 999),
        ]
    }

    #[test]
    fn test_in_bounds_calls_emit_in_order() {
        let tasks = tasks_chr1();
        let index = IntervalIndex::build(&tasks);

        let mut results = HashMap::new();
        results.insert(2, vec![call("chr1", 900, "C"), call("chr1", 700, "B")]);
        results.insert(0, vec![call("chr1", 10, "A")]);

        let mut out = Vec::new();
        let stats = emit_ordered(&tasks, &index, results, &mut out).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "A\nB\nC\n");
        assert_eq!(stats.emitted, 3);
        assert_eq!(stats.reassigned, 0);
        assert_eq!(stats.ignored, 0);
    }

    #[test]
    fn test_out_of_bounds_call_is_reassigned() {
        let tasks = tasks_chr1();
        let index = IntervalIndex::build(&tasks);

        // Task 1 produced a call just past its right boundary
        let mut results = HashMap::new();
        results.insert(1, vec![call("chr1", 400, "MID"), call("chr1", 670, "EDGE")]);
        results.insert(2, vec![call("chr1", 900, "LATE")]);

        let mut out = Vec::new();
        let stats = emit_ordered(&tasks, &index, results, &mut out).unwrap();

        // EDGE must surface in task 2's bucket, before LATE
        assert_eq!(String::from_utf8(out).unwrap(), "MID\nEDGE\nLATE\n");
        assert_eq!(stats.reassigned, 1);
        assert_eq!(stats.ignored, 1);
        assert_eq!(stats.dropped_unowned, 0);
    }

    #[test]
    fn test_unowned_call_is_dropped() {
        let tasks = tasks_chr1();
        let index = IntervalIndex::build(&tasks);

        let mut results = HashMap::new();
        results.insert(0, vec![call("chr1", 10, "OK"), call("chrUn", 5, "LOST")]);

        let mut out = Vec::new();
        let stats = emit_ordered(&tasks, &index, results, &mut out).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "OK\n");
        assert_eq!(stats.dropped_unowned, 1);
        assert_eq!(stats.reassigned, 0);
        assert_eq!(stats.ignored, 0);
    }

    fn target(line: usize, contig: &str, pos: u64, raw: &str) -> TargetRecord {
        TargetRecord {
            line_index: line,
            contig: contig.into(),
            pos,
            raw: raw.into(),
        }
    }

    #[test]
    fn test_genotype_emission_preserves_input_order() {
        let targets = TargetCallSet {
            header_lines: vec!["##header".into()],
            records: vec![
                target(0, "chr1", 100, "chr1\t100\traw0"),
                target(1, "chr1", 500, "chr1\t500\traw1"),
                target(2, "chr2", 50, "chr2\t50\traw2"),
            ],
        };

        // Only line 1 received a result; delivery order is irrelevant
        let mut results = HashMap::new();
        results.insert(
            4,
            vec![Call {
                contig: "chr1".into(),
                pos: 500,
                source_line: Some(1),
                record: "chr1\t500\tGENOTYPED".into(),
            }],
        );

        let mut out = Vec::new();
        let stats = emit_genotyped(&targets, results, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "##header\nchr1\t100\traw0\nchr1\t500\tGENOTYPED\nchr2\t50\traw2\n"
        );
        assert_eq!(stats.emitted, 3);
        assert_eq!(stats.genotyped, 1);
        assert_eq!(stats.passthrough, 2);
        assert_eq!(stats.duplicates, 0);
    }

    #[test]
    fn test_duplicate_genotype_result_keeps_first() {
        let targets = TargetCallSet {
            header_lines: vec![],
            records: vec![target(0, "chr1", 100, "chr1\t100\traw0")],
        };

        let mut results = HashMap::new();
        results.insert(
            0,
            vec![Call {
                contig: "chr1".into(),
                pos: 100,
                source_line: Some(0),
                record: "first".into(),
            }],
        );
        results.insert(
            1,
            vec![Call {
                contig: "chr1".into(),
                pos: 100,
                source_line: Some(0),
                record: "second".into(),
            }],
        );

        let mut out = Vec::new();
        let stats = emit_genotyped(&targets, results, &mut out).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "first\n");
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.genotyped, 1);
    }
}
