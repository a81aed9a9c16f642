//! Task and interval-index types
//!
//! A [`Task`] binds one contiguous genomic interval on one contig. Tasks
//! are created once by the planner, immutable afterwards except for the
//! worker assignment, and never reused. The [`IntervalIndex`] answers
//! "which task owns this coordinate" for the aggregator's reassignment
//! pass.

use crate::container::ContainerPart;
use crate::input::{RegionAnnotation, TargetRecord};
use std::collections::HashMap;

/// A unit of work bound to a contiguous genomic interval
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique, dense id assigned in creation order
    pub id: usize,

    /// Contig the interval lies on
    pub contig: String,

    /// First coordinate covered by this task
    pub start: u64,

    /// Last coordinate covered by this task (inclusive)
    pub end: u64,

    /// Worker the task was dispatched to; set exactly once
    pub assigned_worker: Option<usize>,

    /// Region annotations overlapping this interval, opaque to the scheduler
    pub annotations: Vec<RegionAnnotation>,

    /// Pre-filtered target calls for genotyping mode
    pub target_calls: Vec<TargetRecord>,

    /// Base for worker-local call-id generation; the worker's counter
    /// starts at 0 and is offset by this
    pub call_id_offset: u64,
}

impl Task {
    /// Create a task covering `[start, end]` on `contig`
    pub fn new(id: usize, contig: &str, start: u64, end: u64) -> Self {
        Self {
            id,
            contig: contig.to_string(),
            start,
            end,
            assigned_worker: None,
            annotations: Vec::new(),
            target_calls: Vec::new(),
            call_id_offset: 0,
        }
    }

    /// Whether `pos` on `contig` falls inside this task's interval
    pub fn contains(&self, contig: &str, pos: u64) -> bool {
        self.contig == contig && self.start <= pos && pos <= self.end
    }

    /// Interval width in coordinates
    pub fn span(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// A finalized or genotype-annotated variant record produced by a worker
///
/// The record encoding is opaque; the scheduler only interprets the
/// placement fields needed for ordering and reassignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Contig the call is placed on
    pub contig: String,

    /// Position of the call
    pub pos: u64,

    /// Originating input line for genotyping mode results
    pub source_line: Option<usize>,

    /// Encoded record, emitted verbatim to the output stream
    pub record: String,
}

/// Result returned by a worker for one completed task
#[derive(Debug, Clone, Default)]
pub struct TaskResult {
    /// Id of the completed task
    pub task_id: usize,

    /// Units processed, for progress accounting
    pub processed_units: u64,

    /// Calls produced (mode-dependent; may be empty)
    pub calls: Vec<Call>,

    /// Partial candidate container, present in serialization mode
    pub part: Option<ContainerPart>,
}

/// Outcome of an interval-index ownership lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerLookup {
    /// Exactly one task owns the coordinate
    Unique(usize),

    /// No planned interval covers the coordinate
    Missing,

    /// More than one interval covers the coordinate; carries the first
    /// matching task id and the number of matches
    Ambiguous(usize, usize),
}

#[derive(Debug, Clone, Copy)]
struct IndexedInterval {
    start: u64,
    end: u64,
    task_id: usize,
}

/// Per-contig sorted interval lists supporting ownership queries
///
/// Built once from the planned task list, read-only afterwards.
#[derive(Debug, Default)]
pub struct IntervalIndex {
    by_contig: HashMap<String, Vec<IndexedInterval>>,
}

impl IntervalIndex {
    /// Build the index from a planned task list
    pub fn build(tasks: &[Task]) -> Self {
        let mut by_contig: HashMap<String, Vec<IndexedInterval>> = HashMap::new();
        for task in tasks {
            by_contig
                .entry(task.contig.clone())
                .or_default()
                .push(IndexedInterval {
                    start: task.start,
                    end: task.end,
                    task_id: task.id,
                });
        }
        for intervals in by_contig.values_mut() {
            intervals.sort_by_key(|iv| iv.start);
        }
        Self { by_contig }
    }

    /// Find the task owning `(contig, pos)`
    pub fn owner_of(&self, contig: &str, pos: u64) -> OwnerLookup {
        let Some(intervals) = self.by_contig.get(contig) else {
            return OwnerLookup::Missing;
        };

        // All intervals starting at or before pos are candidates; with a
        // well-formed partition only the last of them can contain pos, but
        // the scan detects overlapping (malformed) input too.
        let upper = intervals.partition_point(|iv| iv.start <= pos);
        let mut matches = intervals[..upper]
            .iter()
            .rev()
            .take_while(|iv| iv.end >= pos);

        match matches.next() {
            None => OwnerLookup::Missing,
            Some(first) => {
                let rest = matches.count();
                if rest == 0 {
                    OwnerLookup::Unique(first.task_id)
                } else {
                    OwnerLookup::Ambiguous(first.task_id, rest + 1)
                }
            }
        }
    }

    /// Number of indexed contigs
    pub fn contig_count(&self) -> usize {
        self.by_contig.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_tasks() -> Vec<Task> {
        vec![
            Task::new(0, "chr1", 0, 332),
            Task::new(1, "chr1", 333, 665),
            Task::new(2, "chr1", 666, 999),
        ]
    }

    #[test]
    fn test_task_contains() {
        let task = Task::new(0, "chr1", 100, 199);
        assert!(task.contains("chr1", 100));
        assert!(task.contains("chr1", 199));
        assert!(!task.contains("chr1", 200));
        assert!(!task.contains("chr1", 99));
        assert!(!task.contains("chr2", 150));
        assert_eq!(task.span(), 100);
    }

    #[test]
    fn test_owner_lookup_unique() {
        let index = IntervalIndex::build(&three_tasks());

        assert_eq!(index.owner_of("chr1", 0), OwnerLookup::Unique(0));
        assert_eq!(index.owner_of("chr1", 332), OwnerLookup::Unique(0));
        assert_eq!(index.owner_of("chr1", 333), OwnerLookup::Unique(1));
        assert_eq!(index.owner_of("chr1", 999), OwnerLookup::Unique(2));
    }

    #[test]
    fn test_owner_lookup_missing() {
        let index = IntervalIndex::build(&three_tasks());

        assert_eq!(index.owner_of("chr1", 1000), OwnerLookup::Missing);
        assert_eq!(index.owner_of("chr2", 5), OwnerLookup::Missing);
    }

    #[test]
    fn test_owner_lookup_ambiguous() {
        // Overlapping intervals are malformed input; the lookup must still
        // report the ambiguity rather than silently picking one
        let tasks = vec![Task::new(0, "chr1", 0, 500), Task::new(1, "chr1", 400, 999)];
        let index = IntervalIndex::build(&tasks);

        match index.owner_of("chr1", 450) {
            OwnerLookup::Ambiguous(_, count) => assert_eq!(count, 2),
            other => panic!("expected ambiguous lookup, got {:?}", other),
        }
    }
}
