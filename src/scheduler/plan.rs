//! Task planner
//!
//! Converts a job description (contig lengths plus per-contig work
//! estimates, or a fixed contig list) into a dense, creation-ordered task
//! list and the interval index. Planned intervals partition each contig:
//! contiguous, non-overlapping, covering `[0, length - 1]`.

use crate::input::{AlignmentInput, ContigInfo, RegionAnnotation, TargetCallSet};
use crate::scheduler::task::{IntervalIndex, Task};
use tracing::debug;

/// Call-id stride when the input format reports no unit totals
pub const FALLBACK_ID_SPAN: u64 = 1_000_000_000;

/// Planning inputs shared by both planning modes
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanParams<'a> {
    /// Worker count the run will use
    pub worker_count: usize,

    /// Target task count per worker; 0 disables contig splitting
    pub task_count_multiplier: u64,

    /// Memory-constrained policy (keeps splitting even with one worker)
    pub low_memory: bool,

    /// Region annotations to subset into tasks
    pub annotations: &'a [RegionAnnotation],

    /// Externally supplied calls to subset into tasks (genotyping mode)
    pub target_calls: Option<&'a TargetCallSet>,
}

/// The planner's output: tasks, index and id-generation parameters
#[derive(Debug)]
pub struct TaskPlan {
    /// Tasks in creation order (ascending coordinate per contig, then
    /// contig order); ids are the dense range `[0, tasks.len())`
    pub tasks: Vec<Task>,

    /// Ownership index over the planned intervals
    pub index: IntervalIndex,

    /// Total estimated units; 0 means unknown (progress is suppressed)
    pub total_units: u64,

    /// Stride between consecutive tasks' call-id offsets
    pub call_id_stride: u64,
}

/// Plan tasks by splitting contigs according to their unit estimates
///
/// Falls back to one task per contig when the input reports no totals.
pub fn plan_tasks(input: &dyn AlignmentInput, params: &PlanParams) -> TaskPlan {
    let contigs = input.contigs();
    let total_units = input.total_mapped_units();

    if total_units == 0 {
        // Format does not report totals; never split, and use the fixed
        // fallback span for call-id offsets
        return plan_per_contig(contigs, params);
    }

    let worker_count = params.worker_count.max(1) as u64;
    let never_split =
        params.task_count_multiplier == 0 || (worker_count == 1 && !params.low_memory);
    let task_max_units = if never_split {
        total_units
    } else {
        (total_units / (worker_count * params.task_count_multiplier)).max(1)
    };

    let mut tasks = Vec::new();
    for contig in contigs {
        if contig.length == 0 {
            continue;
        }
        let task_count = contig.mapped_units.div_ceil(task_max_units).max(1);
        let task_len = (contig.length / task_count).max(1);
        emit_contig_tasks(&mut tasks, contig, task_count, task_len, params);
    }

    finish_plan(tasks, total_units, total_units.max(1), params)
}

/// Plan exactly one task per contig, spanning `[0, length - 1]`
///
/// Used when re-partitioning already-serialized inputs and as the
/// zero-total fallback.
pub fn plan_per_contig(contigs: &[ContigInfo], params: &PlanParams) -> TaskPlan {
    let mut tasks = Vec::new();
    for contig in contigs {
        if contig.length == 0 {
            continue;
        }
        emit_contig_tasks(&mut tasks, contig, 1, contig.length, params);
    }

    finish_plan(tasks, 0, FALLBACK_ID_SPAN, params)
}

fn emit_contig_tasks(
    tasks: &mut Vec<Task>,
    contig: &ContigInfo,
    task_count: u64,
    task_len: u64,
    params: &PlanParams,
) {
    for i in 0..task_count {
        let start = i * task_len;
        if start >= contig.length {
            break;
        }

        // The final task absorbs the remainder; widths are slightly uneven
        // when the length does not divide evenly
        let end = if i + 1 == task_count {
            contig.length - 1
        } else {
            ((i + 1) * task_len - 1).min(contig.length - 1)
        };

        let mut task = Task::new(tasks.len(), &contig.name, start, end);
        task.annotations = params
            .annotations
            .iter()
            .filter(|a| a.contig == contig.name && task.contains(&a.contig, a.start))
            .cloned()
            .collect();
        if let Some(targets) = params.target_calls {
            task.target_calls = targets
                .records
                .iter()
                .filter(|t| task.contains(&t.contig, t.pos))
                .cloned()
                .collect();
        }
        tasks.push(task);

        if end == contig.length - 1 {
            break;
        }
    }
}

fn finish_plan(
    mut tasks: Vec<Task>,
    total_units: u64,
    call_id_stride: u64,
    params: &PlanParams,
) -> TaskPlan {
    for task in &mut tasks {
        task.call_id_offset = task.id as u64 * call_id_stride;
    }
    let index = IntervalIndex::build(&tasks);

    debug!(
        tasks = tasks.len(),
        contigs = index.contig_count(),
        total_units,
        workers = params.worker_count,
        "Plan complete"
    );

    TaskPlan {
        tasks,
        index,
        total_units,
        call_id_stride,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ContigTable, TargetRecord};
    use crate::scheduler::task::OwnerLookup;

    fn table(spec: &[(&str, u64, u64)]) -> ContigTable {
        ContigTable::new(
            spec.iter()
                .map(|(name, length, units)| ContigInfo {
                    name: name.to_string(),
                    length: *length,
                    mapped_units: *units,
                })
                .collect(),
        )
    }

    fn params(workers: usize, multiplier: u64) -> PlanParams<'static> {
        PlanParams {
            worker_count: workers,
            task_count_multiplier: multiplier,
            ..Default::default()
        }
    }

    /// Planned intervals must be contiguous, non-overlapping and cover
    /// exactly [0, length-1], with dense creation-ordered ids.
    fn assert_partition(plan: &TaskPlan, contigs: &[(&str, u64)]) {
        for (i, task) in plan.tasks.iter().enumerate() {
            assert_eq!(task.id, i, "ids must be dense and creation-ordered");
            assert!(task.start <= task.end);
        }

        for (name, length) in contigs {
            let intervals: Vec<_> = plan
                .tasks
                .iter()
                .filter(|t| t.contig == *name)
                .map(|t| (t.start, t.end))
                .collect();
            assert!(!intervals.is_empty(), "no tasks for {}", name);
            assert_eq!(intervals[0].0, 0);
            assert_eq!(intervals.last().unwrap().1, length - 1);
            for pair in intervals.windows(2) {
                assert_eq!(pair[1].0, pair[0].1 + 1, "gap or overlap on {}", name);
            }
        }
    }

    #[test]
    fn test_single_worker_single_contig() {
        let table = table(&[("chr1", 1000, 600)]);
        let plan = plan_tasks(&table, &params(1, 3));

        // One worker without the memory constraint never splits
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].start, 0);
        assert_eq!(plan.tasks[0].end, 999);
        assert_partition(&plan, &[("chr1", 1000)]);
    }

    #[test]
    fn test_splitting_by_units() {
        let table = table(&[("chr1", 1000, 600), ("chr2", 500, 600)]);
        let plan = plan_tasks(&table, &params(2, 3));

        // task_max_units = 1200 / 6 = 200 -> 3 tasks per contig
        assert_eq!(plan.tasks.len(), 6);
        assert_partition(&plan, &[("chr1", 1000), ("chr2", 500)]);

        // Uneven final widths are accepted
        let chr1_tasks: Vec<_> = plan.tasks.iter().filter(|t| t.contig == "chr1").collect();
        assert_eq!(chr1_tasks[0].span(), 333);
        assert_eq!(chr1_tasks[2].span(), 334);
    }

    #[test]
    fn test_multiplier_zero_never_splits() {
        let table = table(&[("chr1", 1000, 600)]);
        let plan = plan_tasks(&table, &params(8, 0));
        assert_eq!(plan.tasks.len(), 1);
    }

    #[test]
    fn test_low_memory_splits_single_worker() {
        let table = table(&[("chr1", 1000, 600)]);
        let mut p = params(1, 3);
        p.low_memory = true;
        let plan = plan_tasks(&table, &p);
        assert!(plan.tasks.len() > 1);
        assert_partition(&plan, &[("chr1", 1000)]);
    }

    #[test]
    fn test_zero_units_falls_back_to_per_contig() {
        let table = table(&[("chr1", 1000, 0), ("chr2", 500, 0)]);
        let plan = plan_tasks(&table, &params(4, 3));

        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.total_units, 0);
        assert_eq!(plan.call_id_stride, FALLBACK_ID_SPAN);
        assert_eq!(plan.tasks[1].call_id_offset, FALLBACK_ID_SPAN);
        assert_partition(&plan, &[("chr1", 1000), ("chr2", 500)]);
    }

    #[test]
    fn test_short_contig_gets_one_task_minimum() {
        let table = table(&[("chrM", 3, 1), ("chr1", 1000, 5000)]);
        let plan = plan_tasks(&table, &params(4, 3));
        assert_partition(&plan, &[("chrM", 3), ("chr1", 1000)]);
    }

    #[test]
    fn test_interval_index_matches_partition() {
        let table = table(&[("chr1", 1000, 600)]);
        let mut p = params(2, 3);
        p.low_memory = true;
        let plan = plan_tasks(&table, &p);

        for pos in [0u64, 1, 332, 333, 500, 998, 999] {
            let owner = plan.tasks.iter().find(|t| t.contains("chr1", pos)).unwrap();
            assert_eq!(
                plan.index.owner_of("chr1", pos),
                OwnerLookup::Unique(owner.id)
            );
        }
    }

    #[test]
    fn test_annotation_and_target_subsetting() {
        let annotations = vec![
            RegionAnnotation {
                contig: "chr1".into(),
                start: 10,
                end: 20,
                payload: "TR_A".into(),
            },
            RegionAnnotation {
                contig: "chr1".into(),
                start: 900,
                end: 950,
                payload: "TR_B".into(),
            },
        ];
        let targets = TargetCallSet {
            header_lines: vec![],
            records: vec![
                TargetRecord {
                    line_index: 0,
                    contig: "chr1".into(),
                    pos: 400,
                    raw: "chr1\t400".into(),
                },
                TargetRecord {
                    line_index: 1,
                    contig: "chr2".into(),
                    pos: 5,
                    raw: "chr2\t5".into(),
                },
            ],
        };

        let table = table(&[("chr1", 1000, 600)]);
        let p = PlanParams {
            worker_count: 1,
            task_count_multiplier: 3,
            low_memory: true,
            annotations: &annotations,
            target_calls: Some(&targets),
        };
        let plan = plan_tasks(&table, &p);
        assert_eq!(plan.tasks.len(), 3);

        assert_eq!(plan.tasks[0].annotations.len(), 1);
        assert_eq!(plan.tasks[0].annotations[0].payload, "TR_A");
        assert_eq!(plan.tasks[2].annotations[0].payload, "TR_B");

        // chr2 target has no task and is simply not subset anywhere
        assert_eq!(plan.tasks[1].target_calls.len(), 1);
        assert_eq!(plan.tasks[1].target_calls[0].line_index, 0);
        assert!(plan.tasks[0].target_calls.is_empty());
    }

    #[test]
    fn test_per_contig_plan() {
        let table = table(&[("chr1", 1000, 0), ("chr2", 500, 0)]);
        let plan = plan_per_contig(table.contigs(), &PlanParams::default());

        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[0].end, 999);
        assert_eq!(plan.tasks[1].end, 499);
    }
}
