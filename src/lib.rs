//! sv-scatter - scheduling and merge core for structural-variant calling
//!
//! The orchestration engine of a structural-variant calling pipeline:
//! partitions an analysis job into independent spatial tasks, distributes
//! them across a pool of isolated workers, collects results as they
//! complete, and reassembles them into one correctly ordered output stream
//! and one consolidated candidate container.
//!
//! # Features
//!
//! - **Interval partitioning**: contigs are split by per-contig work
//!   estimates into contiguous, non-overlapping tasks covering every
//!   coordinate exactly once.
//!
//! - **Isolated workers**: one thread per worker, a dedicated duplex
//!   channel each, no shared mutable state; the detection engine plugs in
//!   through the [`scheduler::TaskProcessor`] trait.
//!
//! - **Out-of-order tolerant merging**: completion order is
//!   non-deterministic; the aggregator restores global
//!   `(contig order, position)` order and corrects boundary-effect
//!   misassignments through the interval index.
//!
//! - **Append-only container combination**: per-task partial containers
//!   merge into one artifact by index relocation alone; no candidate block
//!   is ever re-encoded.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────────────────────────┐
//! │ Task Planner │────▶│             Scheduler Loop               │
//! │  + interval  │     │  dispatch -> progress -> bounded poll    │
//! │    index     │     └───┬──────────┬──────────┬────────────────┘
//! └──────────────┘         │          │          │
//!                     ┌────▼───┐ ┌────▼───┐ ┌────▼───┐
//!                     │Worker 0│ │Worker 1│ │Worker N│   (isolated,
//!                     │process │ │process │ │process │    channel only)
//!                     └────┬───┘ └────┬───┘ └────┬───┘
//!                          │          │          │
//!                 per-task results    │     partial containers
//!                          │          │          │
//!              ┌───────────▼──────────▼┐  ┌──────▼──────────────┐
//!              │   Result Aggregator   │  │      Combiner       │
//!              │ reassign + sort/emit  │  │ index-shifted merge │
//!              └───────────┬───────────┘  └──────┬──────────────┘
//!                          ▼                     ▼
//!                  ordered call stream    one .snf container
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sv_scatter::config::RunMode;
//! use sv_scatter::input::ContigTable;
//! use sv_scatter::scheduler::{
//!     plan_tasks, PlanParams, Scheduler, SchedulerOptions, WorkerPool,
//! };
//!
//! let table = ContigTable::from_tsv("contigs.tsv".as_ref()).unwrap();
//! let plan = plan_tasks(
//!     &table,
//!     &PlanParams {
//!         worker_count: 8,
//!         task_count_multiplier: 3,
//!         ..Default::default()
//!     },
//! );
//!
//! // `my_engine` is the detection engine's TaskProcessor factory
//! # fn my_engine(_id: usize) -> Box<dyn sv_scatter::scheduler::TaskProcessor> { unimplemented!() }
//! let pool = WorkerPool::spawn(8, my_engine).unwrap();
//! let output = Scheduler::new(RunMode::CallSample, plan, pool, SchedulerOptions::default())
//!     .run()
//!     .unwrap();
//! ```

pub mod aggregate;
pub mod config;
pub mod container;
pub mod error;
pub mod input;
pub mod progress;
pub mod scheduler;

pub use config::{CliArgs, PipelineArgs, RunConfig, RunMode};
pub use error::{Result, ScatterError};
pub use scheduler::{Scheduler, SchedulerOptions, SchedulerOutput};
