//! Task scheduling core
//!
//! One coordinating thread drives a fixed pool of isolated workers over
//! dedicated duplex channels; workers share no memory with each other or
//! with the scheduler.
//!
//! # Architecture
//!
//! ```text
//!                   ┌──────────────────────────┐
//!                   │       Task Planner       │
//!                   │  contig lengths + units  │
//!                   │  -> tasks + interval idx │
//!                   └────────────┬─────────────┘
//!                                │
//!                                ▼
//!                   ┌──────────────────────────┐
//!                   │      Scheduler Loop      │
//!                   │  dispatch / poll / abort │
//!                   └────┬───────┬───────┬─────┘
//!                        │       │       │   (duplex channel per worker)
//!                  ┌─────▼─┐ ┌───▼───┐ ┌─▼─────┐
//!                  │Worker1│ │Worker2│ │WorkerN│
//!                  │process│ │process│ │process│
//!                  └───────┘ └───────┘ └───────┘
//! ```

pub mod coordinator;
pub mod plan;
pub mod pool;
pub mod task;

pub use coordinator::{
    DispatchPolicy, Lcg, RunSummary, Scheduler, SchedulerOptions, SchedulerOutput,
};
pub use plan::{plan_per_contig, plan_tasks, PlanParams, TaskPlan, FALLBACK_ID_SPAN};
pub use pool::{TaskProcessor, WorkerPool, WorkerReply, WorkerRequest};
pub use task::{Call, IntervalIndex, OwnerLookup, Task, TaskResult};
