//! Worker pool and channel protocol
//!
//! Each worker is an isolated thread owning its [`TaskProcessor`] and a
//! dedicated pair of bounded channels; workers share no state with each
//! other or with the scheduler beyond message payloads. The pool itself is
//! only ever touched from the scheduler's single control thread, so the
//! free/busy bookkeeping needs no locking.

use crate::config::RunMode;
use crate::error::WorkerError;
use crate::scheduler::task::{Task, TaskResult};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The opaque per-task computation
///
/// The variant-detection engine implements this; one instance is created
/// per worker and owns whatever per-worker resources it needs (file
/// handles, caches). A returned `Err` is the worker-fault message and is
/// fatal to the whole run.
pub trait TaskProcessor: Send {
    fn process(&mut self, mode: RunMode, task: &Task) -> std::result::Result<TaskResult, String>;
}

impl<F> TaskProcessor for F
where
    F: FnMut(RunMode, &Task) -> std::result::Result<TaskResult, String> + Send,
{
    fn process(&mut self, mode: RunMode, task: &Task) -> std::result::Result<TaskResult, String> {
        self(mode, task)
    }
}

/// Scheduler-to-worker messages
#[derive(Debug)]
pub enum WorkerRequest {
    /// Start the opaque computation for one task
    Process { mode: RunMode, task: Task },

    /// Terminate cleanly after the task stream is drained
    Finalize,
}

/// Worker-to-scheduler messages
#[derive(Debug)]
pub enum WorkerReply {
    /// Successful completion, tagged with the mode it was produced under
    Result { mode: RunMode, result: TaskResult },

    /// The computation failed; fatal to the whole run, never retried
    Fault {
        worker: usize,
        task_id: usize,
        message: String,
    },
}

/// One live worker: id, duplex channel endpoints and busy state
struct WorkerSlot {
    id: usize,
    requests: Sender<WorkerRequest>,
    replies: Receiver<WorkerReply>,
    busy: bool,
    handle: Option<JoinHandle<()>>,
}

/// Fixed set of workers with free/busy tracking
pub struct WorkerPool {
    slots: Vec<WorkerSlot>,
    free: Vec<usize>,
}

impl WorkerPool {
    /// Spawn `count` workers, each with a processor from `factory`
    pub fn spawn<F>(count: usize, factory: F) -> Result<Self, WorkerError>
    where
        F: Fn(usize) -> Box<dyn TaskProcessor>,
    {
        let mut slots = Vec::with_capacity(count);
        let mut free = Vec::with_capacity(count);

        for id in 0..count {
            let (req_tx, req_rx) = bounded::<WorkerRequest>(1);
            let (rep_tx, rep_rx) = bounded::<WorkerReply>(1);
            let processor = factory(id);

            let handle = thread::Builder::new()
                .name(format!("scatter-worker-{}", id))
                .spawn(move || worker_loop(id, processor, req_rx, rep_tx))
                .map_err(|e| WorkerError::SpawnFailed {
                    id,
                    reason: e.to_string(),
                })?;

            slots.push(WorkerSlot {
                id,
                requests: req_tx,
                replies: rep_rx,
                busy: false,
                handle: Some(handle),
            });
            free.push(id);
        }

        // Pop order prefers low worker ids first
        free.reverse();

        debug!(count, "Workers spawned");
        Ok(Self { slots, free })
    }

    /// Total worker count
    pub fn worker_count(&self) -> usize {
        self.slots.len()
    }

    /// Workers currently processing a task
    pub fn busy_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Ids of all busy workers
    pub fn busy_ids(&self) -> Vec<usize> {
        self.slots
            .iter()
            .filter(|slot| slot.busy)
            .map(|slot| slot.id)
            .collect()
    }

    /// Take a free worker, marking it busy; O(1)
    pub fn acquire_free(&mut self) -> Option<usize> {
        let id = self.free.pop()?;
        self.slots[id].busy = true;
        Some(id)
    }

    /// Return a worker to the free set; O(1)
    pub fn release(&mut self, id: usize) {
        debug_assert!(self.slots[id].busy, "released worker {} was not busy", id);
        self.slots[id].busy = false;
        self.free.push(id);
    }

    /// Send a task to a (previously acquired) worker
    pub fn dispatch(&self, id: usize, mode: RunMode, task: Task) -> Result<(), WorkerError> {
        let task_id = task.id;
        self.slots[id]
            .requests
            .send(WorkerRequest::Process { mode, task })
            .map_err(|_| WorkerError::DispatchFailed { id, task_id })
    }

    /// Bounded, non-blocking-ish poll of one worker's reply channel
    ///
    /// `Ok(None)` on timeout; `Err(Disconnected)` if the worker thread died
    /// without sending a fault message (e.g. a panic).
    pub fn poll(&self, id: usize, timeout: Duration) -> Result<Option<WorkerReply>, WorkerError> {
        match self.slots[id].replies.recv_timeout(timeout) {
            Ok(reply) => Ok(Some(reply)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(WorkerError::Disconnected { id }),
        }
    }

    /// Send the shutdown signal to every worker (delivery is best-effort)
    pub fn finalize_all(&self) {
        for slot in &self.slots {
            let _ = slot.requests.send(WorkerRequest::Finalize);
        }
    }

    /// Signal shutdown and reap worker threads
    ///
    /// Waits up to `grace` for in-flight computations to flush diagnostics,
    /// then detaches any worker that is still unresponsive; termination is
    /// unconditional after the grace delay.
    pub fn shutdown(mut self, grace: Duration) {
        self.finalize_all();

        let deadline = Instant::now() + grace;
        for slot in &mut self.slots {
            let Some(handle) = slot.handle.take() else {
                continue;
            };
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!(worker = slot.id, "Worker unresponsive after grace period; detaching");
                drop(handle);
            }
        }
    }
}

fn worker_loop(
    id: usize,
    mut processor: Box<dyn TaskProcessor>,
    requests: Receiver<WorkerRequest>,
    replies: Sender<WorkerReply>,
) {
    debug!(worker = id, "Worker starting");

    while let Ok(request) = requests.recv() {
        match request {
            WorkerRequest::Process { mode, task } => {
                let task_id = task.id;
                match processor.process(mode, &task) {
                    Ok(result) => {
                        if replies.send(WorkerReply::Result { mode, result }).is_err() {
                            break;
                        }
                    }
                    Err(message) => {
                        // Fatal; report and stop pulling work
                        let _ = replies.send(WorkerReply::Fault {
                            worker: id,
                            task_id,
                            message,
                        });
                        break;
                    }
                }
            }
            WorkerRequest::Finalize => break,
        }
    }

    debug!(worker = id, "Worker shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_processor(_id: usize) -> Box<dyn TaskProcessor> {
        Box::new(|_mode: RunMode, task: &Task| {
            Ok(TaskResult {
                task_id: task.id,
                processed_units: task.span(),
                ..Default::default()
            })
        })
    }

    #[test]
    fn test_acquire_release_cycle() {
        let mut pool = WorkerPool::spawn(2, echo_processor).unwrap();

        assert_eq!(pool.worker_count(), 2);
        assert_eq!(pool.busy_count(), 0);

        let a = pool.acquire_free().unwrap();
        let b = pool.acquire_free().unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.busy_count(), 2);
        assert!(pool.acquire_free().is_none());

        pool.release(a);
        assert_eq!(pool.busy_count(), 1);
        assert_eq!(pool.acquire_free(), Some(a));

        pool.release(a);
        pool.release(b);
        pool.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_dispatch_and_poll_round_trip() {
        let mut pool = WorkerPool::spawn(1, echo_processor).unwrap();

        let id = pool.acquire_free().unwrap();
        pool.dispatch(id, RunMode::CallSample, Task::new(7, "chr1", 0, 99))
            .unwrap();

        let reply = loop {
            if let Some(reply) = pool.poll(id, Duration::from_millis(10)).unwrap() {
                break reply;
            }
        };

        match reply {
            WorkerReply::Result { mode, result } => {
                assert_eq!(mode, RunMode::CallSample);
                assert_eq!(result.task_id, 7);
                assert_eq!(result.processed_units, 100);
            }
            other => panic!("unexpected reply: {:?}", other),
        }

        pool.release(id);
        pool.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_fault_reply_carries_context() {
        let mut pool = WorkerPool::spawn(1, |_id| {
            Box::new(|_mode: RunMode, _task: &Task| Err("engine exploded".to_string()))
                as Box<dyn TaskProcessor>
        })
        .unwrap();

        let id = pool.acquire_free().unwrap();
        pool.dispatch(id, RunMode::CallSample, Task::new(3, "chr1", 0, 9))
            .unwrap();

        let reply = loop {
            if let Some(reply) = pool.poll(id, Duration::from_millis(10)).unwrap() {
                break reply;
            }
        };

        match reply {
            WorkerReply::Fault {
                worker,
                task_id,
                message,
            } => {
                assert_eq!(worker, id);
                assert_eq!(task_id, 3);
                assert!(message.contains("engine exploded"));
            }
            other => panic!("unexpected reply: {:?}", other),
        }

        pool.release(id);
        pool.shutdown(Duration::from_secs(1));
    }
}
