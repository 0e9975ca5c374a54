//! Queue Scheduler
//!
//! Batches deliveries into a single microtask flush.
//!
//! # Algorithm
//!
//! 1. A job is queued under an effect ID. If that ID is already pending, the
//!    call is a no-op.
//!
//! 2. The first job queued while idle schedules one microtask to flush the
//!    queue.
//!
//! 3. The flush takes the pending jobs as one batch and runs them in queue
//!    order. The queue is idle again as soon as the batch is taken, so a job
//!    queued while the batch runs (and not already in it) schedules the next
//!    microtask. Each batch is therefore one microtask, and effects that keep
//!    re-queueing each other count against the microtask flush limit.

use std::cell::RefCell;

use indexmap::IndexMap;

use super::microtask::queue_microtask;
use crate::reactive::{EffectId, EffectRef, Subscriber};

type Job = Box<dyn FnOnce()>;

#[derive(Default)]
struct JobQueue {
    pending: IndexMap<EffectId, Job>,
    /// The batch being flushed right now.
    running: IndexMap<EffectId, Job>,
    flush_scheduled: bool,
}

impl JobQueue {
    fn contains(&self, id: &EffectId) -> bool {
        self.pending.contains_key(id) || self.running.contains_key(id)
    }
}

thread_local! {
    static QUEUE: RefCell<JobQueue> = RefCell::new(JobQueue::default());
}

/// Queue `job` under `id` for the next flush.
///
/// Returns `false` if a job for `id` was already pending or is waiting in
/// the batch being flushed, in which case `job` is discarded.
pub fn queue_job<F>(id: EffectId, job: F) -> bool
where
    F: FnOnce() + 'static,
{
    let (queued, schedule_flush) = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if queue.contains(&id) {
            return (false, false);
        }
        queue.pending.insert(id, Box::new(job));
        let schedule_flush = !queue.flush_scheduled;
        queue.flush_scheduled = true;
        (true, schedule_flush)
    });

    if schedule_flush {
        tracing::debug!(first = %id, "scheduling job queue flush");
        queue_microtask(flush_jobs);
    }
    queued
}

/// Scheduler that batches runs of `effect` into the next microtask flush.
///
/// Use it through [`Scheduler::queued`](crate::reactive::Scheduler::queued).
pub fn queue_scheduler(effect: &EffectRef) {
    let run = EffectRef::clone(effect);
    queue_job(effect.id(), move || run.run());
}

/// Number of jobs that have not run yet, including the rest of a batch
/// that is being flushed.
pub fn pending_jobs() -> usize {
    QUEUE.with(|queue| {
        let queue = queue.borrow();
        queue.pending.len() + queue.running.len()
    })
}

/// Returns the queue to idle when a job panics.
struct ResetOnPanic;

impl Drop for ResetOnPanic {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }

        let dropped = QUEUE
            .try_with(|queue| {
                let mut queue = queue.try_borrow_mut().ok()?;
                queue.flush_scheduled = false;
                let running = std::mem::take(&mut queue.running);
                let pending = std::mem::take(&mut queue.pending);
                Some((running, pending))
            })
            .ok()
            .flatten();

        if let Some((running, pending)) = dropped {
            let count = running.len() + pending.len();
            if count > 0 {
                tracing::debug!(dropped = count, "job queue reset after panic");
            }
        }
    }
}

fn flush_jobs() {
    let batch = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        queue.flush_scheduled = false;
        queue.running = std::mem::take(&mut queue.pending);
        queue.running.len()
    });

    let _reset = ResetOnPanic;
    let mut ran = 0_usize;

    while let Some((id, job)) = QUEUE.with(|queue| queue.borrow_mut().running.shift_remove_index(0)) {
        tracing::trace!(effect = %id, "running queued job");
        job();
        ran += 1;
    }

    tracing::debug!(batch, ran, requeued = pending_jobs(), "job queue batch flushed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{configure, ReactiveConfig};
    use crate::error::ReactiveError;
    use crate::scheduler::flush_microtasks;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn duplicate_ids_are_ignored() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = EffectId::new();
        let b = EffectId::new();

        for (id, label) in [(a, "a1"), (b, "b"), (a, "a2")] {
            let log = log.clone();
            queue_job(id, move || log.borrow_mut().push(label));
        }

        assert_eq!(pending_jobs(), 2);
        // One microtask covers the whole batch
        assert_eq!(flush_microtasks().unwrap(), 1);
        assert_eq!(*log.borrow(), vec!["a1", "b"]);
        assert_eq!(pending_jobs(), 0);
    }

    #[test]
    fn queue_returns_to_idle_after_flush() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = EffectId::new();

        for round in 0..2 {
            let log = log.clone();
            assert!(queue_job(id, move || log.borrow_mut().push(round)));
            flush_microtasks().unwrap();
        }

        assert_eq!(*log.borrow(), vec![0, 1]);
    }

    #[test]
    fn jobs_queued_during_flush_run_in_next_microtask() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = EffectId::new();
        let second = EffectId::new();

        queue_job(first, {
            let log = log.clone();
            move || {
                log.borrow_mut().push("first");
                let log = log.clone();
                queue_job(second, move || log.borrow_mut().push("second"));
            }
        });

        // One microtask per batch
        assert_eq!(flush_microtasks().unwrap(), 2);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn job_still_in_running_batch_is_not_queued_twice() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = EffectId::new();
        let second = EffectId::new();

        queue_job(first, {
            let log = log.clone();
            move || {
                log.borrow_mut().push("first");
                let log = log.clone();
                assert!(!queue_job(second, move || log.borrow_mut().push("second again")));
            }
        });
        queue_job(second, {
            let log = log.clone();
            move || log.borrow_mut().push("second")
        });

        assert_eq!(flush_microtasks().unwrap(), 1);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn requeueing_jobs_are_bounded_by_flush_limit() {
        fn requeue(id: EffectId, runs: Rc<Cell<usize>>) {
            queue_job(id, move || {
                runs.set(runs.get() + 1);
                requeue(id, runs);
            });
        }

        let previous = configure(ReactiveConfig {
            max_microtasks_per_flush: 5,
            ..ReactiveConfig::default()
        });

        let runs = Rc::new(Cell::new(0));
        requeue(EffectId::new(), runs.clone());
        let result = flush_microtasks();
        configure(previous);

        assert!(matches!(result, Err(ReactiveError::MicrotaskOverflow { limit: 5 })));
        assert_eq!(runs.get(), 5);
        assert_eq!(pending_jobs(), 1);
    }

    #[test]
    fn panicking_job_resets_queue() {
        let id = EffectId::new();
        queue_job(id, || panic!("job failed"));
        queue_job(EffectId::new(), || {});

        assert!(std::panic::catch_unwind(flush_microtasks).is_err());
        assert_eq!(pending_jobs(), 0);

        // A fresh job schedules a fresh flush
        assert!(queue_job(id, || {}));
        assert_eq!(flush_microtasks().unwrap(), 1);
    }
}
