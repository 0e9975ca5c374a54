//! Microtask Queue
//!
//! Deferred callbacks that run after the current synchronous stretch of code
//! and before control returns to the host. Tasks queued while the queue is
//! being flushed run in the same flush.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::config::ReactiveConfig;
use crate::error::{ReactiveError, Result};

type Microtask = Box<dyn FnOnce()>;

thread_local! {
    static MICROTASKS: RefCell<VecDeque<Microtask>> = RefCell::new(VecDeque::new());
    static FLUSHING: Cell<bool> = const { Cell::new(false) };
}

/// Queue `task` to run at the next [`flush_microtasks`].
pub fn queue_microtask<F>(task: F)
where
    F: FnOnce() + 'static,
{
    MICROTASKS.with(|queue| queue.borrow_mut().push_back(Box::new(task)));
}

/// Number of tasks waiting for the next flush.
pub fn pending_microtasks() -> usize {
    MICROTASKS.with(|queue| queue.borrow().len())
}

/// Clears the flushing flag on every exit path.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = FLUSHING.try_with(|flushing| flushing.set(false));
    }
}

/// Run queued microtasks, in order, until the queue is empty.
///
/// Returns the number of tasks that ran. Calling this from inside a running
/// microtask does nothing; the outer flush picks up new tasks anyway.
///
/// A flush stops after `max_microtasks_per_flush` tasks and reports
/// [`ReactiveError::MicrotaskOverflow`]; the remaining tasks stay queued.
pub fn flush_microtasks() -> Result<usize> {
    if FLUSHING.with(|flushing| flushing.replace(true)) {
        return Ok(0);
    }
    let _guard = FlushGuard;

    let limit = ReactiveConfig::current().max_microtasks_per_flush;
    let mut ran = 0;

    loop {
        if ran >= limit && pending_microtasks() > 0 {
            tracing::error!(limit, pending = pending_microtasks(), "microtask flush limit reached");
            return Err(ReactiveError::MicrotaskOverflow { limit });
        }

        let Some(task) = MICROTASKS.with(|queue| queue.borrow_mut().pop_front()) else {
            break;
        };
        task();
        ran += 1;
    }

    if ran > 0 {
        tracing::debug!(ran, "flushed microtasks");
    }
    Ok(ran)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::configure;
    use std::rc::Rc;

    #[test]
    fn tasks_run_in_order_on_flush() {
        let log = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            queue_microtask(move || log.borrow_mut().push(i));
        }

        assert!(log.borrow().is_empty());
        assert_eq!(pending_microtasks(), 3);

        assert_eq!(flush_microtasks().unwrap(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(pending_microtasks(), 0);
    }

    #[test]
    fn tasks_queued_during_flush_run_in_same_flush() {
        let log = Rc::new(RefCell::new(Vec::new()));

        queue_microtask({
            let log = log.clone();
            move || {
                log.borrow_mut().push("outer");
                let log = log.clone();
                queue_microtask(move || log.borrow_mut().push("inner"));
            }
        });

        assert_eq!(flush_microtasks().unwrap(), 2);
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn runaway_tasks_hit_the_limit() {
        fn requeue() {
            queue_microtask(requeue);
        }

        let previous = configure(ReactiveConfig {
            max_microtasks_per_flush: 10,
            ..ReactiveConfig::default()
        });

        queue_microtask(requeue);
        let result = flush_microtasks();
        configure(previous);

        assert!(matches!(result, Err(ReactiveError::MicrotaskOverflow { limit: 10 })));
        assert_eq!(pending_microtasks(), 1);

        // Drain without re-queueing so the thread is left clean.
        MICROTASKS.with(|queue| queue.borrow_mut().clear());
    }

    #[test]
    fn panicking_task_resets_flush_state() {
        queue_microtask(|| panic!("task failed"));
        assert!(std::panic::catch_unwind(flush_microtasks).is_err());

        let ran = Rc::new(Cell::new(false));
        queue_microtask({
            let ran = ran.clone();
            move || ran.set(true)
        });
        assert_eq!(flush_microtasks().unwrap(), 1);
        assert!(ran.get());
    }
}
