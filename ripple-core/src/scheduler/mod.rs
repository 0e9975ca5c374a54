//! Delivery Schedulers
//!
//! By default a write re-runs its subscribers synchronously, on the same
//! call stack as the write. A [`Scheduler`](crate::reactive::Scheduler)
//! replaces that delivery for one effect entirely; this module provides the
//! pieces the built-in schedulers are made of.
//!
//! # Overview
//!
//! - `microtask`: a per-thread queue of deferred callbacks. The host drains
//!   it with [`flush_microtasks`] at the end of each synchronous turn, the way
//!   an event loop runs its microtask checkpoint.
//!
//! - `queue`: a de-duplicating job queue flushed one batch per microtask. Any
//!   number of writes within one turn collapse into at most one run per
//!   queued effect, observing the state as of the flush.
//!
//! # Design Decisions
//!
//! 1. Jobs are keyed by effect ID, so re-queueing an effect that is still
//!    pending is a no-op and the original position is kept.
//!
//! 2. Jobs queued while a batch is being flushed go to the next batch, which
//!    is its own microtask, unless they are still waiting in the current one.
//!    Effects that keep re-queueing each other are bounded by
//!    `max_microtasks_per_flush`.
//!
//! 3. A panicking job resets the queue to idle before the panic continues.

mod microtask;
mod queue;

pub use microtask::{flush_microtasks, pending_microtasks, queue_microtask};
pub use queue::{pending_jobs, queue_job, queue_scheduler};
