//! Ripple Core
//!
//! This crate provides a fine-grained reactive runtime. It implements:
//!
//! - Reactive records with per-property dependency tracking
//! - Effects with dynamic dependencies, nesting, and pluggable schedulers
//! - Lazily evaluated, cached computed values
//! - Watches with previous values, invalidation hooks, and batched delivery
//! - A de-duplicating job queue flushed through a microtask queue
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Records, effects, computed values, watches, and the
//!   dependency store that connects them
//! - `scheduler`: Microtask queue and the job queue built on top of it
//! - `config`: Per-thread runtime limits
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::{computed, flush_microtasks, Effect, EffectOptions, Reactive, Scheduler};
//!
//! // Create a reactive record
//! let data = Reactive::from_pairs([("count", 0)]);
//!
//! // Create a derived value
//! let doubled = computed({
//!     let data = data.clone();
//!     move || data.get("count").as_i64().unwrap_or(0) * 2
//! });
//!
//! // Create an effect
//! let _effect = Effect::new({
//!     let data = data.clone();
//!     move || println!("Count: {}, Doubled: {}", data.get("count"), doubled.get())
//! });
//!
//! // Update the record
//! data.set("count", 5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod scheduler;

pub use config::{configure, ReactiveConfig, TraverseLimits};
pub use error::{ReactiveError, Result};
pub use reactive::{
    computed, create_effect, watch, wrap, Computed, Effect, EffectId, EffectOptions, EffectRef,
    FlushMode, Key, OnInvalidate, RawData, Reactive, ReactiveContext, Scheduler, Subscriber,
    TargetId, Value, WatchOptions, WatchSource, WeakEffect,
};
pub use scheduler::{
    flush_microtasks, pending_jobs, pending_microtasks, queue_job, queue_microtask,
    queue_scheduler,
};
