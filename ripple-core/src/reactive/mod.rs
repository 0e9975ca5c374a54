//! Reactive Primitives
//!
//! This module implements the core reactive system: reactive records, effects,
//! computed values, and watches. Together they form Ripple's fine-grained
//! dependency tracking.
//!
//! # Concepts
//!
//! ## Reactive Records
//!
//! A [`Reactive`] wraps a plain [`RawData`] record. Reading a property through
//! the wrapper while an effect is running subscribes that effect to the
//! property. Writing a property through the wrapper notifies every subscriber
//! of that property, and only that property.
//!
//! ## Effects
//!
//! An [`Effect`] is a computation that re-runs whenever a property it read
//! changes. Dependencies are collected fresh on every run, so branches that
//! are no longer taken stop causing re-runs. An effect can hand its re-runs
//! to a [`Scheduler`] instead of running synchronously.
//!
//! ## Computed Values
//!
//! A [`Computed`] is a lazily evaluated, cached derivation. It recomputes only
//! when read after one of its inputs changed.
//!
//! ## Watches
//!
//! [`watch`] calls a callback with the new and previous value of a source
//! whenever it changes, either synchronously or batched through the job queue.
//!
//! # Implementation Notes
//!
//! The active effect lives on a thread-local stack (see [`ReactiveContext`]).
//! Subscriptions live in a thread-local dependency store keyed by record
//! identity and property key (see [`store`]). All state is single-threaded;
//! the handles are `Rc`-based and deliberately `!Send`.

mod computed;
mod context;
mod effect;
mod object;
pub mod store;
mod subscriber;
mod value;
mod watch;

pub use computed::{computed, Computed};
pub use context::ReactiveContext;
pub use effect::{create_effect, Effect, EffectOptions, WeakEffect};
pub use object::{wrap, RawData, Reactive};
pub use store::{subscriber_count, track, tracked_targets, trigger, Dep, DepId};
pub use subscriber::{EffectId, EffectRef, Scheduler, Subscriber};
pub use value::{Key, TargetId, Value};
pub use watch::{watch, FlushMode, OnInvalidate, WatchOptions, WatchSource};
