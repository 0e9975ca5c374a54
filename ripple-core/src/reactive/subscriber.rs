//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that depends on reactive values: plain
//! effects, the effect behind a computed value, or the getter of a watch.
//! The dependency store only sees them through the type-erased
//! [`Subscriber`] trait, whatever their return type.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::store::Dep;

/// Unique identifier for an effect.
///
/// Dependency sets and job queues compare effects by this ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect#{}", self.0)
    }
}

/// The seam between the dependency store and effects.
pub trait Subscriber {
    /// The subscriber's unique ID.
    fn id(&self) -> EffectId;

    /// Run the computation, discarding its result.
    fn run(self: Rc<Self>);

    /// The scheduler configured for this subscriber, if any.
    fn scheduler(&self) -> Option<Scheduler>;

    /// Record that this subscriber now belongs to `dep`.
    fn attach(&self, dep: &Rc<Dep>);

    /// Leave every dep this subscriber belongs to.
    fn detach_all(&self);
}

/// Type-erased handle to an effect, as handed to schedulers.
pub type EffectRef = Rc<dyn Subscriber>;

/// A delivery strategy: receives the effect whose dependencies changed and
/// decides if, when and how often to run it.
#[derive(Clone)]
pub struct Scheduler {
    deliver: Rc<dyn Fn(&EffectRef)>,
}

impl Scheduler {
    /// Wrap a scheduling function.
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(&EffectRef) + 'static,
    {
        Self {
            deliver: Rc::new(deliver),
        }
    }

    /// The microtask-batched, de-duplicating queue scheduler.
    pub fn queued() -> Self {
        Self::new(crate::scheduler::queue_scheduler)
    }

    /// Hand `effect` to this scheduler.
    pub fn schedule(&self, effect: &EffectRef) {
        (self.deliver)(effect);
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}
