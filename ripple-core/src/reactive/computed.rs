//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when read
//! after one of its dependencies changed.
//!
//! # How Computed Values Work
//!
//! 1. The derivation runs inside a lazy effect. Nothing is computed until the
//!    first read.
//!
//! 2. When a dependency changes, the effect's scheduler does not recompute.
//!    It only marks the value dirty and triggers the computed's own synthetic
//!    `value` key, so effects that read this computed get scheduled.
//!
//! 3. On read, a dirty value is recomputed first. The read is then tracked
//!    on the synthetic key, which lets computed values depend on each other.
//!
//! # Why This Matters
//!
//! - A record changes
//! - 10 computed values depend on it
//! - Only the ones that are actually read recompute, once each
//! - Values that are never read stay dirty (no wasted work)

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Rc;

use super::effect::{create_effect, Effect, EffectOptions};
use super::store;
use super::subscriber::{EffectRef, Scheduler};
use super::value::{Key, TargetId};

struct ComputedInner<T: 'static> {
    /// Identity of the synthetic dependency.
    target: TargetId,
    key: Key,
    effect: Effect<T>,
    cache: RefCell<Option<T>>,
    dirty: Rc<Cell<bool>>,
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        store::evict(self.target);
        // Upstream deps hold the derivation strongly.
        self.effect.detach();
    }
}

/// A cached value derived from reactive data.
///
/// # Example
///
/// ```rust,ignore
/// let data = Reactive::from_pairs([("x", 0)]);
/// let plus_one = computed({
///     let data = data.clone();
///     move || data.get("x").as_i64().unwrap_or(0) + 1
/// });
///
/// assert_eq!(plus_one.get(), 1);
/// ```
pub struct Computed<T: Clone + 'static> {
    inner: Rc<ComputedInner<T>>,
}

/// Create a computed value. Equivalent to [`Computed::new`].
pub fn computed<T, F>(f: F) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Computed::new(f)
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed value. `f` does not run until the first read.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let target = TargetId::new();
        let key = Key::from("value");
        let dirty = Rc::new(Cell::new(true));

        let scheduler = Scheduler::new({
            let dirty = Rc::clone(&dirty);
            let key = key.clone();
            move |_: &EffectRef| {
                dirty.set(true);
                store::trigger(target, &key);
            }
        });

        let effect = create_effect(f, EffectOptions::default().lazy().with_scheduler(scheduler));

        Self {
            inner: Rc::new(ComputedInner {
                target,
                key,
                effect,
                cache: RefCell::new(None),
                dirty,
            }),
        }
    }

    /// Get the current value, recomputing first if it is dirty.
    ///
    /// Inside an effect, this also subscribes the effect to future
    /// invalidations of this value.
    ///
    /// Invalidation is delivered like any other subscription. An effect that
    /// subscribed to an input before this computed did is re-run first, and
    /// reads the previous value; it runs again with the fresh value once the
    /// computed is invalidated in the same pass.
    pub fn get(&self) -> T {
        let inner = &self.inner;

        let cached = if inner.dirty.get() {
            None
        } else {
            inner.cache.borrow().clone()
        };

        let value = match cached {
            Some(value) => value,
            None => self.refresh(),
        };

        store::track(inner.target, &inner.key);
        value
    }

    fn refresh(&self) -> T {
        let inner = &self.inner;
        let value = inner.effect.run();
        *inner.cache.borrow_mut() = Some(value.clone());
        inner.dirty.set(false);
        tracing::trace!(target = %inner.target, effect = %inner.effect.id(), "recomputed");
        value
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Identity of the synthetic dependency that readers subscribe to.
    pub fn id(&self) -> TargetId {
        self.inner.target
    }

    /// Number of times the derivation has run.
    pub fn compute_count(&self) -> usize {
        self.inner.effect.run_count()
    }
}

impl<T: Clone + 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id())
            .field("dirty", &self.is_dirty())
            .field("cached", &*self.inner.cache.borrow())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
