//! Dependency Store
//!
//! The store is the central registry that connects reactive records to the
//! effects that read them. It maps a target's identity and a property key to
//! a [`Dep`], the ordered set of effects subscribed to that property.
//!
//! # How It Works
//!
//! 1. When a property is read inside an effect, [`track`] adds the effect to
//!    the property's dep and gives the effect a back-link to the dep.
//!
//! 2. Before an effect re-runs, it leaves every dep it belongs to, so that
//!    branches it no longer takes stop notifying it.
//!
//! 3. When a property is written, [`trigger`] delivers to a snapshot of the
//!    dep's members, in subscription order. Each member is handed to its
//!    scheduler if it has one, and run directly otherwise.
//!
//! # Eviction
//!
//! - A dep that loses its last subscriber is removed.
//! - When a record or computed value is dropped, all of its deps are removed.
//!
//! # Thread Safety
//!
//! There is one store per thread. Effects are `Rc`-based, so reactive state
//! cannot leak across threads in the first place. No borrow of the store is
//! held while effect code runs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::subscriber::{EffectId, EffectRef, Subscriber};
use super::value::{Key, TargetId};

/// Unique identifier for a dep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepId(u64);

impl DepId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// The effects subscribed to one (target, key) pair, in subscription order.
pub struct Dep {
    id: DepId,
    target: TargetId,
    key: Key,
    subscribers: RefCell<IndexMap<EffectId, EffectRef>>,
}

impl Dep {
    fn new(target: TargetId, key: Key) -> Self {
        Self {
            id: DepId::new(),
            target,
            key,
            subscribers: RefCell::new(IndexMap::new()),
        }
    }

    pub fn id(&self) -> DepId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }

    /// Remove `effect` from this dep, pruning the dep from the store if it
    /// became empty.
    pub(crate) fn unsubscribe(self: &Rc<Self>, effect: EffectId) {
        let removed = self.subscribers.borrow_mut().shift_remove(&effect);
        if removed.is_some() && self.is_empty() {
            prune(self);
        }
        // `removed` may hold the last strong reference to the effect; it is
        // dropped here, after every borrow has been released.
    }

    fn snapshot(&self, skip: Option<EffectId>) -> SmallVec<[EffectRef; 8]> {
        self.subscribers
            .borrow()
            .iter()
            .filter(|(id, _)| Some(**id) != skip)
            .map(|(_, effect)| Rc::clone(effect))
            .collect()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("target", &self.target)
            .field("key", &self.key)
            .field("subscriber_count", &self.len())
            .finish()
    }
}

/// Per-thread map of target identity -> key -> dep.
#[derive(Default)]
struct DependencyStore {
    targets: HashMap<TargetId, HashMap<Key, Rc<Dep>>>,
}

impl DependencyStore {
    fn dep_entry(&mut self, target: TargetId, key: &Key) -> Rc<Dep> {
        let deps = self.targets.entry(target).or_default();
        match deps.get(key) {
            Some(dep) => Rc::clone(dep),
            None => {
                let dep = Rc::new(Dep::new(target, key.clone()));
                deps.insert(key.clone(), Rc::clone(&dep));
                dep
            }
        }
    }

    fn dep(&self, target: TargetId, key: &Key) -> Option<Rc<Dep>> {
        self.targets.get(&target)?.get(key).cloned()
    }
}

thread_local! {
    static STORE: RefCell<DependencyStore> = RefCell::new(DependencyStore::default());
}

/// Record that the active effect read `key` on `target`.
///
/// Does nothing outside of an effect. Tracking the same pair twice in one run
/// keeps the effect's original position in the dep.
pub fn track(target: TargetId, key: &Key) {
    let Some(effect) = ReactiveContext::current() else {
        return;
    };

    let dep = STORE.with(|store| store.borrow_mut().dep_entry(target, key));

    let inserted = {
        let mut subscribers = dep.subscribers.borrow_mut();
        if subscribers.contains_key(&effect.id()) {
            false
        } else {
            subscribers.insert(effect.id(), Rc::clone(&effect));
            true
        }
    };

    if inserted {
        tracing::trace!(effect = %effect.id(), %target, key = %key, "tracked");
        effect.attach(&dep);
    }
}

/// Notify every effect that read `key` on `target`.
///
/// Delivery iterates a snapshot, so effects that change their subscriptions
/// while re-running neither skip nor duplicate anyone. The currently active
/// effect is never delivered to, which keeps a read-modify-write inside an
/// effect from re-entering that same effect.
pub fn trigger(target: TargetId, key: &Key) {
    let Some(dep) = STORE.with(|store| store.borrow().dep(target, key)) else {
        return;
    };

    let effects = dep.snapshot(ReactiveContext::current_effect());
    if effects.is_empty() {
        return;
    }

    tracing::trace!(%target, key = %key, count = effects.len(), "triggering");

    for effect in effects {
        match effect.scheduler() {
            Some(scheduler) => scheduler.schedule(&effect),
            None => effect.run(),
        }
    }
}

/// Forget every dep registered for `target`.
pub(crate) fn evict(target: TargetId) {
    // Ignore teardown of the thread-local itself.
    let removed = STORE
        .try_with(|store| store.try_borrow_mut().ok()?.targets.remove(&target))
        .ok()
        .flatten();

    if let Some(deps) = removed {
        tracing::debug!(%target, deps = deps.len(), "evicted dependency entries");
        // Subscribers (and whatever they capture) drop here, outside the borrow.
        drop(deps);
    }
}

fn prune(dep: &Rc<Dep>) {
    let removed = STORE
        .try_with(|store| {
            let mut store = store.try_borrow_mut().ok()?;
            let deps = store.targets.get_mut(&dep.target)?;
            // Only prune the dep that is actually registered; a fresh dep
            // may already have replaced it.
            if !deps.get(&dep.key).is_some_and(|current| Rc::ptr_eq(current, dep)) {
                return None;
            }
            let removed = deps.remove(&dep.key);
            if deps.is_empty() {
                store.targets.remove(&dep.target);
            }
            removed
        })
        .ok()
        .flatten();
    drop(removed);
}

/// Number of effects currently subscribed to `key` on `target`.
pub fn subscriber_count(target: TargetId, key: &Key) -> usize {
    STORE.with(|store| store.borrow().dep(target, key).map_or(0, |dep| dep.len()))
}

/// Number of targets that currently have at least one dep.
pub fn tracked_targets() -> usize {
    STORE.with(|store| store.borrow().targets.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::subscriber::{Scheduler, Subscriber};
    use std::cell::Cell;

    struct MockEffect {
        id: EffectId,
        runs: Cell<usize>,
        attached: Cell<usize>,
    }

    impl MockEffect {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                id: EffectId::new(),
                runs: Cell::new(0),
                attached: Cell::new(0),
            })
        }
    }

    impl Subscriber for MockEffect {
        fn id(&self) -> EffectId {
            self.id
        }

        fn run(self: Rc<Self>) {
            self.runs.set(self.runs.get() + 1);
        }

        fn scheduler(&self) -> Option<Scheduler> {
            None
        }

        fn attach(&self, _dep: &Rc<Dep>) {
            self.attached.set(self.attached.get() + 1);
        }

        fn detach_all(&self) {}
    }

    #[test]
    fn track_outside_effect_is_noop() {
        let target = TargetId::new();
        let key = Key::from("a");

        track(target, &key);
        assert_eq!(subscriber_count(target, &key), 0);
    }

    #[test]
    fn track_and_trigger() {
        let target = TargetId::new();
        let key = Key::from("a");
        let effect = MockEffect::new();

        {
            let _ctx = ReactiveContext::enter(effect.clone());
            track(target, &key);
            track(target, &key);
        }

        assert_eq!(subscriber_count(target, &key), 1);
        assert_eq!(effect.attached.get(), 1);

        trigger(target, &key);
        assert_eq!(effect.runs.get(), 1);

        // Other keys are unaffected
        trigger(target, &Key::from("b"));
        assert_eq!(effect.runs.get(), 1);
    }

    #[test]
    fn trigger_skips_active_effect() {
        let target = TargetId::new();
        let key = Key::from("a");
        let effect = MockEffect::new();

        let _ctx = ReactiveContext::enter(effect.clone());
        track(target, &key);
        trigger(target, &key);

        assert_eq!(effect.runs.get(), 0);
    }

    #[test]
    fn unsubscribe_prunes_and_evict_clears() {
        let target = TargetId::new();
        let key = Key::from("a");
        let effect = MockEffect::new();

        {
            let _ctx = ReactiveContext::enter(effect.clone());
            track(target, &key);
            track(target, &Key::from("b"));
        }
        let dep = STORE.with(|store| store.borrow().dep(target, &key)).unwrap();

        dep.unsubscribe(effect.id);
        assert_eq!(subscriber_count(target, &key), 0);
        assert_eq!(subscriber_count(target, &Key::from("b")), 1);

        evict(target);
        assert_eq!(subscriber_count(target, &Key::from("b")), 0);
    }
}
