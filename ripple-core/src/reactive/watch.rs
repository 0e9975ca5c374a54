//! Watch Implementation
//!
//! A watch observes a source from outside the reactive graph and hands the
//! previous and next value to a callback whenever the source changes.
//!
//! # How Watches Work
//!
//! 1. The source becomes the body of a lazy effect: either a getter, or a
//!    deep traversal that reads every property reachable from a record.
//!
//! 2. At registration the effect runs once to capture the starting value.
//!    With `immediate`, the callback also runs right away, with no previous
//!    value.
//!
//! 3. On every change the effect's scheduler re-runs the getter, runs the
//!    cleanup registered by the previous callback (if any), calls the
//!    callback, and remembers the new value as the next previous value.
//!
//! # Invalidation
//!
//! The callback receives an [`OnInvalidate`] handle. A closure registered
//! there runs right before the *next* callback invocation, which lets an
//! asynchronous callback body notice it has been superseded:
//!
//! ```rust,ignore
//! watch(
//!     WatchSource::getter(move || query.get("id")),
//!     move |id, _, on_invalidate| {
//!         let expired = Rc::new(Cell::new(false));
//!         on_invalidate.register({
//!             let expired = expired.clone();
//!             move || expired.set(true)
//!         });
//!         spawn_local(async move {
//!             let result = fetch(id).await;
//!             if !expired.get() {
//!                 commit(result);
//!             }
//!         });
//!     },
//!     WatchOptions::default(),
//! );
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use super::effect::{create_effect, EffectOptions, WeakEffect};
use super::object::Reactive;
use super::subscriber::{EffectRef, Scheduler, Subscriber};
use super::value::{TargetId, Value};
use crate::config::{ReactiveConfig, TraverseLimits};
use crate::scheduler::queue_job;

type Cleanup = Box<dyn FnOnce()>;
type Callback<T> = Box<dyn Fn(&T, Option<&T>, &OnInvalidate)>;

/// What a watch observes: a getter whose reads are tracked.
pub struct WatchSource<T> {
    getter: Box<dyn Fn() -> T>,
}

impl<T> WatchSource<T> {
    /// Observe the value returned by `f`. Everything `f` reads is tracked.
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self { getter: Box::new(f) }
    }
}

impl WatchSource<Reactive> {
    /// Observe a whole record: every property reachable from it is tracked.
    pub fn deep(source: &Reactive) -> Self {
        Self {
            getter: deep_getter(source.clone()),
        }
    }
}

impl From<Reactive> for WatchSource<Reactive> {
    fn from(source: Reactive) -> Self {
        Self::deep(&source)
    }
}

/// When the callback runs relative to the triggering write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlushMode {
    /// Inside the write's own delivery.
    #[default]
    Sync,
    /// In the next microtask flush, batched with other queued work.
    Post,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Also run the callback once at registration.
    pub immediate: bool,
    pub flush: FlushMode,
}

impl WatchOptions {
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn flush(mut self, flush: FlushMode) -> Self {
        self.flush = flush;
        self
    }
}

/// Registers cleanup to run before the next callback invocation.
pub struct OnInvalidate {
    slot: Rc<RefCell<Option<Cleanup>>>,
}

impl OnInvalidate {
    /// Run `cleanup` before the watch callback is next invoked. Registering
    /// again replaces the previous cleanup.
    pub fn register<F>(&self, cleanup: F)
    where
        F: FnOnce() + 'static,
    {
        *self.slot.borrow_mut() = Some(Box::new(cleanup));
    }
}

impl fmt::Debug for OnInvalidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnInvalidate")
            .field("pending", &self.slot.borrow().is_some())
            .finish()
    }
}

struct WatchState<T: 'static> {
    effect: RefCell<Option<WeakEffect<T>>>,
    old: RefCell<Option<T>>,
    cleanup: Rc<RefCell<Option<Cleanup>>>,
    callback: Callback<T>,
}

impl<T: Clone + 'static> WatchState<T> {
    fn fire(&self) {
        let Some(effect) = self.effect.borrow().as_ref().and_then(WeakEffect::upgrade) else {
            return;
        };

        let new = effect.run();

        let pending = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = pending {
            cleanup();
        }

        let old = self.old.borrow().clone();
        let on_invalidate = OnInvalidate {
            slot: Rc::clone(&self.cleanup),
        };
        (self.callback)(&new, old.as_ref(), &on_invalidate);

        *self.old.borrow_mut() = Some(new);
    }
}

/// Watch `source`, calling `callback(new, old, on_invalidate)` on change.
///
/// `old` is `None` only for the initial call made by an `immediate` watch.
/// The watch lives as long as it has dependencies; there is no explicit
/// teardown.
pub fn watch<T, F>(source: WatchSource<T>, callback: F, options: WatchOptions)
where
    T: Clone + 'static,
    F: Fn(&T, Option<&T>, &OnInvalidate) + 'static,
{
    let getter = source.getter;

    let state = Rc::new(WatchState {
        effect: RefCell::new(None),
        old: RefCell::new(None),
        cleanup: Rc::new(RefCell::new(None)),
        callback: Box::new(callback),
    });

    let scheduler = match options.flush {
        FlushMode::Sync => Scheduler::new({
            let state = Rc::clone(&state);
            move |_: &EffectRef| state.fire()
        }),
        FlushMode::Post => Scheduler::new({
            let state = Rc::clone(&state);
            move |effect: &EffectRef| {
                let state = Rc::clone(&state);
                queue_job(effect.id(), move || state.fire());
            }
        }),
    };

    let effect = create_effect(
        move || getter(),
        EffectOptions::default().lazy().with_scheduler(scheduler),
    );
    *state.effect.borrow_mut() = Some(effect.downgrade());

    tracing::debug!(effect = %effect.id(), immediate = options.immediate, flush = ?options.flush, "registered watch");

    if options.immediate {
        state.fire();
    } else {
        let initial = effect.run();
        *state.old.borrow_mut() = Some(initial);
    }
}

fn deep_getter(root: Reactive) -> Box<dyn Fn() -> Reactive> {
    Box::new(move || {
        let limits = ReactiveConfig::current().traverse;
        Traversal::new(limits).visit(&root, 0);
        root.clone()
    })
}

/// Reads every property reachable from a record so that all of them are
/// tracked. Each record is visited once, so cycles terminate.
struct Traversal {
    limits: TraverseLimits,
    seen: HashSet<TargetId>,
    truncated: bool,
}

impl Traversal {
    fn new(limits: TraverseLimits) -> Self {
        Self {
            limits,
            seen: HashSet::new(),
            truncated: false,
        }
    }

    fn visit(&mut self, node: &Reactive, depth: usize) {
        if !self.seen.insert(node.id()) {
            return;
        }
        if depth > self.limits.max_depth || self.seen.len() > self.limits.max_nodes {
            self.truncate(node, depth);
            return;
        }

        for key in node.keys() {
            if let Value::Object(child) = node.get(key) {
                self.visit(&Reactive::new(&child), depth + 1);
            }
        }
    }

    fn truncate(&mut self, node: &Reactive, depth: usize) {
        if !self.truncated {
            self.truncated = true;
            tracing::warn!(
                target_id = %node.id(),
                depth,
                visited = self.seen.len(),
                max_depth = self.limits.max_depth,
                max_nodes = self.limits.max_nodes,
                "deep watch traversal truncated"
            );
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::object::RawData;
    use crate::scheduler::flush_microtasks;
    use std::cell::Cell;

    type Log = Rc<RefCell<Vec<(i64, Option<i64>)>>>;

    fn recorder() -> (Log, impl Fn(&i64, Option<&i64>, &OnInvalidate)) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, move |new: &i64, old: Option<&i64>, _: &OnInvalidate| {
            sink.borrow_mut().push((*new, old.copied()))
        })
    }

    fn getter(data: &Reactive, key: &'static str) -> WatchSource<i64> {
        let data = data.clone();
        WatchSource::getter(move || data.get(key).as_i64().unwrap_or(0))
    }

    #[test]
    fn callback_receives_new_and_old() {
        let data = Reactive::from_pairs([("count", 1)]);
        let (log, callback) = recorder();

        watch(getter(&data, "count"), callback, WatchOptions::default());
        assert!(log.borrow().is_empty());

        data.set("count", 2);
        data.set("count", 5);
        assert_eq!(*log.borrow(), vec![(2, Some(1)), (5, Some(2))]);
    }

    #[test]
    fn immediate_runs_at_registration() {
        let data = Reactive::from_pairs([("count", 1)]);
        let (log, callback) = recorder();

        watch(getter(&data, "count"), callback, WatchOptions::default().immediate());
        assert_eq!(*log.borrow(), vec![(1, None)]);

        data.set("count", 3);
        assert_eq!(*log.borrow(), vec![(1, None), (3, Some(1))]);
    }

    #[test]
    fn post_flush_coalesces_writes() {
        let data = Reactive::from_pairs([("count", 0)]);
        let (log, callback) = recorder();

        watch(
            getter(&data, "count"),
            callback,
            WatchOptions::default().flush(FlushMode::Post),
        );

        for i in 1..=3 {
            data.set("count", i);
        }
        assert!(log.borrow().is_empty());

        flush_microtasks().unwrap();
        assert_eq!(*log.borrow(), vec![(3, Some(0))]);
    }

    #[test]
    fn cleanup_runs_before_next_callback() {
        let data = Reactive::from_pairs([("count", 0)]);
        let events = Rc::new(RefCell::new(Vec::new()));

        watch(
            getter(&data, "count"),
            {
                let events = events.clone();
                move |new: &i64, _: Option<&i64>, on_invalidate: &OnInvalidate| {
                    events.borrow_mut().push(format!("callback {new}"));
                    let events = events.clone();
                    let new = *new;
                    on_invalidate.register(move || events.borrow_mut().push(format!("cleanup {new}")));
                }
            },
            WatchOptions::default(),
        );

        data.set("count", 1);
        assert_eq!(*events.borrow(), vec!["callback 1"]);

        data.set("count", 2);
        assert_eq!(*events.borrow(), vec!["callback 1", "cleanup 1", "callback 2"]);
    }

    #[test]
    fn deep_source_tracks_nested_properties() {
        let inner = RawData::from_pairs([("leaf", 1)]);
        let root = Reactive::from_pairs([("inner", Value::from(&inner)), ("flat", Value::from(0))]);
        let calls = Rc::new(Cell::new(0));

        watch(
            WatchSource::deep(&root),
            {
                let calls = calls.clone();
                move |new: &Reactive, old: Option<&Reactive>, _: &OnInvalidate| {
                    assert!(old.is_some_and(|old| old.same_target(new)));
                    calls.set(calls.get() + 1);
                }
            },
            WatchOptions::default(),
        );

        Reactive::new(&inner).set("leaf", 2);
        assert_eq!(calls.get(), 1);

        root.set("flat", 1);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn deep_source_tolerates_cycles() {
        let a = RawData::from_pairs([("n", 0)]);
        let b = RawData::from_pairs([("back", Value::from(&a))]);
        a.insert("next", &b);
        let calls = Rc::new(Cell::new(0));

        watch(
            WatchSource::from(Reactive::new(&a)),
            {
                let calls = calls.clone();
                move |_: &Reactive, _: Option<&Reactive>, _: &OnInvalidate| calls.set(calls.get() + 1)
            },
            WatchOptions::default(),
        );

        Reactive::new(&b).set("extra", 1);
        // "extra" did not exist during the traversal, so only tracked keys fire
        assert_eq!(calls.get(), 0);

        Reactive::new(&a).set("n", 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn deep_source_respects_depth_limit() {
        let previous = crate::config::configure(ReactiveConfig {
            traverse: TraverseLimits {
                max_depth: 1,
                ..TraverseLimits::default()
            },
            ..ReactiveConfig::default()
        });

        let level2 = RawData::from_pairs([("v", 0)]);
        let level1 = RawData::from_pairs([("child", Value::from(&level2))]);
        let root = Reactive::from_pairs([("child", Value::from(&level1))]);
        let calls = Rc::new(Cell::new(0));

        watch(
            WatchSource::deep(&root),
            {
                let calls = calls.clone();
                move |_: &Reactive, _: Option<&Reactive>, _: &OnInvalidate| calls.set(calls.get() + 1)
            },
            WatchOptions::default(),
        );

        // Beyond max_depth: not tracked
        Reactive::new(&level2).set("v", 1);
        assert_eq!(calls.get(), 0);

        // Within max_depth: tracked
        Reactive::new(&level1).set("child", Value::from(&level2));
        assert_eq!(calls.get(), 1);

        crate::config::configure(previous);
    }
}
