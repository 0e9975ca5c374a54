//! Effect Implementation
//!
//! An Effect is a computation that re-runs whenever reactive data it read
//! during its last run is written.
//!
//! # How Effects Work
//!
//! Every run goes through the same four steps:
//!
//! 1. Leave every dep the effect currently belongs to. A branch that is not
//!    taken this time must stop notifying the effect.
//!
//! 2. Push the effect onto the reactive context stack, making it the target
//!    of every tracked read.
//!
//! 3. Invoke the body and keep its result.
//!
//! 4. Pop the context stack, restoring the outer effect (if any). This also
//!    happens when the body panics.
//!
//! # Options
//!
//! - `lazy`: skip the initial run at creation. Computed values and watches
//!   use this to decide exactly when dependencies are first captured.
//! - `scheduler`: route every delivery to this effect through a
//!   [`Scheduler`] instead of running it directly.
//!
//! # Failure
//!
//! A panicking body is logged, the context stack is unwound, and the panic
//! continues to whoever ran the effect: the creating call, a trigger, or a
//! scheduler. Use [`Effect::try_run`] to get a [`ReactiveError`] instead.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::store::{Dep, DepId};
use super::subscriber::{EffectId, EffectRef, Scheduler, Subscriber};
use crate::error::{panic_message, ReactiveError, Result};

/// Configuration of an effect.
#[derive(Debug, Clone, Default)]
pub struct EffectOptions {
    /// Do not run the effect at creation.
    pub lazy: bool,

    /// Deliver changes through this scheduler instead of running directly.
    pub scheduler: Option<Scheduler>,
}

impl EffectOptions {
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}

struct EffectInner<T> {
    id: EffectId,
    body: Box<dyn Fn() -> T>,
    /// Deps this effect belongs to. Weak so that evicted deps just vanish.
    deps: RefCell<IndexMap<DepId, Weak<Dep>>>,
    options: EffectOptions,
    run_count: Cell<usize>,
}

impl<T: 'static> EffectInner<T> {
    fn execute(self: &Rc<Self>) -> T {
        self.detach_all();

        let _ctx = ReactiveContext::enter(Rc::clone(self) as EffectRef);
        tracing::trace!(effect = %self.id, run = self.run_count.get() + 1, "running effect");

        let result = (self.body)();
        self.run_count.set(self.run_count.get() + 1);
        result
    }
}

impl<T: 'static> Subscriber for EffectInner<T> {
    fn id(&self) -> EffectId {
        self.id
    }

    fn run(self: Rc<Self>) {
        self.execute();
    }

    fn scheduler(&self) -> Option<Scheduler> {
        self.options.scheduler.clone()
    }

    fn attach(&self, dep: &Rc<Dep>) {
        self.deps
            .borrow_mut()
            .entry(dep.id())
            .or_insert_with(|| Rc::downgrade(dep));
    }

    fn detach_all(&self) {
        let deps: Vec<Weak<Dep>> = self.deps.borrow_mut().drain(..).map(|(_, dep)| dep).collect();
        for dep in deps.iter().filter_map(Weak::upgrade) {
            dep.unsubscribe(self.id);
        }
    }
}

/// A computation that re-runs when its dependencies change.
///
/// Cloning an Effect clones the handle; all clones share one record.
///
/// # Example
///
/// ```rust,ignore
/// let data = Reactive::from_pairs([("a", 1)]);
///
/// let effect = Effect::new({
///     let data = data.clone();
///     move || println!("a is: {}", data.get("a"))
/// });
///
/// data.set("a", 5);  // Prints: "a is: 5"
/// ```
pub struct Effect<T: 'static> {
    inner: Rc<EffectInner<T>>,
}

/// Create an effect with the given options.
///
/// Unless `options.lazy` is set, the effect runs once before this returns.
pub fn create_effect<T, F>(f: F, options: EffectOptions) -> Effect<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    let lazy = options.lazy;
    let effect = Effect {
        inner: Rc::new(EffectInner {
            id: EffectId::new(),
            body: Box::new(f),
            deps: RefCell::new(IndexMap::new()),
            options,
            run_count: Cell::new(0),
        }),
    };

    if !lazy {
        effect.run();
    }

    effect
}

impl<T: 'static> Effect<T> {
    /// Create an effect and run it immediately to establish its dependencies.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        create_effect(f, EffectOptions::default())
    }

    /// Create an effect without running it.
    pub fn new_lazy<F>(f: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        create_effect(f, EffectOptions::default().lazy())
    }

    /// Run the effect now, re-collecting its dependencies, and return the
    /// body's result.
    pub fn run(&self) -> T {
        self.inner.execute()
    }

    /// Like [`run`](Self::run), but a panicking body is reported as an error.
    pub fn try_run(&self) -> Result<T> {
        panic::catch_unwind(AssertUnwindSafe(|| self.run())).map_err(|payload| {
            ReactiveError::EffectPanicked {
                effect: self.id(),
                message: panic_message(payload.as_ref()),
            }
        })
    }

    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Number of deps the effect currently belongs to.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    /// Leave every dep without running. A later delivery or `run`
    /// subscribes the effect again.
    pub(crate) fn detach(&self) {
        self.inner.detach_all();
    }

    pub fn is_lazy(&self) -> bool {
        self.inner.options.lazy
    }

    /// The type-erased handle the store and schedulers work with.
    pub fn as_subscriber(&self) -> EffectRef {
        Rc::clone(&self.inner) as EffectRef
    }

    pub fn downgrade(&self) -> WeakEffect<T> {
        WeakEffect {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl<T: 'static> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> std::fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("lazy", &self.is_lazy())
            .finish()
    }
}

/// A non-owning handle to an effect.
pub struct WeakEffect<T: 'static> {
    inner: Weak<EffectInner<T>>,
}

impl<T: 'static> WeakEffect<T> {
    pub fn upgrade(&self) -> Option<Effect<T>> {
        self.inner.upgrade().map(|inner| Effect { inner })
    }
}

impl<T: 'static> Clone for WeakEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
