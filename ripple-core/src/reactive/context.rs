//! Reactive Context
//!
//! The reactive context tracks which effect is currently running. This
//! enables automatic dependency tracking: when a property is read, we can
//! subscribe the current effect to it.
//!
//! # Implementation
//!
//! We use a thread-local stack of effects. Running an effect pushes it onto
//! the stack; when its body returns, it is popped and the previous top becomes
//! the tracking target again. This supports effects created inside other
//! effects to any depth.
//!
//! The stack is only ever touched through [`ReactiveContext`] guards, so it
//! is restored on every exit path, including a panicking effect body.

use std::cell::RefCell;

use super::subscriber::{EffectId, EffectRef, Subscriber};

thread_local! {
    static EFFECT_STACK: RefCell<Vec<EffectRef>> = RefCell::new(Vec::new());
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub struct ReactiveContext {
    effect_id: EffectId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given effect.
    ///
    /// While this context is active, any property that is read will
    /// subscribe the effect.
    pub(crate) fn enter(effect: EffectRef) -> Self {
        let effect_id = effect.id();
        EFFECT_STACK.with(|stack| stack.borrow_mut().push(effect));
        tracing::trace!(effect = %effect_id, "entered reactive context");

        Self { effect_id }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        EFFECT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the ID of the effect currently tracking reads, if any.
    pub fn current_effect() -> Option<EffectId> {
        EFFECT_STACK.with(|stack| stack.borrow().last().map(|effect| effect.id()))
    }

    /// Number of effects currently executing on this thread.
    pub fn depth() -> usize {
        EFFECT_STACK.with(|stack| stack.borrow().len())
    }

    /// The effect currently tracking reads.
    pub(crate) fn current() -> Option<EffectRef> {
        EFFECT_STACK.with(|stack| stack.borrow().last().cloned())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!(effect = %self.effect_id, "effect panicked; unwinding reactive context");
        }

        // The stack may already be gone during thread teardown.
        let popped = EFFECT_STACK
            .try_with(|stack| stack.borrow_mut().pop())
            .ok()
            .flatten();

        // Verify we're popping the right context.
        if let Some(effect) = popped {
            debug_assert_eq!(
                effect.id(),
                self.effect_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.effect_id,
                effect.id()
            );
        }
    }
}
