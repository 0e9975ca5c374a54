//! Error types for Ripple.
//!
//! Effect bodies fail by panicking; the runtime unwinds its tracking state and
//! lets the panic continue. Callers that prefer a typed error use
//! [`Effect::try_run`](crate::reactive::Effect::try_run), which converts the
//! panic into [`ReactiveError::EffectPanicked`].

use thiserror::Error;

use crate::reactive::EffectId;

/// Errors surfaced by the reactive runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    #[error("Effect {effect} panicked: {message}")]
    EffectPanicked {
        effect: EffectId,
        message: String,
    },

    #[error("Microtask flush exceeded {limit} tasks; remaining tasks were dropped")]
    MicrotaskOverflow {
        limit: usize,
    },

    #[error("Invalid reactive configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

/// Result type for reactive operations.
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Extract a human readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
