//! Runtime Configuration
//!
//! Limits that keep the runtime well-behaved on caller-supplied data. The
//! configuration is per thread, like the rest of the reactive state, and can
//! be loaded from JSON so host applications can keep it next to their own
//! settings.
//!
//! ```rust,ignore
//! let config = ReactiveConfig::from_json(r#"{ "traverse": { "max_depth": 8 } }"#)?;
//! ripple_core::configure(config);
//! ```

use std::cell::RefCell;

use serde::Deserialize;

use crate::error::Result;

/// Bounds applied when a whole object is watched and has to be traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TraverseLimits {
    /// Maximum nesting depth that is descended into.
    pub max_depth: usize,
    /// Maximum number of distinct objects visited per traversal.
    pub max_nodes: usize,
}

impl Default for TraverseLimits {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_nodes: 10_000,
        }
    }
}

/// Configuration of the reactive runtime on the current thread.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReactiveConfig {
    /// Limits for deep traversal performed by whole-object watches.
    pub traverse: TraverseLimits,

    /// Upper bound on microtasks run by a single flush. Guards against
    /// effects that keep re-queueing each other forever.
    pub max_microtasks_per_flush: usize,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            traverse: TraverseLimits::default(),
            max_microtasks_per_flush: 100_000,
        }
    }
}

thread_local! {
    static CONFIG: RefCell<ReactiveConfig> = RefCell::new(ReactiveConfig::default());
}

impl ReactiveConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The configuration currently installed on this thread.
    pub fn current() -> Self {
        CONFIG.with(|config| config.borrow().clone())
    }
}

/// Install `config` for the current thread, returning the previous one.
pub fn configure(config: ReactiveConfig) -> ReactiveConfig {
    tracing::debug!(?config, "installing reactive configuration");
    CONFIG.with(|current| current.replace(config))
}
