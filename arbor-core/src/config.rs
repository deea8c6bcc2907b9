//! Runtime Configuration
//!
//! Each thread owns one reactive runtime, and each runtime carries a
//! [`RuntimeConfig`]. The defaults are what most hosts want; a host that
//! needs a different array diffing policy calls [`configure`] once before
//! creating stores.
//!
//! The config derives serde so hosts can embed it in their own settings
//! files:
//!
//! ```rust,ignore
//! let config: RuntimeConfig = serde_json::from_str(r#"{ "array_diff": "coarse" }"#)?;
//! arbor_core::configure(config);
//! ```

use serde::{Deserialize, Serialize};

use crate::reactive::with_runtime;

/// How writes that replace or mutate an array are propagated to the
/// materialized element nodes underneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayDiff {
    /// Every array write is diffed element by element, by index.
    #[default]
    Positional,

    /// Only writes made through the array mutators (`push`, `splice`, ...)
    /// are diffed by index. Replacing an array with `set` invalidates the
    /// whole subtree.
    MutatorsOnly,

    /// Array writes always invalidate the whole subtree.
    Coarse,
}

/// Per-thread runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Array diffing policy for structural stores.
    pub array_diff: ArrayDiff,

    /// Number of effect runs within a single flush after which a warning is
    /// logged. The flush keeps going; this only surfaces effect chains that
    /// keep writing to their own sources.
    pub flush_warn_threshold: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            array_diff: ArrayDiff::default(),
            flush_warn_threshold: 10_000,
        }
    }
}

/// Replace the configuration of the current thread's runtime.
pub fn configure(config: RuntimeConfig) {
    tracing::debug!(?config, "runtime reconfigured");
    with_runtime(|rt| rt.config = config);
}

/// Get a copy of the current thread's runtime configuration.
pub fn current_config() -> RuntimeConfig {
    with_runtime(|rt| rt.config.clone())
}
