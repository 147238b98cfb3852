#![forbid(unsafe_code)]

//! Configuration for the batching scheduler and new bindings.
//!
//! Configs are plain values with builder-style setters. With the
//! `policy-config` feature they can also be loaded from TOML or JSON
//! documents; missing fields take their defaults.
//!
//! ```toml
//! default_mode = "batched"
//!
//! [scheduler]
//! starvation_warn_depth = 128
//! ```

use crate::binding::DeliveryMode;

/// Default pending depth at which the scheduler warns about starvation.
pub const DEFAULT_STARVATION_WARN_DEPTH: usize = 64;

/// Scheduler tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "policy-config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct SchedulerConfig {
    /// Pending depth at which a starvation warning is logged.
    ///
    /// The scheduler drains one binding per frame, so a queue this deep
    /// means the last entry waits this many frames. `0` disables the warning.
    pub starvation_warn_depth: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            starvation_warn_depth: DEFAULT_STARVATION_WARN_DEPTH,
        }
    }
}

/// Top-level configuration for a connect context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "policy-config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "policy-config", serde(default))]
pub struct ConnectConfig {
    /// Delivery mode for bindings created without an explicit override.
    pub default_mode: DeliveryMode,
    /// Scheduler tuning.
    pub scheduler: SchedulerConfig,
}

impl ConnectConfig {
    /// Default configuration (synchronous delivery).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default delivery mode.
    #[must_use]
    pub fn with_default_mode(mut self, mode: DeliveryMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Set the starvation warning depth (`0` disables it).
    #[must_use]
    pub fn with_starvation_warn_depth(mut self, depth: usize) -> Self {
        self.scheduler.starvation_warn_depth = depth;
        self
    }
}

#[cfg(feature = "policy-config")]
impl ConnectConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Config`](crate::ConnectError::Config) if the
    /// document is malformed or has fields of the wrong type.
    pub fn from_toml_str(src: &str) -> crate::Result<Self> {
        toml::from_str(src).map_err(|e| crate::ConnectError::Config(e.to_string()))
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Config`](crate::ConnectError::Config) if the
    /// document is malformed or has fields of the wrong type.
    pub fn from_json_str(src: &str) -> crate::Result<Self> {
        serde_json::from_str(src).map_err(|e| crate::ConnectError::Config(e.to_string()))
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Config`](crate::ConnectError::Config) if the
    /// file cannot be read or parsed.
    pub fn load(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)
            .map_err(|e| crate::ConnectError::Config(format!("{}: {e}", path.display())))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&src)
        } else {
            Self::from_toml_str(&src)
        }
    }
}
