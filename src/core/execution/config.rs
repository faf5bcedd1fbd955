//! Configuration for simulator execution
//!
//! This module provides the tuning knobs for the step loop and the clock
//! driver.

use serde::{Deserialize, Serialize};

/// Default number of repeated pending snapshots tolerated before `step_all`
/// reports an oscillation. Short circuits are retried, so a few repeats are
/// legitimate.
pub const DEFAULT_OSCILLATION_THRESHOLD: usize = 10;

/// Configuration for simulation execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Repeated pending snapshots that make `step_all` fail with an oscillation
    pub oscillation_threshold: usize,
    /// Default frequency used by `start_clock` when none is given
    pub clock_hertz: u32,
    /// Maximum distinct pending snapshots remembered during one `step_all`
    pub history_limit: usize,
}

impl SimulatorConfig {
    /// Create a new simulator configuration with default values
    pub fn new() -> Self {
        Self {
            oscillation_threshold: DEFAULT_OSCILLATION_THRESHOLD,
            clock_hertz: 1,
            history_limit: 4096,
        }
    }

    /// Set the oscillation threshold
    ///
    /// # Arguments
    /// * `repeats` - Number of repeated snapshots; clamped to at least 1
    pub fn with_oscillation_threshold(mut self, repeats: usize) -> Self {
        self.oscillation_threshold = repeats.max(1);
        self
    }

    /// Set the default clock frequency
    ///
    /// # Arguments
    /// * `hertz` - Full clock cycles per second; clamped to at least 1
    pub fn with_clock_hertz(mut self, hertz: u32) -> Self {
        self.clock_hertz = hertz.max(1);
        self
    }

    /// Set how many distinct pending snapshots one `step_all` remembers
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self::new()
    }
}
