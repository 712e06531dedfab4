use std::{fs, num::NonZeroUsize, path::Path};

use serde::Deserialize;

use crate::{LsvmErr, Result};

/// Default step budget of a training run.
pub const ITER: usize = 5_000_000;

const PROGRESS_INTERVAL: NonZeroUsize = NonZeroUsize::new(10_000).unwrap();

/// Hyperparameters and run bounds of the optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    /// Margin violation weight.
    pub c: f64,
    /// Weight of positive examples relative to negative ones.
    pub j: f64,
    /// Regularization strength of the bias vectors relative to `w`.
    pub lambda: f64,
    /// Step budget, checked at the start of every pass.
    pub iterations: usize,
    /// Seed for the permutation RNG, `None` draws one from the OS.
    pub seed: Option<u64>,
    /// Steps between progress log lines.
    pub progress_interval: NonZeroUsize,
}

impl TrainConfig {
    /// Creates a new `TrainConfig` with the default run bounds.
    ///
    /// # Arguments
    /// * `c` - Margin violation weight.
    /// * `j` - Positive example weight.
    /// * `lambda` - Bias regularization strength.
    pub fn new(c: f64, j: f64, lambda: f64) -> Self {
        Self {
            c,
            j,
            lambda,
            ..Default::default()
        }
    }

    /// Checks the hyperparameters are usable.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("C", self.c), ("J", self.j), ("lambda", self.lambda)] {
            if !value.is_finite() {
                return Err(LsvmErr::InvalidConfig(format!("{name} must be finite, got {value}")));
            }
        }

        Ok(())
    }

    /// Applies every field set in `overrides`.
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(iterations) = overrides.iterations {
            self.iterations = iterations;
        }

        if overrides.seed.is_some() {
            self.seed = overrides.seed;
        }

        if let Some(interval) = overrides.progress_interval {
            self.progress_interval = interval;
        }
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            c: 0.0,
            j: 1.0,
            lambda: 1.0,
            iterations: ITER,
            seed: None,
            progress_interval: PROGRESS_INTERVAL,
        }
    }
}

/// Run bounds that may be overridden from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    pub iterations: Option<usize>,
    pub seed: Option<u64>,
    pub progress_interval: Option<NonZeroUsize>,
}

impl ConfigOverrides {
    /// Parses overrides from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LsvmErr::InvalidConfig(format!("invalid JSON: {e}")))
    }

    /// Reads and parses an overrides file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| LsvmErr::file("config", path, e))?;
        Self::from_json(&content)
    }
}
