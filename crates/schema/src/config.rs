use serde::{Deserialize, Serialize};

/// Engine configuration (§4.4.2).
///
/// Validated once at construction time (`Config::validate`) rather than
/// threaded through a global mutable settings module -- callers build one
/// `Config` value and pass it into `Engine::new` alongside a `Store` handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of guesses kept after ranking/pruning.
    pub guess_limit: usize,
    /// Maximum number of probe iterations `analyze()` will run.
    pub max_iterations: usize,
    /// Stop walking an iteration's probe list once this many assets were
    /// found in the index.
    pub min_assets_per_iteration: usize,
    /// Upper bound on probe paths requested per iteration.
    pub max_assets_per_iteration: usize,
    /// Minimum `support` ratio for a result to be considered confident.
    pub min_support: f64,
    /// Minimum absolute top-guess strength for a result to be considered
    /// confident, independent of `min_support`.
    pub min_absolute_support: f64,
    /// Consecutive useless iterations before the loop gives up early.
    pub max_iterations_without_improvement: usize,
    /// Minimum decisiveness gain for an iteration to count as useful.
    pub iteration_min_improvement: f64,
    /// Absolute strength distance below the top guess still kept.
    pub guess_ignore_distance: f64,
    /// Relative (fractional) strength distance below the top guess still
    /// kept.
    pub guess_relative_ignore_distance: f64,
    /// Below this top-guess positive strength, the ignore-distance floor is
    /// disabled entirely (every non-negative guess survives pruning).
    pub guess_ignore_min_positive: f64,
    /// Weight applied to a guess's summed positive IDF strength.
    pub positive_match_weight: f64,
    /// Weight applied to a guess's summed negative IDF strength.
    pub negative_match_weight: f64,
    /// Weight recorded for a failed asset fetch in aggregate denominator
    /// accounting (§3 "Invariants").
    pub failed_asset_weight: f64,
    /// Per-HTTP-request timeout, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            guess_limit: 10,
            max_iterations: 20,
            min_assets_per_iteration: 3,
            max_assets_per_iteration: 10,
            min_support: 0.2,
            min_absolute_support: 10.0,
            max_iterations_without_improvement: 3,
            iteration_min_improvement: 0.01,
            guess_ignore_distance: 5.0,
            guess_relative_ignore_distance: 0.1,
            guess_ignore_min_positive: 1.0,
            positive_match_weight: 1.0,
            negative_match_weight: 0.1,
            failed_asset_weight: 0.5,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{field} must be greater than zero, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} must be greater than zero, got {value}")]
    NotPositiveUsize { field: &'static str, value: usize },
    #[error("min_support must be in [0, 1], got {0}")]
    SupportOutOfRange(f64),
}

impl Config {
    /// Validate configuration invariants (§7 "Invalid configuration").
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` describing the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.guess_limit == 0 {
            return Err(ConfigError::NotPositiveUsize {
                field: "guess_limit",
                value: self.guess_limit,
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::NotPositiveUsize {
                field: "max_iterations",
                value: self.max_iterations,
            });
        }
        if self.max_assets_per_iteration == 0 {
            return Err(ConfigError::NotPositiveUsize {
                field: "max_assets_per_iteration",
                value: self.max_assets_per_iteration,
            });
        }
        if !(0.0..=1.0).contains(&self.min_support) {
            return Err(ConfigError::SupportOutOfRange(self.min_support));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::NotPositiveUsize {
                field: "request_timeout_ms",
                value: self.request_timeout_ms as usize,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_guess_limit() {
        let mut cfg = Config::default();
        cfg.guess_limit = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_support_out_of_range() {
        let mut cfg = Config::default();
        cfg.min_support = 1.5;
        assert!(cfg.validate().is_err());
    }
}
