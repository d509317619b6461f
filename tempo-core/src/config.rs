use crate::{DEFAULT_MAX_VUS, DEFAULT_PREALLOCATED_VUS, MAX_TARGET_RATE};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
#[cfg(feature = "serde")]
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::time::Duration;
use thiserror::Error;

/// Arrival-rate scenario parameters.
///
/// Built through the `ConfigurableScenario` methods or deserialized (with the `serde`
/// feature) from an external configuration file. Once a run starts the config is owned by
/// the run and never changes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", cfg_eval::cfg_eval, serde_as)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScenarioConfig {
    pub name: String,
    /// Iterations started per second.
    pub target_rate: Option<f64>,
    #[cfg_attr(feature = "serde", serde_as(as = "Option<DurationSecondsWithFrac<f64>>"))]
    pub duration: Option<Duration>,
    /// VUs constructed before time zero.
    pub preallocated_vus: usize,
    /// Ceiling on concurrently in-flight iterations.
    pub max_vus: usize,
    pub drain: DrainPolicy,
    pub seed: Option<u64>,
}

impl ScenarioConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.target_rate.ok_or(ConfigError::MissingRate)?;
        if !rate.is_finite() || rate <= 0. || rate > MAX_TARGET_RATE {
            return Err(ConfigError::InvalidRate(rate));
        }

        let duration = self.duration.ok_or(ConfigError::MissingDuration)?;
        if duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }

        if self.max_vus == 0 {
            return Err(ConfigError::ZeroMaxVus);
        }

        if self.preallocated_vus > self.max_vus {
            return Err(ConfigError::PreallocatedExceedsMax {
                preallocated: self.preallocated_vus,
                max: self.max_vus,
            });
        }

        Ok(())
    }

    /// Time between two dispatch attempts, `None` until a rate is set.
    pub fn tick_period(&self) -> Option<Duration> {
        self.target_rate
            .filter(|rate| rate.is_finite() && *rate > 0.)
            .map(|rate| Duration::from_nanos((1e9 / rate).round() as u64))
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: "scenario".to_string(),
            target_rate: None,
            duration: None,
            preallocated_vus: DEFAULT_PREALLOCATED_VUS,
            max_vus: DEFAULT_MAX_VUS,
            drain: DrainPolicy::Graceful,
            seed: None,
        }
    }
}

/// What happens to in-flight iterations once the scheduling window closes.
#[cfg_attr(feature = "serde", cfg_eval::cfg_eval, serde_as)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DrainPolicy {
    /// Wait for every in-flight iteration to complete.
    #[default]
    Graceful,
    /// Wait up to the grace period, then cancel whatever is still running.
    Deadline(
        #[cfg_attr(feature = "serde", serde_as(as = "DurationSecondsWithFrac<f64>"))] Duration,
    ),
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("No target rate configured; use `.rate()`")]
    MissingRate,

    #[error("No duration configured; use `.duration()`")]
    MissingDuration,

    #[error("Target rate must be within (0, 1000000] iterations/s, got {0}")]
    InvalidRate(f64),

    #[error("Duration must be greater than zero")]
    ZeroDuration,

    #[error("max_vus must be at least 1")]
    ZeroMaxVus,

    #[error("preallocated_vus ({preallocated}) exceeds max_vus ({max})")]
    PreallocatedExceedsMax { preallocated: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ScenarioConfig {
        ScenarioConfig {
            target_rate: Some(10.),
            duration: Some(Duration::from_secs(1)),
            ..ScenarioConfig::new("valid")
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn requires_rate_and_duration() {
        let mut config = valid();
        config.target_rate = None;
        assert_eq!(config.validate(), Err(ConfigError::MissingRate));

        let mut config = valid();
        config.duration = None;
        assert_eq!(config.validate(), Err(ConfigError::MissingDuration));
    }

    #[test]
    fn rejects_bad_rates() {
        for rate in [0., -1., f64::NAN, f64::INFINITY, MAX_TARGET_RATE * 2.] {
            let mut config = valid();
            config.target_rate = Some(rate);
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidRate(_))
            ));
        }
    }

    #[test]
    fn rejects_inverted_vu_bounds() {
        let mut config = valid();
        config.preallocated_vus = 5;
        config.max_vus = 2;
        assert_eq!(
            config.validate(),
            Err(ConfigError::PreallocatedExceedsMax {
                preallocated: 5,
                max: 2
            })
        );

        config.preallocated_vus = 0;
        config.max_vus = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroMaxVus));
    }

    #[test]
    fn tick_period_is_inverse_rate() {
        assert_eq!(valid().tick_period(), Some(Duration::from_millis(100)));
        let thirds = ScenarioConfig {
            target_rate: Some(3.),
            ..valid()
        };
        assert_eq!(thirds.tick_period(), Some(Duration::from_nanos(333_333_333)));
        assert_eq!(ScenarioConfig::new("none").tick_period(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_fractional_seconds() {
        let config: ScenarioConfig = serde_json::from_str(
            r#"{
                "name": "browse_submit",
                "target_rate": 250.0,
                "duration": 1.5,
                "max_vus": 50,
                "drain": { "Deadline": 2.5 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.duration, Some(Duration::from_millis(1500)));
        assert_eq!(config.drain, DrainPolicy::Deadline(Duration::from_millis(2500)));
        assert_eq!(config.preallocated_vus, DEFAULT_PREALLOCATED_VUS);
        assert_eq!(config.validate(), Ok(()));
    }
}
