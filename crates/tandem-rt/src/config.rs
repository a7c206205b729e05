// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Runtime configuration.
//!
//! JSON (all fields optional) or environment:
//!
//! | Variable | Field |
//! |---|---|
//! | `TANDEM_CONFIG` | path of a JSON file read first |
//! | `TANDEM_POOL_MAX_THREADS` | `pool_max_threads` |
//! | `TANDEM_TIMEOUT_WARN_BELOW` | `timeout_policy.warn_below_secs`, enables the policy |
//! | `TANDEM_TIMEOUT_WARN_ABOVE` | `timeout_policy.warn_above_secs`, enables the policy |
//! | `TANDEM_DEBUG_TIMERS` | `debug_timers` |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_native::{NativeThreadPool, ThreadPool};

use crate::bridge::timer;
use crate::error::{Error, Result};
use crate::timeout::{self, TimeoutPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub enabled: bool,
    pub warn_below_secs: f64,
    pub warn_above_secs: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            warn_below_secs: 0.1,
            warn_above_secs: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Global pool size. 0 leaves the default (one worker per core).
    pub pool_max_threads: usize,
    pub timeout_policy: PolicyConfig,
    pub debug_timers: bool,
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var("TANDEM_CONFIG") {
            Ok(path) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| Error::Config(format!("{}: {}", path, e)))?;
                Self::from_json(&text)?
            }
            Err(_) => Self::default(),
        };

        if let Some(n) = env_parse::<usize>("TANDEM_POOL_MAX_THREADS")? {
            config.pool_max_threads = n;
        }
        if let Some(secs) = env_parse::<f64>("TANDEM_TIMEOUT_WARN_BELOW")? {
            config.timeout_policy.warn_below_secs = secs;
            config.timeout_policy.enabled = true;
        }
        if let Some(secs) = env_parse::<f64>("TANDEM_TIMEOUT_WARN_ABOVE")? {
            config.timeout_policy.warn_above_secs = secs;
            config.timeout_policy.enabled = true;
        }
        if let Ok(v) = std::env::var("TANDEM_DEBUG_TIMERS") {
            config.debug_timers = matches!(v.trim(), "1" | "true" | "yes" | "on");
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let p = &self.timeout_policy;
        secs_field("warn_below_secs", p.warn_below_secs)?;
        secs_field("warn_above_secs", p.warn_above_secs)?;
        if p.warn_below_secs > p.warn_above_secs {
            return Err(Error::Config(
                "warn_below_secs is greater than warn_above_secs".to_string(),
            ));
        }
        Ok(())
    }

    /// Install the timeout policy, timer debug default and pool size.
    /// Any violation callback already installed is kept. Nothing is
    /// installed if the configuration is invalid.
    pub fn apply(&self) -> Result<()> {
        self.validate()?;
        let warn_below = secs_field("warn_below_secs", self.timeout_policy.warn_below_secs)?;
        let warn_above = secs_field("warn_above_secs", self.timeout_policy.warn_above_secs)?;
        let current = timeout::policy();
        timeout::set_policy(TimeoutPolicy {
            enabled: self.timeout_policy.enabled,
            warn_below,
            warn_above,
            on_violation: current.on_violation,
        });
        timer::set_default_debug(self.debug_timers);
        if self.pool_max_threads > 0 {
            ThreadPool::global().set_max_thread_count(self.pool_max_threads);
        }
        tracing::debug!(
            pool_max_threads = self.pool_max_threads,
            policy_enabled = self.timeout_policy.enabled,
            debug_timers = self.debug_timers,
            "configuration applied"
        );
        Ok(())
    }
}

/// A threshold in seconds, as a `Duration`.
fn secs_field(name: &str, secs: f64) -> Result<Duration> {
    if secs < 0.0 {
        return Err(Error::Config(format!("{} must not be negative, got {}", name, secs)));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::Config(format!("{} = {}: {}", name, secs, e)))
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}={:?}: {}", name, v, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_default() {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn partial_json() {
        let c = Config::from_json(r#"{"pool_max_threads": 3, "timeout_policy": {"enabled": true}}"#)
            .unwrap();
        assert_eq!(c.pool_max_threads, 3);
        assert!(c.timeout_policy.enabled);
        assert_eq!(c.timeout_policy.warn_above_secs, 10.0);
    }

    #[test]
    fn rejects_inverted_range() {
        let err = Config::from_json(
            r#"{"timeout_policy": {"warn_below_secs": 5.0, "warn_above_secs": 1.0}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(matches!(Config::from_json("not json"), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_thresholds_out_of_duration_range() {
        let err = Config::from_json(r#"{"timeout_policy": {"warn_above_secs": 1e30}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(Config::from_json(r#"{"timeout_policy": {"warn_below_secs": -0.5}}"#).is_err());
    }

    #[test]
    fn apply_refuses_hand_built_invalid_config() {
        let _serial = timeout::POLICY_TEST_LOCK.lock();
        let before = timeout::policy();
        let mut c = Config::default();
        c.timeout_policy.enabled = true;
        c.timeout_policy.warn_above_secs = 1e30;
        assert!(matches!(c.apply(), Err(Error::Config(_))));
        c.timeout_policy.warn_above_secs = f64::NAN;
        assert!(matches!(c.apply(), Err(Error::Config(_))));
        let after = timeout::policy();
        assert_eq!(after.enabled, before.enabled);
        assert_eq!(after.warn_above, before.warn_above);
    }

    #[test]
    fn json_roundtrip() {
        let c = Config {
            debug_timers: true,
            ..Config::default()
        };
        assert_eq!(Config::from_json(&c.to_json().unwrap()).unwrap(), c);
    }

    #[test]
    fn environment_overrides() {
        std::env::set_var("TANDEM_POOL_MAX_THREADS", "6");
        std::env::set_var("TANDEM_TIMEOUT_WARN_ABOVE", "30");
        std::env::set_var("TANDEM_DEBUG_TIMERS", "true");
        let c = Config::from_env();
        std::env::remove_var("TANDEM_POOL_MAX_THREADS");
        std::env::remove_var("TANDEM_TIMEOUT_WARN_ABOVE");
        std::env::remove_var("TANDEM_DEBUG_TIMERS");

        let c = c.unwrap();
        assert_eq!(c.pool_max_threads, 6);
        assert!(c.timeout_policy.enabled);
        assert_eq!(c.timeout_policy.warn_above_secs, 30.0);
        assert!(c.debug_timers);
    }

    #[test]
    fn apply_installs_policy() {
        let _serial = timeout::POLICY_TEST_LOCK.lock();
        let previous = timeout::policy();
        let c = Config::from_json(
            r#"{"timeout_policy": {"enabled": true, "warn_below_secs": 0.5, "warn_above_secs": 2.0}}"#,
        )
        .unwrap();
        c.apply().unwrap();
        let p = timeout::policy();
        assert!(p.enabled);
        assert_eq!(p.warn_below, Duration::from_millis(500));
        assert_eq!(p.warn_above, Duration::from_secs(2));
        timeout::set_policy(previous);
        timer::set_default_debug(false);
    }
}
