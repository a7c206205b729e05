// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Timeouts and the timeout policy.
//!
//! `Timeout` is the caller-facing value. It converts to the two native
//! encodings (`Msecs` with `-1` for forever, and `Deadline`) and nothing
//! else happens on conversion.
//!
//! The policy is a process-wide audit: when enabled, a timeout outside
//! `[warn_below, warn_above]` is logged and handed to `on_violation`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{const_rwlock, RwLock};
use tandem_native::{Deadline, Msecs, FOREVER};

/// How long a blocking call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    #[default]
    Forever,
    After(Duration),
}

impl Timeout {
    /// Don't wait at all.
    pub const NON_BLOCKING: Timeout = Timeout::After(Duration::ZERO);

    /// Fractional seconds. Negative, NaN and infinite mean forever.
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs < 0.0 {
            return Timeout::Forever;
        }
        Duration::try_from_secs_f64(secs)
            .map(Timeout::After)
            .unwrap_or(Timeout::Forever)
    }

    pub fn is_forever(&self) -> bool {
        matches!(self, Timeout::Forever)
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Timeout::After(d) if d.is_zero())
    }

    /// Native millisecond encoding. Sub-millisecond parts are dropped.
    pub fn as_msecs(&self) -> Msecs {
        match self {
            Timeout::Forever => FOREVER,
            Timeout::After(d) => Msecs::try_from(d.as_millis()).unwrap_or(Msecs::MAX),
        }
    }

    /// Native deadline, anchored now.
    pub fn deadline(&self) -> Deadline {
        match self {
            Timeout::Forever => Deadline::Forever,
            Timeout::After(d) => Deadline::after(*d),
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Timeout::Forever => None,
            Timeout::After(d) => Some(*d),
        }
    }
}

impl From<f64> for Timeout {
    fn from(secs: f64) -> Self {
        Timeout::from_secs_f64(secs)
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Timeout::After(d)
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeout::Forever => f.write_str("forever"),
            Timeout::After(d) => write!(f, "{:.3}s", d.as_secs_f64()),
        }
    }
}

pub type ViolationFn = Arc<dyn Fn(&Timeout) + Send + Sync>;

#[derive(Clone)]
pub struct TimeoutPolicy {
    pub enabled: bool,
    pub warn_below: Duration,
    pub warn_above: Duration,
    pub on_violation: Option<ViolationFn>,
}

impl TimeoutPolicy {
    pub const DISABLED: TimeoutPolicy = TimeoutPolicy {
        enabled: false,
        warn_below: Duration::from_millis(100),
        warn_above: Duration::from_secs(10),
        on_violation: None,
    };

    fn violated_by(&self, d: Duration) -> bool {
        d < self.warn_below || d > self.warn_above
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::DISABLED
    }
}

impl fmt::Debug for TimeoutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutPolicy")
            .field("enabled", &self.enabled)
            .field("warn_below", &self.warn_below)
            .field("warn_above", &self.warn_above)
            .field("on_violation", &self.on_violation.is_some())
            .finish()
    }
}

static POLICY: RwLock<TimeoutPolicy> = const_rwlock(TimeoutPolicy::DISABLED);

/// Install `policy`, returning the previous one.
pub fn set_policy(policy: TimeoutPolicy) -> TimeoutPolicy {
    std::mem::replace(&mut *POLICY.write(), policy)
}

pub fn policy() -> TimeoutPolicy {
    POLICY.read().clone()
}

pub fn reset_policy() {
    set_policy(TimeoutPolicy::DISABLED);
}

/// Check `timeout` against the policy. Returns `true` if it was reported.
/// `Forever` and zero are never reported.
pub fn audit(timeout: &Timeout) -> bool {
    let d = match timeout {
        Timeout::After(d) if !d.is_zero() => *d,
        _ => return false,
    };
    let callback = {
        let p = POLICY.read();
        if !p.enabled || !p.violated_by(d) {
            return false;
        }
        tracing::warn!(
            timeout_secs = d.as_secs_f64(),
            warn_below_secs = p.warn_below.as_secs_f64(),
            warn_above_secs = p.warn_above.as_secs_f64(),
            "timeout outside policy range"
        );
        p.on_violation.clone()
    };
    if let Some(f) = callback {
        f(timeout);
    }
    true
}

/// Pick the effective timeout for a call and audit it.
pub(crate) fn resolve(timeout: Option<Timeout>, default: Timeout) -> Timeout {
    let t = timeout.unwrap_or(default);
    audit(&t);
    t
}

/// Serializes tests that touch the process-wide policy.
#[cfg(test)]
pub(crate) static POLICY_TEST_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());
