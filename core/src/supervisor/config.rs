// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Supervisor configuration: the four health-monitor knobs plus the
//! disable flag, loadable through the same `config`-crate layering
//! ([`crate::config::ConfigLoader`]) used elsewhere in this crate.

use serde::{Deserialize, Serialize};
use serde_valid::Validate;

/// Supervisor-wide tunables, validated and (de)serializable so they can be
/// embedded in a `[supervisor]` table of the crate's top-level config file
/// or overridden via `LLM_TEST_BENCH_SUPERVISOR_SUPERVISOR__*` environment
/// variables.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Seconds between health sweeps.
    #[validate(minimum = 1)]
    pub health_check_interval: u64,
    /// Seconds of staleness before a worker is considered unresponsive on
    /// one sweep.
    #[validate(minimum = 1)]
    pub health_check_timeout: u64,
    /// Consecutive stale sweeps before a worker is evicted.
    #[validate(minimum = 1)]
    pub health_check_failure_threshold: u32,
    /// Seconds an aborted request's replica is blocked from rescheduling.
    #[validate(minimum = 0)]
    pub default_cancel_block_duration: u64,
    /// When `true`, the health monitor loop is never started (used by
    /// tests that want full control over eviction timing).
    pub disable_health_monitor: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            health_check_interval: 30,
            health_check_timeout: 90,
            health_check_failure_threshold: 3,
            default_cancel_block_duration: 120,
            disable_health_monitor: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SupervisorConfig::default();
        assert_eq!(cfg.health_check_interval, 30);
        assert_eq!(cfg.health_check_timeout, 90);
        assert_eq!(cfg.health_check_failure_threshold, 3);
        assert_eq!(cfg.default_cancel_block_duration, 120);
        assert!(!cfg.disable_health_monitor);
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(SupervisorConfig::default().validate().is_ok());
    }
}
