// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The top-level configuration schema.

use serde::{Deserialize, Serialize};
use serde_valid::Validate;

use crate::supervisor::SupervisorConfig;

/// Root configuration document for a supervisor process.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// This supervisor's own network address (used for `is_local_deployment`
    /// and `get_supervisor_info`).
    pub supervisor_address: String,

    /// Health monitor and routing tunables.
    #[validate]
    pub supervisor: SupervisorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            supervisor_address: "127.0.0.1:9000".to_string(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }
}
