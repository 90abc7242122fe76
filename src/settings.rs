// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

static ENV_PREFIX: &str = "OAUTH_MQTT";

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    pub log_directory: Option<String>,
    /// Overrides whether the token endpoint's certificate is verified. The sample driver skips
    /// verification when this is unset.
    pub insecure_skip_verify: Option<bool>,
    /// PEM bundle of CA certificates trusted for the broker connection. When unset the platform
    /// trust store is used.
    pub trust_store: Option<PathBuf>,
    #[serde(default)]
    pub exit_policy: ExitPolicy,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::with_prefix(ENV_PREFIX))
    }

    pub(crate) fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(environment.try_parsing(true))
            .build()?
            .try_deserialize()
    }
}

/// How outcomes map to process exit statuses.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExitPolicy {
    /// Every path exits 0, including usage errors and broker failures.
    #[default]
    Compatible,
    /// Usage errors exit 2 and runtime failures exit 1.
    Strict,
}

impl ExitPolicy {
    pub fn success(self) -> u8 {
        0
    }

    pub fn usage(self) -> u8 {
        match self {
            ExitPolicy::Compatible => 0,
            ExitPolicy::Strict => 2,
        }
    }

    pub fn failure(self) -> u8 {
        match self {
            ExitPolicy::Compatible => 0,
            ExitPolicy::Strict => 1,
        }
    }
}
