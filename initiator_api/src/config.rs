use std::{collections::HashMap, path::PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

/// Runs every nvme command inside `chroot <dir>`, useful for containerized services.
pub const CHROOT_DIRECTORY: &str = "chrootDirectory";

/// Number of TCP targets the mock initiator discovers.
pub const MOCK_NUMBER_OF_TCP_TARGETS: &str = "mockNumberOfTCPTargets";

/// Number of Fibre Channel targets the mock initiator discovers.
pub const MOCK_NUMBER_OF_FC_TARGETS: &str = "mockNumberOfFCTargets";

/// Number of initiator NQNs the mock initiator reports.
pub const MOCK_NUMBER_OF_INITIATORS: &str = "mockNumberOfInitiators";

/// Number of namespace devices the mock initiator lists.
pub const MOCK_NUMBER_OF_NAMESPACE_DEVICES: &str = "mockNumberOfNamespaceDevices";

/// Cardinality used when an option is absent, zero or not a number.
pub const DEFAULT_MOCK_COUNT: usize = 1;

/// Configuration shared by the real and the mock initiator.
///
/// Unknown keys are ignored, both by [`InitiatorConfig::from_options`] and when deserializing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InitiatorConfig {
    #[serde(rename = "chrootDirectory", default)]
    pub chroot_directory: Option<PathBuf>,

    #[serde(rename = "mockNumberOfTCPTargets", default = "default_count")]
    pub mock_tcp_targets: usize,

    #[serde(rename = "mockNumberOfFCTargets", default = "default_count")]
    pub mock_fc_targets: usize,

    #[serde(rename = "mockNumberOfInitiators", default = "default_count")]
    pub mock_initiators: usize,

    #[serde(rename = "mockNumberOfNamespaceDevices", default = "default_count")]
    pub mock_namespace_devices: usize,
}

fn default_count() -> usize {
    DEFAULT_MOCK_COUNT
}

impl Default for InitiatorConfig {
    fn default() -> Self {
        Self {
            chroot_directory: None,
            mock_tcp_targets: DEFAULT_MOCK_COUNT,
            mock_fc_targets: DEFAULT_MOCK_COUNT,
            mock_initiators: DEFAULT_MOCK_COUNT,
            mock_namespace_devices: DEFAULT_MOCK_COUNT,
        }
    }
}

impl InitiatorConfig {
    /// Builds the configuration from a string option map.
    pub fn from_options(options: &HashMap<String, String>) -> Self {
        let chroot_directory = options
            .get(CHROOT_DIRECTORY)
            .map(|dir| dir.trim())
            .filter(|dir| !dir.is_empty() && *dir != "/")
            .map(PathBuf::from);

        Self {
            chroot_directory,
            mock_tcp_targets: count_option(options, MOCK_NUMBER_OF_TCP_TARGETS),
            mock_fc_targets: count_option(options, MOCK_NUMBER_OF_FC_TARGETS),
            mock_initiators: count_option(options, MOCK_NUMBER_OF_INITIATORS),
            mock_namespace_devices: count_option(options, MOCK_NUMBER_OF_NAMESPACE_DEVICES),
        }
    }

    /// Root all commands and host files are resolved against.
    pub fn root(&self) -> Option<&PathBuf> {
        self.chroot_directory.as_ref()
    }
}

fn count_option(options: &HashMap<String, String>, key: &str) -> usize {
    match options.get(key).map(|v| v.trim().parse::<usize>()) {
        None => DEFAULT_MOCK_COUNT,
        Some(Ok(0)) => DEFAULT_MOCK_COUNT,
        Some(Ok(count)) => count,
        Some(Err(e)) => {
            warn!("Ignoring option '{key}': {e}");
            DEFAULT_MOCK_COUNT
        }
    }
}
