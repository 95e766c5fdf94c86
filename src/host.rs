//! Local host identity: initiator NQNs and Fibre Channel host adapters.

use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{debug, warn};

use initiator_api::{
    error::{InitiatorError, ReportError, ResolutionError},
    model::FcHost,
};
use osutils::{files, path};

/// File holding the NQN(s) of this host.
pub const DEFAULT_INITIATOR_NAME_FILE: &str = "/etc/nvme/hostnqn";

/// sysfs class directory with one `hostN` entry per FC host adapter.
const FC_HOST_CLASS: &str = "/sys/class/fc_host";

/// Reads the initiator NQNs of this host, one per non-empty line.
///
/// Without an explicit `filename` the default host NQN file is read under `root`. An explicit
/// file is used as given.
pub fn get_initiators(
    root: Option<&Path>,
    filename: Option<&Path>,
) -> Result<Vec<String>, InitiatorError> {
    let path = match filename {
        Some(filename) if !filename.as_os_str().is_empty() => filename.to_path_buf(),
        _ => path::root_relative(root, DEFAULT_INITIATOR_NAME_FILE),
    };

    let nqns = files::read_nonempty_lines(&path).structured(ResolutionError::InitiatorNameFile {
        path: path.display().to_string(),
    })?;
    debug!("Read {} initiator NQN(s) from '{}'", nqns.len(), path.display());
    Ok(nqns)
}

fn read_fc_host(dir: &Path) -> Result<FcHost, anyhow::Error> {
    Ok(FcHost {
        node_name: files::read_trimmed(dir.join("node_name"))?,
        port_name: files::read_trimmed(dir.join("port_name"))?,
    })
}

/// Lists the FC host adapters of this host, ordered by adapter name.
pub fn fc_hosts(root: Option<&Path>) -> Result<Vec<FcHost>, InitiatorError> {
    let class = path::root_relative(root, FC_HOST_CLASS);
    let pattern = format!("{}/host*", class.display());

    let dirs = glob::glob(&pattern)
        .context(format!("Invalid FC host pattern '{pattern}'"))
        .and_then(|paths| {
            paths
                .collect::<Result<Vec<PathBuf>, _>>()
                .context(format!("Failed to list '{}'", class.display()))
        })
        .structured(ResolutionError::FcHostInfo)?;

    let hosts = dirs
        .iter()
        .map(|dir| {
            read_fc_host(dir)
                .with_context(|| format!("Failed to read FC host '{}'", dir.display()))
        })
        .collect::<Result<Vec<_>, _>>()
        .structured(ResolutionError::FcHostInfo)?;

    if hosts.is_empty() {
        warn!("No FC host adapters found under '{}'", class.display());
    }
    Ok(hosts)
}
