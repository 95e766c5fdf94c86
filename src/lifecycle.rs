//! Connection lifecycle: connect, disconnect and namespace rescan.
//!
//! No connection state is tracked here. The state of a target is observed by listing sessions.

use log::info;

use initiator_api::{
    error::{InitiatorError, InvalidInputError, ReportError},
    model::{Target, TransportType},
};
use osutils::dependencies::DependencyResultExt;

use crate::cli::{NvmeCli, EXIT_CODE_ALREADY_CONNECTED, NVME_PORT};

/// Service id to connect to, falling back to the default NVMe/TCP port.
fn service_id(target: &Target) -> &str {
    match target.trsvc_id.as_str() {
        "" | "none" => NVME_PORT,
        trsvcid => trsvcid,
    }
}

fn connect_args(
    target: &Target,
    transport: TransportType,
    duplicate: bool,
) -> Result<Vec<String>, InitiatorError> {
    let mut args = match transport {
        TransportType::Tcp => vec![
            "connect".to_string(),
            "-t".into(),
            "tcp".into(),
            "-n".into(),
            target.target_nqn.clone(),
            "-a".into(),
            target.portal.clone(),
            "-s".into(),
            service_id(target).into(),
        ],
        TransportType::Fc => {
            let host_address = target
                .host_address
                .clone()
                .filter(|address| !address.is_empty())
                .structured(InvalidInputError::MissingHostAddress {
                    nqn: target.target_nqn.clone(),
                })?;
            vec![
                "connect".to_string(),
                "-t".into(),
                "fc".into(),
                "-a".into(),
                target.portal.clone(),
                "-w".into(),
                host_address,
                "-n".into(),
                target.target_nqn.clone(),
            ]
        }
    };
    if duplicate {
        args.push("-D".into());
    }
    Ok(args)
}

/// Connects to `target` over the given transport.
///
/// Connecting to a target that already has a controller is not an error: `nvme connect`
/// reports it with a dedicated exit status which is treated as success.
pub fn connect(
    cli: &NvmeCli,
    target: &Target,
    transport: TransportType,
    duplicate: bool,
) -> Result<(), InitiatorError> {
    let cmd = cli.command(connect_args(target, transport, duplicate)?);
    let context = format!(
        "Failed to connect to '{}' at '{}' over {transport}",
        target.target_nqn, target.portal
    );

    match cli.run(&cmd).message(context.clone())?.check() {
        Ok(()) => {
            info!("Connected to '{}' over {transport}", target.target_nqn);
            Ok(())
        }
        Err(e) if e.exit_code() == Some(EXIT_CODE_ALREADY_CONNECTED) => {
            info!("Connection to '{}' already exists", target.target_nqn);
            Ok(())
        }
        Err(e) => Err(e).message(context),
    }
}

/// Disconnects every controller of the target's subsystem.
pub fn disconnect(cli: &NvmeCli, target: &Target) -> Result<(), InitiatorError> {
    let cmd = cli.command(["disconnect", "-n", target.target_nqn.as_str()]);
    cli.run_and_check(&cmd)
        .message(format!("Failed to disconnect from '{}'", target.target_nqn))?;

    info!("Disconnected from '{}'", target.target_nqn);
    Ok(())
}

/// Asks the controller behind `device` to rescan its namespaces.
pub fn rescan(cli: &NvmeCli, device: &str) -> Result<(), InitiatorError> {
    let cmd = cli.command(["ns-rescan", device]);
    cli.run_and_check(&cmd)
        .message(format!("Failed to rescan '{device}'"))
}
