//! NVMe device and namespace inspection.

use std::collections::BTreeMap;

use log::{debug, trace};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use initiator_api::{
    error::{InitiatorError, ReportError, ResolutionError},
    model::{ControllerData, Device, DeviceNamespace, Namespace, NamespaceData},
};
use osutils::dependencies::DependencyResultExt;

use crate::cli::NvmeCli;

lazy_static::lazy_static! {
    static ref NAMESPACE_ID: Regex = Regex::new(r"namespace-id:\s*(\d+)").unwrap();
    static ref IDENTIFY_NAMESPACE_HEADER: Regex =
        Regex::new(r"^NVME Identify Namespace (\d+)").unwrap();
}

#[derive(Deserialize, Debug, Default)]
struct NvmeListOutput {
    #[serde(rename = "Devices", default)]
    devices: Vec<Value>,
}

#[derive(Deserialize, Debug)]
struct ListedDevice {
    #[serde(rename = "DevicePath")]
    device_path: String,
    #[serde(rename = "NameSpace")]
    namespace: Option<u32>,
}

/// Parses `nvme list -o json` output. Anything that is not a device listing yields no devices.
pub fn parse_device_list(output: &str) -> Vec<Device> {
    let listing: NvmeListOutput = match serde_json::from_str(output) {
        Ok(listing) => listing,
        Err(e) => {
            debug!("No devices parsed from nvme list output: {e}");
            return Vec::new();
        }
    };

    listing
        .devices
        .into_iter()
        .filter_map(|raw| match ListedDevice::deserialize(&raw) {
            Ok(listed) => Some(Device {
                device_path: listed.device_path,
                namespaces: listed.namespace.map(|id| Namespace { id }).into_iter().collect(),
                raw,
            }),
            Err(e) => {
                trace!("Ignoring device entry {raw}: {e}");
                None
            }
        })
        .collect()
}

/// Parses `nvme get-ns-id` output, e.g. `nvme0n1: namespace-id:1`.
pub fn parse_namespace_id(output: &str) -> Option<u32> {
    NAMESPACE_ID
        .captures(output)
        .and_then(|captures| captures.get(1))
        .and_then(|id| id.as_str().parse().ok())
}

/// Parses the `key : value` lines printed by `nvme id-ctrl` and `nvme id-ns`.
fn parse_identify_fields(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter(|line| !line.starts_with("NVME Identify"))
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| {
            (
                key.split_whitespace().collect::<Vec<_>>().join(" "),
                value.trim().to_string(),
            )
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn field(fields: &BTreeMap<String, String>, key: &str) -> Option<String> {
    fields.get(key).filter(|value| !value.is_empty()).cloned()
}

pub fn parse_controller_data(output: &str) -> ControllerData {
    let fields = parse_identify_fields(output);
    ControllerData {
        serial_number: field(&fields, "sn"),
        model_number: field(&fields, "mn"),
        firmware_revision: field(&fields, "fr"),
        subsystem_nqn: field(&fields, "subnqn"),
        controller_id: field(&fields, "cntlid"),
        fields,
    }
}

pub fn parse_namespace_data(output: &str) -> NamespaceData {
    let fields = parse_identify_fields(output);
    NamespaceData {
        namespace_id: output
            .lines()
            .find_map(|line| IDENTIFY_NAMESPACE_HEADER.captures(line.trim()))
            .and_then(|captures| captures.get(1))
            .and_then(|id| id.as_str().parse().ok()),
        nguid: field(&fields, "nguid"),
        eui64: field(&fields, "eui64"),
        size: field(&fields, "nsze"),
        fields,
    }
}

/// Lists all NVMe devices visible on the host.
pub fn list_devices(cli: &NvmeCli) -> Result<Vec<Device>, InitiatorError> {
    let cmd = cli.command(["list", "-o", "json"]);
    let output = cli
        .output_and_check(&cmd)
        .message("Failed to list NVMe devices")?;

    let devices = parse_device_list(&output);
    debug!("Found {} NVMe device(s)", devices.len());
    Ok(devices)
}

/// Resolves the namespace ID of every device, failing if any of them cannot be resolved.
pub fn list_namespace_ids(
    cli: &NvmeCli,
    devices: &[Device],
) -> Result<Vec<DeviceNamespace>, InitiatorError> {
    devices
        .iter()
        .map(|device| -> Result<DeviceNamespace, InitiatorError> {
            let cmd = cli.command(["get-ns-id", device.device_path.as_str()]);
            let output = cli.output_and_check(&cmd).message(format!(
                "Failed to get namespace ID of '{}'",
                device.device_path
            ))?;

            let namespace_id =
                parse_namespace_id(&output).structured(ResolutionError::NamespaceId {
                    device: device.device_path.clone(),
                })?;
            Ok(DeviceNamespace {
                device_path: device.device_path.clone(),
                namespace_id,
            })
        })
        .collect()
}

/// Reads the Identify Controller and Identify Namespace data of a device.
pub fn get_device_data(
    cli: &NvmeCli,
    device_path: &str,
) -> Result<(ControllerData, NamespaceData), InitiatorError> {
    let output = cli
        .output_and_check(&cli.command(["id-ctrl", device_path]))
        .message(format!("Failed to identify controller of '{device_path}'"))?;
    let controller = parse_controller_data(&output);

    let output = cli
        .output_and_check(&cli.command(["id-ns", device_path]))
        .message(format!("Failed to identify namespace of '{device_path}'"))?;
    let namespace = parse_namespace_data(&output);

    Ok((controller, namespace))
}
