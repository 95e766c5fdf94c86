//! In-memory initiator for exercising callers without fabric hardware.
//!
//! [`MockNvmeInitiator`] never spawns a process or reads a file. Every operation first checks
//! its fault switch in a [`FaultInjection`] handle and then synthesizes a deterministic result
//! sized by the configured cardinalities.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use log::{debug, info};
use serde_json::json;
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, IntoStaticStr};

use initiator_api::{
    config::InitiatorConfig,
    error::{InducedError, InitiatorError},
    model::{
        ControllerData, Device, DeviceNamespace, Namespace, NamespaceData, Session, SessionState,
        Target, TransportName, TransportType,
    },
};

use crate::{cli::NVME_PORT, initiator::Initiator};

/// Subsystem NQN prefix of synthesized targets.
pub const MOCK_TARGET_NQN_PREFIX: &str = "nqn.1988-11.com.dell.mock:00:e6e2d5b871f1403E169D";

/// Host NQN prefix of synthesized initiators.
pub const MOCK_INITIATOR_NQN_PREFIX: &str = "nqn.2014-08.org.nvmexpress:uuid:mock-initiator-";

/// Host adapter address attached to synthesized FC targets.
pub const MOCK_FC_HOST_ADDRESS: &str = "nn-0x20000090fae0b5f5:pn-0x10000090fae0b5f5";

/// Operation families that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Fault {
    Discovery,
    Initiator,
    TcpLogin,
    FcLogin,
    Logout,
    GetSessions,
    DeviceAndNamespace,
    NamespaceId,
    DeviceData,
}

impl Fault {
    fn error(self) -> InducedError {
        match self {
            Fault::Discovery => InducedError::Discovery,
            Fault::Initiator => InducedError::Initiator,
            Fault::TcpLogin => InducedError::TcpLogin,
            Fault::FcLogin => InducedError::FcLogin,
            Fault::Logout => InducedError::Logout,
            Fault::GetSessions => InducedError::GetSessions,
            Fault::DeviceAndNamespace => InducedError::DeviceAndNamespace,
            Fault::NamespaceId => InducedError::NamespaceId,
            Fault::DeviceData => InducedError::DeviceData,
        }
    }
}

/// Synthesized record counts that can be overridden at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Cardinality {
    TcpTargets,
    FcTargets,
    Initiators,
    NamespaceDevices,
}

#[derive(Debug)]
struct FaultState {
    switches: Vec<AtomicBool>,
    /// Zero means "not overridden".
    counts: Vec<AtomicUsize>,
}

impl Default for FaultState {
    fn default() -> Self {
        Self {
            switches: Fault::iter().map(|_| AtomicBool::new(false)).collect(),
            counts: Cardinality::iter().map(|_| AtomicUsize::new(0)).collect(),
        }
    }
}

/// Shared fault switches and cardinality overrides.
///
/// Clones share state. Every mock built with [`MockNvmeInitiator::new`] uses the process-wide
/// [`FaultInjection::global`] handle, so flipping a switch there affects all of them. Tests
/// that run in parallel should give their mocks a private handle through
/// [`MockNvmeInitiator::with_faults`].
#[derive(Debug, Clone, Default)]
pub struct FaultInjection {
    state: Arc<FaultState>,
}

lazy_static::lazy_static! {
    static ref GLOBAL_FAULTS: FaultInjection = FaultInjection::new();
}

impl FaultInjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// The handle shared by every mock that was not given its own.
    pub fn global() -> Self {
        GLOBAL_FAULTS.clone()
    }

    pub fn set(&self, fault: Fault, enabled: bool) {
        debug!(
            "Mock fault '{}' {}",
            <&str>::from(fault),
            if enabled { "induced" } else { "cleared" }
        );
        self.state.switches[fault as usize].store(enabled, Ordering::SeqCst);
    }

    pub fn induce(&self, fault: Fault) {
        self.set(fault, true);
    }

    pub fn clear(&self, fault: Fault) {
        self.set(fault, false);
    }

    pub fn is_set(&self, fault: Fault) -> bool {
        self.state.switches[fault as usize].load(Ordering::SeqCst)
    }

    /// Overrides a configured cardinality. A count of zero removes the override.
    pub fn set_count(&self, cardinality: Cardinality, count: usize) {
        self.state.counts[cardinality as usize].store(count, Ordering::SeqCst);
    }

    pub fn count(&self, cardinality: Cardinality) -> Option<usize> {
        match self.state.counts[cardinality as usize].load(Ordering::SeqCst) {
            0 => None,
            count => Some(count),
        }
    }

    /// Clears every switch and override.
    pub fn reset(&self) {
        self.state
            .switches
            .iter()
            .for_each(|switch| switch.store(false, Ordering::SeqCst));
        self.state
            .counts
            .iter()
            .for_each(|count| count.store(0, Ordering::SeqCst));
    }

    fn check(&self, fault: Fault) -> Result<(), InitiatorError> {
        if self.is_set(fault) {
            return Err(InitiatorError::new(fault.error()));
        }
        Ok(())
    }
}

/// Initiator that synthesizes its results.
#[derive(Debug, Clone)]
pub struct MockNvmeInitiator {
    config: InitiatorConfig,
    faults: FaultInjection,
}

impl MockNvmeInitiator {
    /// Creates a mock using the process-wide fault injection state.
    pub fn new(options: &HashMap<String, String>) -> Self {
        Self::with_faults(options, FaultInjection::global())
    }

    pub fn with_faults(options: &HashMap<String, String>, faults: FaultInjection) -> Self {
        Self {
            config: InitiatorConfig::from_options(options),
            faults,
        }
    }

    pub fn faults(&self) -> &FaultInjection {
        &self.faults
    }

    fn count(&self, cardinality: Cardinality) -> usize {
        self.faults.count(cardinality).unwrap_or(match cardinality {
            Cardinality::TcpTargets => self.config.mock_tcp_targets,
            Cardinality::FcTargets => self.config.mock_fc_targets,
            Cardinality::Initiators => self.config.mock_initiators,
            Cardinality::NamespaceDevices => self.config.mock_namespace_devices,
        })
    }

    fn tcp_targets(&self) -> Vec<Target> {
        (0..self.count(Cardinality::TcpTargets))
            .map(|i| Target {
                portal: format!("10.230.1.{}", i + 1),
                target_nqn: format!("{MOCK_TARGET_NQN_PREFIX}{i:05}"),
                tr_type: TransportType::Tcp.to_string(),
                adr_fam: "ipv4".into(),
                sub_type: "nvme subsystem".into(),
                treq: "not specified".into(),
                port_id: (2304 + i).to_string(),
                trsvc_id: NVME_PORT.into(),
                sec_type: "none".into(),
                target_type: TransportType::Tcp.to_string(),
                host_address: None,
            })
            .collect()
    }

    fn fc_targets(&self) -> Vec<Target> {
        (0..self.count(Cardinality::FcTargets))
            .map(|i| Target {
                portal: format!("nn-0x58ccf090c9200c{i:02x}:pn-0x58ccf091492b0c{i:02x}"),
                target_nqn: format!("{MOCK_TARGET_NQN_PREFIX}{i:05}"),
                tr_type: TransportType::Fc.to_string(),
                adr_fam: "fibre-channel".into(),
                sub_type: "nvme subsystem".into(),
                treq: "not specified".into(),
                port_id: i.to_string(),
                trsvc_id: "none".into(),
                sec_type: String::new(),
                target_type: TransportType::Fc.to_string(),
                host_address: Some(MOCK_FC_HOST_ADDRESS.into()),
            })
            .collect()
    }

    fn device_path(index: usize) -> String {
        format!("/dev/nvme{index}n1")
    }
}

impl Initiator for MockNvmeInitiator {
    fn discover_tcp_targets(
        &self,
        address: &str,
        login: bool,
    ) -> Result<Vec<Target>, InitiatorError> {
        self.faults.check(Fault::Discovery)?;
        let targets = self.tcp_targets();
        debug!("Mock discovered {} NVMe/TCP target(s) at '{address}'", targets.len());
        if login {
            for target in &targets {
                self.tcp_connect(target, false)?;
            }
        }
        Ok(targets)
    }

    fn discover_fc_targets(
        &self,
        address: &str,
        login: bool,
    ) -> Result<Vec<Target>, InitiatorError> {
        self.faults.check(Fault::Discovery)?;
        let targets = self.fc_targets();
        debug!("Mock discovered {} NVMe/FC target(s) at '{address}'", targets.len());
        if login {
            for target in &targets {
                self.fc_connect(target, false)?;
            }
        }
        Ok(targets)
    }

    fn get_initiators(&self, _filename: Option<&Path>) -> Result<Vec<String>, InitiatorError> {
        self.faults.check(Fault::Initiator)?;
        Ok((0..self.count(Cardinality::Initiators))
            .map(|i| format!("{MOCK_INITIATOR_NQN_PREFIX}{i:05}"))
            .collect())
    }

    fn tcp_connect(&self, target: &Target, _duplicate: bool) -> Result<(), InitiatorError> {
        self.faults.check(Fault::TcpLogin)?;
        info!("Mock connected to '{}' over tcp", target.target_nqn);
        Ok(())
    }

    fn fc_connect(&self, target: &Target, _duplicate: bool) -> Result<(), InitiatorError> {
        self.faults.check(Fault::FcLogin)?;
        info!("Mock connected to '{}' over fc", target.target_nqn);
        Ok(())
    }

    fn disconnect(&self, target: &Target) -> Result<(), InitiatorError> {
        self.faults.check(Fault::Logout)?;
        info!("Mock disconnected from '{}'", target.target_nqn);
        Ok(())
    }

    fn get_sessions(&self) -> Result<Vec<Session>, InitiatorError> {
        self.faults.check(Fault::GetSessions)?;
        Ok(self
            .tcp_targets()
            .into_iter()
            .map(|target| Session {
                portal: format!("{}:{}", target.portal, target.trsvc_id),
                target: target.target_nqn,
                state: SessionState::Live,
                transport: TransportName::Tcp,
            })
            .collect())
    }

    fn device_rescan(&self, device: &str) -> Result<(), InitiatorError> {
        // Rescan shares the session switch.
        self.faults.check(Fault::GetSessions)?;
        debug!("Mock rescanned '{device}'");
        Ok(())
    }

    fn list_devices_and_namespaces(&self) -> Result<Vec<Device>, InitiatorError> {
        self.faults.check(Fault::DeviceAndNamespace)?;
        Ok((0..self.count(Cardinality::NamespaceDevices))
            .map(|i| {
                let device_path = Self::device_path(i);
                Device {
                    raw: json!({
                        "NameSpace": 1,
                        "DevicePath": device_path,
                        "Index": i,
                        "ModelNumber": "Mock NVMe Controller",
                        "SerialNumber": format!("MOCK{i:08}"),
                    }),
                    device_path,
                    namespaces: vec![Namespace { id: 1 }],
                }
            })
            .collect())
    }

    fn list_namespace_ids(
        &self,
        devices: &[Device],
    ) -> Result<Vec<DeviceNamespace>, InitiatorError> {
        self.faults.check(Fault::NamespaceId)?;
        Ok(devices
            .iter()
            .map(|device| DeviceNamespace {
                device_path: device.device_path.clone(),
                namespace_id: device.namespaces.first().map_or(1, |namespace| namespace.id),
            })
            .collect())
    }

    fn get_device_data(
        &self,
        device_path: &str,
    ) -> Result<(ControllerData, NamespaceData), InitiatorError> {
        self.faults.check(Fault::DeviceData)?;
        let controller_fields = BTreeMap::from([
            ("sn".to_string(), "MOCK00000000".to_string()),
            ("mn".to_string(), "Mock NVMe Controller".to_string()),
            ("fr".to_string(), "1.0".to_string()),
            ("subnqn".to_string(), format!("{MOCK_TARGET_NQN_PREFIX}00000")),
            ("cntlid".to_string(), "0x1".to_string()),
        ]);
        let namespace_fields = BTreeMap::from([
            ("nsze".to_string(), "0x200000".to_string()),
            ("nguid".to_string(), "00000000000000000000000000000001".to_string()),
            ("eui64".to_string(), "0000000000000001".to_string()),
        ]);
        debug!("Mock identified '{device_path}'");

        Ok((
            ControllerData {
                serial_number: controller_fields.get("sn").cloned(),
                model_number: controller_fields.get("mn").cloned(),
                firmware_revision: controller_fields.get("fr").cloned(),
                subsystem_nqn: controller_fields.get("subnqn").cloned(),
                controller_id: controller_fields.get("cntlid").cloned(),
                fields: controller_fields,
            },
            NamespaceData {
                namespace_id: Some(1),
                nguid: namespace_fields.get("nguid").cloned(),
                eui64: namespace_fields.get("eui64").cloned(),
                size: namespace_fields.get("nsze").cloned(),
                fields: namespace_fields,
            },
        ))
    }

    fn is_mock(&self) -> bool {
        true
    }
}
