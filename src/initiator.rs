use std::{collections::HashMap, path::Path, sync::Arc};

use log::{debug, info};

use initiator_api::{
    config::InitiatorConfig,
    error::InitiatorError,
    model::{
        ControllerData, Device, DeviceNamespace, NamespaceData, Session, Target, TransportType,
    },
};
use osutils::dependencies::Executor;

use crate::{cli::NvmeCli, devices, discovery, host, lifecycle, sessions};

/// Operations of an NVMe over Fabrics host initiator.
///
/// Implemented by [`NvmeInitiator`], which drives the `nvme` CLI, and by
/// [`MockNvmeInitiator`](crate::mock::MockNvmeInitiator), which synthesizes results in memory.
pub trait Initiator: Send + Sync {
    /// Discovers NVMe/TCP targets through the discovery controller at `address`, connecting to
    /// each of them when `login` is set.
    fn discover_tcp_targets(&self, address: &str, login: bool)
        -> Result<Vec<Target>, InitiatorError>;

    /// Discovers NVMe/FC targets at `address` through every local FC host adapter, connecting
    /// to each of them when `login` is set.
    fn discover_fc_targets(&self, address: &str, login: bool)
        -> Result<Vec<Target>, InitiatorError>;

    /// Returns the NQNs of this host, read from `filename` or the default host NQN file.
    fn get_initiators(&self, filename: Option<&Path>) -> Result<Vec<String>, InitiatorError>;

    fn tcp_connect(&self, target: &Target, duplicate: bool) -> Result<(), InitiatorError>;

    fn fc_connect(&self, target: &Target, duplicate: bool) -> Result<(), InitiatorError>;

    /// Connects to `target` over `transport` without allowing duplicate controllers.
    fn connect(&self, target: &Target, transport: TransportType) -> Result<(), InitiatorError> {
        match transport {
            TransportType::Tcp => self.tcp_connect(target, false),
            TransportType::Fc => self.fc_connect(target, false),
        }
    }

    fn disconnect(&self, target: &Target) -> Result<(), InitiatorError>;

    fn get_sessions(&self) -> Result<Vec<Session>, InitiatorError>;

    /// Triggers a namespace rescan on the controller behind `device`.
    fn device_rescan(&self, device: &str) -> Result<(), InitiatorError>;

    fn list_devices_and_namespaces(&self) -> Result<Vec<Device>, InitiatorError>;

    /// Resolves the namespace ID of each device, in input order.
    fn list_namespace_ids(&self, devices: &[Device])
        -> Result<Vec<DeviceNamespace>, InitiatorError>;

    fn get_device_data(
        &self,
        device_path: &str,
    ) -> Result<(ControllerData, NamespaceData), InitiatorError>;

    /// Whether results are synthesized instead of coming from the host.
    fn is_mock(&self) -> bool;
}

/// Initiator backed by the `nvme` command line tool.
#[derive(Debug, Clone)]
pub struct NvmeInitiator {
    config: InitiatorConfig,
    cli: NvmeCli,
}

impl NvmeInitiator {
    pub fn new(options: &HashMap<String, String>) -> Self {
        Self::from_config(InitiatorConfig::from_options(options))
    }

    pub fn from_config(config: InitiatorConfig) -> Self {
        let cli = NvmeCli::new(config.chroot_directory.clone());
        Self { config, cli }
    }

    /// Creates an initiator that runs its commands through `executor`.
    pub fn with_executor(options: &HashMap<String, String>, executor: Arc<dyn Executor>) -> Self {
        let config = InitiatorConfig::from_options(options);
        let cli = NvmeCli::with_executor(config.chroot_directory.clone(), executor);
        Self { config, cli }
    }

    pub fn config(&self) -> &InitiatorConfig {
        &self.config
    }

    fn login_all(&self, targets: &[Target], transport: TransportType) -> Result<(), InitiatorError> {
        for target in targets {
            self.connect(target, transport)?;
        }
        Ok(())
    }
}

impl Initiator for NvmeInitiator {
    fn discover_tcp_targets(
        &self,
        address: &str,
        login: bool,
    ) -> Result<Vec<Target>, InitiatorError> {
        let targets = discovery::discover_tcp(&self.cli, address)?;
        info!("Discovered {} NVMe/TCP target(s) at '{address}'", targets.len());
        if login {
            self.login_all(&targets, TransportType::Tcp)?;
        }
        Ok(targets)
    }

    fn discover_fc_targets(
        &self,
        address: &str,
        login: bool,
    ) -> Result<Vec<Target>, InitiatorError> {
        let hosts = host::fc_hosts(self.cli.root())?;
        let targets = discovery::discover_fc(&self.cli, address, &hosts)?;
        info!(
            "Discovered {} NVMe/FC target(s) at '{address}' through {} host adapter(s)",
            targets.len(),
            hosts.len()
        );
        if login {
            self.login_all(&targets, TransportType::Fc)?;
        }
        Ok(targets)
    }

    fn get_initiators(&self, filename: Option<&Path>) -> Result<Vec<String>, InitiatorError> {
        host::get_initiators(self.cli.root(), filename)
    }

    fn tcp_connect(&self, target: &Target, duplicate: bool) -> Result<(), InitiatorError> {
        lifecycle::connect(&self.cli, target, TransportType::Tcp, duplicate)
    }

    fn fc_connect(&self, target: &Target, duplicate: bool) -> Result<(), InitiatorError> {
        lifecycle::connect(&self.cli, target, TransportType::Fc, duplicate)
    }

    fn disconnect(&self, target: &Target) -> Result<(), InitiatorError> {
        lifecycle::disconnect(&self.cli, target)
    }

    fn get_sessions(&self) -> Result<Vec<Session>, InitiatorError> {
        sessions::get_sessions(&self.cli)
    }

    fn device_rescan(&self, device: &str) -> Result<(), InitiatorError> {
        debug!("Rescanning '{device}'");
        lifecycle::rescan(&self.cli, device)
    }

    fn list_devices_and_namespaces(&self) -> Result<Vec<Device>, InitiatorError> {
        devices::list_devices(&self.cli)
    }

    fn list_namespace_ids(
        &self,
        devices: &[Device],
    ) -> Result<Vec<DeviceNamespace>, InitiatorError> {
        devices::list_namespace_ids(&self.cli, devices)
    }

    fn get_device_data(
        &self,
        device_path: &str,
    ) -> Result<(ControllerData, NamespaceData), InitiatorError> {
        devices::get_device_data(&self.cli, device_path)
    }

    fn is_mock(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use maplit::hashmap;

    use initiator_api::config::CHROOT_DIRECTORY;

    use crate::testutils::ScriptedExecutor;

    use super::*;

    const TCP_LOG: &str = indoc! {"
        Discovery Log Number of Records 2, Generation counter 2
        =====Discovery Log Entry 0======
        trtype:  tcp
        adrfam:  ipv4
        subtype: nvme subsystem
        treq:    not specified
        portid:  2304
        trsvcid: 4420
        subnqn:  nqn.1988-11.com.dell:powerstore:00:a1a1a1a111a1111a111a
        traddr:  10.230.1.1
        sectype: none
        =====Discovery Log Entry 1======
        trtype:  tcp
        adrfam:  ipv4
        subtype: nvme subsystem
        treq:    not specified
        portid:  2305
        trsvcid: 4420
        subnqn:  nqn.1988-11.com.dell:powerstore:00:a1a1a1a111a1111a111a
        traddr:  10.230.1.2
        sectype: none
    "};

    #[test]
    fn test_new() {
        let initiator = NvmeInitiator::new(&hashmap! {
            CHROOT_DIRECTORY.to_string() => "/noderoot".to_string(),
        });
        assert!(!initiator.is_mock());
        assert_eq!(initiator.cli.root(), Some(Path::new("/noderoot")));

        let initiator = NvmeInitiator::new(&HashMap::new());
        assert_eq!(initiator.config(), &InitiatorConfig::default());
        assert_eq!(initiator.cli.root(), None);
    }

    #[test]
    fn test_discover_and_login() {
        let executor = ScriptedExecutor::new();
        executor.push_ok(TCP_LOG);
        executor.push_ok("");
        executor.push_exit(114, "", "already connected");
        let initiator = NvmeInitiator::with_executor(
            &hashmap! { CHROOT_DIRECTORY.to_string() => "/noderoot".to_string() },
            executor.clone(),
        );

        let targets = initiator.discover_tcp_targets("10.230.1.1", true).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(
            executor.calls(),
            vec![
                "chroot /noderoot nvme discover -t tcp -a 10.230.1.1 -s 4420",
                "chroot /noderoot nvme connect -t tcp -n nqn.1988-11.com.dell:powerstore:00:a1a1a1a111a1111a111a -a 10.230.1.1 -s 4420",
                "chroot /noderoot nvme connect -t tcp -n nqn.1988-11.com.dell:powerstore:00:a1a1a1a111a1111a111a -a 10.230.1.2 -s 4420",
            ]
        );
    }

    #[test]
    fn test_discover_without_login() {
        let executor = ScriptedExecutor::new();
        executor.push_ok(TCP_LOG);
        let initiator = NvmeInitiator::with_executor(&HashMap::new(), executor.clone());

        assert_eq!(
            initiator.discover_tcp_targets("10.230.1.1", false).unwrap().len(),
            2
        );
        assert_eq!(executor.calls().len(), 1);
    }

    #[test]
    fn test_discover_fc_without_adapters() {
        let root = tempfile::tempdir().unwrap();
        let executor = ScriptedExecutor::new();
        let initiator = NvmeInitiator::with_executor(
            &hashmap! {
                CHROOT_DIRECTORY.to_string() => root.path().display().to_string(),
            },
            executor.clone(),
        );

        assert!(initiator
            .discover_fc_targets("nn-0x58ccf090c9200c22:pn-0x58ccf091492b0c22", true)
            .unwrap()
            .is_empty());
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn test_connect_dispatch() {
        let executor = ScriptedExecutor::new();
        executor.push_ok("");
        let initiator = NvmeInitiator::with_executor(&HashMap::new(), executor.clone());
        let target = Target {
            portal: "nn-0x58ccf090c9200c22:pn-0x58ccf091492b0c22".into(),
            target_nqn: "nqn.1988-11.com.dell:powerstore:00:b2b2b2b222b2222b222b".into(),
            host_address: Some("nn-0x20000090fae0b5f5:pn-0x10000090fae0b5f5".into()),
            ..Default::default()
        };

        initiator.connect(&target, TransportType::Fc).unwrap();
        assert!(executor.calls()[0].starts_with("nvme connect -t fc"));
    }

    #[test]
    fn test_device_flow() {
        let executor = ScriptedExecutor::new();
        executor.push_ok(r#"{"Devices":[{"DevicePath":"/dev/nvme0n1","NameSpace":1}]}"#);
        executor.push_ok("nvme0n1: namespace-id:1\n");
        let initiator = NvmeInitiator::with_executor(&HashMap::new(), executor.clone());

        let devices = initiator.list_devices_and_namespaces().unwrap();
        let ids = initiator.list_namespace_ids(&devices).unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].namespace_id, 1);
        assert_eq!(
            executor.calls(),
            vec!["nvme list -o json", "nvme get-ns-id /dev/nvme0n1"]
        );
    }
}
