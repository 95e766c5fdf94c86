use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Fabric transport used to reach a target.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum TransportType {
    #[default]
    Tcp,
    Fc,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// One endpoint reported by a discovery controller.
///
/// Fields hold the raw values printed by `nvme discover`.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Target {
    /// Transport address (`traddr`).
    pub portal: String,
    /// Subsystem NQN (`subnqn`).
    pub target_nqn: String,
    pub tr_type: String,
    pub adr_fam: String,
    pub sub_type: String,
    pub treq: String,
    pub port_id: String,
    pub trsvc_id: String,
    pub sec_type: String,
    pub target_type: String,
    /// Local host adapter address, only set for Fibre Channel targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_address: Option<String>,
}

impl Target {
    /// A target is usable once both its NQN and transport address are known.
    pub fn is_complete(&self) -> bool {
        !self.target_nqn.is_empty() && !self.portal.is_empty()
    }
}

macro_rules! open_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $literal:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            /// Value reported by the tool that is not known to this library.
            Other(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $literal,)+
                    Self::Other(s) => s.as_str(),
                }
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($literal => Self::$variant,)+
                    _ => Self::Other(value.trim().to_string()),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = String::deserialize(deserializer)?;
                Ok(Self::from(value.as_str()))
            }
        }
    };
}

open_enum! {
    /// Controller state as printed by `nvme list-subsys`.
    SessionState {
        Live => "live",
        Deleting => "deleting",
        Connecting => "connecting",
        Resetting => "resetting",
        New => "new",
        Dead => "dead",
    }
}

open_enum! {
    /// Transport name of an established controller.
    TransportName {
        Tcp => "tcp",
        Fc => "fc",
        Rdma => "rdma",
        Loop => "loop",
        Pcie => "pcie",
    }
}

/// One controller connection to a fabric target.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Session {
    pub target: String,
    pub portal: String,
    pub state: SessionState,
    pub transport: TransportName,
}

/// Namespace bound to a device.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub id: u32,
}

/// NVMe block device visible on the host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Device {
    pub device_path: String,
    pub namespaces: Vec<Namespace>,
    /// Entry as reported by the tool.
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Resolved namespace identifier for one device.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceNamespace {
    pub device_path: String,
    pub namespace_id: u32,
}

/// Identify Controller data of a device.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ControllerData {
    pub serial_number: Option<String>,
    pub model_number: Option<String>,
    pub firmware_revision: Option<String>,
    pub subsystem_nqn: Option<String>,
    pub controller_id: Option<String>,
    pub fields: BTreeMap<String, String>,
}

/// Identify Namespace data of a device.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct NamespaceData {
    pub namespace_id: Option<u32>,
    pub nguid: Option<String>,
    pub eui64: Option<String>,
    pub size: Option<String>,
    pub fields: BTreeMap<String, String>,
}

/// Local Fibre Channel host adapter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct FcHost {
    pub node_name: String,
    pub port_name: String,
}

impl FcHost {
    /// Address in the form expected by `--host-traddr`.
    pub fn host_traddr(&self) -> String {
        format!("nn-{}:pn-{}", self.node_name, self.port_name)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_transport_type() {
        assert_eq!(TransportType::from_str("tcp").unwrap(), TransportType::Tcp);
        assert_eq!(TransportType::from_str("fc").unwrap(), TransportType::Fc);
        assert!(TransportType::from_str("rdma").is_err());
        assert_eq!(TransportType::Fc.as_str(), "fc");
        assert_eq!(TransportType::Tcp.to_string(), "tcp");
    }

    #[test]
    fn test_session_state_keeps_unknown_values() {
        assert_eq!(SessionState::from("live"), SessionState::Live);
        assert_eq!(SessionState::from("Deleting"), SessionState::Deleting);
        assert_eq!(
            SessionState::from("deleting (no IO)"),
            SessionState::Other("deleting (no IO)".into())
        );
        assert_eq!(SessionState::Other("frozen".into()).as_str(), "frozen");
        assert_eq!(TransportName::from("fc"), TransportName::Fc);
        assert_eq!(TransportName::from("ib"), TransportName::Other("ib".into()));
    }

    #[test]
    fn test_session_serialize() {
        let session = Session {
            target: "nqn.1988-11.com.dell.mock:00:e6e2d5b871f1403E169D".into(),
            portal: "10.230.1.1:4420".into(),
            state: SessionState::Live,
            transport: TransportName::Tcp,
        };
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["state"], "live");
        assert_eq!(value["transport"], "tcp");
        let parsed: Session = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, session);
    }

    #[test]
    fn test_target_completeness() {
        let mut target = Target {
            target_nqn: "nqn.1988-11.com.dell.mock:00:0001".into(),
            ..Default::default()
        };
        assert!(!target.is_complete());
        target.portal = "1.1.1.1".into();
        assert!(target.is_complete());
    }

    #[test]
    fn test_fc_host_traddr() {
        let host = FcHost {
            node_name: "0x20000090fae0b5f5".into(),
            port_name: "0x10000090fae0b5f5".into(),
        };
        assert_eq!(
            host.host_traddr(),
            "nn-0x20000090fae0b5f5:pn-0x10000090fae0b5f5"
        );
    }
}
