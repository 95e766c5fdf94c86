//! Session listing.
//!
//! Sessions are derived from `nvme list-subsys`, which prints every subsystem followed by
//! its controllers:
//!
//! ```text
//! nvme-subsys0 - NQN=nqn.1988-11.com.dell.mock:00:e6e2d5b871f1403E169D
//! \
//!  +- nvme0 tcp traddr=10.230.1.1 trsvcid=4420 live
//!  +- nvme1 tcp traddr=10.230.1.2,trsvcid=4420,src_addr=10.230.1.10 deleting
//! ```

use log::{debug, trace};

use initiator_api::{
    error::InitiatorError,
    model::{Session, SessionState, TransportName},
};
use osutils::dependencies::DependencyResultExt;

use crate::cli::NvmeCli;

#[derive(Debug, Default)]
struct ControllerAddress {
    traddr: Option<String>,
    trsvcid: Option<String>,
}

impl ControllerAddress {
    fn portal(self) -> Option<String> {
        let traddr = self.traddr.filter(|a| !a.is_empty())?;
        Some(match self.trsvcid.filter(|s| !s.is_empty() && s != "none") {
            Some(trsvcid) => format!("{traddr}:{trsvcid}"),
            None => traddr,
        })
    }
}

type AddressSetter = fn(&mut ControllerAddress, &str);

/// Controller address keys and the field each one populates.
const ADDRESS_FIELDS: &[(&str, AddressSetter)] = &[
    ("traddr", |a: &mut ControllerAddress, v: &str| {
        a.traddr = Some(v.to_string())
    }),
    ("trsvcid", |a: &mut ControllerAddress, v: &str| {
        a.trsvcid = Some(v.to_string())
    }),
];

/// Parses `nvme list-subsys` output into sessions, in listing order.
///
/// Lines that cannot be understood are skipped, so malformed output yields no sessions.
pub fn parse_sessions(data: &str) -> Vec<Session> {
    let mut sessions = Vec::new();
    let mut subsystem_nqn: Option<String> = None;

    for line in data.lines().map(str::trim) {
        if line.starts_with("nvme-subsys") {
            subsystem_nqn = line
                .split_once("NQN=")
                .map(|(_, nqn)| nqn.trim().to_string())
                .filter(|nqn| !nqn.is_empty());
            continue;
        }

        let Some(controller) = line.strip_prefix("+-") else {
            continue;
        };
        let Some(target) = subsystem_nqn.as_ref() else {
            trace!("Ignoring controller outside of a subsystem: '{line}'");
            continue;
        };
        match parse_controller(controller, target) {
            Some(session) => sessions.push(session),
            None => trace!("Ignoring malformed controller line: '{line}'"),
        }
    }

    debug!("Parsed {} session(s)", sessions.len());
    sessions
}

/// Parses `nvme0 tcp traddr=..,trsvcid=.. live` into a session for `target`.
fn parse_controller(controller: &str, target: &str) -> Option<Session> {
    let tokens = controller.split_whitespace().collect::<Vec<_>>();
    let [_name, transport, address @ .., state] = tokens.as_slice() else {
        return None;
    };
    if address.is_empty() || state.contains('=') {
        return None;
    }

    let mut parsed = ControllerAddress::default();
    for pair in address.iter().flat_map(|token| token.split(',')) {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        if let Some((_, set)) = ADDRESS_FIELDS.iter().find(|(k, _)| *k == key) {
            set(&mut parsed, value);
        }
    }

    Some(Session {
        target: target.to_string(),
        portal: parsed.portal()?,
        state: SessionState::from(*state),
        transport: TransportName::from(*transport),
    })
}

/// Lists the sessions currently known to the host.
pub fn get_sessions(cli: &NvmeCli) -> Result<Vec<Session>, InitiatorError> {
    let cmd = cli.command(["list-subsys"]);
    let output = cli
        .output_and_check(&cmd)
        .message("Failed to list NVMe subsystems")?;

    Ok(parse_sessions(&output))
}

#[cfg(test)]
mod tests {
    use crate::testutils::ScriptedExecutor;

    use super::*;

    const VALID: &str = include_str!("../testdata/session_info_valid");
    const INVALID: &str = include_str!("../testdata/session_info_invalid");
    const V2: &str = include_str!("../testdata/session_info_v2");

    #[test]
    fn test_parse_valid() {
        let sessions = parse_sessions(VALID);
        assert_eq!(sessions.len(), 2);

        assert_eq!(
            sessions[0].target,
            "nqn.1988-11.com.dell.mock:00:e6e2d5b871f1403E169D"
        );
        assert_eq!(sessions[0].portal, "10.230.1.1:4420");
        assert_eq!(sessions[0].state.as_str(), "live");
        assert_eq!(sessions[0].transport.as_str(), "tcp");

        assert_eq!(
            sessions[1].target,
            "nqn.1988-11.com.dell.mock:00:e6e2d5b871f1403E169D"
        );
        assert_eq!(sessions[1].portal, "10.230.1.2:4420");
        assert_eq!(sessions[1].state, SessionState::Deleting);
        assert_eq!(sessions[1].transport, TransportName::Tcp);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_sessions(INVALID).is_empty());
        assert!(parse_sessions("").is_empty());
        assert!(parse_sessions("\0\u{1}not a listing").is_empty());
    }

    #[test]
    fn test_parse_comma_separated_addresses() {
        let sessions = parse_sessions(V2);
        assert_eq!(sessions.len(), 4);

        assert_eq!(sessions[1].portal, "10.230.1.2:4420");
        assert_eq!(sessions[1].state, SessionState::Connecting);

        assert_eq!(
            sessions[2].target,
            "nqn.1988-11.com.dell:powerstore:00:b2b2b2b222b2222b222b"
        );
        assert_eq!(
            sessions[2].portal,
            "nn-0x58ccf090c9200c22:pn-0x58ccf091492b0c22"
        );
        assert_eq!(sessions[2].transport, TransportName::Fc);
        assert_eq!(sessions[3].state, SessionState::Other("frozen".into()));
    }

    #[test]
    fn test_parse_controller_requires_address() {
        let listing = "nvme-subsys0 - NQN=nqn.2014-08.org.nvmexpress:a\n +- nvme0 tcp live\n +- nvme1 tcp trsvcid=4420 live\n";
        assert!(parse_sessions(listing).is_empty());
    }

    #[test]
    fn test_get_sessions() {
        let executor = ScriptedExecutor::new();
        executor.push_ok(VALID);
        executor.push_exit(1, "", "failed to scan topology");
        let cli = NvmeCli::with_executor(None, executor.clone());

        assert_eq!(get_sessions(&cli).unwrap().len(), 2);
        assert!(get_sessions(&cli).is_err());
        assert_eq!(executor.calls(), vec!["nvme list-subsys"; 2]);
    }
}
