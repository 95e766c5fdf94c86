//! Discovery log handling.
//!
//! `nvme discover` prints one block per discovery log entry:
//!
//! ```text
//! Discovery Log Number of Records 2, Generation counter 2
//! =====Discovery Log Entry 0======
//! trtype:  tcp
//! adrfam:  ipv4
//! subtype: nvme subsystem
//! treq:    not specified
//! portid:  2304
//! trsvcid: 4420
//! subnqn:  nqn.1988-11.com.dell:powerstore:00:a1a1a1a111a1111a111a
//! traddr:  1.1.1.1
//! sectype: none
//! ```

use log::{debug, info};

use initiator_api::{
    error::InitiatorError,
    model::{FcHost, Target, TransportType},
};
use osutils::dependencies::DependencyResultExt;

use crate::cli::{NvmeCli, NVME_PORT};

/// Marker contained in the line that opens every entry.
const ENTRY_HEADER: &str = "Discovery Log Entry";

type FieldSetter = fn(&mut Target, String);

/// Discovery log keys and the target field each one populates.
const DISCOVERY_FIELDS: &[(&str, FieldSetter)] = &[
    ("trtype:", |t: &mut Target, v: String| {
        t.tr_type = v.clone();
        t.target_type = v;
    }),
    ("traddr:", |t: &mut Target, v: String| t.portal = v),
    ("subnqn:", |t: &mut Target, v: String| t.target_nqn = v),
    ("adrfam:", |t: &mut Target, v: String| t.adr_fam = v),
    ("subtype:", |t: &mut Target, v: String| t.sub_type = v),
    ("treq:", |t: &mut Target, v: String| t.treq = v),
    ("portid:", |t: &mut Target, v: String| t.port_id = v),
    ("trsvcid:", |t: &mut Target, v: String| t.trsvc_id = v),
    ("sectype:", |t: &mut Target, v: String| t.sec_type = v),
];

/// Parses `nvme discover` output, keeping only entries of the given transport.
///
/// Entries of other transports are dropped, as are entries that never received both a
/// subsystem NQN and a transport address. Output without entries yields an empty list.
pub fn parse_discovery_log(output: &str, transport: TransportType) -> Vec<Target> {
    let mut targets = Vec::new();
    let mut current = Target::default();
    let mut entry_count = 0;
    let mut skip = false;

    for line in output.lines() {
        if line.contains(ENTRY_HEADER) {
            if entry_count != 0 && !skip && current.is_complete() {
                targets.push(current);
            }
            current = Target::default();
            skip = false;
            entry_count += 1;
            continue;
        }

        let mut tokens = line.split_whitespace();
        let Some(key) = tokens.next() else {
            continue;
        };
        let value = tokens.collect::<Vec<_>>().join(" ");
        if value.is_empty() {
            continue;
        }

        if key == "trtype:" && value != transport.as_str() {
            skip = true;
        }

        if let Some((_, set)) = DISCOVERY_FIELDS.iter().find(|(k, _)| *k == key) {
            set(&mut current, value);
        }
    }

    if !skip && current.is_complete() {
        targets.push(current);
    }

    debug!(
        "Parsed {} {} target(s) from discovery log",
        targets.len(),
        transport
    );
    targets
}

/// Runs `nvme discover` against a TCP discovery controller.
pub fn discover_tcp(cli: &NvmeCli, address: &str) -> Result<Vec<Target>, InitiatorError> {
    info!("Discovering NVMe/TCP targets at '{address}'");
    let cmd = cli.command(["discover", "-t", "tcp", "-a", address, "-s", NVME_PORT]);
    let output = cli
        .output_and_check(&cmd)
        .message(format!("Failed to discover NVMe/TCP targets at '{address}'"))?;

    Ok(parse_discovery_log(&output, TransportType::Tcp))
}

/// Runs `nvme discover` against a Fibre Channel target address once per local host adapter.
pub fn discover_fc(
    cli: &NvmeCli,
    address: &str,
    hosts: &[FcHost],
) -> Result<Vec<Target>, InitiatorError> {
    let mut targets = Vec::new();
    for host in hosts {
        let host_traddr = host.host_traddr();
        info!("Discovering NVMe/FC targets at '{address}' through '{host_traddr}'");
        let cmd = cli.command([
            "discover".to_string(),
            "--transport=fc".to_string(),
            format!("--traddr={address}"),
            format!("--host-traddr={host_traddr}"),
        ]);
        let output = cli.output_and_check(&cmd).message(format!(
            "Failed to discover NVMe/FC targets at '{address}'"
        ))?;

        targets.extend(
            parse_discovery_log(&output, TransportType::Fc)
                .into_iter()
                .map(|target| Target {
                    host_address: Some(host_traddr.clone()),
                    ..target
                }),
        );
    }
    Ok(targets)
}
