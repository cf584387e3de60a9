//! Server defaulting policy
//!
//! Runs after schema defaults are injected. Fills identity, bind address,
//! log directory and derived ports for every server so that the resolved
//! configuration never leaves those fields empty.

use std::path::Path;

use log::debug;

use super::defaults::{
    DEFAULT_GROUPPORT_OFFSET_FROM_TSAPORT, DEFAULT_HOST, DEFAULT_LOGS, DEFAULT_MANAGEMENTPORT_OFFSET_FROM_TSAPORT,
    MAX_PORTNUMBER, MIN_PORTNUMBER, WILDCARD_IP,
};
use super::types::{BindPort, Server, TcConfig};
use crate::common::fs::absolute_path;
use crate::common::substitute;

/// Management port derived from a TSA port
pub fn compute_management_port_from_tsa_port(tsa_port: u16) -> u16 {
    derive_port(tsa_port, DEFAULT_MANAGEMENTPORT_OFFSET_FROM_TSAPORT)
}

/// Group port derived from a TSA port
pub fn compute_group_port_from_tsa_port(tsa_port: u16) -> u16 {
    derive_port(tsa_port, DEFAULT_GROUPPORT_OFFSET_FROM_TSAPORT)
}

// Past the top of the port range the value wraps to just above MIN_PORTNUMBER.
fn derive_port(tsa_port: u16, offset: u16) -> u16 {
    let candidate = u32::from(tsa_port) + u32::from(offset);
    let port = if candidate <= MAX_PORTNUMBER {
        candidate
    } else {
        candidate % MAX_PORTNUMBER + MIN_PORTNUMBER
    };
    port as u16
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Apply the policy to every server of `config`
pub fn apply_platform_defaults(config: &mut TcConfig, source: Option<&Path>) {
    if let Some(servers) = config.servers.as_mut() {
        for server in servers.server.iter_mut() {
            apply_server_defaults(server, source);
        }
    }
}

/// Fill the runtime defaults of one server.
///
/// `source` is the directory relative log paths resolve against; the
/// working directory is used when it is `None`.
pub fn apply_server_defaults(server: &mut Server, source: Option<&Path>) {
    let bind = if is_blank(&server.bind) {
        WILDCARD_IP.to_string()
    } else {
        substitute(server.bind.as_deref().unwrap_or_default())
    };
    server.bind = Some(bind.clone());

    let tsa = server.tsa_port.get_or_insert_with(BindPort::default);
    tsa.bind.get_or_insert_with(|| bind.clone());
    let tsa_value = tsa.value;

    let derived = |slot: &mut Option<BindPort>, compute: fn(u16) -> u16| match slot {
        Some(port) => {
            port.bind.get_or_insert_with(|| bind.clone());
        }
        None => *slot = Some(BindPort::new(compute(tsa_value), Some(bind.clone()))),
    };
    derived(&mut server.management_port, compute_management_port_from_tsa_port);
    derived(&mut server.tsa_group_port, compute_group_port_from_tsa_port);

    // Identity comes after ports: a defaulted name embeds the TSA port.
    if is_blank(&server.host) {
        server.host = Some(if is_blank(&server.name) {
            DEFAULT_HOST.to_string()
        } else {
            server.name.clone().unwrap_or_default()
        });
    }
    if is_blank(&server.name) {
        let host = server.host.clone().unwrap_or_default();
        server.name = Some(if tsa_value > 0 {
            format!("{}:{}", host, tsa_value)
        } else {
            host
        });
    }
    server.host = server.host.as_deref().map(substitute);
    server.name = server.name.as_deref().map(substitute);

    let logs = substitute(server.logs.as_deref().unwrap_or(DEFAULT_LOGS));
    let base = source.unwrap_or_else(|| Path::new("."));
    server.logs = Some(absolute_path(&logs, base).to_string_lossy().into_owned());

    debug!(
        "Server {} defaults: host={:?} bind={} tsa={} group={} management={}",
        server.display_name(),
        server.host,
        bind,
        tsa_value,
        server.tsa_group_port.as_ref().map_or(0, |p| p.value),
        server.management_port.as_ref().map_or(0, |p| p.value)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::substitutor::ip_address;
    use std::path::PathBuf;

    #[test]
    fn test_port_derivation() {
        assert_eq!(compute_management_port_from_tsa_port(9410), 9440);
        assert_eq!(compute_group_port_from_tsa_port(9410), 9430);
        assert_eq!(compute_management_port_from_tsa_port(200), 230);
        assert_eq!(compute_group_port_from_tsa_port(200), 220);
        assert_eq!(compute_management_port_from_tsa_port(65505), 65535);
        assert_eq!(compute_management_port_from_tsa_port(65535), 30 + 0x0FFF);
        assert_eq!(compute_group_port_from_tsa_port(65535), 20 + 0x0FFF);
    }

    #[test]
    fn test_empty_server_gets_everything() {
        let mut server = Server::default();
        server.tsa_port = Some(BindPort::new(9410, None));
        apply_server_defaults(&mut server, Some(Path::new("/etc/tc")));

        let ip = ip_address();
        assert_eq!(server.host.as_deref(), Some(ip.as_str()));
        assert_eq!(server.name, Some(format!("{}:9410", ip)));
        assert_eq!(server.bind.as_deref(), Some(WILDCARD_IP));
        assert_eq!(server.logs.as_deref().map(PathBuf::from), Some(PathBuf::from("/etc/tc/logs")));
        assert_eq!(server.tsa_port, Some(BindPort::new(9410, Some(WILDCARD_IP.into()))));
        assert_eq!(server.management_port, Some(BindPort::new(9440, Some(WILDCARD_IP.into()))));
        assert_eq!(server.tsa_group_port, Some(BindPort::new(9430, Some(WILDCARD_IP.into()))));
    }

    #[test]
    fn test_host_falls_back_to_name() {
        let mut server = Server {
            name: Some("s1".into()),
            ..Default::default()
        };
        apply_server_defaults(&mut server, None);
        assert_eq!(server.host.as_deref(), Some("s1"));
        assert_eq!(server.name.as_deref(), Some("s1"));
        assert_eq!(server.tsa_port, Some(BindPort::new(0, Some(WILDCARD_IP.into()))));
    }

    #[test]
    fn test_name_from_host_and_port() {
        let mut server = Server {
            host: Some("example.org".into()),
            tsa_port: Some(BindPort::new(200, None)),
            ..Default::default()
        };
        apply_server_defaults(&mut server, None);
        assert_eq!(server.name.as_deref(), Some("example.org:200"));
        assert_eq!(server.management_port.as_ref().map(|p| p.value), Some(230));
        assert_eq!(server.tsa_group_port.as_ref().map(|p| p.value), Some(220));
    }

    #[test]
    fn test_explicit_ports_keep_values_and_gain_bind() {
        let mut server = Server {
            name: Some("s1".into()),
            bind: Some("10.0.0.1".into()),
            tsa_port: Some(BindPort::new(1000, Some("10.0.0.2".into()))),
            management_port: Some(BindPort::new(5000, None)),
            logs: Some("/abs/logs".into()),
            ..Default::default()
        };
        apply_server_defaults(&mut server, Some(Path::new("/ignored")));

        assert_eq!(server.tsa_port, Some(BindPort::new(1000, Some("10.0.0.2".into()))));
        assert_eq!(server.management_port, Some(BindPort::new(5000, Some("10.0.0.1".into()))));
        assert_eq!(server.tsa_group_port, Some(BindPort::new(1020, Some("10.0.0.1".into()))));
        assert_eq!(server.logs.as_deref().map(PathBuf::from), Some(PathBuf::from("/abs/logs")));
    }

    #[test]
    fn test_relative_logs_without_source_use_working_directory() {
        let mut server = Server::default();
        apply_server_defaults(&mut server, None);
        let logs = PathBuf::from(server.logs.unwrap());
        assert!(logs.is_absolute());
        assert!(logs.ends_with("logs"));
    }

    #[test]
    fn test_policy_is_idempotent() {
        let mut server = Server {
            tsa_port: Some(BindPort::new(9410, None)),
            ..Default::default()
        };
        apply_server_defaults(&mut server, Some(Path::new("/etc/tc")));
        let once = server.clone();
        apply_server_defaults(&mut server, Some(Path::new("/etc/tc")));
        assert_eq!(server, once);
    }
}
