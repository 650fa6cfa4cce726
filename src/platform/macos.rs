//! macOS sampler backed by `netstat`.
//!
//! Socket enumeration comes from `netstat -anp tcp|udp`, interface
//! counters from `netstat -ib`. Process attribution and per-socket byte
//! counters are not available through this path and are reported as
//! zero; interface counters remain the ground truth for totals.

use std::collections::HashMap;
use std::net::IpAddr;
use std::process::Command;

use crate::error::{Error, Result};
use crate::model::{InterfaceStats, Protocol, SocketState};
use crate::platform::{CgroupInfo, MappedSocket, Sampler, SocketKey};

pub struct NetstatSampler;

impl NetstatSampler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NetstatSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for NetstatSampler {
    fn collect(&mut self) -> Result<(Vec<MappedSocket>, Vec<InterfaceStats>)> {
        let mut seen: HashMap<SocketKey, MappedSocket> = HashMap::new();

        for (proto, flag) in [(Protocol::Tcp, "tcp"), (Protocol::Udp, "udp")] {
            let output = Command::new("netstat")
                .args(["-anp", flag])
                .output()
                .map_err(|e| Error::Sampler(format!("netstat: {e}")))?;
            if !output.status.success() {
                continue;
            }
            let text = String::from_utf8_lossy(&output.stdout);
            for sock in parse_netstat(&text, proto) {
                seen.entry(SocketKey::of(&sock)).or_insert(sock);
            }
        }

        let ifaces = collect_interfaces()?;
        Ok((seen.into_values().collect(), ifaces))
    }

    fn read_ppid(&self, _pid: u32) -> u32 {
        0
    }

    fn read_cgroup(&self, _pid: u32) -> CgroupInfo {
        CgroupInfo::default()
    }

    fn default_interface(&self) -> String {
        let Ok(output) = Command::new("route").args(["-n", "get", "default"]).output() else {
            return String::new();
        };
        let text = String::from_utf8_lossy(&output.stdout);
        for line in text.lines() {
            if let Some(iface) = line.trim().strip_prefix("interface:") {
                return iface.trim().to_string();
            }
        }
        String::new()
    }
}

/// Parses `netstat -anp` output lines like
/// `tcp4  0  0  192.168.1.10.52134  93.184.216.34.443  ESTABLISHED`.
fn parse_netstat(text: &str, proto: Protocol) -> Vec<MappedSocket> {
    let mut sockets = Vec::new();

    for line in text.lines().skip(2) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 || !parts[0].starts_with(match proto {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }) {
            continue;
        }

        let Some((src_ip, src_port)) = parse_addr(parts[3]) else {
            continue;
        };
        let Some((dst_ip, dst_port)) = parse_addr(parts[4]) else {
            continue;
        };

        let state = match proto {
            Protocol::Tcp => parts.get(5).map(|s| parse_state(s)).unwrap_or_default(),
            Protocol::Udp => SocketState::Unknown,
        };

        sockets.push(MappedSocket {
            proto,
            src_ip,
            src_port,
            dst_ip,
            dst_port,
            state,
            inode: 0,
            bytes_sent: 0,
            bytes_recv: 0,
            pid: 0,
            process_name: String::new(),
            cmdline: String::new(),
        });
    }

    sockets
}

/// `ip.port` with `*` standing in for unspecified parts.
fn parse_addr(addr: &str) -> Option<(IpAddr, u16)> {
    let dot = addr.rfind('.')?;
    let (ip_str, port_str) = (&addr[..dot], &addr[dot + 1..]);

    let port = if port_str == "*" {
        0
    } else {
        port_str.parse().ok()?
    };
    let ip = if ip_str == "*" {
        IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
    } else {
        ip_str.parse().ok()?
    };

    Some((ip, port))
}

fn parse_state(s: &str) -> SocketState {
    match s {
        "ESTABLISHED" => SocketState::Established,
        "SYN_SENT" => SocketState::SynSent,
        "SYN_RCVD" => SocketState::SynRecv,
        "FIN_WAIT_1" => SocketState::FinWait1,
        "FIN_WAIT_2" => SocketState::FinWait2,
        "TIME_WAIT" => SocketState::TimeWait,
        "CLOSED" => SocketState::Close,
        "CLOSE_WAIT" => SocketState::CloseWait,
        "LAST_ACK" => SocketState::LastAck,
        "LISTEN" => SocketState::Listen,
        "CLOSING" => SocketState::Closing,
        _ => SocketState::Unknown,
    }
}

/// `netstat -ib`: name at column 0, ibytes/obytes near the end. Loopback
/// is excluded; multi-homed rows per interface are collapsed to the first.
fn collect_interfaces() -> Result<Vec<InterfaceStats>> {
    let output = Command::new("netstat")
        .args(["-ib"])
        .output()
        .map_err(|e| Error::Sampler(format!("netstat -ib: {e}")))?;
    let text = String::from_utf8_lossy(&output.stdout);

    let mut seen: HashMap<String, InterfaceStats> = HashMap::new();
    for line in text.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }
        let name = parts[0].to_string();
        if name.starts_with("lo") || seen.contains_key(&name) {
            continue;
        }

        // Columns: Name Mtu Network Address Ipkts Ierrs Ibytes Opkts Oerrs Obytes
        let ibytes = parts[6].parse().unwrap_or(0);
        let obytes = parts[9].parse().unwrap_or(0);
        seen.insert(
            name.clone(),
            InterfaceStats {
                name,
                bytes_recv: ibytes,
                bytes_sent: obytes,
                recv_rate: 0.0,
                send_rate: 0.0,
            },
        );
    }

    Ok(seen.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_addr_forms() {
        let (ip, port) = parse_addr("192.168.1.10.52134").unwrap();
        assert_eq!(ip.to_string(), "192.168.1.10");
        assert_eq!(port, 52134);

        let (ip, port) = parse_addr("*.443").unwrap();
        assert!(ip.is_unspecified());
        assert_eq!(port, 443);
    }

    #[test]
    fn parse_established_line() {
        let text = "Active Internet connections\nProto Recv-Q Send-Q  Local Address          Foreign Address        (state)\ntcp4       0      0  192.168.1.10.52134     93.184.216.34.443      ESTABLISHED\n";
        let socks = parse_netstat(text, Protocol::Tcp);
        assert_eq!(socks.len(), 1);
        assert_eq!(socks[0].state, SocketState::Established);
        assert_eq!(socks[0].dst_port, 443);
    }
}
