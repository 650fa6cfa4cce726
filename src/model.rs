//! Domain types: sockets, connections, per-process aggregates, snapshots.
//!
//! Everything here is plain data. A [`Snapshot`] is produced once per poll
//! by the collector and never mutated after publication.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport protocol of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
        }
    }
}

/// TCP connection state. UDP endpoints carry [`SocketState::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SocketState {
    #[default]
    Unknown,
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
}

impl SocketState {
    /// Maps the hex state column of `/proc/net/tcp` to a state.
    pub fn from_proc_hex(hex: u8) -> Self {
        match hex {
            0x01 => Self::Established,
            0x02 => Self::SynSent,
            0x03 => Self::SynRecv,
            0x04 => Self::FinWait1,
            0x05 => Self::FinWait2,
            0x06 => Self::TimeWait,
            0x07 => Self::Close,
            0x08 => Self::CloseWait,
            0x09 => Self::LastAck,
            0x0A => Self::Listen,
            0x0B => Self::Closing,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "UNKNOWN",
            Self::Established => "ESTABLISHED",
            Self::SynSent => "SYN_SENT",
            Self::SynRecv => "SYN_RECV",
            Self::FinWait1 => "FIN_WAIT1",
            Self::FinWait2 => "FIN_WAIT2",
            Self::TimeWait => "TIME_WAIT",
            Self::Close => "CLOSE",
            Self::CloseWait => "CLOSE_WAIT",
            Self::LastAck => "LAST_ACK",
            Self::Listen => "LISTEN",
            Self::Closing => "CLOSING",
        };
        f.write_str(s)
    }
}

/// Renders `ip:port`, bracketing IPv6 addresses.
pub fn addr_port(ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{v4}:{port}"),
        IpAddr::V6(v6) => format!("[{v6}]:{port}"),
    }
}

/// A single connection with smoothed bandwidth, derived each poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub proto: Protocol,
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub state: SocketState,
    /// Bytes per second, upload direction.
    #[serde(default)]
    pub up_rate: f64,
    /// Bytes per second, download direction.
    #[serde(default)]
    pub down_rate: f64,
    /// Seconds since the connection was first tracked.
    #[serde(default)]
    pub age_secs: f64,
    /// Resolved remote hostname, empty until the cache answers.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote_host: String,
    /// Well-known service label (e.g. `HTTPS`), empty if unknown.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
}

/// A port a process is listening on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenPort {
    pub proto: Protocol,
    pub ip: IpAddr,
    pub port: u16,
}

/// Per-process aggregate for one poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub pid: u32,
    #[serde(default)]
    pub ppid: u32,
    pub name: String,
    #[serde(default)]
    pub cmdline: String,
    #[serde(default)]
    pub up_rate: f64,
    #[serde(default)]
    pub down_rate: f64,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub listen_ports: Vec<ListenPort>,
    #[serde(default)]
    pub conn_count: usize,
    #[serde(default)]
    pub listen_count: usize,
    /// Cumulative bytes uploaded over the session.
    #[serde(default)]
    pub cum_up: u64,
    /// Cumulative bytes downloaded over the session.
    #[serde(default)]
    pub cum_down: u64,
    /// Docker/Podman short container id, empty outside a container.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container_id: String,
    /// Owning systemd service, empty if none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_name: String,
    /// Sparkline history of up+down rate, oldest first. Not recorded.
    #[serde(skip)]
    pub rate_history: Vec<f64>,
}

/// Per-interface counters and rates for one poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceStats {
    pub name: String,
    #[serde(default)]
    pub bytes_recv: u64,
    #[serde(default)]
    pub bytes_sent: u64,
    #[serde(default)]
    pub recv_rate: f64,
    #[serde(default)]
    pub send_rate: f64,
}

/// Bandwidth grouped by remote host across all processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteHostSummary {
    /// Resolved hostname, or empty if unresolved.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    pub ip: IpAddr,
    #[serde(default)]
    pub up_rate: f64,
    #[serde(default)]
    pub down_rate: f64,
    #[serde(default)]
    pub conn_count: usize,
    /// Distinct process names talking to this host, sorted.
    #[serde(default)]
    pub processes: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub country: String,
}

/// A listening port with its owning process, system-wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenPortEntry {
    pub proto: Protocol,
    pub ip: IpAddr,
    pub port: u16,
    pub pid: u32,
    pub process: String,
    #[serde(default)]
    pub cmdline: String,
}

/// Immutable point-in-time view of all attributable network activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub processes: Vec<ProcessSummary>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceStats>,
    #[serde(default)]
    pub remote_hosts: Vec<RemoteHostSummary>,
    #[serde(default)]
    pub listen_ports: Vec<ListenPortEntry>,
    /// Bytes per second across all interfaces.
    #[serde(default)]
    pub total_up: f64,
    #[serde(default)]
    pub total_down: f64,
    /// Header sparkline history (up+down), oldest first. Not recorded.
    #[serde(skip)]
    pub total_rate_history: Vec<f64>,
    /// Interface carrying the default route, empty if undetermined. Not recorded.
    #[serde(skip)]
    pub active_iface: String,
}

/// Cumulative bytes for a single process over the session.
#[derive(Debug, Clone, Default)]
pub struct ProcessCumulative {
    pub pid: u32,
    pub name: String,
    pub bytes_up: u64,
    pub bytes_down: u64,
}

/// Session-wide totals, surfaced on demand and printed on exit.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub duration: Duration,
    pub total_up: u64,
    pub total_down: u64,
    /// Top 5 processes by cumulative up+down.
    pub top_processes: Vec<ProcessCumulative>,
}

impl SessionStats {
    /// Formats the exit report. Empty string when nothing was transferred.
    pub fn summary(&self) -> String {
        if self.total_up == 0 && self.total_down == 0 && self.top_processes.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        let secs = self.duration.as_secs();
        out.push_str(&format!("\nconntop session: {}s\n", secs));
        out.push_str(&format!(
            "Total: ▲ {}  ▼ {}\n",
            fmt_bytes(self.total_up),
            fmt_bytes(self.total_down)
        ));

        if !self.top_processes.is_empty() {
            out.push_str("Top processes:\n");
            for (i, p) in self.top_processes.iter().enumerate() {
                if p.bytes_up == 0 && p.bytes_down == 0 {
                    continue;
                }
                out.push_str(&format!(
                    "  {}. {:<16} ▲ {:<10} ▼ {}\n",
                    i + 1,
                    p.name,
                    fmt_bytes(p.bytes_up),
                    fmt_bytes(p.bytes_down)
                ));
            }
        }
        out
    }
}

/// Formats a byte count with a 1024-based unit suffix.
pub fn fmt_bytes(b: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;
    match b {
        _ if b >= TB => format!("{:.1} TB", b as f64 / TB as f64),
        _ if b >= GB => format!("{:.1} GB", b as f64 / GB as f64),
        _ if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        _ if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        _ => format!("{b} B"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn protocol_display() {
        assert_eq!(Protocol::Tcp.to_string(), "TCP");
        assert_eq!(Protocol::Udp.to_string(), "UDP");
    }

    #[test]
    fn state_from_proc_hex() {
        assert_eq!(SocketState::from_proc_hex(0x01), SocketState::Established);
        assert_eq!(SocketState::from_proc_hex(0x0A), SocketState::Listen);
        assert_eq!(SocketState::from_proc_hex(0xFF), SocketState::Unknown);
    }

    #[test]
    fn state_display_labels() {
        assert_eq!(SocketState::Established.to_string(), "ESTABLISHED");
        assert_eq!(SocketState::Listen.to_string(), "LISTEN");
        assert_eq!(SocketState::Unknown.to_string(), "UNKNOWN");
    }

    #[test]
    fn addr_port_formats() {
        assert_eq!(addr_port(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), 80), "1.2.3.4:80");
        assert_eq!(addr_port("::1".parse().unwrap(), 443), "[::1]:443");
    }

    #[test]
    fn fmt_bytes_units() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
        assert_eq!(fmt_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(fmt_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn session_summary_empty() {
        let stats = SessionStats::default();
        assert_eq!(stats.summary(), "");
    }

    #[test]
    fn session_summary_filters_zero_processes() {
        let stats = SessionStats {
            duration: Duration::from_secs(10),
            total_up: 2048,
            total_down: 4096,
            top_processes: vec![
                ProcessCumulative {
                    pid: 1,
                    name: "curl".into(),
                    bytes_up: 2048,
                    bytes_down: 4096,
                },
                ProcessCumulative {
                    pid: 2,
                    name: "idle".into(),
                    bytes_up: 0,
                    bytes_down: 0,
                },
            ],
        };
        let s = stats.summary();
        assert!(s.contains("curl"));
        assert!(!s.contains("idle"));
    }

    #[test]
    fn snapshot_serde_skips_history() {
        let snap = Snapshot {
            timestamp: Utc::now(),
            processes: Vec::new(),
            interfaces: Vec::new(),
            remote_hosts: Vec::new(),
            listen_ports: Vec::new(),
            total_up: 1.0,
            total_down: 2.0,
            total_rate_history: vec![1.0, 2.0, 3.0],
            active_iface: "eth0".into(),
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert!(!json.contains("total_rate_history"));
        assert!(!json.contains("active_iface"));

        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert!(back.total_rate_history.is_empty());
        assert_eq!(back.total_up, 1.0);
    }

    #[test]
    fn snapshot_deserialize_ignores_unknown_fields() {
        let json = r#"{"timestamp":"2025-01-01T00:00:00Z","total_up":1.5,"future_field":true}"#;
        let snap: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.total_up, 1.5);
        assert!(snap.processes.is_empty());
    }
}
