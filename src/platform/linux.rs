//! Linux sampler backed by procfs.
//!
//! Sockets come from `/proc/net/{tcp,tcp6,udp,udp6}`, process attribution
//! from scanning `/proc/<pid>/fd` for `socket:[inode]` links, interface
//! counters from `/proc/net/dev`, and the default route from
//! `/proc/net/route`.
//!
//! procfs does not expose per-socket byte counters, so `bytes_sent` and
//! `bytes_recv` are reported as zero here; interface counters remain the
//! ground truth for link utilization.

use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{Error, Result};
use crate::model::{InterfaceStats, Protocol, SocketState};
use crate::platform::{cgroup, CgroupInfo, MappedSocket, Sampler, SocketKey};

pub struct ProcfsSampler;

impl ProcfsSampler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProcfsSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for ProcfsSampler {
    fn collect(&mut self) -> Result<(Vec<MappedSocket>, Vec<InterfaceStats>)> {
        let inodes = scan_socket_inodes()?;

        // Dedupe by key: the same logical connection can surface through
        // more than one table; first sighting wins.
        let mut seen: HashMap<SocketKey, MappedSocket> = HashMap::new();

        for (path, proto, v6) in [
            ("/proc/net/tcp", Protocol::Tcp, false),
            ("/proc/net/tcp6", Protocol::Tcp, true),
            ("/proc/net/udp", Protocol::Udp, false),
            ("/proc/net/udp6", Protocol::Udp, true),
        ] {
            let Ok(content) = fs::read_to_string(path) else {
                continue;
            };
            for mut sock in parse_proc_net(&content, proto, v6) {
                if let Some(info) = inodes.get(&sock.inode) {
                    sock.pid = info.pid;
                    sock.process_name = info.name.clone();
                    sock.cmdline = info.cmdline.clone();
                }
                seen.entry(SocketKey::of(&sock)).or_insert(sock);
            }
        }

        let ifaces = parse_net_dev()?;
        Ok((seen.into_values().collect(), ifaces))
    }

    fn read_ppid(&self, pid: u32) -> u32 {
        read_ppid(pid)
    }

    fn read_cgroup(&self, pid: u32) -> CgroupInfo {
        cgroup::read_cgroup(pid)
    }

    fn default_interface(&self) -> String {
        default_interface()
    }
}

struct InodeInfo {
    pid: u32,
    name: String,
    cmdline: String,
}

/// Walks `/proc` to map socket inodes to their owning process.
fn scan_socket_inodes() -> Result<HashMap<u64, InodeInfo>> {
    let mut result = HashMap::new();

    let entries =
        fs::read_dir("/proc").map_err(|e| Error::Sampler(format!("read /proc: {e}")))?;

    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };

        // Permission denied or the process exited mid-scan.
        let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
            continue;
        };

        // Process info is read lazily, only once a socket fd shows up.
        let mut info: Option<(String, String)> = None;

        for fd in fds.flatten() {
            let Ok(link) = fs::read_link(fd.path()) else {
                continue;
            };
            let link = link.to_string_lossy();
            let Some(inode) = link
                .strip_prefix("socket:[")
                .and_then(|s| s.strip_suffix(']'))
                .and_then(|s| s.parse::<u64>().ok())
            else {
                continue;
            };

            let (name, cmdline) = info.get_or_insert_with(|| read_process_info(pid));
            result.insert(
                inode,
                InodeInfo {
                    pid,
                    name: name.clone(),
                    cmdline: cmdline.clone(),
                },
            );
        }
    }

    Ok(result)
}

/// Reads `/proc/<pid>/comm` and `/proc/<pid>/cmdline`.
fn read_process_info(pid: u32) -> (String, String) {
    let name = fs::read_to_string(format!("/proc/{pid}/comm"))
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let cmdline = fs::read(format!("/proc/{pid}/cmdline"))
        .map(|data| {
            String::from_utf8_lossy(&data)
                .replace('\0', " ")
                .trim()
                .to_string()
        })
        .unwrap_or_default();

    let name = if name.is_empty() { "?".to_string() } else { name };
    (name, cmdline)
}

/// Parses one `/proc/net/{tcp,udp}[6]` table.
fn parse_proc_net(content: &str, proto: Protocol, v6: bool) -> Vec<MappedSocket> {
    let mut sockets = Vec::new();

    for line in content.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }

        let Some((src_ip, src_port)) = parse_hex_addr(parts[1], v6) else {
            continue;
        };
        let Some((dst_ip, dst_port)) = parse_hex_addr(parts[2], v6) else {
            continue;
        };

        // UDP has no connection state machine.
        let state = match proto {
            Protocol::Tcp => u8::from_str_radix(parts[3], 16)
                .map(SocketState::from_proc_hex)
                .unwrap_or(SocketState::Unknown),
            Protocol::Udp => SocketState::Unknown,
        };

        let inode = parts[9].parse().unwrap_or(0);

        sockets.push(MappedSocket {
            proto,
            src_ip,
            src_port,
            dst_ip,
            dst_port,
            state,
            inode,
            bytes_sent: 0,
            bytes_recv: 0,
            pid: 0,
            process_name: String::new(),
            cmdline: String::new(),
        });
    }

    sockets
}

/// Parses the `ADDR:PORT` hex form of procfs net tables.
///
/// IPv4 addresses are one little-endian u32; IPv6 addresses are four
/// little-endian u32 groups.
fn parse_hex_addr(s: &str, v6: bool) -> Option<(IpAddr, u16)> {
    let (addr, port) = s.split_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;

    let ip = if v6 {
        if addr.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, chunk) in addr.as_bytes().chunks(8).enumerate() {
            let group = u32::from_str_radix(std::str::from_utf8(chunk).ok()?, 16).ok()?;
            bytes[i * 4..i * 4 + 4].copy_from_slice(&group.swap_bytes().to_be_bytes());
        }
        IpAddr::V6(Ipv6Addr::from(bytes))
    } else {
        if addr.len() != 8 {
            return None;
        }
        let n = u32::from_str_radix(addr, 16).ok()?;
        IpAddr::V4(Ipv4Addr::from(n.swap_bytes()))
    };

    Some((ip, port))
}

/// Reads `/proc/net/dev`, skipping loopback.
fn parse_net_dev() -> Result<Vec<InterfaceStats>> {
    let content = fs::read_to_string("/proc/net/dev")
        .map_err(|e| Error::Sampler(format!("read /proc/net/dev: {e}")))?;

    let mut result = Vec::new();
    for line in content.lines().skip(2) {
        let Some((name, fields)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name == "lo" {
            continue;
        }
        let fields: Vec<&str> = fields.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }

        result.push(InterfaceStats {
            name: name.to_string(),
            bytes_recv: fields[0].parse().unwrap_or(0),
            bytes_sent: fields[8].parse().unwrap_or(0),
            recv_rate: 0.0,
            send_rate: 0.0,
        });
    }

    Ok(result)
}

/// Parent PID from `/proc/<pid>/stat`.
///
/// The comm field can contain spaces and parens, so fields are taken
/// after the last `)`.
fn read_ppid(pid: u32) -> u32 {
    let Ok(data) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return 0;
    };
    let Some(rest) = data.rfind(')').map(|i| &data[i + 1..]) else {
        return 0;
    };
    // After the comm: state ppid ...
    rest.split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Interface of the default route from `/proc/net/route`.
fn default_interface() -> String {
    let Ok(content) = fs::read_to_string("/proc/net/route") else {
        return String::new();
    };
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 2 && fields[1] == "00000000" {
            return fields[0].to_string();
        }
    }
    String::new()
}
