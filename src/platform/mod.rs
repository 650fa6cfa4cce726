//! OS sampling layer.
//!
//! A [`Sampler`] is the abstract source of raw data: every `collect` call
//! returns the current set of process-attributed sockets and per-interface
//! byte counters since boot. One implementation per OS family is selected
//! at construction.

use std::net::IpAddr;

use crate::error::Result;
use crate::model::{addr_port, InterfaceStats, Protocol, SocketState};

pub mod cgroup;
#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "macos")]
pub mod macos;

pub use cgroup::CgroupInfo;

/// A socket sample with its owning process already resolved.
#[derive(Debug, Clone)]
pub struct MappedSocket {
    pub proto: Protocol,
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub state: SocketState,
    /// Kernel socket inode; zero where the OS does not expose one.
    pub inode: u64,
    /// Cumulative bytes over the socket's lifetime.
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    /// Owning process, zero when attribution failed.
    pub pid: u32,
    pub process_name: String,
    pub cmdline: String,
}

/// Canonical identity of a logical connection across polls.
///
/// Deliberately inode-independent: a connection observed through different
/// code paths must coalesce into one tracker. The textual endpoint form is
/// deterministic for the same logical endpoint, with unspecified addresses
/// rendered as `*:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketKey {
    pub proto: Protocol,
    pub src_addr: String,
    pub dst_addr: String,
}

impl SocketKey {
    pub fn of(s: &MappedSocket) -> Self {
        Self {
            proto: s.proto,
            src_addr: format_addr(s.src_ip, s.src_port),
            dst_addr: format_addr(s.dst_ip, s.dst_port),
        }
    }
}

/// Renders one endpoint of a [`SocketKey`].
pub fn format_addr(ip: IpAddr, port: u16) -> String {
    if ip.is_unspecified() {
        return format!("*:{port}");
    }
    addr_port(ip, port)
}

/// Abstract source of raw samples.
///
/// Implementations must never return duplicate [`SocketKey`]s (when two
/// kernel sockets share one, pick one) and must exclude loopback
/// interfaces from the interface list.
pub trait Sampler: Send {
    /// Returns all live sockets and interface counters.
    fn collect(&mut self) -> Result<(Vec<MappedSocket>, Vec<InterfaceStats>)>;

    /// Parent PID of a process, zero if unknown.
    fn read_ppid(&self, pid: u32) -> u32;

    /// Container / systemd classification for a process.
    fn read_cgroup(&self, pid: u32) -> CgroupInfo;

    /// Name of the interface carrying the default route, or empty.
    fn default_interface(&self) -> String;

    /// Releases any OS resources.
    fn close(&mut self) {}
}

/// Builds the sampler for the current OS.
#[cfg(target_os = "linux")]
pub fn new_sampler() -> Result<Box<dyn Sampler>> {
    Ok(Box::new(linux::ProcfsSampler::new()))
}

#[cfg(target_os = "macos")]
pub fn new_sampler() -> Result<Box<dyn Sampler>> {
    Ok(Box::new(macos::NetstatSampler::new()))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn new_sampler() -> Result<Box<dyn Sampler>> {
    Err(crate::error::Error::Sampler(
        "unsupported platform".to_string(),
    ))
}
