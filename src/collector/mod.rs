//! Collection and aggregation pipeline.
//!
//! The [`Collector`] owns a driver thread that periodically pulls a raw
//! batch from the sampler, turns counter deltas into EMA-smoothed rates,
//! aggregates by process, remote host, and listen port, and publishes one
//! immutable [`Snapshot`] per poll over a one-slot drop-oldest channel.

pub mod channel;
pub mod dns;
pub mod ema;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::model::{
    Connection, InterfaceStats, ListenPort, ListenPortEntry, ProcessCumulative, ProcessSummary,
    RemoteHostSummary, SessionStats, Snapshot, SocketState,
};
use crate::platform::{CgroupInfo, MappedSocket, Sampler, SocketKey};
use crate::ring_buffer::RingBuffer;
use crate::{geo, service};

use self::dns::DnsCache;
use self::ema::Ema;

const EMA_ALPHA: f64 = 0.3;

/// Trackers not observed for this long are evicted. Keeping an entry
/// briefly after disappearance tolerates transient sampling gaps.
const STALE_TTL_SECS: i64 = 30;

/// Lower bound on the polling interval.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Locks a mutex, recovering the guard if a test thread panicked while
/// holding it.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct SocketTracker {
    prev_sent: u64,
    prev_recv: u64,
    up_ema: Ema,
    down_ema: Ema,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl SocketTracker {
    fn new(sent: u64, recv: u64, now: DateTime<Utc>) -> Self {
        Self {
            prev_sent: sent,
            prev_recv: recv,
            up_ema: Ema::new(EMA_ALPHA),
            down_ema: Ema::new(EMA_ALPHA),
            first_seen: now,
            last_seen: now,
        }
    }
}

struct IfaceTracker {
    prev_sent: u64,
    prev_recv: u64,
    up_ema: Ema,
    down_ema: Ema,
}

/// Everything behind the single state lock.
struct State {
    sockets: HashMap<SocketKey, SocketTracker>,
    ifaces: HashMap<String, IfaceTracker>,
    proc_history: HashMap<u32, RingBuffer>,
    total_history: RingBuffer,
    last_poll: Option<DateTime<Utc>>,
    total_cum_up: u64,
    total_cum_down: u64,
    cum_by_pid: HashMap<u32, ProcessCumulative>,
    interval: Duration,
}

enum Ctrl {
    /// A pending interval change is waiting in its slot.
    Wake,
    Stop,
}

struct Inner {
    sampler: Mutex<Box<dyn Sampler>>,
    dns: DnsCache,
    state: Mutex<State>,
    session_start: DateTime<Utc>,
    active_iface: String,
    snap_tx: channel::Sender<Snapshot>,
    /// Coalescing slot for interval changes: an unconsumed value is
    /// simply overwritten by the next one.
    pending_interval: Mutex<Option<Duration>>,
}

/// Periodically polls the sampler and produces [`Snapshot`]s.
pub struct Collector {
    inner: Arc<Inner>,
    ctrl_tx: mpsc::Sender<Ctrl>,
    ctrl_rx: Mutex<Option<mpsc::Receiver<Ctrl>>>,
    snap_rx: Mutex<Option<channel::Receiver<Snapshot>>>,
    stopped: AtomicBool,
}

impl Collector {
    pub fn new(sampler: Box<dyn Sampler>, interval: Duration) -> Self {
        let active_iface = sampler.default_interface();
        let (snap_tx, snap_rx) = channel::channel();
        let (ctrl_tx, ctrl_rx) = mpsc::channel();

        let inner = Arc::new(Inner {
            sampler: Mutex::new(sampler),
            dns: DnsCache::new(),
            state: Mutex::new(State {
                sockets: HashMap::new(),
                ifaces: HashMap::new(),
                proc_history: HashMap::new(),
                total_history: RingBuffer::default(),
                last_poll: None,
                total_cum_up: 0,
                total_cum_down: 0,
                cum_by_pid: HashMap::new(),
                interval: interval.max(MIN_INTERVAL),
            }),
            session_start: Utc::now(),
            active_iface,
            snap_tx,
            pending_interval: Mutex::new(None),
        });

        Self {
            inner,
            ctrl_tx,
            ctrl_rx: Mutex::new(Some(ctrl_rx)),
            snap_rx: Mutex::new(Some(snap_rx)),
            stopped: AtomicBool::new(false),
        }
    }

    /// Spawns the driver thread and returns the snapshot channel.
    ///
    /// The loop performs one immediate poll, then fires on the timer until
    /// [`stop`](Self::stop) is signalled, at which point the channel closes.
    pub fn start(&self) -> channel::Receiver<Snapshot> {
        let (Some(ctrl_rx), Some(snap_rx)) =
            (lock(&self.ctrl_rx).take(), lock(&self.snap_rx).take())
        else {
            tracing::warn!("collector started twice");
            let (tx, rx) = channel::channel();
            tx.close();
            return rx;
        };

        let inner = self.inner.clone();
        thread::spawn(move || {
            inner.poll_at(Utc::now());
            loop {
                let interval = lock(&inner.state).interval;
                match ctrl_rx.recv_timeout(interval) {
                    Ok(Ctrl::Stop) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    Ok(Ctrl::Wake) => {
                        if let Some(d) = lock(&inner.pending_interval).take() {
                            lock(&inner.state).interval = d.max(MIN_INTERVAL);
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => inner.poll_at(Utc::now()),
                }
            }
            lock(&inner.sampler).close();
            inner.snap_tx.close();
        });

        snap_rx
    }

    /// Signals the driver loop to terminate. Idempotent; the snapshot
    /// channel closes exactly once when the loop exits.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            let _ = self.ctrl_tx.send(Ctrl::Stop);
        }
    }

    /// Requests a new polling interval (clamped to [`MIN_INTERVAL`]).
    /// If a previous change has not been consumed yet it is replaced.
    pub fn set_interval(&self, d: Duration) {
        *lock(&self.inner.pending_interval) = Some(d);
        let _ = self.ctrl_tx.send(Ctrl::Wake);
    }

    /// Current polling interval.
    pub fn interval(&self) -> Duration {
        lock(&self.inner.state).interval
    }

    /// Performs one collection pass immediately.
    pub fn poll(&self) {
        self.inner.poll_at(Utc::now());
    }

    /// Session totals and the top-5 processes by cumulative traffic.
    pub fn session_stats(&self) -> SessionStats {
        let state = lock(&self.inner.state);

        let mut all: Vec<ProcessCumulative> = state.cum_by_pid.values().cloned().collect();
        all.sort_by(|a, b| {
            (b.bytes_up + b.bytes_down)
                .cmp(&(a.bytes_up + a.bytes_down))
                .then(a.pid.cmp(&b.pid))
        });
        all.truncate(5);

        SessionStats {
            duration: (Utc::now() - self.inner.session_start)
                .to_std()
                .unwrap_or_default(),
            total_up: state.total_cum_up,
            total_down: state.total_cum_down,
            top_processes: all,
        }
    }

    /// Cumulative bytes for one PID, or zeroes.
    pub fn cumulative_by_pid(&self, pid: u32) -> (u64, u64) {
        let state = lock(&self.inner.state);
        state
            .cum_by_pid
            .get(&pid)
            .map(|pc| (pc.bytes_up, pc.bytes_down))
            .unwrap_or((0, 0))
    }

    #[cfg(test)]
    fn poll_at(&self, now: DateTime<Utc>) {
        self.inner.poll_at(now);
    }
}

struct ProcBucket {
    pid: u32,
    name: String,
    cmdline: String,
    conns: Vec<Connection>,
    listen: Vec<ListenPort>,
    up_rate: f64,
    down_rate: f64,
}

impl Inner {
    fn poll_at(&self, now: DateTime<Utc>) {
        // The sampler blocks on OS reads; the state lock stays free until
        // it returns.
        let collected = lock(&self.sampler).collect();
        let (sockets, ifaces) = match collected {
            Ok(batch) => batch,
            Err(e) => {
                tracing::debug!("poll skipped: {e}");
                return;
            }
        };

        // Process metadata is also sampler territory, gathered before the
        // state lock is taken.
        let pids: HashSet<u32> = sockets.iter().map(|s| s.pid).filter(|&p| p != 0).collect();
        let proc_meta: HashMap<u32, (u32, CgroupInfo)> = {
            let sampler = lock(&self.sampler);
            pids.iter()
                .map(|&pid| (pid, (sampler.read_ppid(pid), sampler.read_cgroup(pid))))
                .collect()
        };

        let mut guard = lock(&self.state);
        let state = &mut *guard;

        let is_first_poll = state.last_poll.is_none();
        let mut dt = state
            .last_poll
            .map(|lp| (now - lp).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(1.0);
        if dt <= 0.0 {
            dt = 1.0;
        }
        state.last_poll = Some(now);

        let mut active_keys: HashSet<SocketKey> = HashSet::with_capacity(sockets.len());
        let mut procs: HashMap<u32, ProcBucket> = HashMap::new();

        for s in &sockets {
            let key = SocketKey::of(s);
            active_keys.insert(key.clone());

            let existed = state.sockets.contains_key(&key);
            let tracker = state
                .sockets
                .entry(key)
                .or_insert_with(|| SocketTracker::new(s.bytes_sent, s.bytes_recv, now));

            let mut up_rate = 0.0;
            let mut down_rate = 0.0;
            if !is_first_poll && existed {
                let delta_sent = safe_delta(s.bytes_sent, tracker.prev_sent);
                let delta_recv = safe_delta(s.bytes_recv, tracker.prev_recv);
                up_rate = tracker.up_ema.update(delta_sent as f64 / dt);
                down_rate = tracker.down_ema.update(delta_recv as f64 / dt);

                state.total_cum_up += delta_sent;
                state.total_cum_down += delta_recv;
                if s.pid != 0 {
                    let pc = state.cum_by_pid.entry(s.pid).or_insert_with(|| {
                        ProcessCumulative {
                            pid: s.pid,
                            name: s.process_name.clone(),
                            ..Default::default()
                        }
                    });
                    pc.bytes_up += delta_sent;
                    pc.bytes_down += delta_recv;
                    if pc.name.is_empty() {
                        pc.name = s.process_name.clone();
                    }
                }
            }

            tracker.prev_sent = s.bytes_sent;
            tracker.prev_recv = s.bytes_recv;
            tracker.last_seen = now;
            let age_secs = (now - tracker.first_seen).num_milliseconds() as f64 / 1000.0;

            let bucket = procs.entry(s.pid).or_insert_with(|| ProcBucket {
                pid: s.pid,
                name: s.process_name.clone(),
                cmdline: s.cmdline.clone(),
                conns: Vec::new(),
                listen: Vec::new(),
                up_rate: 0.0,
                down_rate: 0.0,
            });

            if s.state == SocketState::Listen {
                bucket.listen.push(ListenPort {
                    proto: s.proto,
                    ip: s.src_ip,
                    port: s.src_port,
                });
            } else {
                let remote_host = if s.dst_ip.is_unspecified() {
                    String::new()
                } else {
                    self.dns.resolve(s.dst_ip)
                };
                bucket.conns.push(Connection {
                    proto: s.proto,
                    src_ip: s.src_ip,
                    src_port: s.src_port,
                    dst_ip: s.dst_ip,
                    dst_port: s.dst_port,
                    state: s.state,
                    up_rate,
                    down_rate,
                    age_secs,
                    remote_host,
                    service: service::service_name(s.dst_port, s.src_port).to_string(),
                });
            }
            bucket.up_rate += up_rate;
            bucket.down_rate += down_rate;
        }

        let stale_threshold = now - chrono::Duration::seconds(STALE_TTL_SECS);
        state
            .sockets
            .retain(|key, t| active_keys.contains(key) || t.last_seen >= stale_threshold);

        // Interface rates; interface counters are ground truth for totals.
        let mut iface_stats = Vec::with_capacity(ifaces.len());
        let mut total_up = 0.0;
        let mut total_down = 0.0;
        for iface in &ifaces {
            let existed = state.ifaces.contains_key(&iface.name);
            let tracker = state
                .ifaces
                .entry(iface.name.clone())
                .or_insert_with(|| IfaceTracker {
                    prev_sent: iface.bytes_sent,
                    prev_recv: iface.bytes_recv,
                    up_ema: Ema::new(EMA_ALPHA),
                    down_ema: Ema::new(EMA_ALPHA),
                });

            let mut up_rate = 0.0;
            let mut down_rate = 0.0;
            if !is_first_poll && existed {
                let delta_sent = safe_delta(iface.bytes_sent, tracker.prev_sent);
                let delta_recv = safe_delta(iface.bytes_recv, tracker.prev_recv);
                up_rate = tracker.up_ema.update(delta_sent as f64 / dt);
                down_rate = tracker.down_ema.update(delta_recv as f64 / dt);
                total_up += up_rate;
                total_down += down_rate;
            }

            tracker.prev_sent = iface.bytes_sent;
            tracker.prev_recv = iface.bytes_recv;

            iface_stats.push(InterfaceStats {
                name: iface.name.clone(),
                bytes_recv: iface.bytes_recv,
                bytes_sent: iface.bytes_sent,
                recv_rate: down_rate,
                send_rate: up_rate,
            });
        }

        // Per-process summaries plus sparkline upkeep.
        let active_pids: HashSet<u32> = procs.keys().copied().collect();
        let mut processes: Vec<ProcessSummary> = Vec::with_capacity(procs.len());
        for bucket in procs.values() {
            let hist = state.proc_history.entry(bucket.pid).or_default();
            hist.push(bucket.up_rate + bucket.down_rate);

            let (cum_up, cum_down) = state
                .cum_by_pid
                .get(&bucket.pid)
                .map(|pc| (pc.bytes_up, pc.bytes_down))
                .unwrap_or((0, 0));

            let (ppid, cg) = proc_meta
                .get(&bucket.pid)
                .cloned()
                .unwrap_or((0, CgroupInfo::default()));

            processes.push(ProcessSummary {
                pid: bucket.pid,
                ppid,
                name: bucket.name.clone(),
                cmdline: bucket.cmdline.clone(),
                up_rate: bucket.up_rate,
                down_rate: bucket.down_rate,
                conn_count: bucket.conns.len(),
                listen_count: bucket.listen.len(),
                connections: bucket.conns.clone(),
                listen_ports: bucket.listen.clone(),
                cum_up,
                cum_down,
                container_id: cg.container_id,
                service_name: cg.service_name,
                rate_history: hist.samples(),
            });
        }
        processes.sort_by_key(|p| p.pid);
        state.proc_history.retain(|pid, _| active_pids.contains(pid));

        let remote_hosts = aggregate_remote_hosts(&procs);
        let listen_ports = aggregate_listen_ports(&procs);

        state.total_history.push(total_up + total_down);

        let snap = Snapshot {
            timestamp: now,
            processes,
            interfaces: iface_stats,
            remote_hosts,
            listen_ports,
            total_up,
            total_down,
            total_rate_history: state.total_history.samples(),
            active_iface: self.active_iface.clone(),
        };

        drop(guard);

        // Drop-oldest: a slow consumer loses stale snapshots, never
        // stalls the driver.
        self.snap_tx.publish(snap);
    }
}

/// Groups every non-listen connection by destination IP.
fn aggregate_remote_hosts(procs: &HashMap<u32, ProcBucket>) -> Vec<RemoteHostSummary> {
    struct HostAgg {
        ip: IpAddr,
        host: String,
        up_rate: f64,
        down_rate: f64,
        conn_count: usize,
        proc_names: BTreeSet<String>,
    }

    let mut hosts: HashMap<IpAddr, HostAgg> = HashMap::new();
    for bucket in procs.values() {
        for conn in &bucket.conns {
            if conn.dst_ip.is_unspecified() {
                continue;
            }
            let agg = hosts.entry(conn.dst_ip).or_insert_with(|| HostAgg {
                ip: conn.dst_ip,
                host: conn.remote_host.clone(),
                up_rate: 0.0,
                down_rate: 0.0,
                conn_count: 0,
                proc_names: BTreeSet::new(),
            });
            agg.up_rate += conn.up_rate;
            agg.down_rate += conn.down_rate;
            agg.conn_count += 1;
            if !bucket.name.is_empty() {
                agg.proc_names.insert(bucket.name.clone());
            }
        }
    }

    let mut result: Vec<RemoteHostSummary> = hosts
        .into_values()
        .map(|agg| RemoteHostSummary {
            host: agg.host,
            ip: agg.ip,
            country: geo::lookup(agg.ip).format(),
            up_rate: agg.up_rate,
            down_rate: agg.down_rate,
            conn_count: agg.conn_count,
            processes: agg.proc_names.into_iter().collect(),
        })
        .collect();

    result.sort_by(|a, b| {
        (b.up_rate + b.down_rate)
            .partial_cmp(&(a.up_rate + a.down_rate))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.ip.to_string().cmp(&b.ip.to_string()))
    });
    result
}

/// Flattens every listening socket system-wide, sorted by port then proto.
fn aggregate_listen_ports(procs: &HashMap<u32, ProcBucket>) -> Vec<ListenPortEntry> {
    let mut result: Vec<ListenPortEntry> = Vec::new();
    for bucket in procs.values() {
        for lp in &bucket.listen {
            result.push(ListenPortEntry {
                proto: lp.proto,
                ip: lp.ip,
                port: lp.port,
                pid: bucket.pid,
                process: bucket.name.clone(),
                cmdline: bucket.cmdline.clone(),
            });
        }
    }
    result.sort_by(|a, b| a.port.cmp(&b.port).then(a.proto.cmp(&b.proto)));
    result
}

/// Delta between two cumulative counter readings, clamped at zero so a
/// kernel counter reset (socket identity reuse) never produces a spike.
fn safe_delta(current: u64, previous: u64) -> u64 {
    current.saturating_sub(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Protocol;
    use std::net::Ipv4Addr;

    /// Sampler driven by a script of prepared batches.
    struct ScriptedSampler {
        batches: Mutex<Vec<crate::error::Result<(Vec<MappedSocket>, Vec<InterfaceStats>)>>>,
    }

    impl ScriptedSampler {
        fn new(
            batches: Vec<crate::error::Result<(Vec<MappedSocket>, Vec<InterfaceStats>)>>,
        ) -> Box<dyn Sampler> {
            let mut batches = batches;
            batches.reverse();
            Box::new(Self {
                batches: Mutex::new(batches),
            })
        }
    }

    impl Sampler for ScriptedSampler {
        fn collect(&mut self) -> crate::error::Result<(Vec<MappedSocket>, Vec<InterfaceStats>)> {
            lock(&self.batches)
                .pop()
                .unwrap_or_else(|| Ok((Vec::new(), Vec::new())))
        }

        fn read_ppid(&self, _pid: u32) -> u32 {
            1
        }

        fn read_cgroup(&self, _pid: u32) -> CgroupInfo {
            CgroupInfo::default()
        }

        fn default_interface(&self) -> String {
            "eth0".to_string()
        }
    }

    fn sock(pid: u32, name: &str, sp: u16, dst: &str, dp: u16, sent: u64, recv: u64) -> MappedSocket {
        MappedSocket {
            proto: Protocol::Tcp,
            src_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
            src_port: sp,
            dst_ip: dst.parse().unwrap(),
            dst_port: dp,
            state: SocketState::Established,
            inode: 0,
            bytes_sent: sent,
            bytes_recv: recv,
            pid,
            process_name: name.to_string(),
            cmdline: format!("/usr/bin/{name}"),
        }
    }

    fn listen_sock(pid: u32, name: &str, port: u16, proto: Protocol) -> MappedSocket {
        MappedSocket {
            proto,
            src_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            src_port: port,
            dst_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            dst_port: 0,
            state: SocketState::Listen,
            inode: 0,
            bytes_sent: 0,
            bytes_recv: 0,
            pid,
            process_name: name.to_string(),
            cmdline: String::new(),
        }
    }

    fn iface(name: &str, sent: u64, recv: u64) -> InterfaceStats {
        InterfaceStats {
            name: name.to_string(),
            bytes_sent: sent,
            bytes_recv: recv,
            recv_rate: 0.0,
            send_rate: 0.0,
        }
    }

    fn t0() -> DateTime<Utc> {
        "2025-06-01T12:00:00Z".parse().unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(secs)
    }

    fn take(rx: &channel::Receiver<Snapshot>) -> Snapshot {
        rx.try_recv().expect("snapshot expected")
    }

    #[test]
    fn first_poll_is_quiescent() {
        let c = Collector::new(
            ScriptedSampler::new(vec![Ok((
                vec![sock(100, "curl", 40000, "8.8.8.8", 443, 1000, 500)],
                vec![iface("eth0", 10_000, 20_000)],
            ))]),
            Duration::from_secs(1),
        );
        let rx = lock(&c.snap_rx).take().unwrap();

        c.poll_at(t0());
        let snap = take(&rx);

        assert_eq!(snap.total_up, 0.0);
        assert_eq!(snap.total_down, 0.0);
        let proc = &snap.processes[0];
        assert_eq!(proc.up_rate, 0.0);
        assert_eq!(proc.connections[0].up_rate, 0.0);
        assert_eq!(c.cumulative_by_pid(100), (0, 0));
        assert_eq!(c.session_stats().total_up, 0);
    }

    #[test]
    fn second_poll_computes_ema_rates_and_cumulatives() {
        // Scenario: two polls 1 s apart, counters 1000→2000 sent and
        // 500→2500 received.
        let c = Collector::new(
            ScriptedSampler::new(vec![
                Ok((
                    vec![sock(100, "curl", 40000, "8.8.8.8", 443, 1000, 500)],
                    vec![iface("eth0", 1000, 500)],
                )),
                Ok((
                    vec![sock(100, "curl", 40000, "8.8.8.8", 443, 2000, 2500)],
                    vec![iface("eth0", 2000, 2500)],
                )),
            ]),
            Duration::from_secs(1),
        );
        let rx = lock(&c.snap_rx).take().unwrap();

        c.poll_at(at(0));
        let _ = take(&rx);
        c.poll_at(at(1));
        let snap = take(&rx);

        let conn = &snap.processes[0].connections[0];
        assert!((conn.up_rate - 300.0).abs() < 1e-9, "up {}", conn.up_rate);
        assert!((conn.down_rate - 600.0).abs() < 1e-9, "down {}", conn.down_rate);
        assert!((conn.age_secs - 1.0).abs() < 1e-9);

        let stats = c.session_stats();
        assert_eq!(stats.total_up, 1000);
        assert_eq!(stats.total_down, 2000);
        assert_eq!(c.cumulative_by_pid(100), (1000, 2000));

        // Interface EMA follows the same arithmetic.
        assert!((snap.total_up - 300.0).abs() < 1e-9);
        assert!((snap.total_down - 600.0).abs() < 1e-9);
        assert_eq!(snap.interfaces[0].send_rate, snap.total_up);
    }

    #[test]
    fn counter_reset_emits_zero_then_recovers() {
        let mk = |sent: u64| {
            Ok((
                vec![sock(100, "curl", 40000, "8.8.8.8", 443, sent, 0)],
                vec![],
            ))
        };
        let c = Collector::new(
            ScriptedSampler::new(vec![mk(5000), mk(1000), mk(2000)]),
            Duration::from_secs(1),
        );
        let rx = lock(&c.snap_rx).take().unwrap();

        c.poll_at(at(0));
        let _ = take(&rx);

        // Counter dropped 5000 → 1000: clamped to zero delta.
        c.poll_at(at(1));
        let snap = take(&rx);
        assert_eq!(snap.processes[0].connections[0].up_rate, 0.0);
        assert_eq!(c.cumulative_by_pid(100).0, 0);

        // Next tick continues from the reset baseline.
        c.poll_at(at(2));
        let snap = take(&rx);
        let rate = snap.processes[0].connections[0].up_rate;
        assert!((rate - 300.0).abs() < 1e-9, "rate {rate}");
        assert_eq!(c.cumulative_by_pid(100).0, 1000);
    }

    #[test]
    fn stale_trackers_evicted_after_ttl() {
        let k1 = |sent| vec![sock(100, "a", 40000, "8.8.8.8", 443, sent, 0)];
        let k2 = |sent| vec![sock(200, "b", 40001, "8.8.4.4", 443, sent, 0)];

        let mut batches = vec![
            Ok((k1(100), vec![])),
            Ok(({
                let mut v = k1(200);
                v.extend(k2(100));
                v
            }, vec![])),
            Ok((k2(200), vec![])),
        ];
        // Later polls only see k2.
        for _ in 0..3 {
            batches.push(Ok((k2(300), vec![])));
        }

        let c = Collector::new(ScriptedSampler::new(batches), Duration::from_secs(1));
        let rx = lock(&c.snap_rx).take().unwrap();

        c.poll_at(at(0));
        c.poll_at(at(1));
        c.poll_at(at(2));
        while rx.try_recv().is_some() {}

        // k1 last seen at t=1; still tracked before the 30 s TTL expires.
        assert_eq!(lock(&c.inner.state).sockets.len(), 2);
        c.poll_at(at(30));
        assert_eq!(lock(&c.inner.state).sockets.len(), 2);

        // 1 + 30 < 33: evicted.
        c.poll_at(at(33));
        assert_eq!(lock(&c.inner.state).sockets.len(), 1);
    }

    #[test]
    fn aggregation_identities_hold() {
        let batch = || {
            Ok((
                vec![
                    sock(100, "curl", 40000, "8.8.8.8", 443, 1000, 1000),
                    sock(100, "curl", 40001, "8.8.8.8", 443, 2000, 2000),
                    sock(200, "ssh", 40002, "1.1.1.1", 22, 3000, 3000),
                    listen_sock(200, "ssh", 22, Protocol::Tcp),
                ],
                vec![],
            ))
        };
        let c = Collector::new(
            ScriptedSampler::new(vec![batch(), batch()]),
            Duration::from_secs(1),
        );
        let rx = lock(&c.snap_rx).take().unwrap();

        c.poll_at(at(0));
        c.poll_at(at(1));
        let snap = take(&rx);

        let conn_rate_sum: f64 = snap
            .processes
            .iter()
            .flat_map(|p| p.connections.iter())
            .map(|conn| conn.up_rate)
            .sum();
        let proc_rate_sum: f64 = snap.processes.iter().map(|p| p.up_rate).sum();
        assert!((conn_rate_sum - proc_rate_sum).abs() < 1e-9);

        let host_conns: usize = snap.remote_hosts.iter().map(|h| h.conn_count).sum();
        let non_listen: usize = snap.processes.iter().map(|p| p.conn_count).sum();
        assert_eq!(host_conns, non_listen);

        let google = snap
            .remote_hosts
            .iter()
            .find(|h| h.ip.to_string() == "8.8.8.8")
            .unwrap();
        assert_eq!(google.conn_count, 2);
        assert_eq!(google.processes, vec!["curl".to_string()]);
        assert_eq!(google.country, "🇺🇸 US");
    }

    #[test]
    fn remote_hosts_sorted_by_total_rate_desc() {
        let batch = |busy_sent: u64| {
            Ok((
                vec![
                    sock(100, "slow", 40000, "8.8.8.8", 443, 100, 0),
                    sock(200, "fast", 40001, "1.1.1.1", 443, busy_sent, 0),
                ],
                vec![],
            ))
        };
        let c = Collector::new(
            ScriptedSampler::new(vec![batch(0), batch(100_000)]),
            Duration::from_secs(1),
        );
        let rx = lock(&c.snap_rx).take().unwrap();

        c.poll_at(at(0));
        c.poll_at(at(1));
        let snap = take(&rx);

        assert_eq!(snap.remote_hosts.len(), 2);
        assert_eq!(snap.remote_hosts[0].ip.to_string(), "1.1.1.1");
        assert!(snap.remote_hosts[0].up_rate > snap.remote_hosts[1].up_rate);
    }

    #[test]
    fn listen_ports_sorted_by_port_then_proto() {
        let batch = || {
            Ok((
                vec![
                    listen_sock(1, "dns", 53, Protocol::Udp),
                    listen_sock(1, "dns", 53, Protocol::Tcp),
                    listen_sock(2, "sshd", 22, Protocol::Tcp),
                    listen_sock(3, "web", 8080, Protocol::Tcp),
                ],
                vec![],
            ))
        };
        let c = Collector::new(ScriptedSampler::new(vec![batch()]), Duration::from_secs(1));
        let rx = lock(&c.snap_rx).take().unwrap();

        c.poll_at(at(0));
        let snap = take(&rx);

        let order: Vec<(u16, Protocol)> = snap
            .listen_ports
            .iter()
            .map(|e| (e.port, e.proto))
            .collect();
        assert_eq!(
            order,
            vec![
                (22, Protocol::Tcp),
                (53, Protocol::Tcp),
                (53, Protocol::Udp),
                (8080, Protocol::Tcp),
            ]
        );
    }

    #[test]
    fn slow_consumer_gets_only_the_latest_snapshot() {
        let batches = (0..10)
            .map(|i| {
                Ok((
                    vec![sock(100, "curl", 40000, "8.8.8.8", 443, i * 1000, 0)],
                    vec![],
                ))
            })
            .collect();
        let c = Collector::new(ScriptedSampler::new(batches), Duration::from_secs(1));
        let rx = lock(&c.snap_rx).take().unwrap();

        for i in 0..10 {
            c.poll_at(at(i));
        }

        let snap = rx.try_recv().expect("latest snapshot present");
        assert_eq!(snap.timestamp, at(9));
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn fast_consumer_sees_every_snapshot_in_order() {
        let batches = (0..10).map(|_| Ok((vec![], vec![]))).collect();
        let c = Collector::new(ScriptedSampler::new(batches), Duration::from_secs(1));
        let rx = lock(&c.snap_rx).take().unwrap();

        for i in 0..10 {
            c.poll_at(at(i));
            let snap = take(&rx);
            assert_eq!(snap.timestamp, at(i));
        }
    }

    #[test]
    fn monotone_cumulative_totals() {
        let batches = (0..6)
            .map(|i| {
                Ok((
                    vec![sock(100, "curl", 40000, "8.8.8.8", 443, i * 500, i * 250)],
                    vec![],
                ))
            })
            .collect();
        let c = Collector::new(ScriptedSampler::new(batches), Duration::from_secs(1));

        let mut prev = (0u64, 0u64);
        for i in 0..6 {
            c.poll_at(at(i));
            let stats = c.session_stats();
            assert!(stats.total_up >= prev.0);
            assert!(stats.total_down >= prev.1);
            prev = (stats.total_up, stats.total_down);
        }
        assert_eq!(prev, (2500, 1250));
    }

    #[test]
    fn sampler_error_skips_the_poll() {
        let c = Collector::new(
            ScriptedSampler::new(vec![
                Err(crate::error::Error::Sampler("boom".into())),
                Ok((vec![], vec![])),
            ]),
            Duration::from_secs(1),
        );
        let rx = lock(&c.snap_rx).take().unwrap();

        c.poll_at(at(0));
        assert!(rx.try_recv().is_none(), "failed poll must not publish");
        assert!(lock(&c.inner.state).last_poll.is_none());

        c.poll_at(at(1));
        assert!(rx.try_recv().is_some());
    }

    #[test]
    fn interval_accessor_and_clamp() {
        let c = Collector::new(
            ScriptedSampler::new(vec![]),
            Duration::from_millis(10),
        );
        assert_eq!(c.interval(), MIN_INTERVAL);
    }

    #[test]
    fn proc_history_grows_then_follows_liveness() {
        let live = |pid: u32| Ok((vec![sock(pid, "p", 40000, "8.8.8.8", 443, 0, 0)], vec![]));
        let c = Collector::new(
            ScriptedSampler::new(vec![live(1), live(1), live(2)]),
            Duration::from_secs(1),
        );

        c.poll_at(at(0));
        c.poll_at(at(1));
        {
            let state = lock(&c.inner.state);
            assert_eq!(state.proc_history.get(&1).map(|h| h.len()), Some(2));
        }

        // PID 1 vanished; its history buffer goes with it.
        c.poll_at(at(2));
        let state = lock(&c.inner.state);
        assert!(!state.proc_history.contains_key(&1));
        assert!(state.proc_history.contains_key(&2));
    }

    #[test]
    fn safe_delta_clamps_regressions() {
        assert_eq!(safe_delta(200, 100), 100);
        assert_eq!(safe_delta(100, 100), 0);
        assert_eq!(safe_delta(50, 100), 0);
    }
}
