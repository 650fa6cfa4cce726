//! Background reverse-DNS cache.
//!
//! `resolve` never blocks the poll: a cache hit returns the name, a miss
//! enqueues the address for a worker thread and returns an empty string.
//! Failed lookups are negatively cached so they are not retried every poll.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

pub struct DnsCache {
    cache: Arc<Mutex<HashMap<IpAddr, String>>>,
    pending: Mutex<HashSet<IpAddr>>,
    tx: Mutex<mpsc::Sender<IpAddr>>,
}

impl DnsCache {
    pub fn new() -> Self {
        let cache: Arc<Mutex<HashMap<IpAddr, String>>> = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = mpsc::channel::<IpAddr>();

        let worker_cache = cache.clone();
        thread::spawn(move || {
            for ip in rx {
                let name = dns_lookup::lookup_addr(&ip).unwrap_or_default();
                if let Ok(mut map) = worker_cache.lock() {
                    map.insert(ip, name);
                }
            }
        });

        Self {
            cache,
            pending: Mutex::new(HashSet::new()),
            tx: Mutex::new(tx),
        }
    }

    /// Returns the cached hostname for `ip`, or empty while unresolved.
    pub fn resolve(&self, ip: IpAddr) -> String {
        if let Ok(map) = self.cache.lock() {
            if let Some(name) = map.get(&ip) {
                return name.clone();
            }
        }
        if let Ok(mut pending) = self.pending.lock() {
            if pending.insert(ip) {
                // Worker gone means we just keep returning empty names.
                if let Ok(tx) = self.tx.lock() {
                    let _ = tx.send(ip);
                }
            }
        }
        String::new()
    }

    /// Seeds an entry directly, bypassing the worker. Used by tests.
    #[cfg(test)]
    pub fn insert(&self, ip: IpAddr, name: &str) {
        if let Ok(mut map) = self.cache.lock() {
            map.insert(ip, name.to_string());
        }
    }
}

impl Default for DnsCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_returns_empty_and_hit_returns_name() {
        let cache = DnsCache::new();
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        assert_eq!(cache.resolve(ip), "");

        cache.insert(ip, "example.test");
        assert_eq!(cache.resolve(ip), "example.test");
    }
}
