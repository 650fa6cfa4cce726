//! Session recording and playback.
//!
//! A recording is a gzip stream of line-delimited JSON records, one
//! snapshot per line: `{"ts": <RFC-3339>, "snap": {...}}`. The format is
//! textual so `zcat | jq` and post-hoc diffing stay practical, and
//! readers ignore unknown fields, keeping it forward compatible.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::collector::channel::{self, Receiver};
use crate::error::{Error, Result};
use crate::model::Snapshot;

/// Playback speed bounds.
pub const MIN_SPEED: f64 = 0.25;
pub const MAX_SPEED: f64 = 16.0;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One line of the wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
    ts: DateTime<Utc>,
    snap: Snapshot,
}

/// Writes snapshots to a gzipped JSONL file.
///
/// Serialized by its own lock so the pass-through and any external
/// producer can share one recorder.
pub struct Recorder {
    gz: Mutex<Option<GzEncoder<File>>>,
}

impl Recorder {
    /// Creates a recording at `path`, truncating any existing file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            gz: Mutex::new(Some(GzEncoder::new(file, Compression::default()))),
        })
    }

    /// Appends a single snapshot.
    pub fn write(&self, snap: &Snapshot) -> Result<()> {
        let mut guard = lock(&self.gz);
        let Some(gz) = guard.as_mut() else {
            return Ok(()); // closed; late writes are dropped
        };
        let record = Record {
            ts: snap.timestamp,
            snap: snap.clone(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        gz.write_all(&line)?;
        Ok(())
    }

    /// Finishes the compressed stream and closes the file. Idempotent.
    pub fn close(&self) -> Result<()> {
        if let Some(gz) = lock(&self.gz).take() {
            let mut file = gz.finish()?;
            file.flush()?;
        }
        Ok(())
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Interposes a recorder on a snapshot channel.
///
/// Every upstream snapshot is written to `path` and forwarded downstream
/// with the same drop-oldest policy the driver uses. A write error is
/// logged and does not stop the pass-through. The downstream channel
/// closes when the upstream one does.
pub fn record_session<P: AsRef<Path>>(
    upstream: Receiver<Snapshot>,
    path: P,
) -> Result<(Receiver<Snapshot>, Arc<Recorder>)> {
    let recorder = Arc::new(Recorder::create(path)?);
    let (tx, rx) = channel::channel();

    let rec = recorder.clone();
    thread::spawn(move || {
        while let Some(snap) = upstream.recv() {
            if let Err(e) = rec.write(&snap) {
                tracing::warn!("recorder write failed: {e}");
            }
            tx.publish(snap);
        }
        if let Err(e) = rec.close() {
            tracing::warn!("recorder close failed: {e}");
        }
        tx.close();
    });

    Ok((rx, recorder))
}

struct PlayerShared {
    speed: f64,
    paused: bool,
}

/// Replays a recording at a configurable speed.
///
/// All records are decoded into memory at open; recordings are bounded by
/// session length. A malformed record stops decoding and the successfully
/// decoded prefix is kept.
pub struct Player {
    records: Arc<Vec<Record>>,
    shared: Arc<Mutex<PlayerShared>>,
}

impl Player {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)
            .map_err(|e| Error::PlayerOpen(format!("{}: {e}", path.as_ref().display())))?;

        let mut content = String::new();
        GzDecoder::new(file)
            .read_to_string(&mut content)
            .map_err(|e| Error::PlayerOpen(format!("decompress: {e}")))?;

        let mut records = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(line) {
                Ok(rec) => records.push(rec),
                Err(e) => {
                    tracing::warn!("malformed record after {} entries: {e}", records.len());
                    break;
                }
            }
        }

        Ok(Self {
            records: Arc::new(records),
            shared: Arc::new(Mutex::new(PlayerShared {
                speed: 1.0,
                paused: false,
            })),
        })
    }

    /// Number of recorded snapshots.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Starts playback, pacing snapshots by their recorded spacing divided
    /// by the current speed. Each emitted snapshot gets a wall-clock
    /// timestamp so downstream views show live clocks. The channel closes
    /// after the last record; an empty recording closes immediately.
    pub fn play(&self) -> mpsc::Receiver<Snapshot> {
        let (tx, rx) = mpsc::sync_channel(1);
        let records = self.records.clone();
        let shared = self.shared.clone();

        thread::spawn(move || {
            for i in 0..records.len() {
                while lock(&shared).paused {
                    thread::sleep(Duration::from_millis(100));
                }

                let mut snap = records[i].snap.clone();
                snap.timestamp = Utc::now();
                if tx.send(snap).is_err() {
                    return; // consumer went away
                }

                if let Some(next) = records.get(i + 1) {
                    let gap = (next.ts - records[i].ts).to_std().unwrap_or_default();
                    let speed = lock(&shared).speed;
                    if !gap.is_zero() && speed > 0.0 {
                        thread::sleep(Duration::from_secs_f64(gap.as_secs_f64() / speed));
                    }
                }
            }
        });

        rx
    }

    /// Sets the playback speed, clamped to `[0.25, 16]`.
    pub fn set_speed(&self, s: f64) {
        lock(&self.shared).speed = s.clamp(MIN_SPEED, MAX_SPEED);
    }

    pub fn speed(&self) -> f64 {
        lock(&self.shared).speed
    }

    pub fn toggle_pause(&self) {
        let mut shared = lock(&self.shared);
        shared.paused = !shared.paused;
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.shared).paused
    }
}
