//! Non-interactive streaming exporters: line-delimited JSON and CSV.

use std::io::Write;

use chrono::SecondsFormat;

use crate::error::Result;
use crate::model::Snapshot;

/// Writes one snapshot as a single JSON line (NDJSON).
pub fn write_json<W: Write>(w: &mut W, snap: &Snapshot) -> Result<()> {
    serde_json::to_writer(&mut *w, snap)?;
    w.write_all(b"\n")?;
    w.flush()?;
    Ok(())
}

/// Writes snapshots as CSV, one row per process.
pub struct CsvWriter<W: Write> {
    writer: csv::Writer<W>,
    wrote_header: bool,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(w: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(w),
            wrote_header: false,
        }
    }

    pub fn write(&mut self, snap: &Snapshot) -> Result<()> {
        if !self.wrote_header {
            self.writer.write_record([
                "timestamp",
                "pid",
                "process",
                "upload_bps",
                "download_bps",
                "connections",
                "listen_ports",
            ])?;
            self.wrote_header = true;
        }

        let ts = snap.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        for p in &snap.processes {
            self.writer.write_record([
                ts.clone(),
                p.pid.to_string(),
                p.name.clone(),
                format!("{:.0}", p.up_rate),
                format!("{:.0}", p.down_rate),
                p.conn_count.to_string(),
                p.listen_count.to_string(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcessSummary;
    use chrono::{TimeZone, Utc};

    fn snap_with_proc() -> Snapshot {
        Snapshot {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
            processes: vec![ProcessSummary {
                pid: 42,
                ppid: 1,
                name: "curl".into(),
                cmdline: "curl https://example.com".into(),
                up_rate: 1234.6,
                down_rate: 99.2,
                connections: Vec::new(),
                listen_ports: Vec::new(),
                conn_count: 1,
                listen_count: 0,
                cum_up: 0,
                cum_down: 0,
                container_id: String::new(),
                service_name: String::new(),
                rate_history: Vec::new(),
            }],
            interfaces: Vec::new(),
            remote_hosts: Vec::new(),
            listen_ports: Vec::new(),
            total_up: 1234.6,
            total_down: 99.2,
            total_rate_history: Vec::new(),
            active_iface: String::new(),
        }
    }

    #[test]
    fn json_is_one_line_per_snapshot() {
        let mut buf = Vec::new();
        write_json(&mut buf, &snap_with_proc()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.matches('\n').count(), 1);
        assert!(text.contains("\"total_up\":1234.6"));

        let back: Snapshot = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(back.processes[0].pid, 42);
    }

    #[test]
    fn csv_header_once_then_rows() {
        let mut w = CsvWriter::new(Vec::new());
        w.write(&snap_with_proc()).unwrap();
        w.write(&snap_with_proc()).unwrap();

        let text = String::from_utf8(w.writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,pid,process"));
        assert!(lines[1].contains("42,curl,1235,99,1,0"));
    }
}
