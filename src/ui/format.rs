//! Display formatting helpers for the TUI.

use crate::model::fmt_bytes;

const SPARK_CHARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Formats a rate in bytes/sec with a unit suffix.
pub fn fmt_rate(bps: f64) -> String {
    if bps < 1.0 {
        return "0 B/s".to_string();
    }
    format!("{}/s", fmt_bytes(bps as u64))
}

/// Renders a sparkline over the last `width` samples, scaled to the
/// window maximum.
pub fn sparkline(samples: &[f64], width: usize) -> String {
    if samples.is_empty() || width == 0 {
        return String::new();
    }

    let start = samples.len().saturating_sub(width);
    let window = &samples[start..];
    let max = window.iter().copied().fold(0.0_f64, f64::max);

    window
        .iter()
        .map(|&v| {
            if max <= 0.0 {
                SPARK_CHARS[0]
            } else {
                let idx = ((v / max) * 7.0).round() as usize;
                SPARK_CHARS[idx.min(7)]
            }
        })
        .collect()
}

/// Shortens a string to `max` chars with an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}
