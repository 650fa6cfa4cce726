//! conntop: per-process network activity monitor.
//!
//! Interactive TUI by default; `--json` / `--csv` stream line-structured
//! output instead; `--record` captures the session to a gzipped JSONL
//! file and `--playback` replays one.

use std::fs::File;
use std::io::stdout;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing_subscriber::EnvFilter;

use conntop::collector::{channel, Collector, MIN_INTERVAL};
use conntop::model::Snapshot;
use conntop::output::{self, CsvWriter};
use conntop::platform;
use conntop::recorder::{record_session, Player};
use conntop::ui::{
    self,
    app::{App, Mode},
};

const MAX_INTERVAL: Duration = Duration::from_secs(60);

/// conntop: per-process network activity monitor
#[derive(Parser, Debug)]
#[command(name = "conntop")]
#[command(version)]
#[command(about = "Per-process network activity monitor", long_about = None)]
struct Cli {
    /// Stream line-delimited JSON (one object per snapshot)
    #[arg(long, conflicts_with = "csv")]
    json: bool,

    /// Stream CSV (header + one row per process per snapshot)
    #[arg(long)]
    csv: bool,

    /// Exit after emitting one snapshot (streaming modes)
    #[arg(long)]
    once: bool,

    /// Poll interval, e.g. 2s, 500ms (minimum 100ms)
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    interval: Duration,

    /// Record the session to a file while running interactively
    #[arg(long, value_name = "PATH")]
    record: Option<PathBuf>,

    /// Replay a recorded session instead of live capture
    #[arg(long, value_name = "PATH", conflicts_with_all = ["json", "csv", "record", "once"])]
    playback: Option<PathBuf>,
}

/// Parses durations of the form `500ms`, `2s`, `1.5s`, `1m`.
/// A bare number means seconds.
fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    let (num, unit_ms) = if let Some(v) = s.strip_suffix("ms") {
        (v, 1.0)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1000.0)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60_000.0)
    } else {
        (s, 1000.0)
    };
    let n: f64 = num
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {s:?}"))?;
    if n < 0.0 || !n.is_finite() {
        return Err(format!("invalid duration: {s:?}"));
    }
    Ok(Duration::from_millis((n * unit_ms) as u64))
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let streaming = cli.json || cli.csv;
    init_logging(!streaming);

    if let Some(path) = &cli.playback {
        return run_playback(path);
    }

    let sampler = platform::new_sampler().context("init sampler")?;
    let collector = Collector::new(sampler, cli.interval);
    let snapshots = collector.start();

    if streaming {
        run_streaming(&snapshots, cli.json, cli.once)?;
        collector.stop();
        return Ok(());
    }

    let mut mode = Mode::Live;
    let (snapshots, _recorder) = match &cli.record {
        Some(path) => {
            let (rx, rec) =
                record_session(snapshots, path).context("open record file")?;
            mode = Mode::Recording;
            (rx, Some(rec))
        }
        None => (snapshots, None),
    };

    run_tui(Source::Slot(snapshots), Some(&collector), None, mode)?;
    collector.stop();

    let summary = collector.session_stats().summary();
    if !summary.is_empty() {
        print!("{summary}");
    }
    Ok(())
}

fn run_playback(path: &Path) -> Result<()> {
    let player = Player::open(path)?;
    if player.is_empty() {
        bail!("recording is empty, nothing to play");
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let rx = player.play();
    run_tui(Source::Chan(rx), None, Some(&player), Mode::Playback(name))
}

/// Snapshot source for the TUI loop: the collector's one-slot channel or
/// the player's paced channel.
enum Source {
    Slot(channel::Receiver<Snapshot>),
    Chan(mpsc::Receiver<Snapshot>),
}

enum Pull {
    Item(Box<Snapshot>),
    Empty,
    Closed,
}

impl Source {
    fn pull(&self) -> Pull {
        match self {
            Self::Slot(rx) => match rx.try_recv() {
                Some(snap) => Pull::Item(Box::new(snap)),
                None if rx.is_closed() => Pull::Closed,
                None => Pull::Empty,
            },
            Self::Chan(rx) => match rx.try_recv() {
                Ok(snap) => Pull::Item(Box::new(snap)),
                Err(mpsc::TryRecvError::Empty) => Pull::Empty,
                Err(mpsc::TryRecvError::Disconnected) => Pull::Closed,
            },
        }
    }
}

fn run_tui(
    source: Source,
    collector: Option<&Collector>,
    player: Option<&Player>,
    mode: Mode,
) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;

    let result = tui_loop(&mut terminal, source, collector, player, mode);

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn tui_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    source: Source,
    collector: Option<&Collector>,
    player: Option<&Player>,
    mode: Mode,
) -> Result<()> {
    let mut app = App::new(mode);
    if let Some(p) = player {
        app.playback_speed = p.speed();
    }

    loop {
        loop {
            match source.pull() {
                Pull::Item(snap) => app.on_snapshot(*snap),
                Pull::Empty => break,
                Pull::Closed => {
                    // End of a recording pauses the view rather than
                    // exiting; a stopped live collector also lands here.
                    app.stream_ended = true;
                    break;
                }
            }
        }

        terminal.draw(|f| ui::draw(f, &app))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key.code {
            KeyCode::Char('+') | KeyCode::Char('=') => {
                if let Some(c) = collector {
                    c.set_interval((c.interval() / 2).max(MIN_INTERVAL));
                }
            }
            KeyCode::Char('-') => {
                if let Some(c) = collector {
                    c.set_interval((c.interval() * 2).min(MAX_INTERVAL));
                }
            }
            KeyCode::Char(' ') => {
                if let Some(p) = player {
                    p.toggle_pause();
                    app.playback_paused = p.is_paused();
                }
            }
            KeyCode::Char('[') => {
                if let Some(p) = player {
                    p.set_speed(p.speed() / 2.0);
                    app.playback_speed = p.speed();
                }
            }
            KeyCode::Char(']') => {
                if let Some(p) = player {
                    p.set_speed(p.speed() * 2.0);
                    app.playback_speed = p.speed();
                }
            }
            code => {
                if app.handle_key(code) {
                    return Ok(());
                }
            }
        }
    }
}

fn run_streaming(snapshots: &channel::Receiver<Snapshot>, json: bool, once: bool) -> Result<()> {
    let stdout = std::io::stdout();
    let mut csv = if json {
        None
    } else {
        Some(CsvWriter::new(stdout.lock()))
    };

    // The first poll carries no deltas, so its rates are all zero.
    let mut polls = 0usize;
    while let Some(snap) = snapshots.recv() {
        polls += 1;
        if polls < 2 {
            continue;
        }

        if let Some(csv) = csv.as_mut() {
            csv.write(&snap)?;
        } else {
            output::write_json(&mut std::io::stdout().lock(), &snap)?;
        }

        if once {
            return Ok(());
        }
    }
    Ok(())
}

/// Interactive mode logs to a file so the TUI terminal stays clean;
/// streaming mode logs to stderr.
fn init_logging(interactive: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if interactive {
        let path = std::env::temp_dir().join("conntop.log");
        if let Ok(file) = File::create(path) {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .try_init();
        }
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn duration_rejects_garbage() {
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn cli_conflicts() {
        assert!(Cli::try_parse_from(["conntop", "--json", "--csv"]).is_err());
        assert!(Cli::try_parse_from(["conntop", "--playback", "x", "--json"]).is_err());
        assert!(Cli::try_parse_from(["conntop", "--json", "--once"]).is_ok());
    }
}
