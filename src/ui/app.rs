//! Application state for the TUI: current snapshot, active view,
//! selection, and mode badge.

use crossterm::event::KeyCode;

use crate::model::Snapshot;

/// Which table the content area shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Processes,
    RemoteHosts,
    ListenPorts,
}

impl View {
    pub fn next(self) -> Self {
        match self {
            Self::Processes => Self::RemoteHosts,
            Self::RemoteHosts => Self::ListenPorts,
            Self::ListenPorts => Self::Processes,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Processes => "Processes",
            Self::RemoteHosts => "Remote Hosts",
            Self::ListenPorts => "Listen Ports",
        }
    }
}

/// Where snapshots come from, shown in the header badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Live,
    Recording,
    /// Playback of the named recording.
    Playback(String),
}

pub struct App {
    pub snapshot: Option<Snapshot>,
    pub view: View,
    pub selected: usize,
    pub mode: Mode,
    /// Set when the playback channel closed (end of recording).
    pub stream_ended: bool,
    pub playback_speed: f64,
    pub playback_paused: bool,
}

impl App {
    pub fn new(mode: Mode) -> Self {
        Self {
            snapshot: None,
            view: View::default(),
            selected: 0,
            mode,
            stream_ended: false,
            playback_speed: 1.0,
            playback_paused: false,
        }
    }

    pub fn on_snapshot(&mut self, snap: Snapshot) {
        self.snapshot = Some(snap);
        self.clamp_selection();
    }

    /// Handles a navigation key. Returns true when the app should quit;
    /// control keys (interval, speed, pause) are the caller's business.
    pub fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Tab => {
                self.view = self.view.next();
                self.selected = 0;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.selected += 1;
                self.clamp_selection();
            }
            _ => {}
        }
        false
    }

    /// Rows in the active view of the current snapshot.
    pub fn row_count(&self) -> usize {
        let Some(snap) = &self.snapshot else { return 0 };
        match self.view {
            View::Processes => snap.processes.len(),
            View::RemoteHosts => snap.remote_hosts.len(),
            View::ListenPorts => snap.listen_ports.len(),
        }
    }

    fn clamp_selection(&mut self) {
        let rows = self.row_count();
        if rows == 0 {
            self.selected = 0;
        } else if self.selected >= rows {
            self.selected = rows - 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn empty_snapshot() -> Snapshot {
        Snapshot {
            timestamp: Utc::now(),
            processes: Vec::new(),
            interfaces: Vec::new(),
            remote_hosts: Vec::new(),
            listen_ports: Vec::new(),
            total_up: 0.0,
            total_down: 0.0,
            total_rate_history: Vec::new(),
            active_iface: String::new(),
        }
    }

    #[test]
    fn view_cycles_through_all_three() {
        let v = View::Processes;
        assert_eq!(v.next(), View::RemoteHosts);
        assert_eq!(v.next().next(), View::ListenPorts);
        assert_eq!(v.next().next().next(), View::Processes);
    }

    #[test]
    fn quit_keys() {
        let mut app = App::new(Mode::Live);
        assert!(app.handle_key(KeyCode::Char('q')));
        assert!(app.handle_key(KeyCode::Esc));
        assert!(!app.handle_key(KeyCode::Tab));
    }

    #[test]
    fn selection_clamps_to_rows() {
        let mut app = App::new(Mode::Live);
        app.on_snapshot(empty_snapshot());
        app.handle_key(KeyCode::Down);
        assert_eq!(app.selected, 0);

        app.handle_key(KeyCode::Up);
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn tab_resets_selection() {
        let mut app = App::new(Mode::Live);
        app.selected = 5;
        app.handle_key(KeyCode::Tab);
        assert_eq!(app.view, View::RemoteHosts);
        assert_eq!(app.selected, 0);
    }
}
