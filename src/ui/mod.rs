//! Terminal UI rendering.
//!
//! Pure consumer of [`Snapshot`]s: the draw pass reads the latest
//! snapshot out of the [`App`] and renders the header, the active table,
//! and the key-hint footer.

pub mod app;
pub mod format;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use ratatui::Frame;

use crate::model::{ProcessSummary, Snapshot};

use self::app::{App, Mode, View};
use self::format::{fmt_rate, sparkline, truncate};

use crate::model::fmt_bytes;

const HEADER_STYLE: Style = Style::new().fg(Color::Cyan).add_modifier(Modifier::BOLD);
const UP_STYLE: Style = Style::new().fg(Color::Green);
const DOWN_STYLE: Style = Style::new().fg(Color::Magenta);

/// Main draw pass.
pub fn draw(f: &mut Frame, app: &App) {
    let area = f.area();
    if area.width == 0 || area.height == 0 {
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    draw_header(f, app, chunks[0]);
    match app.view {
        View::Processes => draw_processes(f, app, chunks[1]),
        View::RemoteHosts => draw_remote_hosts(f, app, chunks[1]),
        View::ListenPorts => draw_listen_ports(f, app, chunks[1]),
    }
    draw_footer(f, app, chunks[2]);
}

fn mode_badge(app: &App) -> String {
    match &app.mode {
        Mode::Live => "LIVE".to_string(),
        Mode::Recording => "REC".to_string(),
        Mode::Playback(name) => {
            let state = if app.stream_ended {
                "done"
            } else if app.playback_paused {
                "paused"
            } else {
                "playing"
            };
            format!("PLAY {name} {:.2}x {state}", app.playback_speed)
        }
    }
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let (total_up, total_down, history, iface) = match &app.snapshot {
        Some(s) => (
            s.total_up,
            s.total_down,
            s.total_rate_history.as_slice(),
            s.active_iface.as_str(),
        ),
        None => (0.0, 0.0, &[] as &[f64], ""),
    };

    let mut title = vec![
        Span::styled("conntop", HEADER_STYLE),
        Span::raw(format!("  [{}]", mode_badge(app))),
    ];
    if !iface.is_empty() {
        title.push(Span::raw(format!("  {iface}")));
    }
    let rates = Line::from(vec![
        Span::styled(format!("▲ {}", fmt_rate(total_up)), UP_STYLE),
        Span::raw("  "),
        Span::styled(format!("▼ {}", fmt_rate(total_down)), DOWN_STYLE),
        Span::raw("  "),
        Span::raw(sparkline(history, area.width.saturating_sub(30) as usize)),
    ]);

    let para = Paragraph::new(vec![Line::from(title), rates]);
    f.render_widget(para, area);
}

fn row_style(selected: bool) -> Style {
    if selected {
        Style::new().add_modifier(Modifier::REVERSED)
    } else {
        Style::new()
    }
}

/// Processes sorted by total rate for display, busiest first.
fn sorted_processes(snap: &Snapshot) -> Vec<&ProcessSummary> {
    let mut procs: Vec<&ProcessSummary> = snap.processes.iter().collect();
    procs.sort_by(|a, b| {
        (b.up_rate + b.down_rate)
            .partial_cmp(&(a.up_rate + a.down_rate))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.pid.cmp(&b.pid))
    });
    procs
}

fn draw_processes(f: &mut Frame, app: &App, area: Rect) {
    let header = Row::new([
        "PID", "PROCESS", "CONN", "LISTEN", "▲ RATE", "▼ RATE", "▲ TOTAL", "▼ TOTAL", "GROUP",
    ])
    .style(HEADER_STYLE);

    let mut rows = Vec::new();
    if let Some(snap) = &app.snapshot {
        for (i, p) in sorted_processes(snap).into_iter().enumerate() {
            let group = if !p.container_id.is_empty() {
                format!("⬢ {}", p.container_id)
            } else {
                p.service_name.clone()
            };
            rows.push(
                Row::new([
                    Cell::from(p.pid.to_string()),
                    Cell::from(truncate(&p.name, 18)),
                    Cell::from(p.conn_count.to_string()),
                    Cell::from(p.listen_count.to_string()),
                    Cell::from(fmt_rate(p.up_rate)),
                    Cell::from(fmt_rate(p.down_rate)),
                    Cell::from(fmt_bytes(p.cum_up)),
                    Cell::from(fmt_bytes(p.cum_down)),
                    Cell::from(truncate(&group, 20)),
                ])
                .style(row_style(i == app.selected)),
            );
        }
    }

    let table = Table::new(
        rows,
        [
            Constraint::Length(7),
            Constraint::Min(12),
            Constraint::Length(5),
            Constraint::Length(6),
            Constraint::Length(11),
            Constraint::Length(11),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(titled_block(app));

    f.render_widget(table, area);
}

fn draw_remote_hosts(f: &mut Frame, app: &App, area: Rect) {
    let header =
        Row::new(["HOST", "GEO", "CONN", "▲ RATE", "▼ RATE", "PROCESSES"]).style(HEADER_STYLE);

    let mut rows = Vec::new();
    if let Some(snap) = &app.snapshot {
        for (i, h) in snap.remote_hosts.iter().enumerate() {
            let host = if h.host.is_empty() {
                h.ip.to_string()
            } else {
                h.host.clone()
            };
            rows.push(
                Row::new([
                    Cell::from(truncate(&host, 36)),
                    Cell::from(h.country.clone()),
                    Cell::from(h.conn_count.to_string()),
                    Cell::from(fmt_rate(h.up_rate)),
                    Cell::from(fmt_rate(h.down_rate)),
                    Cell::from(truncate(&h.processes.join(","), 30)),
                ])
                .style(row_style(i == app.selected)),
            );
        }
    }

    let table = Table::new(
        rows,
        [
            Constraint::Min(24),
            Constraint::Length(8),
            Constraint::Length(5),
            Constraint::Length(11),
            Constraint::Length(11),
            Constraint::Min(16),
        ],
    )
    .header(header)
    .block(titled_block(app));

    f.render_widget(table, area);
}

fn draw_listen_ports(f: &mut Frame, app: &App, area: Rect) {
    let header = Row::new(["PORT", "PROTO", "BIND", "PID", "PROCESS"]).style(HEADER_STYLE);

    let mut rows = Vec::new();
    if let Some(snap) = &app.snapshot {
        for (i, e) in snap.listen_ports.iter().enumerate() {
            rows.push(
                Row::new([
                    Cell::from(e.port.to_string()),
                    Cell::from(e.proto.to_string()),
                    Cell::from(crate::platform::format_addr(e.ip, e.port)),
                    Cell::from(e.pid.to_string()),
                    Cell::from(truncate(&e.process, 24)),
                ])
                .style(row_style(i == app.selected)),
            );
        }
    }

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Min(16),
            Constraint::Length(7),
            Constraint::Min(12),
        ],
    )
    .header(header)
    .block(titled_block(app));

    f.render_widget(table, area);
}

fn titled_block(app: &App) -> Block<'static> {
    Block::default()
        .borders(Borders::TOP)
        .title(format!(" {} ({}) ", app.view.title(), app.row_count()))
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let hints = match app.mode {
        Mode::Playback(_) => "q quit · Tab view · ↑/↓ select · Space pause · [ ] speed",
        _ => "q quit · Tab view · ↑/↓ select · +/- interval",
    };
    let para = Paragraph::new(Line::from(Span::styled(
        hints,
        Style::new().fg(Color::DarkGray),
    )));
    f.render_widget(para, area);
}
