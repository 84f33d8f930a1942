//! The game screen: the field with the ball on top, each player's filtered
//! signal and spectrum below, and a status line.

use crate::control::{BallSnapshot, GameState, Side};
use crate::gui::GuiError;
use crate::monitor::{Monitor, MonitorError, MonitorEvent};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::warn;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame, Terminal,
};
use std::{io, time::Duration};

const TICK_RATE: Duration = Duration::from_millis(50);

const PLAYER_COLORS: [Color; 2] = [Color::Yellow, Color::Blue];

/// What a key press asks the event loop to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep drawing.
    Continue,
    /// Leave the screen.
    Quit,
}

/// Runs the game screen until the user quits. The terminal is restored
/// even when drawing fails.
pub fn run(monitor: &mut Monitor) -> Result<(), GuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let res = run_app(&mut terminal, monitor, TICK_RATE);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    res
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    monitor: &mut Monitor,
    tick_rate: Duration,
) -> Result<(), GuiError> {
    let mut status = String::from("press p to play");
    loop {
        for event in monitor.poll() {
            status = describe(&event);
        }
        let view = View::capture(monitor);
        terminal.draw(|f| ui(f, &view, &status))?;

        if !event::poll(tick_rate)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match handle_key(monitor, key.code) {
                Ok(Flow::Quit) => return Ok(()),
                Ok(Flow::Continue) => {}
                Err(e) => {
                    warn!("{e}");
                    status = e.to_string();
                }
            }
        }
    }
}

/// Maps a key to a monitor action.
pub fn handle_key(monitor: &mut Monitor, code: KeyCode) -> Result<Flow, MonitorError> {
    match code {
        KeyCode::Char('s') => monitor.start()?,
        KeyCode::Char('t') => {
            monitor.stop();
        }
        KeyCode::Char('p') => monitor.start_game()?,
        KeyCode::Char('r') => monitor.reset()?,
        KeyCode::Char('q') | KeyCode::Esc => return Ok(Flow::Quit),
        _ => {}
    }
    Ok(Flow::Continue)
}

fn describe(event: &MonitorEvent) -> String {
    match event {
        MonitorEvent::WinnerDeclared(side) => {
            format!("GOAL! player {} ({side}) wins, r to reset", side.channel() + 1)
        }
        MonitorEvent::DeviceError { channel, error } => {
            format!("player {}: {error}", channel + 1)
        }
    }
}

/// Everything one frame draws, copied out of the monitor.
struct View {
    ball: BallSnapshot,
    running: bool,
    signals: Vec<Vec<(f64, f64)>>,
    spectra: Vec<Vec<(f64, f64)>>,
    powers: Vec<Option<f64>>,
}

impl View {
    fn capture(monitor: &Monitor) -> Self {
        let frames = monitor.frames();
        Self {
            ball: monitor.current_state(),
            running: monitor.is_running(),
            signals: frames
                .iter()
                .map(|f| {
                    let s = &f.signal;
                    s.times.iter().copied().zip(s.values.iter().copied()).collect()
                })
                .collect(),
            spectra: frames
                .iter()
                .map(|f| {
                    f.spectrum
                        .iter()
                        .flat_map(|s| s.bins.iter().map(|b| (b.frequency_hz, b.power)))
                        .collect()
                })
                .collect(),
            powers: frames.iter().map(|f| f.band_power).collect(),
        }
    }
}

/// Outline of the field: touch lines, halfway line and both goals.
pub fn field_lines() -> Vec<Vec<(f64, f64)>> {
    let goal = |side: f64| {
        vec![
            (side, 0.2),
            (side * 1.1, 0.2),
            (side * 1.1, -0.2),
            (side, -0.2),
        ]
    };
    vec![
        vec![(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0)],
        vec![(0.0, -1.0), (0.0, 1.0)],
        goal(-1.0),
        goal(1.0),
    ]
}

/// Bounds that fit every finite value, widened when they would be empty.
pub fn axis_bounds(values: impl IntoIterator<Item = f64>) -> [f64; 2] {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        [0.0, 1.0]
    } else if lo == hi {
        [lo - 1.0, hi + 1.0]
    } else {
        [lo, hi]
    }
}

fn labels(bounds: [f64; 2]) -> Vec<Span<'static>> {
    let mid = (bounds[0] + bounds[1]) / 2.0;
    [bounds[0], mid, bounds[1]]
        .iter()
        .map(|v| Span::from(format!("{v:.2}")))
        .collect()
}

fn ui(f: &mut Frame, view: &View, status: &str) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(50),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .split(f.size());

    draw_field(f, rows[0], &view.ball);

    let players = view.signals.len().max(1);
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(vec![Constraint::Ratio(1, players as u32); players])
        .split(rows[1]);
    for (i, pane) in panes.iter().enumerate().take(view.signals.len()) {
        draw_player(f, *pane, view, i);
    }

    draw_status(f, rows[2], view, status);
}

fn draw_field(f: &mut Frame, area: Rect, ball: &BallSnapshot) {
    let lines = field_lines();
    let ball_point = [(ball.x, ball.y)];
    let ball_color = match ball.winner {
        Some(side) => PLAYER_COLORS[side.channel()],
        None => Color::White,
    };

    let mut datasets: Vec<Dataset> = lines
        .iter()
        .map(|l| {
            Dataset::default()
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(Color::Green))
                .data(l)
        })
        .collect();
    datasets.push(
        Dataset::default()
            .name("ball")
            .marker(symbols::Marker::Block)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(ball_color))
            .data(&ball_point),
    );

    let chart = Chart::new(datasets)
        .block(Block::default().title(" Mindball ").borders(Borders::ALL))
        .x_axis(Axis::default().bounds([-1.2, 1.2]))
        .y_axis(Axis::default().bounds([-1.1, 1.1]));
    f.render_widget(chart, area);
}

fn draw_player(f: &mut Frame, area: Rect, view: &View, i: usize) {
    let halves = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    let color = PLAYER_COLORS[i % PLAYER_COLORS.len()];
    let power = match view.powers[i] {
        Some(p) => format!("{p:.3}"),
        None => "-".to_string(),
    };

    for (data, half, title, x_name) in [
        (&view.signals[i], halves[0], format!(" Player {} signal ", i + 1), "s"),
        (&view.spectra[i], halves[1], format!(" Spectrum, band power {power} "), "Hz"),
    ] {
        let x_bounds = axis_bounds(data.iter().map(|p| p.0));
        let y_bounds = axis_bounds(data.iter().map(|p| p.1));
        let chart = Chart::new(vec![Dataset::default()
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(color))
            .data(data)])
        .block(Block::default().title(title).borders(Borders::ALL))
        .x_axis(
            Axis::default()
                .title(x_name)
                .style(Style::default().fg(Color::Gray))
                .bounds(x_bounds)
                .labels(labels(x_bounds)),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds(y_bounds)
                .labels(labels(y_bounds)),
        );
        f.render_widget(chart, half);
    }
}

fn draw_status(f: &mut Frame, area: Rect, view: &View, status: &str) {
    let state = match (view.ball.state, view.ball.winner) {
        (GameState::WinnerDeclared, Some(Side::Left)) => "player 1 won".to_string(),
        (GameState::WinnerDeclared, Some(Side::Right)) => "player 2 won".to_string(),
        (state, _) => state.to_string(),
    };
    let measuring = if view.running { "measuring" } else { "stopped" };
    let line = Line::from(vec![
        Span::styled(state, Style::default().add_modifier(Modifier::BOLD)),
        format!(" | {measuring} | x {:+.2} | ", view.ball.raw_x).into(),
        status.to_string().into(),
        " | s start  t stop  p play  r reset  q quit".into(),
    ]);
    f.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}
