//! Terminal picker for the players' serial ports.

use crate::gui::GuiError;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};
use std::{io::stdout, path::PathBuf, time::Duration};

/// Where a [`Selector`] stands after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// More ports are still to be picked.
    Pending,
    /// One port per player, in player order.
    Done(Vec<PathBuf>),
    /// The user quit, or there was nothing to pick.
    Cancelled,
}

/// Picks one port per player from a list, in player order.
#[derive(Debug)]
pub struct Selector {
    ports: Vec<PathBuf>,
    wanted: usize,
    cursor: usize,
    chosen: Vec<usize>,
}

impl Selector {
    /// Asks for `wanted` ports, or for all of them if there are fewer.
    pub fn new(ports: Vec<PathBuf>, wanted: usize) -> Self {
        let wanted = wanted.min(ports.len());
        Self {
            ports,
            wanted,
            cursor: 0,
            chosen: Vec::new(),
        }
    }

    /// Index of the highlighted port.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The player a port was picked for, counting from 1.
    pub fn player_of(&self, port: usize) -> Option<usize> {
        self.chosen.iter().position(|&c| c == port).map(|p| p + 1)
    }

    /// Applies one key press. `Enter` picks the highlighted port for the
    /// next player, or takes it back if it was already picked.
    pub fn key(&mut self, code: KeyCode) -> Selection {
        let n_ports = self.ports.len();
        if n_ports == 0 {
            return Selection::Cancelled;
        }
        match code {
            KeyCode::Down => self.cursor = (self.cursor + 1) % n_ports,
            KeyCode::Up => self.cursor = (self.cursor + n_ports - 1) % n_ports,
            KeyCode::Enter => {
                // picking a port twice takes it back
                match self.chosen.iter().position(|&c| c == self.cursor) {
                    Some(i) => {
                        self.chosen.remove(i);
                    }
                    None => self.chosen.push(self.cursor),
                }
                if self.chosen.len() == self.wanted {
                    let picked = self.chosen.iter().map(|&i| self.ports[i].clone()).collect();
                    return Selection::Done(picked);
                }
            }
            KeyCode::Char('q') | KeyCode::Esc => return Selection::Cancelled,
            _ => {}
        }
        Selection::Pending
    }

    fn render(&self, frame: &mut Frame, list_state: &mut ListState) {
        let title = Title::from(
            format!(" Device for player {} ", self.chosen.len() + 1)
                .magenta()
                .bold(),
        );
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".magenta().bold(),
            " Pick ".into(),
            "<Enter>".magenta().bold(),
            " Quit ".into(),
            "<Q> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let items = self.ports.iter().enumerate().map(|(i, p)| {
            let marker = match self.player_of(i) {
                Some(player) => format!("[{player}] "),
                None => "    ".to_string(),
            };
            format!("{marker}{}", p.to_string_lossy())
        });
        let list = List::new(items)
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Magenta))
            .block(block);
        list_state.select(Some(self.cursor));
        frame.render_stateful_widget(list, frame.size(), list_state);
    }
}

/// Lets the user pick `wanted` serial ports in the terminal. Returns `None`
/// if they quit, or if there is nothing to pick from.
pub fn select_devices(
    ports: Vec<PathBuf>,
    wanted: usize,
) -> Result<Option<Vec<PathBuf>>, GuiError> {
    if ports.is_empty() || wanted == 0 {
        return Ok(None);
    }
    let mut selector = Selector::new(ports, wanted);

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let res = run_selector(&mut selector);
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    res
}

fn run_selector(selector: &mut Selector) -> Result<Option<Vec<PathBuf>>, GuiError> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;
    let mut list_state = ListState::default().with_selected(Some(selector.cursor()));

    loop {
        terminal.draw(|frame| selector.render(frame, &mut list_state))?;
        if !event::poll(Duration::from_millis(16))? {
            continue;
        }
        if let event::Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match selector.key(key.code) {
                Selection::Pending => {}
                Selection::Done(ports) => return Ok(Some(ports)),
                Selection::Cancelled => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports() -> Vec<PathBuf> {
        ["/dev/ttyACM0", "/dev/ttyACM1", "/dev/ttyUSB0"]
            .iter()
            .map(PathBuf::from)
            .collect()
    }

    #[test]
    fn picks_in_player_order() {
        let mut selector = Selector::new(ports(), 2);
        assert_eq!(selector.key(KeyCode::Up), Selection::Pending);
        assert_eq!(selector.cursor(), 2);
        assert_eq!(selector.key(KeyCode::Enter), Selection::Pending);
        assert_eq!(selector.player_of(2), Some(1));

        selector.key(KeyCode::Down);
        assert_eq!(
            selector.key(KeyCode::Enter),
            Selection::Done(vec![
                PathBuf::from("/dev/ttyUSB0"),
                PathBuf::from("/dev/ttyACM0")
            ])
        );
    }

    #[test]
    fn picking_twice_takes_back() {
        let mut selector = Selector::new(ports(), 2);
        selector.key(KeyCode::Enter);
        selector.key(KeyCode::Enter);
        assert_eq!(selector.player_of(0), None);
        selector.key(KeyCode::Down);
        assert_eq!(
            selector.key(KeyCode::Enter),
            Selection::Pending
        );
        assert_eq!(selector.player_of(1), Some(1));
    }

    #[test]
    fn fewer_ports_than_players() {
        let mut selector = Selector::new(vec![PathBuf::from("/dev/ttyACM0")], 2);
        assert_eq!(
            selector.key(KeyCode::Enter),
            Selection::Done(vec![PathBuf::from("/dev/ttyACM0")])
        );
    }

    #[test]
    fn quit_cancels() {
        assert_eq!(Selector::new(ports(), 1).key(KeyCode::Char('q')), Selection::Cancelled);
        assert_eq!(Selector::new(Vec::new(), 1).key(KeyCode::Down), Selection::Cancelled);
    }
}
