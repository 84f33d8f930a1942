//! The game: a ball pushed along the x axis by the difference in band power
//! between the players, wandering randomly along y, until it crosses a goal
//! line.

use log::info;
use rand::Rng;
use std::{f64::consts::PI, fmt};
use thiserror::Error;

/// Where the goal lines sit. A ball past them has scored.
pub const GOAL_LINE: f64 = 1.0;

/// Fraction of an out-of-bounds `y` that is taken back per tick.
const REFLECTION: f64 = 0.3;

/// Where the game stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    /// Waiting for a start. The ball sits at the origin.
    Idle,
    /// The ball moves on every DSP tick.
    Playing,
    /// Someone scored. Only a reset leaves this state.
    WinnerDeclared,
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GameState::Idle => "idle",
            GameState::Playing => "playing",
            GameState::WinnerDeclared => "winner declared",
        };
        f.write_str(s)
    }
}

/// A player. Channel 0 is `Left`, channel 1 is `Right`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Scores by pushing the ball past `-GOAL_LINE`.
    Left,
    /// Scores by pushing the ball past `GOAL_LINE`.
    Right,
}

impl Side {
    /// The config channel this player reads from.
    pub fn channel(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// How many players, and so how the ball is pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    /// One player (`Side::Left`) pushes the ball with their band power alone.
    SingleChannel,
    /// Two players pull against each other.
    TwoChannel,
}

impl GameMode {
    /// Band powers needed per update.
    pub fn channels(self) -> usize {
        match self {
            GameMode::SingleChannel => 1,
            GameMode::TwoChannel => 2,
        }
    }

    /// One channel plays alone, anything else is a two-player game.
    pub fn for_channels(channels: usize) -> Self {
        if channels == 1 {
            GameMode::SingleChannel
        } else {
            GameMode::TwoChannel
        }
    }
}

/// A request the game could not honour.
#[derive(Debug, Error, PartialEq)]
pub enum ControlError {
    /// The action is not allowed from the current state.
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        /// The state the game was in.
        state: GameState,
        /// What was asked for.
        action: &'static str,
    },
    /// An update brought the wrong number of band powers.
    #[error("expected band power for {expected} channels, got {got}")]
    PowerCount {
        /// Channels in the current mode.
        expected: usize,
        /// Powers handed in.
        got: usize,
    },
}

/// Tuning of the ball's movement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSettings {
    /// One or two players.
    pub mode: GameMode,
    /// Scales band power into x movement.
    pub tuning_factor: f64,
    /// Standard deviation of the y jitter per tick.
    pub noise_scale: f64,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            mode: GameMode::TwoChannel,
            tuning_factor: 5.0,
            noise_scale: 0.05,
        }
    }
}

/// What the presentation layer needs to draw the field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallSnapshot {
    /// `x` clamped to the field, keeping its sign.
    pub x: f64,
    /// Sideways position, after reflection.
    pub y: f64,
    /// The unclamped position that decides the game.
    pub raw_x: f64,
    /// Current game state.
    pub state: GameState,
    /// Set once someone has scored.
    pub winner: Option<Side>,
}

/// The game state machine and the ball it moves.
pub struct ControlLoop {
    settings: ControlSettings,
    state: GameState,
    x: f64,
    y: f64,
    winner: Option<Side>,
}

impl ControlLoop {
    /// An idle game with the ball at the origin.
    pub fn new(settings: ControlSettings) -> Self {
        Self {
            settings,
            state: GameState::Idle,
            x: 0.0,
            y: 0.0,
            winner: None,
        }
    }

    /// The settings this game was built with.
    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    /// Current game state.
    pub fn state(&self) -> GameState {
        self.state
    }

    /// Kicks off: `Idle -> Playing`, ball at the centre spot.
    pub fn start(&mut self) -> Result<(), ControlError> {
        self.require(GameState::Idle, "start a game")?;
        self.x = 0.0;
        self.y = 0.0;
        self.state = GameState::Playing;
        info!("game started ({:?})", self.settings.mode);
        Ok(())
    }

    /// `WinnerDeclared -> Idle`, clearing the ball and the winner.
    pub fn reset(&mut self) -> Result<(), ControlError> {
        self.require(GameState::WinnerDeclared, "reset")?;
        self.x = 0.0;
        self.y = 0.0;
        self.winner = None;
        self.state = GameState::Idle;
        info!("game reset");
        Ok(())
    }

    fn require(&self, state: GameState, action: &'static str) -> Result<(), ControlError> {
        if self.state == state {
            Ok(())
        } else {
            Err(ControlError::InvalidTransition {
                state: self.state,
                action,
            })
        }
    }

    /// Moves the ball by one tick's band powers, one per channel.
    ///
    /// Does nothing unless a game is being played. Returns the winner on
    /// the tick the ball crosses a goal line.
    pub fn update<R: Rng>(
        &mut self,
        powers: &[f64],
        rng: &mut R,
    ) -> Result<Option<Side>, ControlError> {
        if self.state != GameState::Playing {
            return Ok(None);
        }
        let expected = self.settings.mode.channels();
        if powers.len() != expected {
            return Err(ControlError::PowerCount {
                expected,
                got: powers.len(),
            });
        }

        let tuning = self.settings.tuning_factor;
        let limit = match *powers {
            [left, right] => {
                self.x += (right - left) * tuning;
                0.7 * (1.1 - self.x.abs())
            }
            _ => {
                self.x += powers[0] * tuning;
                0.7
            }
        };
        self.y += gaussian(rng, self.settings.noise_scale);
        if self.y.abs() > limit {
            self.y -= REFLECTION * self.y;
        }

        if self.x.abs() <= GOAL_LINE {
            return Ok(None);
        }
        let winner = match self.settings.mode {
            GameMode::TwoChannel if self.x > 0.0 => Side::Right,
            _ => Side::Left,
        };
        self.winner = Some(winner);
        self.state = GameState::WinnerDeclared;
        info!("goal, {winner} wins at x = {:.3}", self.x);
        Ok(Some(winner))
    }

    /// The ball and game state as the field should show them.
    pub fn current_state(&self) -> BallSnapshot {
        BallSnapshot {
            x: self.x.signum() * self.x.abs().min(GOAL_LINE),
            y: self.y,
            raw_x: self.x,
            state: self.state,
            winner: self.winner,
        }
    }
}

/// Draws from a normal distribution centred on zero (Box-Muller).
pub fn gaussian<R: Rng>(rng: &mut R, scale: f64) -> f64 {
    // 1 - [0, 1) keeps the log finite
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    scale * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
