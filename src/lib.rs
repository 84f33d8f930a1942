//! Mindball is a two-player game played with brain waves. Each player wears
//! an EEG sensor that streams raw samples over a serial link. The host
//! decodes the stream, resamples and band-pass filters each player's signal,
//! and measures how much of its spectrum falls in a chosen band. The
//! difference between the players pushes a ball across a field until it
//! crosses a goal line.
//!
//! The data flows through these stages:
//!
//! - [`device`] and [`acquisition`]: one thread per sensor reads byte chunks,
//!   decodes them with [`frame_decoder`] and publishes one reading per chunk
//!   into a [`live_feed::LiveFeed`].
//! - [`scheduler`]: a fast tick moves published readings into each feed's
//!   history, a slow tick runs the [`dsp`] pipeline over it and feeds the
//!   resulting band powers to the game in [`control`].
//! - [`monitor`] owns all of the above and is what a front end such as
//!   [`gui::arena`] talks to.
//!
//! A one-player variant pushes the ball with a single sensor's band power.

#![warn(missing_docs)]

pub mod acquisition;
pub mod args;
pub mod audio_cue;
pub mod capture;
pub mod config;
pub mod control;
pub mod device;
pub mod dsp;
pub mod frame_decoder;
pub mod gui;
pub mod live_feed;
pub mod monitor;
pub mod scheduler;
