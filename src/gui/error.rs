//! Errors the terminal front end can hit.

use crate::monitor::MonitorError;

use std::io;
use thiserror::Error;

/// Why a terminal screen had to give up.
#[derive(Debug, Error)]
pub enum GuiError {
    /// Drawing or reading input failed.
    #[error("terminal error: {0}")]
    Io(#[from] io::Error),
    /// The monitor refused an action.
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}
