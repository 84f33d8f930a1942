//! Terminal front ends, drawn with ratatui on a crossterm backend.

pub mod arena;
mod device_selector;
mod error;

pub use device_selector::{select_devices, Selection, Selector};
pub use error::GuiError;
