//! Front-end state and the terminal kiosk

pub mod state;
pub mod terminal;

pub use state::{KioskEvent, KioskStatus, KioskView, SharedKioskView};
