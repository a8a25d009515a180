//! LogDeck Core - Shared types, cursors, configuration, and error handling

pub mod config;
pub mod constants;
pub mod cursor;
pub mod error;
pub mod types;

pub use config::*;
pub use constants::*;
pub use cursor::Cursor;
pub use error::{Error, Result};
pub use types::*;
