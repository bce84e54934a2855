//! logbridge Core - Shared entry model, configuration, and error handling

pub mod config;
pub mod constants;
pub mod error;
pub mod format;
pub mod types;

pub use config::*;
pub use constants::*;
pub use error::{Error, Result};
pub use format::render_entry;
pub use types::*;
