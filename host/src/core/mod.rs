//! DEX Host Core
//!
//! Extension host runtime for the DEX Studio editor.
//! Handles extension loading, hook dispatch, the capability API, theming,
//! core control overrides and settings persistence.

pub mod bridge;
pub mod fs;
pub mod plugin;
pub mod process;
pub mod settings;
pub mod theme;
pub mod ui;

mod error;
pub use error::*;
