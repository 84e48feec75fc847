//! Shared types for the MCP auth workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
