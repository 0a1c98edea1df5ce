//! Shared types, error definitions, and name/string utilities used across all
//! mudvault crates.

pub mod error;
pub mod names;
pub mod sanitize;
pub mod time;

pub use error::{Error, FromMessage, MudVaultError, Result};
