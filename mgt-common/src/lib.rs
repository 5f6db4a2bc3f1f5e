//! # MGT Common Library
//!
//! Shared code for the music genre tagger crates:
//! - Error and result types
//! - Configuration file resolution and TOML loading
//! - Logging initialization
//! - Timestamp utilities and injectable clocks

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
