//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the downloader:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus for progress reporting

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
