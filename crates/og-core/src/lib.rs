//! Core infrastructure for the oxidized-gekko emulator
//!
//! This crate holds the pieces every other crate leans on: configuration,
//! the error taxonomy, logging setup, and the bounded spin-wait primitive
//! used to keep the CPU and video contexts in step.

pub mod config;
pub mod error;
pub mod logging;
pub mod sync;

pub use config::Config;
pub use error::{ConfigError, MemoryError};
