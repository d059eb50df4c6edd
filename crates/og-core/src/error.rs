//! Error types for oxidized-gekko
//!
//! Only the cold surfaces (configuration, device copies, snapshots) use
//! these. Address translation and the hardware access router communicate
//! failure through validity flags instead: a guest-visible fault is data,
//! not a host error, and the hot paths cannot afford unwinding.

use thiserror::Error;

/// Errors from loading or saving the emulator configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read or written
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// No usable config directory on this host
    #[error("no configuration directory available")]
    NoConfigDir,
}

/// Errors from the device-facing (physically addressed) memory surface
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Physical address does not fall inside any backed region
    #[error("unmapped physical address 0x{address:08x}")]
    Unmapped {
        /// The offending physical address
        address: u32,
    },

    /// A bulk copy or fill would cross out of its backing region
    #[error("invalid range: 0x{address:08x} + 0x{size:x}")]
    InvalidRange {
        /// Start address of the range
        address: u32,
        /// Length of the range in bytes
        size: u32,
    },
}

/// Convenience result alias for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Convenience result alias for device memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;
