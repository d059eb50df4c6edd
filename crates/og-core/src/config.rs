//! Emulator configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Which console is being emulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConsoleVariant {
    /// GameCube: 24 MB main RAM, no expansion RAM
    #[default]
    GameCube,
    /// Wii: adds 64 MB expansion RAM and extended BAT registers
    Wii,
}

/// How much of the MMU is emulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MmuMode {
    /// BAT translation only; page-table misses fail
    #[default]
    BatOnly,
    /// BAT translation plus the fake-VMEM compatibility mapping
    FakeVmem,
    /// Full hashed-page-table emulation with TLB caching
    Full,
}

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogLevel {
    /// Logging disabled
    Off,
    /// Errors only
    Error,
    /// Errors and warnings
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Full tracing
    Trace,
}

/// System (console) configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SystemConfig {
    /// Console variant to emulate
    pub console: ConsoleVariant,
    /// MMU emulation mode
    pub mmu: MmuMode,
}

/// JIT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitConfig {
    /// Link compiled blocks directly to each other
    pub block_link: bool,
    /// Code arena capacity in bytes
    pub code_capacity: usize,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            block_link: true,
            code_capacity: 32 * 1024 * 1024,
        }
    }
}

/// Debugging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Log verbosity
    pub log_level: LogLevel,
    /// Also write the log to a file
    pub log_to_file: bool,
    /// Log file path when `log_to_file` is set
    pub log_path: PathBuf,
    /// Evaluate memory watchpoints on every access
    pub enable_memcheck: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_to_file: false,
            log_path: PathBuf::from("oxidized-gekko.log"),
            enable_memcheck: false,
        }
    }
}

/// Top-level emulator configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Console configuration
    pub system: SystemConfig,
    /// JIT configuration
    pub jit: JitConfig,
    /// Debugging configuration
    pub debug: DebugConfig,
}

impl Config {
    /// Path of the configuration file in the user config directory
    pub fn default_path() -> ConfigResult<PathBuf> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("oxidized-gekko").join("config.toml"))
    }

    /// Load the configuration from the default path
    pub fn load() -> ConfigResult<Self> {
        let path = Self::default_path()?;
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Save the configuration to the default path
    pub fn save(&self) -> ConfigResult<()> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}
