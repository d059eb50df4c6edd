//! Oxidized-Gekko - GameCube/Wii emulator core
//!
//! Re-exports the session wiring; the subsystem crates under `crates/`
//! carry the actual emulation.

pub mod system;

pub use system::System;
