//! # chatte-settings
//!
//! Settings are loaded from layers, later layers winning:
//! 1. **Compiled defaults**: [`ChatSettings::default()`]
//! 2. **Settings file**: `~/.chatte/settings.json` or an explicit path (deep-merged)
//! 3. **Environment variables**: `CHATTE_*` overrides
//!
//! The binary applies its CLI flags on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_with, deep_merge, load_settings,
    load_settings_from_path, parse_log_format, settings_path,
};
pub use types::*;
