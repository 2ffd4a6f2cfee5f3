//! # runlog-settings
//!
//! Layered configuration for runlog.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RunlogSettings::default()`]
//! 2. **User file**: `~/.runlog/settings.json` or an explicit path, deep-merged
//!    over defaults
//! 3. **Environment variables**: `RUNLOG_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_dir,
    settings_path,
};
pub use types::*;
