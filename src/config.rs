//! Session configuration.
//!
//! Environment values are captured once, when the configuration is built,
//! and remembered for the life of the session.

use std::env;

use tracing::warn;

use crate::dirty::DirtyStrategy;

/// Environment variable holding the main arena key
pub const KEY_ENV_VAR: &str = "MCENV_POSUC";

/// Environment variable holding the colon-delimited McIDAS path list
pub const PATH_ENV_VAR: &str = "MCPATH";

/// Environment variable holding the directory prefix of the memory-mapped files
pub const TEMP_ENV_VAR: &str = "MCVTEMP";

/// Environment variable holding the session number that names the mapped files
pub const SESSION_ENV_VAR: &str = "MCVNUM";

/// Configuration for a [`crate::FrameStoreSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameStoreConfig {
    /// Variable the key was (or would be) read from; used in error messages.
    pub key_var: String,
    /// Fallback key for lazy attachment when none was supplied or remembered.
    pub key: Option<i32>,
    /// Variable the path list was (or would be) read from.
    pub path_var: String,
    /// Path list used to locate frame directory files.
    pub path_list: Option<String>,
    /// Variable the mapped-file prefix was (or would be) read from.
    pub temp_var: String,
    /// Prefix the `MCIMEM<n>` / `MCGMEM<n>` names are appended to, verbatim.
    pub temp_prefix: Option<String>,
    /// Variable the session number was (or would be) read from.
    pub session_var: String,
    /// Session number of the mapped files; doubles as their key.
    pub session_number: Option<i32>,
    pub dirty_strategy: DirtyStrategy,
}

impl Default for FrameStoreConfig {
    fn default() -> Self {
        Self {
            key_var: KEY_ENV_VAR.to_string(),
            key: None,
            path_var: PATH_ENV_VAR.to_string(),
            path_list: None,
            temp_var: TEMP_ENV_VAR.to_string(),
            temp_prefix: None,
            session_var: SESSION_ENV_VAR.to_string(),
            session_number: None,
            dirty_strategy: DirtyStrategy::default(),
        }
    }
}

impl FrameStoreConfig {
    /// Read `MCENV_POSUC`, `MCPATH`, `MCVTEMP` and `MCVNUM` from the
    /// process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.key = env::var(&config.key_var)
            .ok()
            .and_then(|raw| parse_key(&config.key_var, &raw));
        config.path_list = env::var(&config.path_var).ok();
        config.temp_prefix = env::var(&config.temp_var).ok();
        config.session_number = env::var(&config.session_var)
            .ok()
            .and_then(|raw| parse_key(&config.session_var, &raw));
        config
    }

    pub fn with_key(mut self, key: i32) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_path_list(mut self, paths: impl Into<String>) -> Self {
        self.path_list = Some(paths.into());
        self
    }

    pub fn with_temp_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_prefix = Some(prefix.into());
        self
    }

    pub fn with_session_number(mut self, number: i32) -> Self {
        self.session_number = Some(number);
        self
    }

    pub fn with_dirty_strategy(mut self, strategy: DirtyStrategy) -> Self {
        self.dirty_strategy = strategy;
        self
    }
}

fn parse_key(var: &str, raw: &str) -> Option<i32> {
    match raw.trim().parse::<i32>() {
        Ok(key) => Some(key),
        Err(e) => {
            warn!(target: "frame_store::config", var, value = raw, error = %e, "ignoring unparsable key");
            None
        }
    }
}
