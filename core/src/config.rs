// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Process-wide and per-account configuration (spec §6).

use std::error::Error;
use std::path::{Path, PathBuf};

/// The name of the application, used for state-directory layout.
pub const APP_NAME: &str = "calsync";

/// Credentials and connection details for one remote account (spec §6
/// "Per-account").
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AccountConfig {
    /// The server's base URL, as entered by the user.
    pub server_url: String,
    /// The account username/email.
    pub username: String,
    /// The account password or app-specific password.
    pub password: String,
    /// Whether to accept a server certificate that fails validation.
    #[serde(default)]
    pub trust_insecure: bool,
}

/// Process-wide sync tunables (spec §6 "Process-wide").
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory for the local SQLite store and any cached state.
    pub state_dir: Option<PathBuf>,

    /// How many calendars may sync concurrently (spec §5).
    pub max_parallel_calendars: usize,

    /// How many hrefs go in one `calendar-multiget` REPORT (spec §4.2/§4.6).
    pub multiget_batch_size: usize,

    /// How many times a resource may fail to parse before it's skipped for
    /// good within a session (spec §4.6 "parse-failure retry gate").
    pub max_parse_retries: u32,

    /// How many retries a pending operation gets before it's marked
    /// poisoned (spec §4.5/§7).
    pub retry_cap: u32,

    /// How far before "now" the pull window extends (spec §4.6).
    pub pull_window_before: jiff::Span,

    /// How far after "now" the pull window extends (spec §4.6).
    pub pull_window_after: jiff::Span,

    /// Whether a successful push clears [`crate::model::Event::raw_ical`]
    /// (SPEC_FULL §3.1 Open Question, decided `false`: the patch serializer
    /// keeps the last-known server body until the next pull overwrites it).
    pub clear_raw_ical_on_push: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            max_parallel_calendars: 4,
            multiget_batch_size: 50,
            max_parse_retries: 3,
            retry_cap: 10,
            pull_window_before: jiff::Span::new().days(365),
            pull_window_after: jiff::Span::new().days(730),
            clear_raw_ical_on_push: false,
        }
    }
}

impl SyncConfig {
    /// Resolves `state_dir`, falling back to the platform state directory
    /// joined with [`APP_NAME`] when unset.
    pub fn normalize(&mut self) -> Result<(), Box<dyn Error>> {
        self.state_dir = Some(match &self.state_dir {
            Some(path) => expand_path(path)
                .map_err(|e| format!("failed to expand state directory path: {e}"))?,
            None => match get_state_dir() {
                Ok(dir) => dir.join(APP_NAME),
                Err(e) => {
                    tracing::warn!("failed to resolve state directory: {e}");
                    return Err(e);
                }
            },
        });
        Ok(())
    }
}

/// Expands `~`, `$HOME`, and `$XDG_CONFIG_HOME`-style prefixes in a
/// user-supplied path.
fn expand_path(path: &Path) -> Result<PathBuf, Box<dyn Error>> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }

    let path = path.to_str().ok_or("invalid path")?;

    let home_prefixes: &[&str] = if cfg!(unix) {
        &["~/", "$HOME/", "${HOME}/"]
    } else {
        &[r"~\", "~/", r"%UserProfile%\", r"%UserProfile%/"]
    };
    for prefix in home_prefixes {
        if let Some(stripped) = path.strip_prefix(prefix) {
            return Ok(get_home_dir()?.join(stripped));
        }
    }

    let config_prefixes: &[&str] = if cfg!(unix) {
        &["$XDG_CONFIG_HOME/", "${XDG_CONFIG_HOME}/"]
    } else {
        &[r"%LOCALAPPDATA%\", "%LOCALAPPDATA%/"]
    };
    for prefix in config_prefixes {
        if let Some(stripped) = path.strip_prefix(prefix) {
            return Ok(get_config_dir()?.join(stripped));
        }
    }

    Ok(path.into())
}

fn get_home_dir() -> Result<PathBuf, Box<dyn Error>> {
    dirs::home_dir().ok_or("user-specific home directory not found".into())
}

fn get_config_dir() -> Result<PathBuf, Box<dyn Error>> {
    #[cfg(unix)]
    let config_dir = xdg::BaseDirectories::new().get_config_home();
    #[cfg(windows)]
    let config_dir = dirs::config_dir();
    config_dir.ok_or("user-specific config directory not found".into())
}

fn get_state_dir() -> Result<PathBuf, Box<dyn Error>> {
    #[cfg(unix)]
    let state_dir = xdg::BaseDirectories::new().get_state_home();
    #[cfg(windows)]
    let state_dir = dirs::data_dir();
    state_dir.ok_or("user-specific state directory not found".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_six() {
        let config = SyncConfig::default();
        assert_eq!(config.max_parallel_calendars, 4);
        assert_eq!(config.multiget_batch_size, 50);
        assert_eq!(config.max_parse_retries, 3);
        assert_eq!(config.retry_cap, 10);
        assert_eq!(config.pull_window_before, jiff::Span::new().days(365));
        assert_eq!(config.pull_window_after, jiff::Span::new().days(730));
        assert!(!config.clear_raw_ical_on_push);
    }

    #[test]
    fn expand_path_resolves_home_prefix() {
        let home = get_home_dir().unwrap();
        let result = expand_path(&PathBuf::from("~/calsync")).unwrap();
        assert_eq!(result, home.join("calsync"));
    }

    #[test]
    fn expand_path_leaves_absolute_paths_alone() {
        let absolute = PathBuf::from("/etc/calsync.toml");
        assert_eq!(expand_path(&absolute).unwrap(), absolute);
    }

    #[test]
    fn normalize_falls_back_to_state_dir_when_unset() {
        let mut config = SyncConfig::default();
        config.normalize().unwrap();
        assert!(config.state_dir.unwrap().ends_with(APP_NAME));
    }
}
