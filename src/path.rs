// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine default locations of the workspace and configuration file. None
//! of these functions check that the path returned actually exists.

use std::path::PathBuf;

/// Determine default absolute path to workspace directory.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/reqtrace` as the default
/// absolute path of the workspace.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_workspace_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join("reqtrace"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to `reqtrace.toml`.
///
/// Uses `$XDG_CONFIG_HOME/reqtrace/reqtrace.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("reqtrace").join("reqtrace.toml"))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use sealed_test::prelude::*;

    #[cfg(target_os = "linux")]
    #[sealed_test(env = [("HOME", "/home/blah"), ("XDG_CONFIG_HOME", "/home/blah/.config")])]
    fn config_path_lands_under_config_home() -> anyhow::Result<()> {
        assert_eq!(
            default_config_path()?,
            PathBuf::from("/home/blah/.config/reqtrace/reqtrace.toml")
        );

        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[sealed_test(env = [("HOME", "/home/blah"), ("XDG_DATA_HOME", "/srv/data")])]
    fn workspace_dir_lands_under_data_home() -> anyhow::Result<()> {
        assert_eq!(default_workspace_dir()?, PathBuf::from("/srv/data/reqtrace"));

        Ok(())
    }
}
