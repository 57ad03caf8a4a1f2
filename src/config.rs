// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of `reqtrace.toml` to simplify serialization and
//! deserialization. File I/O is left to the caller to figure out.

use crate::{
    git::{Signature, DEFAULT_BRANCH},
    repository::DEFAULT_HISTORY_DEPTH,
    workspace::WorkspaceOptions,
};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Variable forcing the desktop environment when set to anything but `0`.
pub const DESKTOP_VAR: &str = "REQTRACE_DESKTOP";

/// Settings of a reqtrace installation.
///
/// # General Layout
///
/// The `[workspace]` table says where artifacts live and how they are
/// stored. The `[author]` table is the identity every commit is made as.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub workspace: WorkspaceSettings,

    #[serde(default)]
    pub author: AuthorSettings,
}

impl Settings {
    /// Workspace options to open repositories with.
    pub fn options(&self) -> WorkspaceOptions {
        WorkspaceOptions {
            default_branch: self.workspace.default_branch.clone(),
            author: Signature::new(&self.author.name, &self.author.email),
            history_depth: self.workspace.history_depth,
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on workspace root field.
        settings.workspace.root = PathBuf::from(
            shellexpand::full(settings.workspace.root.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkspaceSettings {
    /// Directory holding the global and project repositories.
    pub root: PathBuf,

    pub backend: Backend,

    /// Branch new repositories start on.
    pub default_branch: String,

    /// Commits returned by history queries without an explicit depth.
    pub history_depth: usize,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("reqtrace"),
            backend: Backend::default(),
            default_branch: DEFAULT_BRANCH.to_string(),
            history_depth: DEFAULT_HISTORY_DEPTH,
        }
    }
}

/// Identity commits are authored as.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorSettings {
    pub name: String,
    pub email: String,
}

impl Default for AuthorSettings {
    fn default() -> Self {
        let fallback = Signature::fallback();
        Self {
            name: fallback.name,
            email: fallback.email,
        }
    }
}

/// Where files are stored.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Process memory, gone on exit.
    #[default]
    Memory,

    /// Host filesystem reached through the bridge.
    Native,
}

/// Environment the library runs in.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Environment {
    /// Desktop host with native files and git.
    Desktop,

    /// Browser-like sandbox with in-memory files and embedded git.
    Browser,
}

impl Environment {
    /// Detect environment from [`DESKTOP_VAR`], falling back on `backend`.
    pub fn detect(backend: Backend) -> Self {
        match std::env::var(DESKTOP_VAR) {
            Ok(value) if !value.is_empty() && value != "0" => Self::Desktop,
            Ok(_) => Self::Browser,
            Err(_) => match backend {
                Backend::Native => Self::Desktop,
                Backend::Memory => Self::Browser,
            },
        }
    }

    pub fn is_desktop(self) -> bool {
        self == Self::Desktop
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("BLAH", "/home/blah")])]
    fn deserialize_settings() -> anyhow::Result<()> {
        let result: Settings = r#"
            [workspace]
            root = "$BLAH/reqs"
            backend = "native"
            default_branch = "trunk"
            history_depth = 20

            [author]
            name = "John Doe"
            email = "john@doe.com"
        "#
        .parse()?;

        let expect = Settings {
            workspace: WorkspaceSettings {
                root: PathBuf::from("/home/blah/reqs"),
                backend: Backend::Native,
                default_branch: "trunk".into(),
                history_depth: 20,
            },
            author: AuthorSettings {
                name: "John Doe".into(),
                email: "john@doe.com".into(),
            },
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn missing_fields_take_defaults() -> anyhow::Result<()> {
        let result: Settings = indoc! {r#"
            [workspace]
            root = "/srv/reqs"
        "#}
        .parse()?;

        assert_eq!(result.workspace.backend, Backend::Memory);
        assert_eq!(result.workspace.default_branch, "main");
        assert_eq!(result.workspace.history_depth, 100);
        assert_eq!(result.author, AuthorSettings::default());

        Ok(())
    }

    #[test]
    fn serialize_settings() {
        let result = Settings {
            workspace: WorkspaceSettings {
                root: PathBuf::from("/srv/reqs"),
                backend: Backend::Memory,
                default_branch: "main".into(),
                history_depth: 100,
            },
            author: AuthorSettings {
                name: "John Doe".into(),
                email: "john@doe.com".into(),
            },
        }
        .to_string();

        let expect = indoc! {r#"
            [workspace]
            root = "/srv/reqs"
            backend = "memory"
            default_branch = "main"
            history_depth = 100

            [author]
            name = "John Doe"
            email = "john@doe.com"
        "#};

        assert_eq!(result, expect);
    }

    #[sealed_test(env = [("REQTRACE_DESKTOP", "1")])]
    fn desktop_variable_wins_over_backend() {
        assert_eq!(Environment::detect(Backend::Memory), Environment::Desktop);
    }

    #[sealed_test(env = [("REQTRACE_DESKTOP", "0")])]
    fn zero_desktop_variable_means_browser() {
        assert_eq!(Environment::detect(Backend::Native), Environment::Browser);
    }
}
