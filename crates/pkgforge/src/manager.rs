// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! The external package-manager command line tool.
//!
//! Everything pkgforge asks of the package manager goes through the
//! [`PackageManager`] trait. Command failures are reported as a
//! [`CommandStatus`], never as errors: the caller decides how a failed
//! export or build affects the batch.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::reference::PackageReference;

#[cfg(test)]
#[path = "./manager_test.rs"]
mod manager_test;

/// Outcome of one external command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    pub success: bool,
    /// Exit code, if the process ran to completion.
    pub code: Option<i32>,
}

impl CommandStatus {
    pub fn success() -> Self {
        Self {
            success: true,
            code: Some(0),
        }
    }

    pub fn failed(code: Option<i32>) -> Self {
        Self {
            success: false,
            code,
        }
    }
}

/// One node of the dependency graph reported by the `info` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct InfoNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default)]
    pub requires: Vec<String>,
}

/// Commands pkgforge runs against the package manager.
///
/// Implementations append the combined output of each command to `log`.
pub trait PackageManager: Send + Sync {
    /// Export a recipe to the local cache under `owner/channel`.
    fn export(&self, recipe: &Path, owner: &str, channel: &str, log: &Path) -> CommandStatus;

    /// Install (and build if needed) a reference.
    fn install(&self, reference: &PackageReference, log: &Path) -> CommandStatus;

    /// Run the test recipe in `test_dir` against `reference`.
    fn test(&self, test_dir: &Path, reference: &PackageReference, log: &Path) -> CommandStatus;

    /// Remove a reference from the local cache.
    fn remove(&self, reference: &PackageReference, log: &Path) -> CommandStatus;

    /// Query the dependency graph of `reference`.
    ///
    /// Returns `None` if the graph could not be determined.
    fn info(&self, reference: &PackageReference) -> Option<Vec<InfoNode>>;
}

/// Production implementation that shells out to the `conan` executable.
#[derive(Debug, Clone)]
pub struct ConanCli {
    /// Executable to run.
    pub program: PathBuf,
    /// Profiles passed to `install` and `test`.
    pub profiles: Vec<String>,
    /// Value for `--build` when installing.
    pub build_policy: Option<String>,
}

impl Default for ConanCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            profiles: Vec::new(),
            build_policy: Some(DEFAULT_BUILD_POLICY.to_string()),
        }
    }
}

/// Executable used when none is configured.
pub const DEFAULT_PROGRAM: &str = "conan";

/// Build policy used for `install` when none is configured.
pub const DEFAULT_BUILD_POLICY: &str = "missing";

impl ConanCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn with_profiles(mut self, profiles: Vec<String>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_build_policy(mut self, policy: Option<String>) -> Self {
        self.build_policy = policy;
        self
    }

    fn profile_args(&self) -> Vec<OsString> {
        self.profiles
            .iter()
            .flat_map(|p| [OsString::from("--profile"), OsString::from(p)])
            .collect()
    }

    pub(crate) fn export_args(recipe: &Path, owner: &str, channel: &str) -> Vec<OsString> {
        vec![
            "export".into(),
            recipe.as_os_str().to_owned(),
            format!("{owner}/{channel}").into(),
        ]
    }

    pub(crate) fn install_args(&self, reference: &PackageReference) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["install".into(), reference.to_string().into()];
        if let Some(policy) = &self.build_policy {
            args.push("--build".into());
            args.push(policy.into());
        }
        args.extend(self.profile_args());
        args
    }

    pub(crate) fn test_args(&self, test_dir: &Path, reference: &PackageReference) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "test".into(),
            test_dir.as_os_str().to_owned(),
            reference.to_string().into(),
        ];
        args.extend(self.profile_args());
        args
    }

    /// Run the program with `args`, appending all output to `log`.
    fn run(&self, args: &[OsString], log: &Path) -> CommandStatus {
        let command_line = self.command_line(args);
        let mut file = match open_log(log) {
            Ok(file) => file,
            Err(err) => {
                tracing::error!("Failed to open log file {:?}: {err}", log);
                return CommandStatus::failed(None);
            }
        };
        if let Err(err) = writeln!(file, "# [{}] {}", Utc::now().to_rfc3339(), command_line) {
            tracing::debug!("Failed to write log header to {:?}: {err}", log);
        }

        let stdout = match file.try_clone() {
            Ok(clone) => Stdio::from(clone),
            Err(err) => {
                tracing::error!("Failed to capture output into {:?}: {err}", log);
                return CommandStatus::failed(None);
            }
        };

        tracing::debug!("running '{command_line}'");
        let status = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::from(file))
            .status();

        match status {
            Ok(status) if status.success() => CommandStatus::success(),
            Ok(status) => CommandStatus::failed(status.code()),
            Err(err) => {
                tracing::error!("Failed to run '{command_line}': {err}");
                if let Ok(mut file) = open_log(log) {
                    if let Err(write_err) = writeln!(file, "# failed to start: {err}") {
                        tracing::debug!("Failed to write to log file {:?}: {write_err}", log);
                    }
                }
                CommandStatus::failed(None)
            }
        }
    }

    fn command_line(&self, args: &[OsString]) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(args.iter().map(OsString::as_os_str))
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl PackageManager for ConanCli {
    fn export(&self, recipe: &Path, owner: &str, channel: &str, log: &Path) -> CommandStatus {
        self.run(&Self::export_args(recipe, owner, channel), log)
    }

    fn install(&self, reference: &PackageReference, log: &Path) -> CommandStatus {
        self.run(&self.install_args(reference), log)
    }

    fn test(&self, test_dir: &Path, reference: &PackageReference, log: &Path) -> CommandStatus {
        self.run(&self.test_args(test_dir, reference), log)
    }

    fn remove(&self, reference: &PackageReference, log: &Path) -> CommandStatus {
        self.run(
            &["remove".into(), "-f".into(), reference.to_string().into()],
            log,
        )
    }

    fn info(&self, reference: &PackageReference) -> Option<Vec<InfoNode>> {
        let dir = tempfile::TempDir::new()
            .map_err(|err| tracing::warn!("Failed to create scratch directory: {err}"))
            .ok()?;
        let json_path = dir.path().join("info.json");
        let log = dir.path().join("info.out");

        let args: Vec<OsString> = vec![
            "info".into(),
            reference.to_string().into(),
            "--json".into(),
            json_path.as_os_str().to_owned(),
        ];
        if !self.run(&args, &log).success {
            tracing::debug!("dependency query for {reference} failed");
            return None;
        }

        let text = std::fs::read_to_string(&json_path)
            .map_err(|err| tracing::warn!("Failed to read {:?}: {err}", json_path))
            .ok()?;
        parse_info(&text)
    }
}

/// Parse the JSON dependency graph written by the `info` command.
pub fn parse_info(text: &str) -> Option<Vec<InfoNode>> {
    serde_json::from_str(text)
        .map_err(|err| tracing::warn!("Unrecognized dependency graph: {err}"))
        .ok()
}

/// Open a log file for appending, creating parent directories as needed.
pub(crate) fn open_log(log: &Path) -> std::io::Result<File> {
    if let Some(parent) = log.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(log)
}
