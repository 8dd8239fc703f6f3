// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! Scoped changes of the process working directory.

use std::path::{Path, PathBuf};

use crate::Error;

#[cfg(test)]
#[path = "./workdir_test.rs"]
mod workdir_test;

/// Changes the working directory for as long as it is alive.
///
/// The previous directory is restored when the guard is dropped, including
/// on early returns and panics.
#[derive(Debug)]
#[must_use = "the previous directory is restored as soon as the guard is dropped"]
pub struct WorkingDirectory {
    previous: PathBuf,
}

impl WorkingDirectory {
    pub fn enter<P: AsRef<Path>>(dir: P) -> crate::Result<Self> {
        let dir = dir.as_ref();
        let previous = std::env::current_dir()?;
        std::env::set_current_dir(dir).map_err(|error| Error::ReadFailed {
            path: dir.to_owned(),
            error,
        })?;
        tracing::debug!("entered {:?}", dir);
        Ok(Self { previous })
    }

    /// The directory that will be restored.
    pub fn previous(&self) -> &Path {
        &self.previous
    }
}

impl Drop for WorkingDirectory {
    fn drop(&mut self) {
        if let Err(err) = std::env::set_current_dir(&self.previous) {
            tracing::error!("Failed to return to {:?}: {err}", self.previous);
        }
    }
}

/// Remove `dir` if it exists and create it again, empty.
pub fn reset_dir<P: AsRef<Path>>(dir: P) -> crate::Result<()> {
    let dir = dir.as_ref();
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|error| Error::WriteFailed {
            path: dir.to_owned(),
            error,
        })?;
    }
    std::fs::create_dir_all(dir).map_err(|error| Error::WriteFailed {
        path: dir.to_owned(),
        error,
    })
}
