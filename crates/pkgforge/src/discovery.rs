// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! Finding template recipes by directory convention.
//!
//! A recipe collection is a directory with one subdirectory per package,
//! each holding a template recipe named [`RECIPE_FILENAME`]:
//!
//! ```text
//! recipes/
//!   PackA/conanfile.py
//!   PackA/test_package/...
//!   PackB/conanfile.py
//! ```

use std::path::{Path, PathBuf};

use crate::Error;

#[cfg(test)]
#[path = "./discovery_test.rs"]
mod discovery_test;

/// File name of a template recipe inside its package directory.
pub const RECIPE_FILENAME: &str = "conanfile.py";

/// A template recipe found in a recipe collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredRecipe {
    /// Package name, taken from the directory name.
    pub name: String,
    pub recipe: PathBuf,
}

/// List the template recipes of a collection, sorted by package name.
pub fn discover_recipes<P: AsRef<Path>>(dir: P) -> crate::Result<Vec<DiscoveredRecipe>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(Error::RecipeCollectionNotFound(dir.to_owned()));
    }
    let dir = dunce::canonicalize(dir).map_err(|error| Error::ReadFailed {
        path: dir.to_owned(),
        error,
    })?;
    let entries = std::fs::read_dir(&dir).map_err(|error| Error::ReadFailed {
        path: dir.clone(),
        error,
    })?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        let recipe = entry.path().join(RECIPE_FILENAME);
        if !recipe.is_file() {
            continue;
        }
        found.push(DiscoveredRecipe {
            name: entry.file_name().to_string_lossy().into_owned(),
            recipe,
        });
    }
    found.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::debug!("found {} recipes in {:?}", found.len(), dir);
    Ok(found)
}
