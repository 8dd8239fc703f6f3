// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! pkgforge - Recipe Instance Configuration Engine
//!
//! This crate provides the core library for turning one template recipe per
//! package into many concrete, reproducible package instances, each with its
//! own version, checkout and dependency references.
//!
//! # Overview
//!
//! A configuration is folded per instance, from package defaults through
//! per-name overrides to the instance entry itself. Each resolved instance
//! writes an instantiated copy of its template recipe with its settings
//! injected and its dependency references rewritten, then hands that recipe
//! to the external package manager to export, build and test.
//!
//! # Example
//!
//! ```yaml
//! # pkgforge.yaml
//! package_defaults:
//!   owner: initech
//!   channel: devel
//!   version: devel
//!   checkout: master
//!
//! package_overrides:
//!   PackA:
//!     version: "2.6"
//!     checkout: v2.6
//!
//! package_instances:
//!   - name: PackA
//!     recipe: recipes/PackA/conanfile.py
//!   - name: PackB
//!     recipe: recipes/PackB/conanfile.py
//!     # every dependency keeps its name and version, owner/channel change
//!     dependency_overrides:
//!       - "*/[version]@initech/devel"
//! ```

pub mod collection;
pub mod config;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod instance;
pub mod manager;
pub mod merge;
pub mod overrides;
pub mod reference;
pub mod settings;
pub mod template;
pub mod workdir;

#[cfg(test)]
mod testutil;

pub use collection::{
    log_path, run_pipeline, BatchOptions, BatchReport, Outcome, PackageCollection,
    PackageResult, PlannedRun, Step,
};
pub use config::{
    default_configuration, load_config_file, parse_config, ToolSettings,
    DEFAULT_CONFIGURATION, TOOL_NAMESPACE,
};
pub use discovery::{discover_recipes, DiscoveredRecipe, RECIPE_FILENAME};
pub use error::{Error, Result};
pub use filter::{filter, FilterRules, Selector};
pub use instance::{InstanceState, PackageInstance, StepStatus, TEST_PACKAGE_DIRNAME};
pub use manager::{CommandStatus, ConanCli, InfoNode, PackageManager};
pub use merge::{compose_layers, merge_values};
pub use overrides::{resolve, resolve_dependency, DependencyOverride};
pub use reference::{PackageReference, ReferenceField};
pub use settings::PackageSettings;
pub use template::{RecipeTemplate, SubstitutionWarning};
pub use workdir::WorkingDirectory;
