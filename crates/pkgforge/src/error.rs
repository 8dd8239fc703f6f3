// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for pkgforge operations.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience Result type with pkgforge Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during pkgforge operations.
///
/// Every variant here is a configuration or template error and aborts the
/// batch it occurs in. Failures of the external package manager are never
/// reported through this type.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// A string did not match `name/version@owner/channel`
    #[error("Malformed package reference: {0:?}")]
    #[diagnostic(
        code(pkgforge::malformed_reference),
        help("References must look like name/version@owner/channel")
    )]
    MalformedReference(String),

    /// The template recipe of a package does not exist
    #[error("Template recipe for package '{package}' not found at {path:?}")]
    #[diagnostic(
        code(pkgforge::template_not_found),
        help("Check the 'recipe' setting of this package instance")
    )]
    TemplateNotFound { package: String, path: PathBuf },

    /// A package instance has no template recipe configured at all
    #[error("Package '{0}' has no template recipe configured")]
    #[diagnostic(
        code(pkgforge::no_template),
        help("Set 'recipe' (or 'conanfile') for this package instance")
    )]
    NoTemplate(String),

    /// A filter selector was neither a keyword, a list of names, nor a rule mapping
    #[error("Unknown package filter: {0}")]
    #[diagnostic(
        code(pkgforge::unknown_filter_spec),
        help("Use 'all', 'none', a list of names, or a mapping with include/exclude/depends_on")
    )]
    UnknownFilterSpec(String),

    /// An include/exclude pattern is not a valid regular expression
    #[error("Invalid filter pattern {pattern:?}")]
    #[diagnostic(code(pkgforge::invalid_filter_pattern))]
    InvalidFilterPattern {
        pattern: String,
        #[source]
        error: regex::Error,
    },

    /// Invalid YAML in a configuration document
    #[error("Invalid configuration YAML: {error}")]
    #[diagnostic(code(pkgforge::invalid_yaml), help("Check YAML syntax"))]
    InvalidYaml {
        #[source]
        error: serde_yaml::Error,
        yaml_content: String,
    },

    /// A configuration fragment has the wrong shape
    #[error("Invalid configuration for {context}: {message}")]
    #[diagnostic(code(pkgforge::invalid_config))]
    InvalidConfig { context: String, message: String },

    /// A setting required to form a reference is missing
    #[error("Package '{package}' has no '{setting}' setting")]
    #[diagnostic(
        code(pkgforge::missing_setting),
        help("Provide it in package_defaults, package_overrides or the instance itself")
    )]
    MissingSetting { package: String, setting: String },

    /// Directory handed to recipe discovery does not exist
    #[error("Recipe collection directory not found: {0:?}")]
    #[diagnostic(code(pkgforge::recipe_collection_not_found))]
    RecipeCollectionNotFound(PathBuf),

    /// Failed to read file
    #[error("Failed to read file: {path:?}")]
    #[diagnostic(code(pkgforge::read_failed))]
    ReadFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Failed to write file
    #[error("Failed to write file: {path:?}")]
    #[diagnostic(code(pkgforge::write_failed))]
    WriteFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// IO error passthrough
    #[error(transparent)]
    #[diagnostic(code(pkgforge::io_error))]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_config(context: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidConfig {
            context: context.into(),
            message: message.to_string(),
        }
    }
}
