// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! Typed settings of a single package instance.
//!
//! The raw configuration tree is merged as plain YAML and then decoded into
//! [`PackageSettings`], so shape errors are reported when a configuration is
//! loaded rather than when a package is exported.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::overrides::DependencyOverride;
use crate::reference::PackageReference;
use crate::Error;

#[cfg(test)]
#[path = "./settings_test.rs"]
mod settings_test;

/// Nested `export:` block used by older configuration files.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ExportTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// Fully merged settings for one package instance.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PackageSettings {
    /// Name used to refer to the package instance in configuration and filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Template recipe this instance is generated from.
    #[serde(default, alias = "conanfile", skip_serializing_if = "Option::is_none")]
    pub recipe: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "scalar_string")]
    pub version: Option<String>,

    #[serde(default, alias = "group", skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportTarget>,

    /// Git reference checked out by the recipe's source step.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "scalar_string")]
    pub checkout: Option<String>,

    #[serde(default, alias = "url_basename", skip_serializing_if = "Option::is_none")]
    pub git_url_basename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,

    /// Extra recipe settings to inject, in order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub setting_overrides: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependency_overrides: Vec<DependencyOverride>,
}

/// Accept numbers and booleans where a string is expected (`version: 2.0`).
mod scalar_string {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_yaml::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(other) => Err(serde::de::Error::custom(format!(
                "expected a scalar, found {other:?}"
            ))),
        }
    }

    pub fn serialize<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.serialize(serializer)
    }
}

impl PackageSettings {
    /// Decode merged settings, naming `context` in any error.
    pub fn from_value(value: Value, context: &str) -> crate::Result<Self> {
        let mut settings: Self =
            serde_yaml::from_value(value).map_err(|e| Error::invalid_config(context, e))?;
        settings.recipe = settings.recipe.map(|p| resolve_recipe_path(&p));
        Ok(settings)
    }

    /// A setting from `setting_overrides` rendered as a plain string.
    fn overridden(&self, key: &str) -> Option<String> {
        self.setting_overrides.get(key).and_then(scalar_text)
    }

    /// Name of the package as it will appear in its reference.
    pub fn package_name(&self) -> Option<String> {
        self.overridden("name").or_else(|| self.name.clone())
    }

    pub fn package_version(&self) -> Option<String> {
        self.overridden("version").or_else(|| self.version.clone())
    }

    pub fn package_owner(&self) -> Option<String> {
        self.overridden("owner")
            .or_else(|| self.owner.clone())
            .or_else(|| self.export.as_ref().and_then(|e| e.owner.clone()))
    }

    pub fn package_channel(&self) -> Option<String> {
        self.overridden("channel")
            .or_else(|| self.channel.clone())
            .or_else(|| self.export.as_ref().and_then(|e| e.channel.clone()))
    }

    /// The reference this instance is exported under.
    pub fn reference(&self) -> crate::Result<PackageReference> {
        let label = self.label();
        let require = |value: Option<String>, setting: &str| {
            value.ok_or_else(|| Error::MissingSetting {
                package: label.clone(),
                setting: setting.to_string(),
            })
        };
        let text = format!(
            "{}/{}@{}/{}",
            require(self.package_name(), "name")?,
            require(self.package_version(), "version")?,
            require(self.package_owner(), "owner")?,
            require(self.package_channel(), "channel")?,
        );
        PackageReference::parse(&text)
    }

    /// Settings injected into the template recipe, in injection order.
    ///
    /// Entries of `setting_overrides` replace the well-known settings of the
    /// same key in place, and unknown keys are appended.
    pub fn injected_settings(&self) -> IndexMap<String, Value> {
        let mut injected = IndexMap::new();
        let known = [
            ("name", self.package_name()),
            ("version", self.version.clone()),
            ("checkout", self.checkout.clone()),
            ("git_url_basename", self.git_url_basename.clone()),
            ("repo_name", self.repo_name.clone()),
        ];
        for (key, value) in known {
            if let Some(value) = value {
                injected.insert(key.to_string(), Value::String(value));
            }
        }
        for (key, value) in &self.setting_overrides {
            injected.insert(key.clone(), value.clone());
        }
        injected
    }

    /// Human readable label used in diagnostics.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.package_name())
            .or_else(|| {
                self.recipe
                    .as_deref()
                    .and_then(recipe_package_name)
            })
            .unwrap_or_else(|| "<unnamed>".to_string())
    }
}

/// Render a scalar as text. Returns `None` for null and non-scalars.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The package name implied by a recipe's location: its parent directory.
pub fn recipe_package_name(recipe: &Path) -> Option<String> {
    recipe
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
}

/// Resolve a recipe path: `~/` is home-relative, relative paths are
/// resolved against the current directory.
fn resolve_recipe_path(path: &Path) -> PathBuf {
    if let Ok(rel) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rel);
        }
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
