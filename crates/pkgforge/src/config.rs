// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! Configuration documents.
//!
//! A configuration is a single YAML tree assembled from the built-in
//! defaults and any number of user files, merged in order with
//! [`merge_document`]:
//!
//! ```yaml
//! package_defaults:        # applied to every instance (alias: global)
//!   owner: initech
//!   channel: devel
//! package_overrides:       # applied to instances with this name
//!   PackA:
//!     version: "2.6"
//! package_instances:       # one entry per instance, in build order
//!   - name: PackA
//!   - name: PackB
//!     dependency_overrides: ["PackA/[version]@initech/stable"]
//! pkgforge:                # settings of the tool itself
//!   scratch-folder: _pkgforge.d
//!   packages_to_test: all
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::filter::Selector;
use crate::merge::{merge_into, merge_values};
use crate::Error;

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

pub const PACKAGE_DEFAULTS_KEY: &str = "package_defaults";
pub const GLOBAL_KEY: &str = "global";
pub const PACKAGE_OVERRIDES_KEY: &str = "package_overrides";
pub const PACKAGE_INSTANCES_KEY: &str = "package_instances";

/// Namespace holding the settings of the pkgforge tool itself.
pub const TOOL_NAMESPACE: &str = "pkgforge";

/// Configuration every run starts from.
pub const DEFAULT_CONFIGURATION: &str = r#"package_defaults:
  version: testing
  owner: cd3
  channel: integration-tests
  git_url_basename: git@github.com:CD3
  checkout: master
package_overrides: {}
package_instances: []
pkgforge:
  scratch-folder: _pkgforge.d
  packages_to_export: all
  packages_to_test: all
  use_cache: none
"#;

/// Parse a configuration document. An empty document is an empty mapping.
pub fn parse_config<S: Into<String>>(yaml: S) -> crate::Result<Value> {
    let yaml = yaml.into();
    let value: Value = serde_yaml::from_str(&yaml).map_err(|e| Error::InvalidYaml {
        error: e,
        yaml_content: yaml.clone(),
    })?;
    match value {
        Value::Null => Ok(Value::Mapping(Mapping::new())),
        Value::Mapping(_) => Ok(value),
        other => Err(Error::invalid_config(
            "configuration document",
            format!("expected a mapping at the top level, found {}", kind(&other)),
        )),
    }
}

/// Load a configuration document from a file.
pub fn load_config_file<P: AsRef<Path>>(path: P) -> crate::Result<Value> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path).map_err(|e| Error::ReadFailed {
        path: path.to_path_buf(),
        error: e,
    })?;
    parse_config(yaml)
}

/// The built-in configuration, normalized.
pub fn default_configuration() -> crate::Result<Value> {
    normalize_document(&parse_config(DEFAULT_CONFIGURATION)?)
}

/// Render a configuration tree as YAML.
pub fn to_yaml(config: &Value) -> crate::Result<String> {
    serde_yaml::to_string(config).map_err(|e| Error::invalid_config("configuration document", e))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Settings applied to every instance.
///
/// `global` and `package_defaults` are folded in the order they appear in
/// the document, so the later section wins.
pub fn package_defaults(config: &Value) -> crate::Result<Value> {
    let mut defaults = Value::Mapping(Mapping::new());
    let Some(document) = config.as_mapping() else {
        return Ok(defaults);
    };
    for (key, value) in document {
        let Some(key @ (GLOBAL_KEY | PACKAGE_DEFAULTS_KEY)) = key.as_str() else {
            continue;
        };
        match value {
            Value::Null => {}
            Value::Mapping(_) => defaults = merge_values(defaults, &normalize_layer(value)),
            other => {
                return Err(Error::invalid_config(
                    key,
                    format!("expected a mapping, found {}", kind(other)),
                ))
            }
        }
    }
    Ok(defaults)
}

/// Keys accepted in place of their canonical spelling.
const LAYER_ALIASES: [(&str, &str); 3] = [
    ("conanfile", "recipe"),
    ("group", "owner"),
    ("url_basename", "git_url_basename"),
];

/// Fields of the nested `export:` block.
const EXPORT_FIELDS: [&str; 2] = ["owner", "channel"];

/// Rewrite one settings layer into canonical keys.
///
/// Aliases are renamed and the `export:` block is lifted into top-level
/// `owner` and `channel`, so a more specific layer overrides a less
/// specific one whichever spelling each uses. Within a single layer the
/// canonical key beats its alias and the top-level field beats `export:`.
pub fn normalize_layer(layer: &Value) -> Value {
    let Value::Mapping(entries) = layer else {
        return layer.clone();
    };

    let mut normalized = Mapping::new();
    for (key, value) in entries {
        let canonical = key.as_str().and_then(|k| {
            LAYER_ALIASES
                .iter()
                .find(|(alias, _)| *alias == k)
                .map(|(_, canonical)| *canonical)
        });
        match canonical {
            Some(canonical) if entries.contains_key(canonical) => {}
            Some(canonical) => {
                normalized.insert(Value::from(canonical), value.clone());
            }
            None => {
                normalized.insert(key.clone(), value.clone());
            }
        }
    }

    match normalized.shift_remove("export") {
        None | Some(Value::Null) => {}
        Some(Value::Mapping(export)) => {
            for field in EXPORT_FIELDS {
                if let Some(value) = export.get(field) {
                    if !normalized.contains_key(field) {
                        normalized.insert(Value::from(field), value.clone());
                    }
                }
            }
        }
        // left in place so decoding reports the bad shape
        Some(other) => {
            normalized.insert(Value::from("export"), other);
        }
    }
    Value::Mapping(normalized)
}

/// Rewrite a whole document into canonical form.
///
/// `global` is folded into `package_defaults` in document order and every
/// settings layer is passed through [`normalize_layer`]. Documents must be
/// normalized before they are merged, otherwise a user's `global` or
/// `export:` could never override the same setting spelled differently in
/// an earlier document.
pub fn normalize_document(config: &Value) -> crate::Result<Value> {
    let Some(document) = config.as_mapping() else {
        return Ok(config.clone());
    };

    let mut normalized = Mapping::new();
    let mut has_defaults = false;
    for (key, value) in document {
        match key.as_str() {
            Some(GLOBAL_KEY | PACKAGE_DEFAULTS_KEY) => {
                if !has_defaults {
                    normalized.insert(Value::from(PACKAGE_DEFAULTS_KEY), Value::Null);
                    has_defaults = true;
                }
            }
            Some(PACKAGE_OVERRIDES_KEY) => {
                let value = match value {
                    Value::Mapping(overrides) => Value::Mapping(
                        overrides
                            .iter()
                            .map(|(name, layer)| (name.clone(), normalize_layer(layer)))
                            .collect(),
                    ),
                    other => other.clone(),
                };
                normalized.insert(key.clone(), value);
            }
            Some(PACKAGE_INSTANCES_KEY) => {
                let value = match value {
                    Value::Sequence(entries) => {
                        Value::Sequence(entries.iter().map(normalize_layer).collect())
                    }
                    other => other.clone(),
                };
                normalized.insert(key.clone(), value);
            }
            _ => {
                normalized.insert(key.clone(), value.clone());
            }
        }
    }
    if has_defaults {
        normalized.insert(Value::from(PACKAGE_DEFAULTS_KEY), package_defaults(config)?);
    }
    Ok(Value::Mapping(normalized))
}

/// Merge the user document `overlay` into `config`.
///
/// Both sides are normalized first, so the overlay wins for every setting
/// it names regardless of spelling.
pub fn merge_document(config: &mut Value, overlay: &Value) -> crate::Result<()> {
    let mut merged = normalize_document(config)?;
    merge_into(&mut merged, &normalize_document(overlay)?);
    *config = merged;
    Ok(())
}

/// The `package_overrides` entry for `name`, if any.
pub fn package_override<'a>(config: &'a Value, name: &str) -> crate::Result<Option<&'a Value>> {
    match config.get(PACKAGE_OVERRIDES_KEY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Mapping(overrides)) => Ok(overrides.get(name).filter(|v| !v.is_null())),
        Some(other) => Err(Error::invalid_config(
            PACKAGE_OVERRIDES_KEY,
            format!("expected a mapping of package names, found {}", kind(other)),
        )),
    }
}

/// The explicitly configured instance entries, in declaration order.
pub fn package_instances(config: &Value) -> crate::Result<&[Value]> {
    match config.get(PACKAGE_INSTANCES_KEY) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Sequence(items)) => Ok(items),
        Some(other) => Err(Error::invalid_config(
            PACKAGE_INSTANCES_KEY,
            format!("expected a list, found {}", kind(other)),
        )),
    }
}

/// Set `key` of the `package_defaults` section, creating it if needed.
pub fn set_package_default(config: &mut Value, key: &str, value: Value) {
    let mut overlay = Mapping::new();
    let mut defaults = Mapping::new();
    defaults.insert(Value::from(key), value);
    overlay.insert(Value::from(PACKAGE_DEFAULTS_KEY), Value::Mapping(defaults));
    *config = merge_values(std::mem::take(config), &Value::Mapping(overlay));
}

fn default_scratch_folder() -> PathBuf {
    PathBuf::from(format!("_{TOOL_NAMESPACE}.d"))
}

fn default_all() -> Value {
    Value::from("all")
}

fn default_none() -> Value {
    Value::from("none")
}

/// Settings of the tool namespace.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ToolSettings {
    /// Directory receiving log files and other run artifacts.
    #[serde(rename = "scratch-folder", default = "default_scratch_folder")]
    pub scratch_folder: PathBuf,

    #[serde(default = "default_all")]
    pub packages_to_export: Value,

    #[serde(default = "default_all")]
    pub packages_to_test: Value,

    /// Instances whose cached package is kept when exporting.
    #[serde(default = "default_none")]
    pub use_cache: Value,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            scratch_folder: default_scratch_folder(),
            packages_to_export: default_all(),
            packages_to_test: default_all(),
            use_cache: default_none(),
        }
    }
}

impl ToolSettings {
    /// Decode the `namespace` section of `config`. A missing section yields
    /// the defaults.
    pub fn from_config(config: &Value, namespace: &str) -> crate::Result<Self> {
        match config.get(namespace) {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(section) => serde_yaml::from_value(section.clone())
                .map_err(|e| Error::invalid_config(namespace, e)),
        }
    }

    pub fn export_selector(&self) -> crate::Result<Selector> {
        Selector::from_value(&self.packages_to_export)
    }

    pub fn test_selector(&self) -> crate::Result<Selector> {
        Selector::from_value(&self.packages_to_test)
    }

    pub fn use_cache_selector(&self) -> crate::Result<Selector> {
        Selector::from_value(&self.use_cache)
    }
}
