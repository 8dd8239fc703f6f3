// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! Textual instantiation of template recipes.
//!
//! Template recipes are treated as opaque text. Settings are injected by
//! rewriting assignment lines such as `version = "master"`, and dependency
//! references are rewritten wherever they appear as quoted string literals.
//! A template may declare `injected_<key> = ...` to receive a setting in
//! place of its plain `<key> = ...` assignment.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde_yaml::Value;

use crate::overrides::{resolve_dependency, DependencyOverride};
use crate::reference::{PackageReference, QUOTED_REFERENCE_RE};
use crate::Error;

#[cfg(test)]
#[path = "./template_test.rs"]
mod template_test;

/// Comment appended to every line rewritten by setting injection.
pub const MODIFIED_MARKER: &str = "# pkgforge: setting injected into recipe instance";

/// Prefix a template uses to receive a setting under a different name.
pub const INJECTED_PREFIX: &str = "injected_";

/// A non-fatal problem found while instantiating a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstitutionWarning {
    /// No assignment for the setting exists in the template.
    SettingNotFound { key: String },
    /// More than one assignment matched; all of them were replaced.
    AmbiguousSetting { key: String, count: usize },
    /// The setting value is a sequence or mapping.
    NotInjectable { key: String },
}

impl fmt::Display for SubstitutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SettingNotFound { key } => {
                write!(f, "setting '{key}' was not found in the template recipe")
            }
            Self::AmbiguousSetting { key, count } => write!(
                f,
                "setting '{key}' is assigned {count} times in the template recipe, all were replaced"
            ),
            Self::NotInjectable { key } => {
                write!(f, "setting '{key}' is not a scalar and cannot be injected")
            }
        }
    }
}

/// Result of instantiating a template.
#[derive(Debug, Clone, Default)]
pub struct Instantiation {
    pub text: String,
    pub warnings: Vec<SubstitutionWarning>,
    /// Dependency references that were rewritten, as `(from, to)`.
    pub rewrites: Vec<(String, String)>,
}

/// A template recipe loaded from disk.
#[derive(Debug, Clone)]
pub struct RecipeTemplate {
    pub path: PathBuf,
    pub text: String,
}

impl RecipeTemplate {
    /// Load the template for `package`.
    pub fn load(path: &Path, package: &str) -> crate::Result<Self> {
        if !path.is_file() {
            return Err(Error::TemplateNotFound {
                package: package.to_string(),
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|e| Error::ReadFailed {
            path: path.to_path_buf(),
            error: e,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            text,
        })
    }

    pub fn instantiate(
        &self,
        package: &str,
        settings: &IndexMap<String, Value>,
        rules: &[DependencyOverride],
    ) -> Instantiation {
        let result = instantiate(&self.text, settings, rules);
        for warning in &result.warnings {
            tracing::warn!(package, template = ?self.path, "{warning}");
        }
        for (from, to) in &result.rewrites {
            tracing::info!(package, "replacing '{from}' with '{to}'");
        }
        result
    }
}

/// Instantiate template text with the given settings and dependency rules.
///
/// The output only depends on the inputs: settings are applied in their
/// insertion order and rules in list order.
pub fn instantiate(
    template: &str,
    settings: &IndexMap<String, Value>,
    rules: &[DependencyOverride],
) -> Instantiation {
    let mut result = Instantiation {
        text: template.to_string(),
        ..Default::default()
    };

    for (key, value) in settings {
        let Some(literal) = recipe_literal(value) else {
            result
                .warnings
                .push(SubstitutionWarning::NotInjectable { key: key.clone() });
            continue;
        };
        inject_setting(&mut result, key, &literal);
    }

    rewrite_dependencies(&mut result, rules);
    result
}

/// Render a setting value as a literal in the recipe language.
pub fn recipe_literal(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return Some("None".to_string()),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    Some(format!(
        "\"{}\"",
        text.replace('\\', "\\\\").replace('"', "\\\"")
    ))
}

fn assignment_regex(name: &str) -> Regex {
    let pattern = format!(
        r"(?m)^(?P<indent>[ \t]*){}[ \t]*=(?:[^=\r\n][^\r\n]*)?$",
        regex::escape(name)
    );
    Regex::new(&pattern).expect("escaped assignment pattern is a valid regex")
}

fn inject_setting(result: &mut Instantiation, key: &str, literal: &str) {
    let protected = format!("{INJECTED_PREFIX}{key}");
    let protected_re = assignment_regex(&protected);
    let (target, re) = if protected_re.is_match(&result.text) {
        (protected, protected_re)
    } else {
        (key.to_string(), assignment_regex(key))
    };

    let count = re.find_iter(&result.text).count();
    match count {
        0 => {
            result.warnings.push(SubstitutionWarning::SettingNotFound {
                key: key.to_string(),
            });
            return;
        }
        1 => {}
        _ => result.warnings.push(SubstitutionWarning::AmbiguousSetting {
            key: key.to_string(),
            count,
        }),
    }

    let replaced = re.replace_all(&result.text, |caps: &Captures| {
        format!(
            "{}{} = {}  {}",
            &caps["indent"], target, literal, MODIFIED_MARKER
        )
    });
    result.text = replaced.into_owned();
}

fn rewrite_dependencies(result: &mut Instantiation, rules: &[DependencyOverride]) {
    if rules.is_empty() {
        return;
    }
    let mut rewrites = Vec::new();
    let text = &result.text;
    let replaced = QUOTED_REFERENCE_RE.replace_all(text, |caps: &Captures| {
        let (Some(whole), Some(found)) = (caps.get(0), caps.name("reference")) else {
            return caps[0].to_string();
        };
        let Ok(original) = PackageReference::parse(found.as_str()) else {
            return whole.as_str().to_string();
        };
        let resolved = resolve_dependency(&original, rules);
        if resolved == original {
            return whole.as_str().to_string();
        }
        rewrites.push((original.to_string(), resolved.to_string()));
        format!(
            "{}{}{}",
            &text[whole.start()..found.start()],
            resolved,
            &text[found.end()..whole.end()]
        )
    });
    result.text = replaced.into_owned();
    result.rewrites.extend(rewrites);
}
