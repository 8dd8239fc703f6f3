// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! Dependency override rules and their resolution.
//!
//! A rule rewrites a dependency reference found in a template recipe. The
//! rule's pattern selects dependencies by name (or `*` for every
//! dependency) and its replacement is a reference template where any field
//! written as `[name]`, `[version]`, `[owner]` or `[channel]` (or simply
//! `*`) takes the value of the original dependency.
//!
//! ```yaml
//! dependency_overrides:
//!   # pin PackA to an exact reference
//!   - PackA/2.6@initech/stable
//!   # move every dependency to one owner/channel, keeping name and version
//!   - pattern: "*"
//!     replacement: "[name]/[version]@initech/testing"
//! ```

use serde::{Deserialize, Serialize};

use crate::reference::{PackageReference, ReferenceField};

#[cfg(test)]
#[path = "./overrides_test.rs"]
mod overrides_test;

/// Pattern name that matches any dependency.
pub const WILDCARD: &str = "*";

/// A single pattern/replacement rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "RawOverride", into = "RawOverride")]
pub struct DependencyOverride {
    pub pattern: String,
    pub replacement: String,
}

/// On-disk forms of a rule. A bare string is both pattern and replacement.
#[derive(Deserialize, Serialize)]
#[serde(untagged)]
enum RawOverride {
    Shorthand(String),
    Full { pattern: String, replacement: String },
}

impl From<RawOverride> for DependencyOverride {
    fn from(raw: RawOverride) -> Self {
        match raw {
            RawOverride::Shorthand(rule) => Self::shorthand(rule),
            RawOverride::Full {
                pattern,
                replacement,
            } => Self {
                pattern,
                replacement,
            },
        }
    }
}

impl From<DependencyOverride> for RawOverride {
    fn from(rule: DependencyOverride) -> Self {
        if rule.pattern == rule.replacement {
            RawOverride::Shorthand(rule.pattern)
        } else {
            RawOverride::Full {
                pattern: rule.pattern,
                replacement: rule.replacement,
            }
        }
    }
}

impl DependencyOverride {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    /// A rule whose pattern and replacement are the same reference template.
    pub fn shorthand(rule: impl Into<String>) -> Self {
        let rule = rule.into();
        Self {
            pattern: rule.clone(),
            replacement: rule,
        }
    }

    /// The dependency name this rule selects, or `None` if the pattern
    /// cannot be understood.
    ///
    /// The pattern may be a full reference template or a bare name.
    pub fn pattern_name(&self) -> Option<String> {
        if let Ok(reference) = PackageReference::parse(&self.pattern) {
            return Some(reference.name);
        }
        let bare = !self.pattern.is_empty()
            && !self
                .pattern
                .contains(|c| matches!(c, '/' | '@' | '"' | '\''));
        bare.then(|| self.pattern.clone())
    }

    /// True if this rule selects the given dependency.
    pub fn matches(&self, dependency: &PackageReference) -> bool {
        match self.pattern_name() {
            Some(name) => name == WILDCARD || name == dependency.name,
            None => false,
        }
    }

    /// Build the replacement for `dependency`, ignoring the pattern.
    ///
    /// Returns `None` when the substituted replacement is not a valid
    /// reference.
    pub fn render(&self, dependency: &PackageReference) -> Option<PackageReference> {
        let mut text = self.replacement.clone();
        for field in ReferenceField::ALL {
            let placeholder = format!("[{}]", field.key());
            text = text.replace(&placeholder, dependency.field(field));
        }

        let mut rendered = PackageReference::parse(&text).ok()?;
        for field in ReferenceField::ALL {
            if rendered.field(field) == WILDCARD {
                let inherited = dependency.field(field).to_string();
                match field {
                    ReferenceField::Name => rendered.name = inherited,
                    ReferenceField::Version => rendered.version = inherited,
                    ReferenceField::Owner => rendered.owner = inherited,
                    ReferenceField::Channel => rendered.channel = inherited,
                }
            }
        }
        Some(rendered)
    }
}

/// Rewrite a dependency reference according to an ordered list of rules.
///
/// Every rule is considered in order and the last matching one wins. If no
/// rule matches, the dependency is returned unchanged. Rules whose pattern
/// or replacement cannot be understood are reported and skipped.
pub fn resolve_dependency(
    dependency: &PackageReference,
    rules: &[DependencyOverride],
) -> PackageReference {
    let mut resolved = dependency.clone();
    for rule in rules {
        if rule.pattern_name().is_none() {
            tracing::warn!(pattern = %rule.pattern, "ignoring dependency override with unparseable pattern");
            continue;
        }
        if !rule.matches(dependency) {
            continue;
        }
        match rule.render(dependency) {
            Some(candidate) => resolved = candidate,
            None => {
                tracing::warn!(
                    replacement = %rule.replacement,
                    dependency = %dependency,
                    "dependency override does not produce a valid reference"
                );
            }
        }
    }
    resolved
}

/// String form of [`resolve_dependency`].
pub fn resolve(dependency: &str, rules: &[DependencyOverride]) -> crate::Result<String> {
    let dependency = PackageReference::parse(dependency)?;
    Ok(resolve_dependency(&dependency, rules).to_string())
}
