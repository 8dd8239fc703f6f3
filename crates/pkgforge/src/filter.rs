// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! Selecting a subset of the configured package instances.
//!
//! A selector is written in configuration (or on the command line) as one of:
//!
//! ```yaml
//! packages_to_test: all            # every instance
//! packages_to_test: none           # nothing
//! packages_to_test: [PackA, PackB] # instances with these names
//! packages_to_test:
//!   include: ["Pack.*"]            # prefix-anchored regexes
//!   exclude: PackB
//!   depends_on: boost/1.69.0@conan/stable
//! ```
//!
//! `include` and `exclude` patterns match at the start of the name only, so
//! the pattern `Pack` selects `PackA`. Anchor with `$` to match a full name.

use std::str::FromStr;

use regex::Regex;
use serde_yaml::Value;

use crate::instance::PackageInstance;
use crate::manager::PackageManager;
use crate::Error;

#[cfg(test)]
#[path = "./filter_test.rs"]
mod filter_test;

/// Which instances a batch operation applies to.
#[derive(Debug, Clone, Default)]
pub enum Selector {
    All,
    #[default]
    None,
    /// Instances whose name is in the list.
    Names(Vec<String>),
    Rules(FilterRules),
}

/// The `{include, exclude, depends_on}` form of a selector.
#[derive(Debug, Clone, Default)]
pub struct FilterRules {
    pub include: Vec<Regex>,
    pub exclude: Vec<Regex>,
    /// References (or instance names) a selected instance must depend on.
    pub depends_on: Vec<String>,
}

impl Selector {
    /// Decode a selector from its configuration form.
    pub fn from_value(value: &Value) -> crate::Result<Self> {
        match value {
            Value::String(keyword) => Self::keyword(keyword),
            Value::Sequence(items) => items
                .iter()
                .map(|item| {
                    crate::settings::scalar_text(item)
                        .ok_or_else(|| Error::UnknownFilterSpec(describe(item)))
                })
                .collect::<crate::Result<Vec<_>>>()
                .map(Self::Names),
            Value::Mapping(map) => {
                let mut rules = FilterRules::default();
                for (key, entry) in map {
                    match key.as_str() {
                        Some("include") => rules.include = patterns(entry)?,
                        Some("exclude") => rules.exclude = patterns(entry)?,
                        Some("depends_on") => rules.depends_on = one_or_many(entry)?,
                        _ => return Err(Error::UnknownFilterSpec(describe(value))),
                    }
                }
                Ok(Self::Rules(rules))
            }
            other => Err(Error::UnknownFilterSpec(describe(other))),
        }
    }

    fn keyword(keyword: &str) -> crate::Result<Self> {
        match keyword.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "none" => Ok(Self::None),
            _ => Err(Error::UnknownFilterSpec(keyword.to_string())),
        }
    }

    /// A selector built from include patterns only.
    pub fn include<I, S>(patterns: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let include = patterns
            .into_iter()
            .map(|p| compile(p.as_ref()))
            .collect::<crate::Result<_>>()?;
        Ok(Self::Rules(FilterRules {
            include,
            ..Default::default()
        }))
    }
}

impl FromStr for Selector {
    type Err = Error;

    /// `all`, `none`, or a comma separated list of names.
    fn from_str(s: &str) -> crate::Result<Self> {
        let trimmed = s.trim();
        if let Ok(selector) = Self::keyword(trimmed) {
            return Ok(selector);
        }
        let names: Vec<String> = trimmed
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect();
        if names.is_empty() {
            return Err(Error::UnknownFilterSpec(s.to_string()));
        }
        Ok(Self::Names(names))
    }
}

fn describe(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|_| format!("{value:?}"))
}

fn one_or_many(value: &Value) -> crate::Result<Vec<String>> {
    let items = match value {
        Value::Sequence(items) => items.iter().collect(),
        single => vec![single],
    };
    items
        .into_iter()
        .map(|item| {
            crate::settings::scalar_text(item).ok_or_else(|| Error::UnknownFilterSpec(describe(item)))
        })
        .collect()
}

fn patterns(value: &Value) -> crate::Result<Vec<Regex>> {
    one_or_many(value)?.iter().map(|p| compile(p)).collect()
}

/// Compile `pattern` so that it only matches at the start of a name.
fn compile(pattern: &str) -> crate::Result<Regex> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|error| Error::InvalidFilterPattern {
        pattern: pattern.to_string(),
        error,
    })
}

/// Indices of the instances selected by `selector`, in collection order.
///
/// Only `depends_on` rules consult `manager`. A failed dependency query
/// counts as "no dependencies" for that instance.
pub fn matching_indices(
    selector: &Selector,
    instances: &[PackageInstance],
    manager: &dyn PackageManager,
) -> Vec<usize> {
    match selector {
        Selector::All => (0..instances.len()).collect(),
        Selector::None => Vec::new(),
        Selector::Names(names) => instances
            .iter()
            .enumerate()
            .filter(|(_, instance)| names.contains(&instance.name()))
            .map(|(i, _)| i)
            .collect(),
        Selector::Rules(rules) => {
            let targets = resolve_targets(&rules.depends_on, instances);
            instances
                .iter()
                .enumerate()
                .filter(|(_, instance)| rules.admits(instance, &targets, manager))
                .map(|(i, _)| i)
                .collect()
        }
    }
}

/// The instances selected by `selector`, in collection order.
pub fn filter<'a>(
    selector: &Selector,
    instances: &'a [PackageInstance],
    manager: &dyn PackageManager,
) -> Vec<&'a PackageInstance> {
    matching_indices(selector, instances, manager)
        .into_iter()
        .map(|i| &instances[i])
        .collect()
}

impl FilterRules {
    fn admits(
        &self,
        instance: &PackageInstance,
        targets: &[String],
        manager: &dyn PackageManager,
    ) -> bool {
        let name = instance.name();
        let mut admitted = self.include.iter().any(|re| re.is_match(&name));
        if self.exclude.iter().any(|re| re.is_match(&name)) {
            admitted = false;
        }
        if !admitted && !targets.is_empty() {
            admitted = depends_on_any(instance, targets, manager);
        }
        admitted
    }
}

/// A target naming a configured instance stands for that instance's
/// reference. Anything else is taken as a reference (or prefix of one).
fn resolve_targets(targets: &[String], instances: &[PackageInstance]) -> Vec<String> {
    targets
        .iter()
        .map(|target| {
            instances
                .iter()
                .find(|instance| &instance.name() == target)
                .and_then(|instance| instance.reference().ok())
                .map(|reference| reference.to_string())
                .unwrap_or_else(|| target.clone())
        })
        .collect()
}

fn depends_on_any(
    instance: &PackageInstance,
    targets: &[String],
    manager: &dyn PackageManager,
) -> bool {
    let reference = match instance.reference() {
        Ok(reference) => reference,
        Err(err) => {
            tracing::debug!("cannot query dependencies of {}: {err}", instance.name());
            return false;
        }
    };
    let Some(graph) = manager.info(&reference) else {
        tracing::warn!("No dependency information available for {reference}");
        return false;
    };
    graph
        .iter()
        .flat_map(|node| node.requires.iter())
        .any(|requirement| targets.iter().any(|t| requirement_matches(requirement, t)))
}

/// Whether `requirement` is `target`, or `target` is a prefix of it ending
/// at a reference delimiter.
pub(crate) fn requirement_matches(requirement: &str, target: &str) -> bool {
    match requirement.strip_prefix(target) {
        Some("") => true,
        Some(rest) => !target.is_empty() && (rest.starts_with('/') || rest.starts_with('@')),
        None => false,
    }
}
