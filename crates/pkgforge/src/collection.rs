// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! The ordered set of package instances built from one configuration.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::config;
use crate::discovery::discover_recipes;
use crate::filter::{self, Selector};
use crate::instance::{PackageInstance, StepStatus};
use crate::manager::PackageManager;
use crate::merge::compose_layers;
use crate::overrides::DependencyOverride;
use crate::settings::{recipe_package_name, scalar_text};
use crate::Error;

#[cfg(test)]
#[path = "./collection_test.rs"]
mod collection_test;

/// Number of identity characters used in log file names.
const LOG_IDENTITY_LEN: usize = 8;

/// One operation run against an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Export,
    Build,
    Test,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Export => "export",
            Self::Build => "build",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a package came out of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
    /// Nothing was run, e.g. a test step without a test directory.
    Skipped,
}

/// Result of running a pipeline for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageResult {
    pub name: String,
    pub reference: Option<String>,
    pub outcome: Outcome,
    /// Log of the last step that ran.
    pub log: PathBuf,
}

/// Results of a batch, in collection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub results: Vec<PackageResult>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.results.len()
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(Outcome::Skipped)
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &PackageResult> {
        self.results.iter().filter(|r| r.outcome == Outcome::Failed)
    }

    /// Process exit code: the number of failed packages.
    pub fn exit_code(&self) -> i32 {
        i32::try_from(self.failed()).unwrap_or(i32::MAX)
    }

    pub fn extend(&mut self, other: BatchReport) {
        self.results.extend(other.results);
    }
}

/// Settings shared by every package of a batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Directory receiving one log file per package and step.
    pub log_dir: PathBuf,
    /// Remove each reference from the local cache before exporting it.
    pub clear_cache: bool,
    /// Instances whose cached package is kept even when clearing.
    pub use_cache: Selector,
}

impl BatchOptions {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            clear_cache: true,
            use_cache: Selector::None,
        }
    }
}

/// An instance scheduled to run in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedRun {
    /// Position in the collection.
    pub index: usize,
    pub clear_cache: bool,
}

/// Instances built by folding defaults, per-name overrides and instance
/// entries of a configuration.
#[derive(Debug, Clone)]
pub struct PackageCollection {
    config: Value,
    instances: Vec<PackageInstance>,
    /// Calls to `add_from_recipe_collection` since the last `load`.
    discoveries: usize,
}

impl Default for PackageCollection {
    fn default() -> Self {
        Self {
            config: Value::Mapping(Mapping::new()),
            instances: Vec::new(),
            discoveries: 0,
        }
    }
}

impl PackageCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Value) -> crate::Result<Self> {
        let mut collection = Self::new();
        collection.load(config)?;
        Ok(collection)
    }

    /// Replace the configuration and rebuild every instance.
    pub fn load(&mut self, config: &Value) -> crate::Result<()> {
        self.rebuild(config::normalize_document(config)?)?;
        self.discoveries = 0;
        Ok(())
    }

    /// Merge `config` into the current configuration and rebuild every
    /// instance.
    pub fn update(&mut self, config: &Value) -> crate::Result<()> {
        let mut merged = self.config.clone();
        config::merge_document(&mut merged, config)?;
        self.rebuild(merged)
    }

    fn rebuild(&mut self, config: Value) -> crate::Result<()> {
        self.instances = build_instances(&config)?;
        self.config = config;
        pin_siblings(&mut self.instances);
        Ok(())
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn instances(&self) -> &[PackageInstance] {
        &self.instances
    }

    pub fn instances_mut(&mut self) -> &mut [PackageInstance] {
        &mut self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Append one instance per template recipe found in `dir`.
    ///
    /// The first call skips packages that are already explicitly configured.
    /// Later calls append every discovered package again, so calling this
    /// twice yields the discovered packages twice. The new entries are also
    /// recorded in `package_instances` so that a later
    /// [`update`](Self::update) keeps them. Returns the number of instances
    /// added.
    pub fn add_from_recipe_collection<P: AsRef<Path>>(&mut self, dir: P) -> crate::Result<usize> {
        let recipes = discover_recipes(dir)?;
        let configured: HashSet<String> = if self.discoveries == 0 {
            self.instances.iter().map(PackageInstance::name).collect()
        } else {
            HashSet::new()
        };
        self.discoveries += 1;

        let mut entries = Vec::with_capacity(recipes.len());
        for found in &recipes {
            if configured.contains(&found.name) {
                tracing::debug!("{} is already configured, skipping discovered recipe", found.name);
                continue;
            }
            let mut entry = Mapping::new();
            entry.insert(Value::from("name"), Value::from(found.name.as_str()));
            entry.insert(
                Value::from("recipe"),
                Value::from(found.recipe.to_string_lossy().into_owned()),
            );
            let entry = Value::Mapping(entry);
            self.instances.push(build_instance(&self.config, &entry)?);
            entries.push(entry);
        }

        let count = entries.len();
        let document = self
            .config
            .as_mapping_mut()
            .ok_or_else(|| Error::invalid_config("configuration document", "expected a mapping"))?;
        match document.get_mut(config::PACKAGE_INSTANCES_KEY) {
            Some(Value::Sequence(existing)) => existing.extend(entries),
            _ => {
                document.insert(
                    Value::from(config::PACKAGE_INSTANCES_KEY),
                    Value::Sequence(entries),
                );
            }
        }
        pin_siblings(&mut self.instances);
        tracing::debug!("added {count} instances from recipe collection");
        Ok(count)
    }

    /// The instances selected by `selector`, in collection order.
    pub fn select(&self, selector: &Selector, manager: &dyn PackageManager) -> Vec<&PackageInstance> {
        filter::filter(selector, &self.instances, manager)
    }

    /// Which instances a batch over `selector` runs, and whether each one's
    /// cached package is removed before it is exported.
    pub fn plan(
        &self,
        selector: &Selector,
        options: &BatchOptions,
        manager: &dyn PackageManager,
    ) -> Vec<PlannedRun> {
        let selected = filter::matching_indices(selector, &self.instances, manager);
        let keep = if options.clear_cache && !selected.is_empty() {
            filter::matching_indices(&options.use_cache, &self.instances, manager)
        } else {
            Vec::new()
        };
        selected
            .into_iter()
            .map(|index| PlannedRun {
                index,
                clear_cache: options.clear_cache && !keep.contains(&index),
            })
            .collect()
    }

    /// Run `steps` for every selected instance, in collection order.
    ///
    /// A failed step ends that instance's pipeline but not the batch.
    /// Configuration errors abort the batch.
    pub fn run(
        &mut self,
        selector: &Selector,
        steps: &[Step],
        manager: &dyn PackageManager,
        options: &BatchOptions,
    ) -> crate::Result<BatchReport> {
        let mut report = BatchReport::default();
        for planned in self.plan(selector, options, manager) {
            let instance = &mut self.instances[planned.index];
            let result = run_pipeline(
                instance,
                steps,
                manager,
                &options.log_dir,
                planned.clear_cache,
            )?;
            report.results.push(result);
        }
        Ok(report)
    }

    pub fn export_packages(
        &mut self,
        selector: &Selector,
        manager: &dyn PackageManager,
        options: &BatchOptions,
    ) -> crate::Result<BatchReport> {
        self.run(selector, &[Step::Export], manager, options)
    }

    pub fn build_packages(
        &mut self,
        selector: &Selector,
        manager: &dyn PackageManager,
        options: &BatchOptions,
    ) -> crate::Result<BatchReport> {
        self.run(selector, &[Step::Build], manager, options)
    }

    pub fn test_packages(
        &mut self,
        selector: &Selector,
        manager: &dyn PackageManager,
        options: &BatchOptions,
    ) -> crate::Result<BatchReport> {
        self.run(selector, &[Step::Test], manager, options)
    }
}

/// Log file for one step of an instance.
pub fn log_path(log_dir: &Path, instance: &PackageInstance, step: Step) -> PathBuf {
    let identity = instance.identity();
    log_dir.join(format!(
        "{}-{}.{}.log",
        instance.name(),
        &identity[..LOG_IDENTITY_LEN],
        step
    ))
}

/// Run `steps` in order for one instance, stopping at the first failure.
///
/// When `clear_cache` is set the instance's reference is removed from the
/// local cache before it is exported.
pub fn run_pipeline(
    instance: &mut PackageInstance,
    steps: &[Step],
    manager: &dyn PackageManager,
    log_dir: &Path,
    clear_cache: bool,
) -> crate::Result<PackageResult> {
    let name = instance.name();
    let reference = instance.reference().ok().map(|r| r.to_string());
    let mut outcome = Outcome::Skipped;
    let mut log = log_dir.to_path_buf();

    for &step in steps {
        log = log_path(log_dir, instance, step);
        let status = match step {
            Step::Export => {
                if clear_cache {
                    instance.remove_from_cache(manager, &log)?;
                } else {
                    tracing::info!("using cached package (if it exists) for {name}");
                }
                Some(instance.export(manager, &log)?)
            }
            Step::Build => Some(instance.build(manager, &log)?),
            Step::Test => instance.test(manager, &log)?,
        };
        match status {
            Some(StepStatus::Failed) => {
                outcome = Outcome::Failed;
                break;
            }
            Some(StepStatus::Passed) => outcome = Outcome::Passed,
            None => {}
        }
    }

    Ok(PackageResult {
        name,
        reference,
        outcome,
        log,
    })
}

fn build_instances(config: &Value) -> crate::Result<Vec<PackageInstance>> {
    config::package_instances(config)?
        .iter()
        .map(|entry| build_instance(config, entry))
        .collect()
}

/// Point every instance's dependencies on other packages of the collection
/// at the references those packages are configured with.
///
/// The first instance of a name wins. References to the instance's own
/// name are left alone, and its `dependency_overrides` still apply on top.
fn pin_siblings(instances: &mut [PackageInstance]) {
    let mut siblings: Vec<(String, String)> = Vec::new();
    for instance in instances.iter() {
        let Ok(reference) = instance.reference() else {
            continue;
        };
        if siblings.iter().all(|(name, _)| *name != reference.name) {
            siblings.push((reference.name.clone(), reference.to_string()));
        }
    }

    for instance in instances.iter_mut() {
        let own = instance.settings().package_name();
        let pins = siblings
            .iter()
            .filter(|(name, _)| Some(name) != own.as_ref())
            .map(|(name, reference)| DependencyOverride::new(name.as_str(), reference.as_str()))
            .collect();
        instance.set_pins(pins);
    }
}

/// Fold defaults, the override for the entry's name and the entry itself.
fn build_instance(config: &Value, entry: &Value) -> crate::Result<PackageInstance> {
    if !matches!(entry, Value::Mapping(_)) {
        return Err(Error::invalid_config(
            config::PACKAGE_INSTANCES_KEY,
            "every instance entry must be a mapping",
        ));
    }
    let name = entry_name(entry);
    let defaults = config::package_defaults(config)?;
    let overrides = match &name {
        Some(name) => config::package_override(config, name)?,
        None => None,
    };

    let overrides = overrides.map(config::normalize_layer);
    let entry = config::normalize_layer(entry);
    let layers = [Some(&defaults), overrides.as_ref(), Some(&entry)];
    let mut merged = compose_layers(layers.into_iter().flatten());
    if let (Some(name), Value::Mapping(map)) = (&name, &mut merged) {
        if !map.contains_key("name") {
            map.insert(Value::from("name"), Value::from(name.as_str()));
        }
    }
    PackageInstance::from_config(&merged)
}

/// The entry's explicit name, or the name implied by its recipe location.
fn entry_name(entry: &Value) -> Option<String> {
    if let Some(name) = entry.get("name").and_then(scalar_text) {
        return Some(name);
    }
    entry
        .get("recipe")
        .or_else(|| entry.get("conanfile"))
        .and_then(Value::as_str)
        .and_then(|recipe| recipe_package_name(Path::new(recipe)))
}
