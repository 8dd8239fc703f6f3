// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! A single package instance and the operations run against it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_yaml::Value;
use sha2::{Digest, Sha256};

use crate::config::normalize_layer;
use crate::manager::PackageManager;
use crate::merge::merge_into;
use crate::overrides::DependencyOverride;
use crate::reference::PackageReference;
use crate::settings::PackageSettings;
use crate::template::RecipeTemplate;
use crate::Error;

#[cfg(test)]
#[path = "./instance_test.rs"]
mod instance_test;

/// Directory beside the template recipe holding its test recipe.
pub const TEST_PACKAGE_DIRNAME: &str = "test_package";

/// Number of identity characters baked into instantiated recipe names.
const IDENTITY_PREFIX_LEN: usize = 12;

/// Lifecycle of an instance. Later states imply the earlier ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstanceState {
    #[default]
    Unconfigured,
    Loaded,
    Instantiated,
    Exported,
    Built,
    Tested,
}

/// Result of running one external step for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Passed,
    Failed,
}

impl StepStatus {
    /// Process exit code for this status.
    pub fn code(&self) -> i32 {
        match self {
            Self::Passed => 0,
            Self::Failed => 1,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// One fully resolved package configuration.
#[derive(Debug, Clone, Default)]
pub struct PackageInstance {
    raw: Value,
    settings: PackageSettings,
    state: InstanceState,
    /// References of the other packages of its collection, applied before
    /// `dependency_overrides`.
    pins: Vec<DependencyOverride>,
}

/// Attributes that make up an instance's identity.
#[derive(Debug, Serialize)]
struct IdentityFields<'a> {
    name: Option<&'a str>,
    reference_name: Option<String>,
    version: Option<String>,
    owner: Option<String>,
    channel: Option<String>,
    checkout: Option<&'a str>,
    git_url_basename: Option<&'a str>,
    repo_name: Option<&'a str>,
    recipe: Option<&'a Path>,
    setting_overrides: BTreeMap<&'a str, &'a Value>,
    pins: &'a [DependencyOverride],
    dependency_overrides: &'a [DependencyOverride],
}

impl PackageInstance {
    /// An unconfigured instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an instance from an already merged configuration.
    pub fn from_config(config: &Value) -> crate::Result<Self> {
        let mut instance = Self::new();
        instance.load(config)?;
        Ok(instance)
    }

    /// Replace the configuration of this instance.
    pub fn load(&mut self, config: &Value) -> crate::Result<()> {
        self.apply(normalize_layer(config))
    }

    /// Merge `config` on top of the current configuration.
    pub fn update(&mut self, config: &Value) -> crate::Result<()> {
        let mut raw = self.raw.clone();
        merge_into(&mut raw, &normalize_layer(config));
        self.apply(raw)
    }

    fn apply(&mut self, raw: Value) -> crate::Result<()> {
        let context = match raw.get("name").and_then(Value::as_str) {
            Some(name) => format!("package '{name}'"),
            None => "package instance".to_string(),
        };
        self.settings = PackageSettings::from_value(raw.clone(), &context)?;
        self.raw = raw;
        self.state = InstanceState::Loaded;
        Ok(())
    }

    pub fn settings(&self) -> &PackageSettings {
        &self.settings
    }

    /// The merged configuration this instance was loaded from.
    pub fn raw_config(&self) -> &Value {
        &self.raw
    }

    /// Pin dependencies on other packages to the given references.
    pub fn set_pins(&mut self, pins: Vec<DependencyOverride>) {
        self.pins = pins;
    }

    pub fn pins(&self) -> &[DependencyOverride] {
        &self.pins
    }

    /// Rules applied to the template's dependency references, in order.
    pub fn dependency_rules(&self) -> Vec<DependencyOverride> {
        self.pins
            .iter()
            .chain(&self.settings.dependency_overrides)
            .cloned()
            .collect()
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    fn advance(&mut self, state: InstanceState) {
        self.state = self.state.max(state);
    }

    /// Name used to refer to this instance.
    pub fn name(&self) -> String {
        self.settings.label()
    }

    pub fn reference(&self) -> crate::Result<PackageReference> {
        self.settings.reference()
    }

    pub fn template_path(&self) -> crate::Result<&Path> {
        self.settings
            .recipe
            .as_deref()
            .ok_or_else(|| Error::NoTemplate(self.name()))
    }

    /// Stable hash over the attributes that define this instance.
    pub fn identity(&self) -> String {
        let s = &self.settings;
        let fields = IdentityFields {
            name: s.name.as_deref(),
            reference_name: s.package_name(),
            version: s.package_version(),
            owner: s.package_owner(),
            channel: s.package_channel(),
            checkout: s.checkout.as_deref(),
            git_url_basename: s.git_url_basename.as_deref(),
            repo_name: s.repo_name.as_deref(),
            recipe: s.recipe.as_deref(),
            setting_overrides: s
                .setting_overrides
                .iter()
                .map(|(k, v)| (k.as_str(), v))
                .collect(),
            pins: &self.pins,
            dependency_overrides: &s.dependency_overrides,
        };
        let encoded = serde_yaml::to_string(&fields).unwrap_or_else(|_| format!("{fields:?}"));
        format!("{:x}", Sha256::digest(encoded.as_bytes()))
    }

    /// Where the instantiated recipe is written: beside the template, with
    /// the identity in its file name.
    pub fn instance_recipe_path(&self) -> crate::Result<PathBuf> {
        let template = self.template_path()?;
        let identity = self.identity();
        let short = &identity[..IDENTITY_PREFIX_LEN];
        let stem = template
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recipe".to_string());
        let file_name = match template.extension() {
            Some(ext) => format!("{stem}-{short}.{}", ext.to_string_lossy()),
            None => format!("{stem}-{short}"),
        };
        Ok(template.with_file_name(file_name))
    }

    /// The test recipe directory, if the template has one.
    pub fn test_dir(&self) -> Option<PathBuf> {
        let dir = self.settings.recipe.as_deref()?.parent()?.join(TEST_PACKAGE_DIRNAME);
        dir.is_dir().then_some(dir)
    }

    /// Write the instantiated recipe and return its path.
    ///
    /// Writing the same configuration twice produces the same bytes at the
    /// same path.
    pub fn instantiate(&mut self) -> crate::Result<PathBuf> {
        let name = self.name();
        let template = RecipeTemplate::load(self.template_path()?, &name)?;
        let target = self.instance_recipe_path()?;
        let result = template.instantiate(
            &name,
            &self.settings.injected_settings(),
            &self.dependency_rules(),
        );
        std::fs::write(&target, result.text).map_err(|e| Error::WriteFailed {
            path: target.clone(),
            error: e,
        })?;
        tracing::debug!(package = %name, "wrote recipe instance {:?}", target);
        self.advance(InstanceState::Instantiated);
        Ok(target)
    }

    /// Export the instance under its own owner and channel.
    pub fn export(
        &mut self,
        manager: &dyn PackageManager,
        log: &Path,
    ) -> crate::Result<StepStatus> {
        let reference = self.reference()?;
        self.export_to(manager, &reference.owner, &reference.channel, log)
    }

    /// Export the instance under `owner/channel`.
    pub fn export_to(
        &mut self,
        manager: &dyn PackageManager,
        owner: &str,
        channel: &str,
        log: &Path,
    ) -> crate::Result<StepStatus> {
        let recipe = self.instantiate()?;
        tracing::info!("Exporting {} to {owner}/{channel}", self.name());
        let status = manager.export(&recipe, owner, channel, log);
        Ok(self.finish(status.success, "exporting", log, InstanceState::Exported))
    }

    /// Install the instance's reference, building it if needed.
    pub fn build(&mut self, manager: &dyn PackageManager, log: &Path) -> crate::Result<StepStatus> {
        let reference = self.reference()?;
        self.instantiate()?;
        tracing::info!("Building {reference}");
        let status = manager.install(&reference, log);
        Ok(self.finish(status.success, "building", log, InstanceState::Built))
    }

    /// Run the instance's test recipe.
    ///
    /// Returns `None` when the template has no test directory.
    pub fn test(
        &mut self,
        manager: &dyn PackageManager,
        log: &Path,
    ) -> crate::Result<Option<StepStatus>> {
        let Some(test_dir) = self.test_dir() else {
            tracing::warn!(
                "No {TEST_PACKAGE_DIRNAME} directory found for {}, skipping tests",
                self.name()
            );
            return Ok(None);
        };
        let reference = self.reference()?;
        self.instantiate()?;
        tracing::info!("Testing {reference}");
        let status = manager.test(&test_dir, &reference, log);
        Ok(Some(self.finish(
            status.success,
            "testing",
            log,
            InstanceState::Tested,
        )))
    }

    /// Remove the instance's reference from the local cache.
    pub fn remove_from_cache(
        &self,
        manager: &dyn PackageManager,
        log: &Path,
    ) -> crate::Result<StepStatus> {
        let reference = self.reference()?;
        tracing::info!("removing {reference} from local cache");
        if manager.remove(&reference, log).success {
            Ok(StepStatus::Passed)
        } else {
            // a reference that was never exported cannot be removed
            tracing::debug!("could not remove {reference} from local cache");
            Ok(StepStatus::Failed)
        }
    }

    fn finish(
        &mut self,
        success: bool,
        action: &str,
        log: &Path,
        reached: InstanceState,
    ) -> StepStatus {
        if success {
            self.advance(reached);
            StepStatus::Passed
        } else {
            tracing::error!(
                "There was an error {action} {}. You can view the output in {}.",
                self.name(),
                log.display()
            );
            StepStatus::Failed
        }
    }
}
