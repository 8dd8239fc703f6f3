// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

//! Test helpers shared by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::manager::{open_log, CommandStatus, InfoNode, PackageManager};
use crate::reference::PackageReference;

/// A template recipe in the shape the tests expect.
pub(crate) const RECIPE_TEXT: &str = r#"
from conans import ConanFile, CMake

class ConanPackage(ConanFile):
    name = "Name Here"
    version = "Unknown"
    checkout = "Unknown"
    requires = "boost/1.69.0@conan/stable"
    git_url_basename = "Missing"
    repo_name = None

    def build(self):
      pass
"#;

/// Write `<root>/<name>/conanfile.py` and return its path.
pub(crate) fn write_recipe(root: &Path, name: &str, text: &str) -> std::path::PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).expect("Failed to create recipe dir");
    let path = dir.join("conanfile.py");
    std::fs::write(&path, text).expect("Failed to write recipe");
    path
}

/// Package manager that records every call instead of running anything.
#[derive(Default)]
pub(crate) struct RecordingManager {
    calls: Mutex<Vec<String>>,
    failing: HashSet<String>,
    graphs: HashMap<String, Vec<InfoNode>>,
}

impl RecordingManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `command` fail for the package `name`.
    pub fn failing(mut self, command: &str, name: &str) -> Self {
        self.failing.insert(format!("{command} {name}"));
        self
    }

    /// Serve `nodes` as the dependency graph of `reference`.
    pub fn with_graph(mut self, reference: &str, nodes: Vec<(&str, Vec<&str>)>) -> Self {
        let nodes = nodes
            .into_iter()
            .map(|(node, requires)| InfoNode {
                reference: Some(node.to_string()),
                requires: requires.into_iter().map(String::from).collect(),
            })
            .collect();
        self.graphs.insert(reference.to_string(), nodes);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, command: &str, name: &str, detail: String, log: Option<&Path>) -> CommandStatus {
        self.calls.lock().unwrap().push(format!("{command} {detail}"));
        if let Some(log) = log {
            let mut file = open_log(log).unwrap();
            writeln!(file, "{command} {detail}").unwrap();
        }
        if self.failing.contains(&format!("{command} {name}")) {
            CommandStatus::failed(Some(1))
        } else {
            CommandStatus::success()
        }
    }
}

fn recipe_dir_name(recipe: &Path) -> String {
    recipe
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl PackageManager for RecordingManager {
    fn export(&self, recipe: &Path, owner: &str, channel: &str, log: &Path) -> CommandStatus {
        let name = recipe_dir_name(recipe);
        self.record("export", &name, format!("{name} {owner}/{channel}"), Some(log))
    }

    fn install(&self, reference: &PackageReference, log: &Path) -> CommandStatus {
        self.record("install", &reference.name, reference.to_string(), Some(log))
    }

    fn test(&self, _test_dir: &Path, reference: &PackageReference, log: &Path) -> CommandStatus {
        self.record("test", &reference.name, reference.to_string(), Some(log))
    }

    fn remove(&self, reference: &PackageReference, log: &Path) -> CommandStatus {
        self.record("remove", &reference.name, reference.to_string(), Some(log))
    }

    fn info(&self, reference: &PackageReference) -> Option<Vec<InfoNode>> {
        self.record("info", &reference.name, reference.to_string(), None);
        self.graphs.get(&reference.to_string()).cloned()
    }
}
