// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

#[fixture]
fn recipe_text() -> &'static str {
    r#"
from conans import ConanFile, CMake
import os, glob

class ConanPackage(ConanFile):
    name = "Name Here"
    version = "master"
    checkout = "master"
    generators = "virtualenv"
    requires = "boost/1.69.0@conan/stable"
    build_requires = "cmake_installer/3.13.0@conan/stable"
    git_url_basename = "Missing"
    repo_name = None

    def source(self):
      pass

    def build(self):
      pass
"#
}

fn settings(text: &str) -> IndexMap<String, Value> {
    serde_yaml::from_str(text).unwrap()
}

fn setting_regex(setting: &str, value: &str, modified: bool) -> Regex {
    let tail = if modified { r"\s*#.*" } else { r"\s*" };
    Regex::new(&format!(
        r#"(?m)^\s*{setting}\s*=\s*['"]{}['"]{tail}$"#,
        regex::escape(value)
    ))
    .unwrap()
}

#[rstest]
fn test_inject_some_settings(recipe_text: &str) {
    let result = instantiate(
        recipe_text,
        &settings("{version: '2.0', requires: boost/1.70@conan/stable}"),
        &[],
    );

    assert!(setting_regex("name", "Name Here", false).is_match(&result.text));
    assert!(setting_regex("version", "2.0", true).is_match(&result.text));
    assert!(setting_regex("checkout", "master", false).is_match(&result.text));
    assert!(result.text.contains("boost/1.70@conan/stable"));
    assert!(result.text.contains("build_requires = \"cmake_installer/3.13.0@conan/stable\""));
    assert!(result.warnings.is_empty());
}

#[rstest]
fn test_inject_all_settings(recipe_text: &str) {
    let result = instantiate(
        recipe_text,
        &settings(
            r#"
name: my_project
version: '2.0'
checkout: v2.0
git_url_basename: git://example.com
repo_name: MyProject
"#,
        ),
        &[],
    );

    assert!(setting_regex("name", "my_project", true).is_match(&result.text));
    assert!(setting_regex("version", "2.0", true).is_match(&result.text));
    assert!(setting_regex("checkout", "v2.0", true).is_match(&result.text));
    assert!(setting_regex("git_url_basename", "git://example.com", true).is_match(&result.text));
    assert!(setting_regex("repo_name", "MyProject", true).is_match(&result.text));
    assert!(result.text.contains("boost/1.69.0@conan/stable"));
}

#[rstest]
fn test_indentation_preserved(recipe_text: &str) {
    let result = instantiate(recipe_text, &settings("{version: '3.1'}"), &[]);
    assert!(result
        .text
        .contains(&format!("\n    version = \"3.1\"  {MODIFIED_MARKER}\n")));
}

#[rstest]
fn test_missing_setting_warns_and_leaves_text(recipe_text: &str) {
    let result = instantiate(recipe_text, &settings("{license: MIT}"), &[]);
    assert_eq!(result.text, recipe_text);
    assert_eq!(
        result.warnings,
        vec![SubstitutionWarning::SettingNotFound {
            key: "license".to_string()
        }]
    );
}

#[rstest]
fn test_ambiguous_setting_replaces_all() {
    let text = "class A:\n    version = '1'\nclass B:\n    version = '2'\n";
    let result = instantiate(text, &settings("{version: '9'}"), &[]);
    assert_eq!(result.text.matches("version = \"9\"").count(), 2);
    assert_eq!(
        result.warnings,
        vec![SubstitutionWarning::AmbiguousSetting {
            key: "version".to_string(),
            count: 2
        }]
    );
}

#[rstest]
fn test_protected_variant_takes_precedence() {
    let text = "    injected_version = None\n    version = compute_version(injected_version)\n";
    let result = instantiate(text, &settings("{version: '2.0'}"), &[]);
    assert!(result.text.contains("    injected_version = \"2.0\""));
    assert!(result
        .text
        .contains("    version = compute_version(injected_version)\n"));
}

#[rstest]
fn test_comparisons_are_not_assignments() {
    let text = "    version = '1'\n    version == '1'\n";
    let result = instantiate(text, &settings("{version: '2'}"), &[]);
    assert!(result.text.contains("\n    version == '1'\n"));
    assert!(result.text.contains("    version = \"2\""));
    assert!(result.warnings.is_empty());
}

#[rstest]
#[case(Value::Null, Some("None"))]
#[case(Value::String("a\"b".to_string()), Some(r#""a\"b""#))]
#[case(serde_yaml::from_str::<Value>("2.5").unwrap(), Some(r#""2.5""#))]
#[case(Value::Bool(true), Some(r#""true""#))]
#[case(serde_yaml::from_str::<Value>("[1]").unwrap(), None)]
fn test_recipe_literal(#[case] value: Value, #[case] expected: Option<&str>) {
    assert_eq!(recipe_literal(&value).as_deref(), expected);
}

#[rstest]
fn test_non_scalar_setting_warns(recipe_text: &str) {
    let result = instantiate(recipe_text, &settings("{version: [1, 2]}"), &[]);
    assert_eq!(result.text, recipe_text);
    assert_eq!(
        result.warnings,
        vec![SubstitutionWarning::NotInjectable {
            key: "version".to_string()
        }]
    );
}

#[rstest]
fn test_dependency_rewrite(recipe_text: &str) {
    let rules = vec![DependencyOverride::new(
        "*",
        "[name]/[version]@initech/testing",
    )];
    let result = instantiate(recipe_text, &IndexMap::new(), &rules);
    assert!(result.text.contains("\"boost/1.69.0@initech/testing\""));
    assert!(result
        .text
        .contains("\"cmake_installer/3.13.0@initech/testing\""));
    assert_eq!(result.rewrites.len(), 2);
}

#[rstest]
fn test_dependency_rewrite_keeps_quote_style() {
    let text = "requires = ('PackA/devel@initech/devel', \"zlib/1.2@conan/stable\")\n";
    let rules = vec![DependencyOverride::shorthand("PackA/2.6@initech/stable")];
    let result = instantiate(text, &IndexMap::new(), &rules);
    assert_eq!(
        result.text,
        "requires = ('PackA/2.6@initech/stable', \"zlib/1.2@conan/stable\")\n"
    );
    assert_eq!(
        result.rewrites,
        vec![(
            "PackA/devel@initech/devel".to_string(),
            "PackA/2.6@initech/stable".to_string()
        )]
    );
}

#[rstest]
fn test_instantiation_is_deterministic(recipe_text: &str) {
    let s = settings("{name: PackB, version: '1.0', checkout: v1.0}");
    let rules = vec![DependencyOverride::shorthand("boost/[version]@me/devel")];
    let first = instantiate(recipe_text, &s, &rules);
    let second = instantiate(recipe_text, &s, &rules);
    assert_eq!(first.text, second.text);
}

#[rstest]
fn test_load_missing_template() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("conanfile.py");
    match RecipeTemplate::load(&path, "PackA") {
        Err(Error::TemplateNotFound { package, path: p }) => {
            assert_eq!(package, "PackA");
            assert_eq!(p, path);
        }
        other => panic!("Expected TemplateNotFound, got: {:?}", other),
    }
}

#[rstest]
fn test_load_and_instantiate(recipe_text: &str) {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("conanfile.py");
    std::fs::write(&path, recipe_text).unwrap();

    let template = RecipeTemplate::load(&path, "PackA").unwrap();
    let result = template.instantiate("PackA", &settings("{name: PackA}"), &[]);
    assert!(setting_regex("name", "PackA", true).is_match(&result.text));
}
