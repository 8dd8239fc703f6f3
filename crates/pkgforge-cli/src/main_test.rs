// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use clap::Parser;
use rstest::rstest;

use super::*;

const RECIPE: &str = r#"
from conans import ConanFile

class ConanPackage(ConanFile):
    name = "Name Here"
    version = "Unknown"
    checkout = "Unknown"
"#;

#[derive(Parser)]
struct Harness {
    #[clap(flatten)]
    config: ConfigFlags,

    #[clap(flatten)]
    manager: ManagerFlags,

    #[clap(flatten)]
    run: RunFlags,
}

fn harness(args: &[&str]) -> Harness {
    Harness::try_parse_from(std::iter::once("pkgforge").chain(args.iter().copied()))
        .expect("arguments should parse")
}

fn write_recipe(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("conanfile.py");
    std::fs::write(&path, RECIPE).unwrap();
    path
}

#[rstest]
#[case(&["export"])]
#[case(&["export", "--create", "-p", "PackA,PackB", "--parallel", "-j", "2"])]
#[case(&["test", "--skip-export", "--profile", "gcc", "--profile", "debug"])]
#[case(&["show", "--format", "yaml", "-vv"])]
#[case(&["-q", "show", "config.yaml", "other.yaml", "--instances-only"])]
#[case(&["-C", "integration", "test", "-c", "devel"])]
fn test_command_lines_parse(#[case] args: &[&str]) {
    let args = std::iter::once("pkgforge").chain(args.iter().copied());
    assert!(Opt::try_parse_from(args).is_ok());
}

#[rstest]
#[case(&["frobnicate"])]
#[case(&["export", "--jobs", "many"])]
#[case(&["show", "--create"])]
fn test_bad_command_lines_rejected(#[case] args: &[&str]) {
    let args = std::iter::once("pkgforge").chain(args.iter().copied());
    assert!(Opt::try_parse_from(args).is_err());
}

#[rstest]
fn test_flag_defaults() {
    let flags = harness(&[]);
    assert!(flags.config.config_files.is_empty());
    assert_eq!(flags.manager.program, PathBuf::from(DEFAULT_PROGRAM));
    assert_eq!(flags.manager.build_policy, DEFAULT_BUILD_POLICY);
    assert!(flags.manager.profiles.is_empty());
    assert_eq!(flags.run.jobs, 4);
    assert!(!flags.run.parallel);
    assert!(!flags.run.no_clear_cache);
}

#[rstest]
fn test_flags_collect_values() {
    let flags = harness(&[
        "a.yaml",
        "b.yaml",
        "-o",
        "initech",
        "-c",
        "devel",
        "--profile",
        "gcc",
        "-p",
        "PackA",
    ]);
    assert_eq!(
        flags.config.config_files,
        vec![PathBuf::from("a.yaml"), PathBuf::from("b.yaml")]
    );
    assert_eq!(flags.config.owner.as_deref(), Some("initech"));
    assert_eq!(flags.config.channel.as_deref(), Some("devel"));
    assert_eq!(flags.manager.profiles, vec!["gcc".to_string()]);
    assert_eq!(flags.run.packages.as_deref(), Some("PackA"));
}

#[rstest]
fn test_selector_defaults_to_configured() {
    let flags = RunFlags::default();
    assert!(!flags.instances_only());
    let selected = flags.selector(Selector::None).unwrap();
    assert!(matches!(selected, Selector::None));
}

#[rstest]
#[case("all")]
#[case("ALL")]
#[case("instances-only")]
fn test_selector_everything(#[case] packages: &str) {
    let flags = RunFlags {
        packages: Some(packages.to_string()),
        ..Default::default()
    };
    assert!(matches!(flags.selector(Selector::None).unwrap(), Selector::All));
}

#[rstest]
fn test_selector_names() {
    let flags = RunFlags {
        packages: Some("PackA,PackB".to_string()),
        ..Default::default()
    };
    assert!(!flags.instances_only());
    match flags.selector(Selector::All).unwrap() {
        Selector::Names(names) => assert_eq!(names, vec!["PackA", "PackB"]),
        other => panic!("expected names, got {other:?}"),
    }
}

#[rstest]
fn test_instances_only_flag() {
    let flags = RunFlags {
        packages: Some(INSTANCES_ONLY.to_string()),
        ..Default::default()
    };
    assert!(flags.instances_only());
}

#[rstest]
fn test_load_merges_files_and_flags() {
    let tmp = tempfile::tempdir().unwrap();
    let recipe = write_recipe(tmp.path(), "PackA");
    let config = tmp.path().join("pkgforge.yaml");
    std::fs::write(
        &config,
        format!(
            "package_overrides:\n  PackA:\n    version: '2.6'\npackage_instances:\n  - name: PackA\n    recipe: {}\n",
            recipe.display()
        ),
    )
    .unwrap();

    let flags = ConfigFlags {
        config_files: vec![config],
        owner: Some("initech".to_string()),
        channel: Some("devel".to_string()),
        instances_only: true,
        ..Default::default()
    };
    let collection = flags.load().unwrap().expect("collection should be built");
    assert_eq!(collection.len(), 1);
    let reference = collection.instances()[0].reference().unwrap();
    assert_eq!(reference.to_string(), "PackA/2.6@initech/devel");
}

#[rstest]
fn test_load_discovers_recipes() {
    let tmp = tempfile::tempdir().unwrap();
    let recipes = tmp.path().join("recipes");
    write_recipe(&recipes, "PackB");
    write_recipe(&recipes, "PackA");

    let flags = ConfigFlags {
        recipes,
        ..Default::default()
    };
    let collection = flags.load().unwrap().expect("collection should be built");
    let names: Vec<_> = collection.instances().iter().map(|i| i.name()).collect();
    assert_eq!(names, vec!["PackA", "PackB"]);
}

#[rstest]
fn test_load_missing_recipe_directory_is_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let flags = ConfigFlags {
        recipes: tmp.path().join("missing"),
        ..Default::default()
    };
    let collection = flags.load().unwrap().expect("collection should be built");
    assert!(collection.is_empty());
}

#[rstest]
fn test_load_returns_none_after_printing() {
    let flags = ConfigFlags {
        print_default_configuration: true,
        ..Default::default()
    };
    assert!(flags.load().unwrap().is_none());

    let flags = ConfigFlags {
        print_configuration: true,
        instances_only: true,
        ..Default::default()
    };
    assert!(flags.load().unwrap().is_none());
}

#[rstest]
fn test_load_missing_config_file_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let flags = ConfigFlags {
        config_files: vec![tmp.path().join("missing.yaml")],
        instances_only: true,
        ..Default::default()
    };
    assert!(flags.load().is_err());
}

#[cfg(unix)]
#[rstest]
#[tokio::test]
async fn test_parallel_batch_keeps_collection_order() {
    let tmp = tempfile::tempdir().unwrap();
    let recipes = tmp.path().join("recipes");
    for name in ["PackA", "PackB", "PackC", "PackD"] {
        write_recipe(&recipes, name);
    }
    let mut collection = ConfigFlags {
        recipes,
        ..Default::default()
    }
    .load()
    .unwrap()
    .unwrap();

    let log_dir = tmp.path().join("logs");
    std::fs::create_dir_all(&log_dir).unwrap();
    let options = BatchOptions::new(&log_dir);
    let flags = RunFlags {
        parallel: true,
        jobs: 2,
        ..Default::default()
    };
    let manager: Arc<dyn PackageManager> = Arc::new(ConanCli::new("true"));

    let report = run_batch(
        &mut collection,
        &Selector::All,
        &[Step::Export],
        manager,
        &options,
        &flags,
    )
    .await
    .unwrap();

    let names: Vec<_> = report.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["PackA", "PackB", "PackC", "PackD"]);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.exit_code(), 0);
}

#[cfg(unix)]
#[rstest]
#[tokio::test]
async fn test_parallel_batch_counts_failures() {
    let tmp = tempfile::tempdir().unwrap();
    let recipes = tmp.path().join("recipes");
    for name in ["PackA", "PackB"] {
        write_recipe(&recipes, name);
    }
    let mut collection = ConfigFlags {
        recipes,
        ..Default::default()
    }
    .load()
    .unwrap()
    .unwrap();

    let log_dir = tmp.path().join("logs");
    std::fs::create_dir_all(&log_dir).unwrap();
    let flags = RunFlags {
        parallel: true,
        ..Default::default()
    };
    let manager: Arc<dyn PackageManager> = Arc::new(ConanCli::new("false"));

    let report = run_batch(
        &mut collection,
        &Selector::All,
        &[Step::Export, Step::Build],
        manager,
        &BatchOptions::new(&log_dir),
        &flags,
    )
    .await
    .unwrap();

    assert_eq!(report.failed(), 2);
    assert_eq!(report.exit_code(), 2);
}
