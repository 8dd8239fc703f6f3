// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;
use tempfile::TempDir;

use super::*;

fn reference() -> PackageReference {
    PackageReference::new("PackA", "1.0", "initech", "devel")
}

fn strings(args: Vec<OsString>) -> Vec<String> {
    args.into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

#[rstest]
fn test_export_args() {
    let args = ConanCli::export_args(Path::new("/r/PackA/conanfile-abc.py"), "initech", "devel");
    assert_eq!(
        strings(args),
        vec!["export", "/r/PackA/conanfile-abc.py", "initech/devel"]
    );
}

#[rstest]
fn test_install_args_with_profiles() {
    let cli = ConanCli::default().with_profiles(vec!["gcc".to_string(), "release".to_string()]);
    assert_eq!(
        strings(cli.install_args(&reference())),
        vec![
            "install",
            "PackA/1.0@initech/devel",
            "--build",
            "missing",
            "--profile",
            "gcc",
            "--profile",
            "release"
        ]
    );
}

#[rstest]
fn test_install_args_without_build_policy() {
    let cli = ConanCli::default().with_build_policy(None);
    assert_eq!(
        strings(cli.install_args(&reference())),
        vec!["install", "PackA/1.0@initech/devel"]
    );
}

#[rstest]
fn test_test_args() {
    let cli = ConanCli::default();
    assert_eq!(
        strings(cli.test_args(Path::new("/r/PackA/test_package"), &reference())),
        vec!["test", "/r/PackA/test_package", "PackA/1.0@initech/devel"]
    );
}

#[rstest]
fn test_parse_info() {
    let nodes = parse_info(
        r#"[
            {"reference": "PackB/devel@initech/devel", "requires": ["PackA/devel@initech/devel"]},
            {"reference": "PackA/devel@initech/devel", "requires": ["boost/1.69.0@conan/stable"]},
            {"reference": "boost/1.69.0@conan/stable"}
        ]"#,
    )
    .unwrap();
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[1].requires, vec!["boost/1.69.0@conan/stable"]);
    assert!(nodes[2].requires.is_empty());
}

#[rstest]
fn test_parse_info_garbage() {
    assert!(parse_info("not json").is_none());
    assert!(parse_info(r#"{"requires": []}"#).is_none());
}

#[cfg(unix)]
#[rstest]
fn test_run_success_writes_header() {
    let tmp = TempDir::new().unwrap();
    let log = tmp.path().join("logs").join("PackA.export.log");
    let cli = ConanCli::new("true");

    let status = cli.export(Path::new("conanfile.py"), "initech", "devel", &log);

    assert_eq!(status, CommandStatus::success());
    let text = std::fs::read_to_string(&log).unwrap();
    assert!(text.contains("true export conanfile.py initech/devel"));
}

#[cfg(unix)]
#[rstest]
fn test_run_failure_reports_code() {
    let tmp = TempDir::new().unwrap();
    let log = tmp.path().join("PackA.install.log");
    let cli = ConanCli::new("false");

    let status = cli.install(&reference(), &log);

    assert!(!status.success);
    assert_eq!(status.code, Some(1));
}

#[rstest]
fn test_missing_program_is_a_failed_status() {
    let tmp = TempDir::new().unwrap();
    let log = tmp.path().join("PackA.remove.log");
    let cli = ConanCli::new(tmp.path().join("no-such-program"));

    let status = cli.remove(&reference(), &log);

    assert_eq!(status, CommandStatus::failed(None));
    let text = std::fs::read_to_string(&log).unwrap();
    assert!(text.contains("failed to start"));
    assert!(cli.info(&reference()).is_none());
}

#[cfg(target_os = "linux")]
#[rstest]
fn test_unwritable_log_does_not_fail_the_command() {
    // every write to /dev/full fails with ENOSPC
    let log = Path::new("/dev/full");
    if !log.exists() {
        return;
    }
    let cli = ConanCli::new("true");

    let status = cli.export(Path::new("conanfile.py"), "initech", "devel", log);

    assert_eq!(status, CommandStatus::success());
}

#[rstest]
fn test_log_appends() {
    let tmp = TempDir::new().unwrap();
    let log = tmp.path().join("a.log");
    {
        let mut f = open_log(&log).unwrap();
        writeln!(f, "first").unwrap();
    }
    {
        let mut f = open_log(&log).unwrap();
        writeln!(f, "second").unwrap();
    }
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "first\nsecond\n");
}
