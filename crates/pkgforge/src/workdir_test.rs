// Copyright (c) Contributors to the pkgforge project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;
use serial_test::serial;
use tempfile::TempDir;

use super::*;

fn cwd() -> PathBuf {
    dunce::canonicalize(std::env::current_dir().unwrap()).unwrap()
}

#[rstest]
#[serial]
fn test_guard_restores_directory() {
    let original = cwd();
    let tmp = TempDir::new().unwrap();
    {
        let guard = WorkingDirectory::enter(tmp.path()).unwrap();
        assert_eq!(cwd(), dunce::canonicalize(tmp.path()).unwrap());
        assert_eq!(dunce::canonicalize(guard.previous()).unwrap(), original);
    }
    assert_eq!(cwd(), original);
}

#[rstest]
#[serial]
fn test_guard_restores_after_error() {
    let original = cwd();
    let tmp = TempDir::new().unwrap();

    let failing = || -> crate::Result<()> {
        let _guard = WorkingDirectory::enter(tmp.path())?;
        Err(Error::NoTemplate("PackA".into()))
    };
    assert!(failing().is_err());
    assert_eq!(cwd(), original);
}

#[rstest]
#[serial]
fn test_guard_restores_after_panic() {
    let original = cwd();
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().to_owned();

    let result = std::panic::catch_unwind(move || {
        let _guard = WorkingDirectory::enter(&path).unwrap();
        panic!("boom");
    });
    assert!(result.is_err());
    assert_eq!(cwd(), original);
}

#[rstest]
#[serial]
fn test_enter_missing_directory() {
    let original = cwd();
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("missing");
    assert!(matches!(
        WorkingDirectory::enter(&missing),
        Err(Error::ReadFailed { path, .. }) if path == missing
    ));
    assert_eq!(cwd(), original);
}

#[rstest]
fn test_reset_dir() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("_pkgforge.d");
    reset_dir(&dir).unwrap();
    std::fs::write(dir.join("old.log"), "old").unwrap();

    reset_dir(&dir).unwrap();

    assert!(dir.is_dir());
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
}
