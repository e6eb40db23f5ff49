//! The JFrog executor driven by the core scan driver, with real child
//! processes standing in for the `jfrog` binary.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use superhighway_core::fakes::{synthetic_hash, MemoryBuildRecordStore, MemoryHistory};
use superhighway_core::{BranchTarget, PipelineStep, ScanDriver, ScanError};
use superhighway_jfrog::JfrogCliExecutor;

/// Fake `jfrog` that appends `<sub> <build name> <build number>` to a log.
fn fake_cli(dir: &Path, log: &Path, fail_sub: Option<&str>) -> String {
    let script = dir.join("jfrog");
    let fail = fail_sub
        .map(|sub| format!("[ \"$2\" = \"{sub}\" ] && exit 1\n"))
        .unwrap_or_default();
    fs::write(
        &script,
        format!(
            "#!/bin/sh\necho \"$2 $JFROG_CLI_BUILD_NAME $JFROG_CLI_BUILD_NUMBER\" >> {}\n{fail}exit 0\n",
            log.display()
        ),
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script.to_string_lossy().to_string()
}

#[tokio::test]
async fn stamped_commands_reach_the_cli() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("calls.log");
    let cli = fake_cli(dir.path(), &log, None);
    let build_log = dir.path().join("build.log");

    let executor = JfrogCliExecutor::new(
        dir.path(),
        format!("echo \"$JFROG_CLI_BUILD_NUMBER\" >> {}", build_log.display()),
    )
    .with_cli(cli)
    .with_timeout_secs(30);

    let mut driver = ScanDriver::new(
        MemoryHistory::linear("main", &["c1"]),
        Arc::new(MemoryBuildRecordStore::new()),
        Arc::new(executor),
    );
    let report = driver
        .scan_branch(&BranchTarget::new("main", "app-main"))
        .await
        .unwrap();

    let number = format!("1.0-{}", synthetic_hash("c1").short());
    assert_eq!(report.scanned[0].build_number.to_string(), number);
    assert_eq!(fs::read_to_string(&build_log).unwrap().trim(), number);

    let calls = fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = calls.lines().collect();
    assert_eq!(
        lines,
        vec![
            format!("bag app-main {number}"),
            format!("bp app-main {number}"),
            format!("bs app-main {number}"),
        ]
    );
}

#[tokio::test]
async fn failing_scan_command_aborts_the_branch() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("calls.log");
    let cli = fake_cli(dir.path(), &log, Some("bs"));

    let executor = JfrogCliExecutor::new(dir.path(), "true").with_cli(cli);
    let mut driver = ScanDriver::new(
        MemoryHistory::linear("main", &["c1"]),
        Arc::new(MemoryBuildRecordStore::new()),
        Arc::new(executor),
    );
    let err = driver
        .scan_branch(&BranchTarget::new("main", "app-main"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScanError::Pipeline {
            step: PipelineStep::Scan,
            ..
        }
    ));
}

#[tokio::test]
async fn failing_build_command_skips_the_commit() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("calls.log");
    let cli = fake_cli(dir.path(), &log, None);

    let executor = JfrogCliExecutor::new(dir.path(), "exit 2").with_cli(cli);
    let mut driver = ScanDriver::new(
        MemoryHistory::linear("main", &["c1"]),
        Arc::new(MemoryBuildRecordStore::new()),
        Arc::new(executor),
    );
    let report = driver
        .scan_branch(&BranchTarget::new("main", "app-main"))
        .await
        .unwrap();
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].reason.contains("code 2"));
    assert!(!log.exists());
}
