//! Tests for launching the replay tool as a child process

mod common;

use common::*;
use dragonlink_lib::device::DeviceAddress;
use dragonlink_lib::error::DlError;
use dragonlink_lib::replay::{ProcessRunner, ReplayCommand, ReplayInvoker, TokioProcessRunner};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn shell(script: &str, timeout: Duration) -> ReplayCommand {
    ReplayCommand {
        program: PathBuf::from("sh"),
        args: vec![OsString::from("-c"), OsString::from(script)],
        timeout,
    }
}

#[test]
fn test_command_layout() {
    let invoker = ReplayInvoker::new(MockRunner::exiting(0, "", ""));
    let command = invoker.command(
        &DeviceAddress::new(0x1fc9, 0x0083),
        Path::new("output.txt"),
        Path::new("./usb_replay_x86_64"),
    );
    assert_eq!(command.program, PathBuf::from("./usb_replay_x86_64"));
    assert_eq!(command.args, vec![OsString::from("1fc9:0083"), OsString::from("output.txt")]);
    assert_eq!(command.to_string(), "./usb_replay_x86_64 1fc9:0083 output.txt");
}

#[test]
fn test_command_with_elevation() {
    let invoker = ReplayInvoker::new(MockRunner::exiting(0, "", ""))
        .with_elevate(Some(vec!["sudo".to_string(), "-n".to_string()]))
        .with_timeout(Duration::from_secs(5));
    let command = invoker.command(
        &DeviceAddress::new(0x1fc9, 0x0083),
        Path::new("1.bin"),
        Path::new("./usb_replay_aarch64"),
    );
    assert_eq!(command.to_string(), "sudo -n ./usb_replay_aarch64 1fc9:0083 1.bin");
    assert_eq!(command.timeout, Duration::from_secs(5));
}

#[tokio::test]
async fn test_invoke_passes_result_through() {
    let invoker = ReplayInvoker::new(MockRunner::exiting(3, "out", "permission denied"));
    let result = invoker
        .invoke(
            &DeviceAddress::new(0x1fc9, 0x0083),
            Path::new("output.txt"),
            Path::new("usb_replay_x86_64"),
        )
        .await
        .unwrap();
    assert!(!result.success());
    assert_eq!(result.exit_code, Some(3));
    assert_eq!(result.stderr, "permission denied");
    assert_eq!(invoker.runner().calls().len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_tokio_runner_captures_output() {
    let result = TokioProcessRunner
        .run(&shell("echo replayed; echo oops >&2; exit 2", Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(result.exit_code, Some(2));
    assert_eq!(result.stdout, "replayed\n");
    assert_eq!(result.stderr, "oops\n");
}

#[cfg(unix)]
#[tokio::test]
async fn test_tokio_runner_success() {
    let result = TokioProcessRunner
        .run(&shell("exit 0", Duration::from_secs(10)))
        .await
        .unwrap();
    assert!(result.success());
}

#[cfg(unix)]
#[tokio::test]
async fn test_tokio_runner_times_out_hung_child() {
    let err = TokioProcessRunner
        .run(&shell("sleep 30", Duration::from_millis(200)))
        .await
        .unwrap_err();
    match err {
        DlError::ReplayTimeout { program, timeout } => {
            assert_eq!(program, PathBuf::from("sh"));
            assert_eq!(timeout, Duration::from_millis(200));
        }
        other => panic!("Expected ReplayTimeout, got {:?}", other),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_tokio_runner_timeout_stops_grandchildren() {
    // The wrapper runs the real work in a forked subshell, like sudo does
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let marker = dir.path().join("marker");
    let script = format!("(sleep 1; touch '{}') ; wait", marker.display());

    let err = TokioProcessRunner
        .run(&shell(&script, Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert!(matches!(err, DlError::ReplayTimeout { .. }));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "grandchild kept running after the timeout");
}

#[cfg(unix)]
#[tokio::test]
async fn test_tokio_runner_kills_child_ignoring_sigterm() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let marker = dir.path().join("marker");
    let script = format!("trap '' TERM; sleep 2; touch '{}'", marker.display());

    let err = TokioProcessRunner
        .run(&shell(&script, Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert!(matches!(err, DlError::ReplayTimeout { .. }));

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!marker.exists(), "child survived SIGKILL fallback");
}

#[tokio::test]
async fn test_tokio_runner_spawn_failure() {
    let command = ReplayCommand {
        program: PathBuf::from("./definitely_not_a_usb_replay_tool"),
        args: vec![],
        timeout: Duration::from_secs(1),
    };
    let err = TokioProcessRunner.run(&command).await.unwrap_err();
    assert!(matches!(err, DlError::ReplaySpawn { .. }));
}
