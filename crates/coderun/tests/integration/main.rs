//! Integration tests for coderun
//!
//! Configuration tests always run. End-to-end language tests need the real
//! compilers and interpreters installed and are behind a feature:
//!    cargo test -p coderun --features toolchain-tests
//!
//! Tests for a toolchain that is rarely installed are marked `#[ignore]`. To
//! include them:
//!    cargo test -p coderun --features toolchain-tests -- --include-ignored

#[cfg(feature = "toolchain-tests")]
use coderun::{Config, Runner};

mod config_loading;
#[cfg(feature = "toolchain-tests")]
mod languages;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
#[cfg(feature = "toolchain-tests")]
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Runner over the built-in languages with a private scratch directory
#[cfg(feature = "toolchain-tests")]
pub(crate) async fn test_runner(scratch: &tempfile::TempDir) -> Runner {
    let mut config = Config::default();
    config.scratch_dir = scratch.path().join("temp");
    Runner::prepare(config)
        .await
        .expect("Failed to prepare runner")
}

/// Whether every per-request workspace has been removed
#[cfg(feature = "toolchain-tests")]
pub(crate) fn scratch_is_empty(runner: &Runner) -> bool {
    std::fs::read_dir(runner.scratch().root())
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

/// Wait for a pid file to be written in full and parse it
#[cfg(all(feature = "toolchain-tests", target_os = "linux"))]
pub(crate) async fn read_pid(path: &std::path::Path) -> i32 {
    for _ in 0..100 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if text.ends_with('\n') {
                return text.trim().parse().expect("pid file holds a number");
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    panic!("pid file {} was never written", path.display());
}

/// Poll `/proc` until `pid` is gone or a zombie, for up to five seconds
#[cfg(all(feature = "toolchain-tests", target_os = "linux"))]
pub(crate) async fn exits_soon(pid: i32) -> bool {
    for _ in 0..50 {
        let running = std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                stat.rsplit_once(')')
                    .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            })
            .unwrap_or(false);
        if !running {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    false
}
