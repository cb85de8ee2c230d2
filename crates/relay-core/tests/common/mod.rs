//! Fake backends for integration tests
//!
//! Backends are POSIX `sh` scripts run as `sh <script>`, so no freshly
//! written file is ever exec'd directly.

#![allow(dead_code)]

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_core::BackendConfig;
use tempfile::TempDir;

/// Emits `Hi`, ` there`, `done` for every sendMessage and ignores the rest
pub const GREETER: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *'"type":"sendMessage"'*)
      printf '%s\n' '{"type":"token","sessionId":"s1","text":"Hi"}'
      printf '%s\n' '{"type":"token","sessionId":"s1","text":" there"}'
      printf '%s\n' '{"type":"done","sessionId":"s1"}'
      ;;
  esac
done
"#;

pub struct Backend {
    pub dir: TempDir,
    pub script: PathBuf,
}

impl Backend {
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("backend.sh");
        fs::write(&script, body).unwrap();
        Self { dir, script }
    }

    /// Backend that appends every input line to `input.log` before running `body`
    pub fn logging(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("input.log");
        let script = dir.path().join("backend.sh");
        let body = format!(
            r#"
while IFS= read -r line; do
  printf '%s\n' "$line" >> '{log}'
  {body}
done
"#,
            log = log.display(),
        );
        fs::write(&script, body).unwrap();
        Self { dir, script }
    }

    pub fn config(&self) -> BackendConfig {
        fast(BackendConfig::new(
            "sh",
            vec![self.script.to_string_lossy().into_owned()],
        ))
    }

    pub fn input_log(&self) -> PathBuf {
        self.dir.path().join("input.log")
    }

    pub fn input_lines(&self) -> Vec<String> {
        read_lines(&self.input_log())
    }
}

/// Short timings so reconnect tests finish quickly
pub fn fast(mut config: BackendConfig) -> BackendConfig {
    config.watchdog_interval_ms = 25;
    config.initial_backoff_ms = 10;
    config.shutdown_timeout_ms = 500;
    config.max_reconnect_attempts = 3;
    config
}

pub fn cat_path() -> &'static str {
    if Path::new("/bin/cat").exists() {
        "/bin/cat"
    } else {
        "/usr/bin/cat"
    }
}

pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Poll `condition` until it holds, panicking after five seconds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}
