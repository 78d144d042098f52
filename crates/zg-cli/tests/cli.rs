//! Integration tests: cli.
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;
use zg_schema::HostPlatform;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Runs the built `zg` binary against an isolated home directory.
struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        fs::create_dir_all(temp_dir.path().join(".gnupg")).expect("failed to create gnupg dir");
        Self { temp_dir }
    }

    fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_zg"))
            .args(args)
            .env("HOME", self.path())
            .env("ZG_HOME", self.path().join(".zerogame"))
            .env("GNUPGHOME", self.path().join(".gnupg"))
            .env_remove("ZG_HTTP_TIMEOUT")
            .env_remove("RUST_LOG")
            .output()
            .expect("failed to execute zg")
    }

    /// Write an unsigned feed whose archive runs `command` on this host.
    fn write_feed(&self, command: &[String]) -> String {
        let manifest = serde_json::json!({
            "platforms": [{
                "name": HostPlatform::current().as_str(),
                "install": command,
            }]
        })
        .to_string();

        let archive = self.path().join("app.zip");
        let mut zip = ZipWriter::new(File::create(&archive).expect("create zip"));
        zip.start_file("app/install.json", SimpleFileOptions::default())
            .expect("start file");
        zip.write_all(manifest.as_bytes()).expect("write manifest");
        zip.finish().expect("finish zip");

        let feed = serde_json::json!({
            "name": "app",
            "version": "0.1.0",
            "archive_url": format!("file://{}", archive.display()),
            "archive_type": "zip",
        });
        let feed_path = self.path().join("feed.json");
        fs::write(&feed_path, feed.to_string()).expect("write feed");
        format!("file://{}", feed_path.display())
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_help() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--help"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Usage:"));
    assert!(out.contains("install"));
    assert!(out.contains("feed"));
}

#[test]
fn test_version() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("zg"));
}

#[test]
fn test_install_missing_feed_fails() {
    let ctx = TestContext::new();
    let missing = format!("file://{}", ctx.path().join("nope.json").display());
    let output = ctx.run(&["install", &missing]);

    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("Failed to install"), "stderr: {err}");
    assert!(err.contains("fetch stage"), "stderr: {err}");
}

#[test]
fn test_unsupported_scheme_fails() {
    let ctx = TestContext::new();
    let output = ctx.run(&["install", "ftp://example.com/feed.json"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("ftp"));
}

#[test]
fn test_run_before_install_fails() {
    let ctx = TestContext::new();
    let output = ctx.run(&["run", "file:///nowhere/feed.json"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("is not installed"));
}

#[test]
fn test_feed_list_empty() {
    let ctx = TestContext::new();
    let output = ctx.run(&["feed", "list"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No feeds imported."));
}

#[test]
fn test_completions() {
    let ctx = TestContext::new();
    let output = ctx.run(&["completions", "bash"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("zg"));
}

#[cfg(unix)]
#[test]
fn test_install_runs_manifest_command() {
    let ctx = TestContext::new();
    let marker: PathBuf = ctx.path().join("installed");
    let command = vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("echo ok > '{}'", marker.display()),
    ];
    let url = ctx.write_feed(&command);

    let output = ctx.run(&["install", &url]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("Installation complete!"));
    assert_eq!(fs::read_to_string(&marker).unwrap().trim(), "ok");

    // Second run is a no-op.
    fs::remove_file(&marker).unwrap();
    let output = ctx.run(&["install", &url]);
    assert!(output.status.success());
    assert!(stderr(&output).contains("already installed"));
    assert!(!marker.exists());
}

#[cfg(unix)]
#[test]
fn test_failing_install_command_exits_nonzero() {
    let ctx = TestContext::new();
    let url = ctx.write_feed(&["sh".to_string(), "-c".to_string(), "exit 3".to_string()]);

    let output = ctx.run(&["install", &url]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("subprocess stage"), "stderr: {err}");
    assert!(err.contains("code 3"), "stderr: {err}");
}
