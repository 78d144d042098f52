//! Integration tests: install_feed.
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zg_core::dispatch::{Action, CommandRunner, DispatchError};
use zg_core::io::extract::ExtractError;
use zg_core::{
    Config, FetchError, InstallError, InstallOptions, InstallOutcome, Installer, NullReporter,
    VerificationMethod, VerifyError,
};
use zg_schema::{HostPlatform, SchemaError};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Records every command instead of spawning it.
#[derive(Default)]
struct FakeRunner {
    calls: RefCell<Vec<(Vec<String>, PathBuf, bool)>>,
    exit_code: RefCell<Option<i32>>,
}

impl FakeRunner {
    fn succeeding() -> Self {
        let runner = Self::default();
        *runner.exit_code.borrow_mut() = Some(0);
        runner
    }

    fn argv(&self) -> Vec<Vec<String>> {
        self.calls.borrow().iter().map(|c| c.0.clone()).collect()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, argv: &[String], cwd: &Path) -> io::Result<Option<i32>> {
        // Whether the manifest was extracted where the command runs.
        let saw_manifest = cwd.join("hello/install.json").is_file();
        self.calls
            .borrow_mut()
            .push((argv.to_vec(), cwd.to_path_buf(), saw_manifest));
        Ok(*self.exit_code.borrow())
    }
}

/// Temporary zg home, keyring directory and feed directory.
struct TestContext {
    temp_dir: TempDir,
    home: PathBuf,
    gnupg: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let home = temp_dir.path().join(".zerogame");
        let gnupg = temp_dir.path().join(".gnupg");
        fs::create_dir_all(&gnupg).expect("failed to create gnupg dir");
        fs::copy(fixture("pubring.gpg"), gnupg.join("pubring.gpg")).expect("copy keyring");
        Self {
            temp_dir,
            home,
            gnupg,
        }
    }

    fn config(&self) -> Config {
        Config::new(&self.home, &self.gnupg)
            .expect("config")
            .with_platform(HostPlatform::named("linux"))
    }

    fn installer<'a>(&self, runner: &'a FakeRunner) -> Installer<NullReporter, &'a FakeRunner> {
        Installer::new(self.config()).with_runner(runner)
    }

    /// Write a feed descriptor and return its `file://` URL.
    fn write_feed(&self, file: &str, archive_url: &str, signature_url: Option<&str>) -> String {
        let mut feed = serde_json::json!({
            "name": "hello",
            "version": "1.0.0",
            "archive_url": archive_url,
            "archive_type": "zip",
        });
        if let Some(sig) = signature_url {
            feed["gpg_signature_url"] = sig.into();
        }
        let path = self.temp_dir.path().join(file);
        fs::write(&path, feed.to_string()).expect("write feed");
        file_url(&path)
    }

    fn zip(&self, file: &str, entries: &[(&str, &str)]) -> PathBuf {
        let path = self.temp_dir.path().join(file);
        let mut zip = ZipWriter::new(File::create(&path).expect("create zip"));
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default())
                .expect("start file");
            zip.write_all(data.as_bytes()).expect("write entry");
        }
        zip.finish().expect("finish zip");
        path
    }
}

#[test]
fn test_install_unsigned_file_feed() {
    let ctx = TestContext::new();
    let runner = FakeRunner::succeeding();
    let url = ctx.write_feed("feed.json", &file_url(&fixture("hello.zip")), None);

    let outcome = ctx
        .installer(&runner)
        .install_feed(&url, InstallOptions::default())
        .unwrap();

    match outcome {
        InstallOutcome::Installed { archive, from_cache } => {
            assert!(!from_cache);
            assert!(archive.starts_with(&ctx.home));
            assert_eq!(archive.file_name().unwrap(), "hello-1.0.0.zip");
            assert_eq!(fs::read(&archive).unwrap(), fs::read(fixture("hello.zip")).unwrap());
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let calls = runner.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, ["sh", "install.sh"]);
    assert!(calls[0].2, "command must run from the extraction root");
    // Scratch directory is gone once the pipeline returns.
    assert!(!calls[0].1.exists());
}

#[test]
fn test_second_install_hits_network_once() {
    let ctx = TestContext::new();
    let mut server = mockito::Server::new();
    let feed = serde_json::json!({
        "name": "hello",
        "version": "1.0.0",
        "archive_url": format!("{}/hello.zip", server.url()),
        "archive_type": "zip",
    });
    let feed_mock = server
        .mock("GET", "/feed.json")
        .with_body(feed.to_string())
        .expect(1)
        .create();
    let archive_mock = server
        .mock("GET", "/hello.zip")
        .with_body(fs::read(fixture("hello.zip")).unwrap())
        .expect(1)
        .create();

    let runner = FakeRunner::succeeding();
    let installer = ctx.installer(&runner);
    let url = format!("{}/feed.json", server.url());

    installer.install_feed(&url, InstallOptions::default()).unwrap();
    let second = installer.install_feed(&url, InstallOptions::default()).unwrap();

    assert!(matches!(second, InstallOutcome::AlreadyInstalled { .. }));
    assert_eq!(runner.calls.borrow().len(), 1);
    feed_mock.assert();
    archive_mock.assert();
}

#[test]
fn test_no_cache_refetches() {
    let ctx = TestContext::new();
    let mut server = mockito::Server::new();
    let feed = serde_json::json!({
        "name": "hello",
        "version": "1.0.0",
        "archive_url": format!("{}/hello.zip", server.url()),
        "archive_type": "zip",
    });
    let feed_mock = server
        .mock("GET", "/feed.json")
        .with_body(feed.to_string())
        .expect(2)
        .create();
    let _archive = server
        .mock("GET", "/hello.zip")
        .with_body(fs::read(fixture("hello.zip")).unwrap())
        .create();

    let runner = FakeRunner::succeeding();
    let installer = ctx.installer(&runner);
    let url = format!("{}/feed.json", server.url());
    let options = InstallOptions {
        use_cache: false,
        ..InstallOptions::default()
    };

    installer.install_feed(&url, options).unwrap();
    installer.install_feed(&url, options).unwrap();
    assert_eq!(runner.calls.borrow().len(), 2);
    feed_mock.assert();
}

#[test]
fn test_equivalent_file_urls_share_cache_entry() {
    let ctx = TestContext::new();
    let runner = FakeRunner::succeeding();
    let url = ctx.write_feed("feed.json", &file_url(&fixture("hello.zip")), None);
    let messy = format!(
        "file://{}/./nowhere/..//feed.json",
        ctx.temp_dir.path().display()
    );

    let installer = ctx.installer(&runner);
    installer.install_feed(&url, InstallOptions::default()).unwrap();
    let again = installer
        .install_feed(&messy, InstallOptions::default())
        .unwrap();

    assert!(matches!(again, InstallOutcome::AlreadyInstalled { .. }));
    assert_eq!(runner.calls.borrow().len(), 1);
    assert_eq!(
        installer.cache().entry_dir(&zg_core::normalize_feed_url(&messy)),
        installer.cache().entry_dir(&url)
    );
}

#[test]
fn test_zip_slip_archive_is_rejected() {
    let ctx = TestContext::new();
    let archive = ctx.zip(
        "evil.zip",
        &[
            ("hello/install.json", r#"{"platforms":[]}"#),
            ("../../evil", "pwned"),
        ],
    );
    let url = ctx.write_feed("feed.json", &file_url(&archive), None);
    let runner = FakeRunner::succeeding();

    let err = ctx
        .installer(&runner)
        .install_feed(&url, InstallOptions::default())
        .unwrap_err();

    assert!(
        matches!(err, InstallError::Extraction(ExtractError::PathTraversal(ref name)) if name == "../../evil"),
        "unexpected error {err}"
    );
    assert_eq!(err.stage(), "extraction");
    assert!(runner.calls.borrow().is_empty());
    assert!(!ctx.installer(&runner).cache().is_installed(&url));
}

#[test]
fn test_detached_signature_verifies() {
    let ctx = TestContext::new();
    let runner = FakeRunner::succeeding();
    let url = ctx.write_feed(
        "feed.json",
        &file_url(&fixture("hello.zip")),
        Some(&file_url(&fixture("hello.zip.sig"))),
    );

    let outcome = ctx
        .installer(&runner)
        .install_feed(&url, InstallOptions::default())
        .unwrap();
    assert!(matches!(outcome, InstallOutcome::Installed { .. }));
    assert_eq!(runner.argv(), [["sh", "install.sh"]]);
}

#[test]
fn test_armored_rsa_signature_verifies() {
    let ctx = TestContext::new();
    let runner = FakeRunner::succeeding();
    let url = ctx.write_feed(
        "feed.json",
        &file_url(&fixture("hello.zip")),
        Some(&file_url(&fixture("hello.zip.asc"))),
    );

    ctx.installer(&runner)
        .install_feed(&url, InstallOptions::default())
        .unwrap();
    assert_eq!(runner.calls.borrow().len(), 1);
}

#[test]
fn test_unknown_signer_fails_closed() {
    let ctx = TestContext::new();
    let runner = FakeRunner::succeeding();
    let url = ctx.write_feed(
        "feed.json",
        &file_url(&fixture("hello.zip")),
        Some(&file_url(&fixture("hello.zip.stranger.sig"))),
    );
    let installer = ctx.installer(&runner);

    let err = installer
        .install_feed(&url, InstallOptions::default())
        .unwrap_err();

    assert!(
        matches!(err, InstallError::Verification(VerifyError::NoMatchingKey { .. })),
        "unexpected error {err}"
    );
    assert!(!installer.cache().exists(&url));
    assert!(!installer.cache().entry_dir(&url).exists());
    assert!(runner.calls.borrow().is_empty());
}

#[test]
fn test_no_verify_skips_signature() {
    let ctx = TestContext::new();
    let runner = FakeRunner::succeeding();
    let url = ctx.write_feed(
        "feed.json",
        &file_url(&fixture("hello.zip")),
        Some(&file_url(&fixture("hello.zip.stranger.sig"))),
    );
    let options = InstallOptions {
        verification: VerificationMethod::None,
        ..InstallOptions::default()
    };

    ctx.installer(&runner).install_feed(&url, options).unwrap();
    assert_eq!(runner.calls.borrow().len(), 1);
}

#[test]
fn test_missing_keyring_is_fatal() {
    let ctx = TestContext::new();
    fs::remove_file(ctx.gnupg.join("pubring.gpg")).unwrap();
    let runner = FakeRunner::succeeding();
    let url = ctx.write_feed(
        "feed.json",
        &file_url(&fixture("hello.zip")),
        Some(&file_url(&fixture("hello.zip.sig"))),
    );

    let err = ctx
        .installer(&runner)
        .install_feed(&url, InstallOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        InstallError::Verification(VerifyError::NoKeyring { .. })
    ));
    assert!(runner.calls.borrow().is_empty());
}

#[test]
fn test_keybox_keyring_fails_closed() {
    let ctx = TestContext::new();
    fs::remove_file(ctx.gnupg.join("pubring.gpg")).unwrap();
    let mut kbx = vec![0, 0, 0, 32, 1, 1, 0, 0];
    kbx.extend(b"KBXf");
    kbx.resize(32, 0);
    fs::write(ctx.gnupg.join("pubring.kbx"), kbx).unwrap();

    let runner = FakeRunner::succeeding();
    let url = ctx.write_feed(
        "feed.json",
        &file_url(&fixture("hello.zip")),
        Some(&file_url(&fixture("hello.zip.sig"))),
    );
    let installer = ctx.installer(&runner);

    let err = installer
        .install_feed(&url, InstallOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        InstallError::Verification(VerifyError::KeyboxUnsupported { .. })
    ));
    assert!(err.to_string().contains("--export"));
    assert!(!installer.cache().exists(&url));
    assert!(runner.calls.borrow().is_empty());
}

#[test]
fn test_missing_platform_spawns_nothing() {
    let ctx = TestContext::new();
    let runner = FakeRunner::succeeding();
    let url = ctx.write_feed("feed.json", &file_url(&fixture("hello.zip")), None);
    let installer = Installer::new(ctx.config().with_platform(HostPlatform::named("plan9")))
        .with_runner(&runner);

    let err = installer
        .install_feed(&url, InstallOptions::default())
        .unwrap_err();

    assert!(matches!(
        err,
        InstallError::Dispatch(DispatchError::UnsupportedPlatform { ref platform, .. }) if platform == "plan9"
    ));
    assert_eq!(err.stage(), "manifest");
    assert!(runner.calls.borrow().is_empty());
}

#[test]
fn test_missing_manifest_is_an_error() {
    let ctx = TestContext::new();
    let archive = ctx.zip("bare.zip", &[("readme.txt", "no manifest here")]);
    let url = ctx.write_feed("feed.json", &file_url(&archive), None);
    let runner = FakeRunner::succeeding();

    let err = ctx
        .installer(&runner)
        .install_feed(&url, InstallOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        InstallError::Dispatch(DispatchError::MissingManifest)
    ));
    assert!(runner.calls.borrow().is_empty());
}

#[test]
fn test_failed_install_retries_from_cache() {
    let ctx = TestContext::new();
    let mut server = mockito::Server::new();
    let feed = serde_json::json!({
        "name": "hello",
        "version": "1.0.0",
        "archive_url": format!("{}/hello.zip", server.url()),
        "archive_type": "zip",
    });
    let feed_mock = server
        .mock("GET", "/feed.json")
        .with_body(feed.to_string())
        .expect(1)
        .create();
    let _archive = server
        .mock("GET", "/hello.zip")
        .with_body(fs::read(fixture("hello.zip")).unwrap())
        .expect(1)
        .create();

    let runner = FakeRunner::default();
    *runner.exit_code.borrow_mut() = Some(1);
    let installer = ctx.installer(&runner);
    let url = format!("{}/feed.json", server.url());

    let err = installer
        .install_feed(&url, InstallOptions::default())
        .unwrap_err();
    assert_eq!(err.stage(), "subprocess");
    assert!(installer.cache().exists(&url));

    *runner.exit_code.borrow_mut() = Some(0);
    let outcome = installer.install_feed(&url, InstallOptions::default()).unwrap();
    assert!(matches!(
        outcome,
        InstallOutcome::Installed {
            from_cache: true,
            ..
        }
    ));
    assert_eq!(runner.calls.borrow().len(), 2);
    feed_mock.assert();
}

#[test]
fn test_run_and_uninstall_actions() {
    let ctx = TestContext::new();
    let runner = FakeRunner::succeeding();
    let url = ctx.write_feed("feed.json", &file_url(&fixture("hello.zip")), None);
    let installer = ctx.installer(&runner);

    installer.install_feed(&url, InstallOptions::default()).unwrap();
    installer.run_action(&url, Action::Run).unwrap();
    installer.run_action(&url, Action::Uninstall).unwrap();
    assert!(!installer.cache().is_installed(&url));

    // After uninstalling, installing again uses the cached archive.
    let outcome = installer.install_feed(&url, InstallOptions::default()).unwrap();
    assert!(matches!(
        outcome,
        InstallOutcome::Installed {
            from_cache: true,
            ..
        }
    ));

    assert_eq!(
        runner.argv(),
        [
            vec!["sh", "install.sh"],
            vec!["sh", "bin/hello.sh"],
            vec!["sh", "uninstall.sh"],
            vec!["sh", "install.sh"],
        ]
    );
}

#[test]
fn test_action_on_unknown_feed_is_not_installed() {
    let ctx = TestContext::new();
    let runner = FakeRunner::succeeding();
    let err = ctx
        .installer(&runner)
        .run_action("file:///nowhere/feed.json", Action::Run)
        .unwrap_err();
    assert!(matches!(err, InstallError::NotInstalled(_)));
}

#[test]
fn test_bad_inputs_fail_at_their_stage() {
    let ctx = TestContext::new();
    let runner = FakeRunner::succeeding();
    let installer = ctx.installer(&runner);

    let err = installer
        .install_feed("gopher://example.com/feed.json", InstallOptions::default())
        .unwrap_err();
    assert!(matches!(err, InstallError::Fetch(FetchError::UnsupportedScheme(_))));

    let path = ctx.temp_dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();
    let err = installer
        .install_feed(&file_url(&path), InstallOptions::default())
        .unwrap_err();
    assert!(matches!(err, InstallError::Parse(SchemaError::Parse { .. })));
    assert_eq!(err.stage(), "parse");

    let url = ctx.write_feed("nover.json", "", None);
    let err = installer
        .install_feed(&url, InstallOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        InstallError::Parse(SchemaError::EmptyField("archive_url"))
    ));
}

#[test]
fn test_signed_archive_is_unwrapped_before_install() {
    let ctx = TestContext::new();
    let runner = FakeRunner::succeeding();
    let feed = serde_json::json!({
        "name": "hello",
        "version": "1.0.0",
        "archive_url": file_url(&fixture("hello.zip.gpg")),
        "archive_type": "zip",
        "is_archive_signed": true,
    });
    let path = ctx.temp_dir.path().join("signed.json");
    fs::write(&path, feed.to_string()).unwrap();

    let outcome = ctx
        .installer(&runner)
        .install_feed(&file_url(&path), InstallOptions::default())
        .unwrap();
    let InstallOutcome::Installed { archive, .. } = outcome else {
        panic!("expected a fresh install");
    };
    assert_eq!(fs::read(archive).unwrap(), fs::read(fixture("hello.zip")).unwrap());
    assert_eq!(runner.calls.borrow().len(), 1);
}

#[cfg(unix)]
#[test]
fn test_real_process_runs_in_extraction_root() {
    let ctx = TestContext::new();
    let marker = ctx.temp_dir.path().join("ran");
    let manifest = serde_json::json!({
        "platforms": [{
            "name": "linux",
            "install": ["sh", "pkg/install.sh", marker.display().to_string()],
        }]
    });
    let manifest = manifest.to_string();
    let archive = ctx.zip(
        "real.zip",
        &[
            ("pkg/install.json", manifest.as_str()),
            ("pkg/install.sh", "pwd > \"$1\"\n"),
        ],
    );
    let url = ctx.write_feed("feed.json", &file_url(&archive), None);

    Installer::new(ctx.config())
        .install_feed(&url, InstallOptions::default())
        .unwrap();

    let cwd = fs::read_to_string(&marker).unwrap();
    let cwd = PathBuf::from(cwd.trim());
    assert!(cwd.file_name().unwrap().to_string_lossy().starts_with("zg-"));
    assert!(!cwd.exists());
}
