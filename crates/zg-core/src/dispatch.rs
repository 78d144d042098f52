//! Install dispatch: find `install.json` among the extracted files and run
//! the command for this platform.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, info};
use zg_schema::{HostPlatform, InstallManifest, MANIFEST_FILE_NAME, Platform, SchemaError};

use crate::io::extract::ExtractedFile;
use crate::reporter::Reporter;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Missing manifest: no install.json in archive")]
    MissingManifest,

    #[error("Failed to read manifest {}: {source}", .path.display())]
    ReadManifest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    InvalidManifest(#[from] SchemaError),

    #[error("Unsupported platform: {platform} (manifest provides: {})", .available.join(", "))]
    UnsupportedPlatform {
        platform: String,
        available: Vec<String>,
    },

    #[error("Manifest has no {action} command for {platform}")]
    EmptyCommand { action: Action, platform: String },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {}", describe_exit(.code))]
    ExitStatus { program: String, code: Option<i32> },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "a signal".to_string(),
    }
}

impl DispatchError {
    /// Whether the failure is about the manifest rather than the subprocess.
    pub fn is_manifest_error(&self) -> bool {
        matches!(
            self,
            Self::MissingManifest
                | Self::ReadManifest { .. }
                | Self::InvalidManifest(_)
                | Self::UnsupportedPlatform { .. }
                | Self::EmptyCommand { .. }
        )
    }
}

/// Which manifest command to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Uninstall,
    Run,
}

impl Action {
    pub fn command(self, platform: &Platform) -> &[String] {
        match self {
            Self::Install => &platform.install_command,
            Self::Uninstall => &platform.uninstall_command,
            Self::Run => &platform.run_command,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Run => "run",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs external commands on behalf of the dispatcher.
pub trait CommandRunner {
    /// Run `argv` with `cwd` as working directory and wait for it.
    ///
    /// Returns the exit code, or `None` if the process was terminated by a
    /// signal.
    fn run(&self, argv: &[String], cwd: &Path) -> io::Result<Option<i32>>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, argv: &[String], cwd: &Path) -> io::Result<Option<i32>> {
        (**self).run(argv, cwd)
    }
}

/// Spawns real processes with the caller's stdin, stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, argv: &[String], cwd: &Path) -> io::Result<Option<i32>> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
        let status = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;
        Ok(status.code())
    }
}

/// First extracted regular file named `install.json`, in archive order.
pub fn find_manifest(files: &[ExtractedFile]) -> Option<&Path> {
    files
        .iter()
        .filter(|f| !f.is_dir)
        .find(|f| f.relative_path.file_name() == Some(OsStr::new(MANIFEST_FILE_NAME)))
        .map(|f| f.absolute_path.as_path())
}

/// Load the manifest and pick the entry for `host`.
pub fn select_platform(
    files: &[ExtractedFile],
    host: &HostPlatform,
) -> Result<Platform, DispatchError> {
    let path = find_manifest(files).ok_or(DispatchError::MissingManifest)?;
    debug!(manifest = %path.display(), "Found install manifest");
    let bytes = fs::read(path).map_err(|source| DispatchError::ReadManifest {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest = InstallManifest::from_slice(&bytes)?;
    manifest
        .platform_for(host)
        .cloned()
        .ok_or_else(|| DispatchError::UnsupportedPlatform {
            platform: host.to_string(),
            available: manifest.platform_names().into_iter().map(String::from).collect(),
        })
}

/// Run `action` for `host` from an extraction rooted at `root`.
///
/// Succeeds only when the command exits with code 0.
pub fn dispatch(
    files: &[ExtractedFile],
    root: &Path,
    host: &HostPlatform,
    action: Action,
    runner: &dyn CommandRunner,
    reporter: &dyn Reporter,
) -> Result<(), DispatchError> {
    let platform = select_platform(files, host)?;
    let command = action.command(&platform);
    let Some(program) = command.first() else {
        return Err(DispatchError::EmptyCommand {
            action,
            platform: platform.name.clone(),
        });
    };

    reporter.installing(&platform.name, command);
    info!(%action, platform = %platform.name, ?command, "Running manifest command");
    let code = runner
        .run(command, root)
        .map_err(|source| DispatchError::Spawn {
            program: program.clone(),
            source,
        })?;

    match code {
        Some(0) => Ok(()),
        code => Err(DispatchError::ExitStatus {
            program: program.clone(),
            code,
        }),
    }
}
