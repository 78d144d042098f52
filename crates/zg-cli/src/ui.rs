//! Console output for the zg binary.
//!
//! Progress goes to stderr so stdout stays clean for command output such
//! as `zg feed list` and `zg completions`.

use std::path::Path;

use crossterm::style::Stylize;
use zg_core::{Reporter, ResolvedMethod, VerifiedBy};

/// Prints pipeline progress to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn info_line(&self, msg: &str) {
        eprintln!("{msg}");
    }

    pub fn success_line(&self, msg: &str) {
        eprintln!("{}", msg.green().bold());
    }

    pub fn warning_line(&self, msg: &str) {
        eprintln!("{} {msg}", "warning:".yellow().bold());
    }
}

fn verifying_message(method: &ResolvedMethod) -> &'static str {
    match method {
        ResolvedMethod::None => "Skipping feed signature verification",
        ResolvedMethod::DetachedSignature { .. } => "Verifying feed signature...",
    }
}

fn verified_message(by: &VerifiedBy) -> String {
    format!("Feed signature verified ({} {})", by.user_id, by.fingerprint)
}

impl Reporter for ConsoleReporter {
    fn loading_feed(&self, url: &str) {
        self.info_line(&format!("Loading feed: {url}"));
    }

    fn already_installed(&self, url: &str) {
        self.success_line(&format!("Feed already installed: {url}"));
    }

    fn fetching(&self, what: &str, url: &str) {
        tracing::debug!(what, url, "Fetching");
    }

    fn verifying(&self, method: &ResolvedMethod) {
        self.info_line(verifying_message(method));
    }

    fn verified(&self, by: &VerifiedBy) {
        self.info_line(&verified_message(by));
    }

    fn caching(&self, path: &Path) {
        self.info_line(&format!("Writing feed archive to {}", path.display()));
    }

    fn extracting(&self, path: &Path) {
        self.info_line(&format!("Extracting archive to {}", path.display()));
    }

    fn installing(&self, platform: &str, command: &[String]) {
        self.info_line(&format!(
            "Running {} command: {}",
            platform,
            command.join(" ").dark_grey()
        ));
    }

    fn done(&self, message: &str) {
        self.success_line(message);
    }

    fn warning(&self, msg: &str) {
        self.warning_line(msg);
    }
}
