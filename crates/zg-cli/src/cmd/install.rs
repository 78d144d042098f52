//! Install command

use anyhow::Result;
use zg_core::{Config, InstallOptions, Installer, VerificationMethod};

use crate::ui::ConsoleReporter;

/// Install the archive behind `feed_url`.
pub fn install(config: Config, feed_url: &str, no_verify: bool, no_cache: bool) -> Result<()> {
    let reporter = ConsoleReporter::new();
    let verification = if no_verify {
        reporter.warning_line("Signature verification disabled (--no-verify)");
        VerificationMethod::None
    } else {
        VerificationMethod::Auto
    };
    let options = InstallOptions {
        use_cache: !no_cache,
        verification,
    };

    Installer::new(config)
        .with_reporter(reporter)
        .install_feed(feed_url, options)
        .map_err(|e| {
            let stage = e.stage();
            anyhow::Error::new(e).context(format!("Failed to install {feed_url} ({stage} stage)"))
        })?;
    Ok(())
}
