//! Feed repository commands

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use zg_core::{Config, FeedRepository};

use crate::ui::ConsoleReporter;

/// Fetch a feed and its archive into the repository.
pub fn import(config: &Config, feed_url: &str) -> Result<()> {
    let reporter = ConsoleReporter::new();
    reporter.info_line(&format!("Importing feed: {feed_url}"));

    let record = FeedRepository::new(config)
        .import_feed(feed_url)
        .with_context(|| format!("Failed to import {feed_url}"))?;

    reporter.info_line(&format!(
        "Archive stored at {}",
        record.feed_archive_path.display()
    ));
    if let Some(signed) = &record.feed_signed_archive_path {
        reporter.info_line(&format!("Signed original kept at {}", signed.display()));
    }
    reporter.success_line("Import complete!");
    Ok(())
}

/// List imported feeds.
pub fn list(config: &Config) -> Result<()> {
    let feeds = FeedRepository::new(config)
        .feeds()
        .context("Failed to read feed records")?;

    if feeds.is_empty() {
        println!();
        println!("  No feeds imported.");
        println!("  Run 'zg feed import <FEED_URL>' to get started.");
        return Ok(());
    }

    println!();
    for record in &feeds {
        let signed = if record.feed_signed_archive_path.is_some() {
            "signed".green().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {} {}",
            record.feed_url.as_str().bold(),
            record.feed_archive_path.display().to_string().dark_grey(),
            signed
        );
    }
    println!();
    println!("  {} feeds", feeds.len());
    Ok(())
}

/// Remove an imported feed and its stored archives.
pub fn remove(config: &Config, feed_url: &str) -> Result<()> {
    FeedRepository::new(config)
        .remove_feed(feed_url)
        .with_context(|| format!("Failed to remove {feed_url}"))?;
    ConsoleReporter::new().success_line(&format!("Removed {feed_url}"));
    Ok(())
}
