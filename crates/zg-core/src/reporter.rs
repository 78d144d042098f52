//! Reporter trait for dependency injection
//!
//! The pipeline reports progress through this trait so that it is not
//! coupled to a terminal. Library code never prints.

use std::path::Path;

use crate::verify::{ResolvedMethod, VerifiedBy};

pub trait Reporter: Send + Sync {
    /// A feed descriptor is about to be fetched.
    fn loading_feed(&self, url: &str);

    /// The feed has a committed cache entry and a recorded install.
    fn already_installed(&self, url: &str);

    /// A resource of the feed (`"feed"`, `"archive"`, `"signature"`) is being fetched.
    fn fetching(&self, what: &str, url: &str);

    /// Verification is starting with the resolved method.
    fn verifying(&self, method: &ResolvedMethod);

    /// A signature was accepted.
    fn verified(&self, by: &VerifiedBy);

    /// The archive is being written to the cache.
    fn caching(&self, path: &Path);

    /// The archive is being unpacked into a scratch directory.
    fn extracting(&self, path: &Path);

    /// The platform command is about to run.
    fn installing(&self, platform: &str, command: &[String]);

    /// The operation finished successfully.
    fn done(&self, message: &str);

    /// Something degraded but safe happened.
    fn warning(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn loading_feed(&self, url: &str) {
        (**self).loading_feed(url);
    }
    fn already_installed(&self, url: &str) {
        (**self).already_installed(url);
    }
    fn fetching(&self, what: &str, url: &str) {
        (**self).fetching(what, url);
    }
    fn verifying(&self, method: &ResolvedMethod) {
        (**self).verifying(method);
    }
    fn verified(&self, by: &VerifiedBy) {
        (**self).verified(by);
    }
    fn caching(&self, path: &Path) {
        (**self).caching(path);
    }
    fn extracting(&self, path: &Path) {
        (**self).extracting(path);
    }
    fn installing(&self, platform: &str, command: &[String]) {
        (**self).installing(platform, command);
    }
    fn done(&self, message: &str) {
        (**self).done(message);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn loading_feed(&self, _: &str) {}
    fn already_installed(&self, _: &str) {}
    fn fetching(&self, _: &str, _: &str) {}
    fn verifying(&self, _: &ResolvedMethod) {}
    fn verified(&self, _: &VerifiedBy) {}
    fn caching(&self, _: &Path) {}
    fn extracting(&self, _: &Path) {}
    fn installing(&self, _: &str, _: &[String]) {}
    fn done(&self, _: &str) {}
    fn warning(&self, _: &str) {}
}
