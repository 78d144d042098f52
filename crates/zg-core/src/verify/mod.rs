//! Verification policy: which method applies to a feed, and the keyring
//! that detached signatures are checked against.

pub mod cert;
mod keyring;

use std::path::PathBuf;

use thiserror::Error;
use zg_schema::Feed;

pub use cert::{Certificate, KeyState, Rejection, read_certificates, read_signatures};
pub use keyring::{Keyring, MAX_MESSAGE_PAYLOAD, VerifiedBy};

/// Keyring file names tried in order inside the keyring directory.
pub const DEFAULT_KEYRING_CANDIDATES: &[&str] = &["pubring.gpg", "pubring.kbx"];

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("No keyring found in {}: looked for {}", .dir.display(), .candidates.join(", "))]
    NoKeyring {
        dir: PathBuf,
        candidates: Vec<String>,
    },

    #[error(
        "{} is a GnuPG keybox, which cannot be read. Export the public keys into a keyring with:\n  gpg --no-default-keyring --keyring {} --export > {}",
        .path.display(),
        .path.display(),
        .export_to.display()
    )]
    KeyboxUnsupported { path: PathBuf, export_to: PathBuf },

    #[error("Failed to read keyring {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid keyring {}: {source}", .path.display())]
    Keyring {
        path: PathBuf,
        #[source]
        source: pgp::errors::Error,
    },

    #[error("Invalid signature: {0}")]
    Signature(#[source] pgp::errors::Error),

    #[error("Detached signature contains no signature packets")]
    NoSignatures,

    #[error("Invalid signed message: {0}")]
    Message(#[source] pgp::errors::Error),

    #[error("Failed to read signed message: {0}")]
    MessageRead(#[source] std::io::Error),

    #[error("Message is encrypted; only signed messages can be read")]
    Encrypted,

    #[error("Message carries no signature")]
    Unsigned,

    #[error("Signed message payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("Signature did not verify against any of the {keys} key(s) in {}", .keyring.display())]
    NoMatchingKey { keys: usize, keyring: PathBuf },

    #[error("Detached signature verification requested but the feed has no signature URL")]
    MissingSignatureUrl,
}

/// How a fetched archive is authenticated.
///
/// `Auto` only selects one of the other two; see [`VerificationMethod::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationMethod {
    #[default]
    Auto,
    None,
    DetachedSignature,
}

/// A verification method with `Auto` resolved away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedMethod {
    None,
    DetachedSignature { signature_url: String },
}

impl VerificationMethod {
    /// Decide the method for `feed`. `Auto` becomes a detached signature
    /// check when the feed names a signature URL and no check otherwise.
    ///
    /// # Errors
    ///
    /// An explicit `DetachedSignature` for a feed without a signature URL is
    /// [`VerifyError::MissingSignatureUrl`].
    pub fn resolve(self, feed: &Feed) -> Result<ResolvedMethod, VerifyError> {
        match (self, feed.signature_url()) {
            (Self::None, _) | (Self::Auto, None) => Ok(ResolvedMethod::None),
            (Self::Auto | Self::DetachedSignature, Some(url)) => {
                Ok(ResolvedMethod::DetachedSignature {
                    signature_url: url.to_string(),
                })
            }
            (Self::DetachedSignature, None) => Err(VerifyError::MissingSignatureUrl),
        }
    }
}

impl std::fmt::Display for ResolvedMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::DetachedSignature { .. } => f.write_str("detached signature"),
        }
    }
}
