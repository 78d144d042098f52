use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pgp::composed::Message;
use pgp::packet::Signature;
use tracing::{debug, info};

use super::VerifyError;
use super::cert::{
    Certificate, Rejection, check_document_signature, read_certificates, read_signatures,
};

/// Bytes 8..12 of the first blob of a GnuPG keybox file.
const KEYBOX_MAGIC: &[u8] = b"KBXf";

/// Largest payload a signed message may unwrap to.
pub const MAX_MESSAGE_PAYLOAD: u64 = 1 << 30;

/// The key that accepted a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedBy {
    /// Fingerprint of the key (or subkey) that made the signature.
    pub fingerprint: String,
    /// First user id of its certificate.
    pub user_id: String,
}

/// Trusted public keys loaded from a local keyring file.
#[derive(Debug, Clone)]
pub struct Keyring {
    path: PathBuf,
    certificates: Vec<Certificate>,
    payload_limit: u64,
}

impl Keyring {
    /// First existing candidate inside `dir`.
    pub fn discover(dir: &Path, candidates: &[String]) -> Result<PathBuf, VerifyError> {
        candidates
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| VerifyError::NoKeyring {
                dir: dir.to_path_buf(),
                candidates: candidates.to_vec(),
            })
    }

    /// Discover and load the keyring in `dir`.
    pub fn load(dir: &Path, candidates: &[String]) -> Result<Self, VerifyError> {
        let path = Self::discover(dir, candidates)?;
        Self::from_file(&path)
    }

    /// Load a specific keyring file, binary or armored.
    ///
    /// A GnuPG keybox is refused with [`VerifyError::KeyboxUnsupported`]
    /// rather than treated as an empty keyring.
    pub fn from_file(path: &Path) -> Result<Self, VerifyError> {
        let bytes = fs::read(path).map_err(|source| VerifyError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_kbx = path.extension().is_some_and(|ext| ext == "kbx")
            || bytes.get(8..12) == Some(KEYBOX_MAGIC);
        if is_kbx {
            return Err(VerifyError::KeyboxUnsupported {
                path: path.to_path_buf(),
                export_to: path.with_file_name("pubring.gpg"),
            });
        }

        let certificates = read_certificates(&bytes).map_err(|source| VerifyError::Keyring {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            path = %path.display(),
            certificates = certificates.len(),
            "Loaded keyring"
        );
        Ok(Self {
            path: path.to_path_buf(),
            certificates,
            payload_limit: MAX_MESSAGE_PAYLOAD,
        })
    }

    /// Cap on the payload [`Keyring::verify_message`] will read.
    #[must_use]
    pub fn with_payload_limit(mut self, limit: u64) -> Self {
        self.payload_limit = limit;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// Number of keys (primary keys and subkeys) in the keyring.
    pub fn key_count(&self) -> usize {
        self.certificates.iter().map(Certificate::key_count).sum()
    }

    fn no_match(&self) -> VerifyError {
        VerifyError::NoMatchingKey {
            keys: self.key_count(),
            keyring: self.path.clone(),
        }
    }

    /// Check a detached signature over `data`, trying keys in keyring order
    /// and stopping at the first one that accepts any of the signatures.
    pub fn verify_detached(
        &self,
        signature: &[u8],
        data: &[u8],
        now: DateTime<Utc>,
    ) -> Result<VerifiedBy, VerifyError> {
        let signatures = read_signatures(signature).map_err(VerifyError::Signature)?;
        if signatures.is_empty() {
            return Err(VerifyError::NoSignatures);
        }

        for signature in &signatures {
            for cert in &self.certificates {
                for (key, state) in cert.keys() {
                    let accepted = cert
                        .check_usable(state, now)
                        .and_then(|()| check_document_signature(signature, state, now))
                        .and_then(|()| key.verify(signature, data).map_err(Rejection::from));
                    match accepted {
                        Ok(()) => return Ok(verified_by(cert, &state.fingerprint)),
                        Err(reason) => debug!(
                            key = %state.fingerprint,
                            %reason,
                            "Key did not verify signature"
                        ),
                    }
                }
            }
        }
        Err(self.no_match())
    }

    /// Verify a signed message and return its literal payload.
    ///
    /// The payload is only handed out after a signature over it verifies.
    /// Reading stops at the payload limit, so a compressed message cannot
    /// expand without bound before its signature is checked.
    pub fn verify_message(
        &self,
        message: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(VerifiedBy, Vec<u8>), VerifyError> {
        let (message, _headers) = Message::from_reader(message).map_err(VerifyError::Message)?;
        let mut message = message.decompress().map_err(VerifyError::Message)?;
        if message.is_encrypted() {
            return Err(VerifyError::Encrypted);
        }
        if !message.is_signed() {
            return Err(VerifyError::Unsigned);
        }

        let mut payload = Vec::new();
        message
            .by_ref()
            .take(self.payload_limit.saturating_add(1))
            .read_to_end(&mut payload)
            .map_err(VerifyError::MessageRead)?;
        if payload.len() as u64 > self.payload_limit {
            return Err(VerifyError::PayloadTooLarge {
                limit: self.payload_limit,
            });
        }

        for cert in &self.certificates {
            for (key, state) in cert.keys() {
                let accepted = cert.check_usable(state, now).and_then(|()| {
                    let signature: &Signature = message.verify(key.as_dyn())?;
                    check_document_signature(signature, state, now)
                });
                match accepted {
                    Ok(()) => return Ok((verified_by(cert, &state.fingerprint), payload)),
                    Err(reason) => debug!(
                        key = %state.fingerprint,
                        %reason,
                        "Key did not verify message"
                    ),
                }
            }
        }
        Err(self.no_match())
    }
}

fn verified_by(cert: &Certificate, fingerprint: &str) -> VerifiedBy {
    VerifiedBy {
        fingerprint: fingerprint.to_string(),
        user_id: cert.display_name().to_string(),
    }
}
