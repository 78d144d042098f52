//! Keyring certificates with their self-signatures checked.
//!
//! Parsing and every cryptographic check come from the `pgp` crate. What
//! lives here is the policy on top: which self-signature is current, when a
//! key or signature has expired, and whether a key may sign at all.

use std::io::BufRead;

use chrono::{DateTime, Duration, Utc};
use pgp::composed::{Deserializable, SignedPublicKey, SignedPublicSubKey, StandaloneSignature};
use pgp::crypto::hash::HashAlgorithm;
use pgp::packet::{self, Packet, PacketParser, Signature, SignatureType, SubpacketData};
use pgp::types::{KeyDetails, PublicKeyTrait, Tag};
use thiserror::Error;
use tracing::{debug, warn};

/// Why a key was not allowed to accept a signature.
#[derive(Error, Debug)]
pub enum Rejection {
    #[error("signature type {0:?} does not sign documents")]
    NotDocumentSignature(Option<SignatureType>),

    #[error("hash algorithm {0:?} is not accepted")]
    WeakHash(Option<HashAlgorithm>),

    #[error("key has no valid self-signature")]
    Unbound,

    #[error("key is not flagged for signing")]
    NotSigningKey,

    #[error("key has been revoked")]
    KeyRevoked,

    #[error("key expired at {0}")]
    KeyExpired(DateTime<Utc>),

    #[error("signature has no creation time")]
    MissingCreationTime,

    #[error("signature was made in the future ({0})")]
    FutureSignature(DateTime<Utc>),

    #[error("signature predates the key")]
    PredatesKey,

    #[error("signature expired at {0}")]
    SignatureExpired(DateTime<Utc>),

    #[error("{0}")]
    Crypto(#[from] pgp::errors::Error),
}

/// A primary key or subkey, as the packet signatures are checked against.
#[derive(Debug, Clone, Copy)]
pub enum ComponentKey<'a> {
    Primary(&'a packet::PublicKey),
    Subkey(&'a packet::PublicSubkey),
}

impl<'a> ComponentKey<'a> {
    /// Check a document signature over `data` with this key.
    pub fn verify(self, signature: &Signature, data: &[u8]) -> pgp::errors::Result<()> {
        match self {
            Self::Primary(key) => signature.verify(key, data),
            Self::Subkey(key) => signature.verify(key, data),
        }
    }

    pub fn as_dyn(self) -> &'a dyn PublicKeyTrait {
        match self {
            Self::Primary(key) => key,
            Self::Subkey(key) => key,
        }
    }
}

/// What the verified self-signatures say about one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyState {
    /// Uppercase hex, the way `gpg --fingerprint` prints it.
    pub fingerprint: String,
    pub created: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub can_sign: bool,
    pub revoked: bool,
    /// At least one self-signature over this key verified.
    pub bound: bool,
}

impl KeyState {
    fn unbound(key: &impl PublicKeyTrait) -> Self {
        Self {
            fingerprint: fingerprint_hex(key),
            created: *key.created_at(),
            expires_at: None,
            can_sign: false,
            revoked: false,
            bound: false,
        }
    }

    /// Take expiry and flags from `sig`, the newest verified self-signature.
    fn bind(&mut self, sig: &Signature) {
        self.bound = true;
        self.expires_at = sig
            .key_expiration_time()
            .and_then(|lifetime| after(self.created, *lifetime));
        self.can_sign = flags_allow_signing(sig);
    }

    fn check_alive(&self, now: DateTime<Utc>) -> Result<(), Rejection> {
        if !self.bound {
            return Err(Rejection::Unbound);
        }
        if self.revoked {
            return Err(Rejection::KeyRevoked);
        }
        match self.expires_at {
            Some(at) if at <= now => Err(Rejection::KeyExpired(at)),
            _ => Ok(()),
        }
    }
}

/// A transferable public key and the state of each of its keys.
#[derive(Debug, Clone)]
pub struct Certificate {
    key: SignedPublicKey,
    pub primary: KeyState,
    /// One entry per subkey, in certificate order.
    pub subkeys: Vec<KeyState>,
    /// User ids carrying a verified self-certification.
    pub user_ids: Vec<String>,
}

impl Certificate {
    /// Evaluate the self-signatures of `key`. Signatures that do not verify
    /// are ignored, as are third-party certifications.
    pub fn new(key: SignedPublicKey) -> Self {
        let primary_key = &key.primary_key;
        let mut primary = KeyState::unbound(primary_key);
        let mut user_ids = Vec::new();
        let mut self_sigs: Vec<&Signature> = Vec::new();

        for user in &key.details.users {
            let certified: Vec<&Signature> = user
                .signatures
                .iter()
                .filter(|sig| {
                    sig.is_certification() && sig.typ() != Some(SignatureType::CertRevocation)
                })
                .filter(|sig| {
                    sig.verify_certification(primary_key, Tag::UserId, &user.id)
                        .inspect_err(|e| debug!(error = %e, "Ignoring user id certification"))
                        .is_ok()
                })
                .collect();
            if !certified.is_empty() {
                user_ids.push(String::from_utf8_lossy(user.id.id()).into_owned());
                self_sigs.extend(certified);
            }
        }
        self_sigs.extend(
            key.details
                .direct_signatures
                .iter()
                .filter(|sig| sig.typ() == Some(SignatureType::Key))
                .filter(|sig| sig.verify_key(primary_key).is_ok()),
        );
        if let Some(newest) = newest(self_sigs) {
            primary.bind(newest);
        }
        primary.revoked = key
            .details
            .revocation_signatures
            .iter()
            .any(|sig| sig.verify_key(primary_key).is_ok());

        let subkeys = key
            .public_subkeys
            .iter()
            .map(|subkey| subkey_state(primary_key, subkey))
            .collect();

        Self {
            key,
            primary,
            subkeys,
            user_ids,
        }
    }

    pub fn inner(&self) -> &SignedPublicKey {
        &self.key
    }

    pub fn fingerprint_hex(&self) -> &str {
        &self.primary.fingerprint
    }

    /// First certified user id, for display.
    pub fn display_name(&self) -> &str {
        self.user_ids.first().map_or("<no user id>", String::as_str)
    }

    /// The primary key followed by every subkey.
    pub fn keys(&self) -> impl Iterator<Item = (ComponentKey<'_>, &KeyState)> {
        std::iter::once((ComponentKey::Primary(&self.key.primary_key), &self.primary)).chain(
            self.key
                .public_subkeys
                .iter()
                .zip(&self.subkeys)
                .map(|(subkey, state)| (ComponentKey::Subkey(&subkey.key), state)),
        )
    }

    pub fn key_count(&self) -> usize {
        1 + self.subkeys.len()
    }

    /// Both `key` and, for a subkey, its primary must be bound, unrevoked
    /// and unexpired at `now`, and `key` must be allowed to sign.
    pub fn check_usable(&self, key: &KeyState, now: DateTime<Utc>) -> Result<(), Rejection> {
        self.primary.check_alive(now)?;
        key.check_alive(now)?;
        if key.can_sign {
            Ok(())
        } else {
            Err(Rejection::NotSigningKey)
        }
    }
}

fn subkey_state(primary: &packet::PublicKey, subkey: &SignedPublicSubKey) -> KeyState {
    let mut state = KeyState::unbound(&subkey.key);
    let bindings = subkey.signatures.iter().filter(|sig| {
        sig.typ() == Some(SignatureType::SubkeyBinding)
            && sig.verify_subkey_binding(primary, &subkey.key).is_ok()
            && (!sig.key_flags().sign()
                || sig.embedded_signature().is_some_and(|back| {
                    back.verify_primary_key_binding(&subkey.key, primary).is_ok()
                }))
    });
    if let Some(newest) = newest(bindings) {
        state.bind(newest);
    }
    state.revoked = subkey.signatures.iter().any(|sig| {
        sig.typ() == Some(SignatureType::SubkeyRevocation)
            && sig.verify_subkey_binding(primary, &subkey.key).is_ok()
    });
    state
}

fn newest<'a>(sigs: impl IntoIterator<Item = &'a Signature>) -> Option<&'a Signature> {
    sigs.into_iter().max_by_key(|sig| sig.created().copied())
}

/// Keys whose self-signature carries no key flags may sign.
fn flags_allow_signing(sig: &Signature) -> bool {
    let has_flags = sig.config().is_some_and(|config| {
        config
            .hashed_subpackets()
            .any(|sp| matches!(sp.data, SubpacketData::KeyFlags(_)))
    });
    !has_flags || sig.key_flags().sign()
}

/// A zero lifetime means the key never expires.
fn after(created: DateTime<Utc>, lifetime: Duration) -> Option<DateTime<Utc>> {
    if lifetime.is_zero() {
        return None;
    }
    created.checked_add_signed(lifetime)
}

fn fingerprint_hex(key: &impl KeyDetails) -> String {
    hex::encode_upper(key.fingerprint().as_bytes())
}

/// Checks on a document signature that do not depend on the key material.
pub fn check_document_signature(
    sig: &Signature,
    key: &KeyState,
    now: DateTime<Utc>,
) -> Result<(), Rejection> {
    if !matches!(sig.typ(), Some(SignatureType::Binary | SignatureType::Text)) {
        return Err(Rejection::NotDocumentSignature(sig.typ()));
    }
    if !matches!(
        sig.hash_alg(),
        Some(
            HashAlgorithm::Sha224
                | HashAlgorithm::Sha256
                | HashAlgorithm::Sha384
                | HashAlgorithm::Sha512
                | HashAlgorithm::Sha3_256
                | HashAlgorithm::Sha3_512
        )
    ) {
        return Err(Rejection::WeakHash(sig.hash_alg()));
    }

    let created = *sig.created().ok_or(Rejection::MissingCreationTime)?;
    if created > now {
        return Err(Rejection::FutureSignature(created));
    }
    if created < key.created {
        return Err(Rejection::PredatesKey);
    }
    if let Some(expires) = sig
        .signature_expiration_time()
        .and_then(|lifetime| after(created, *lifetime))
    {
        if expires <= now {
            return Err(Rejection::SignatureExpired(expires));
        }
    }
    Ok(())
}

/// Parse every certificate in a keyring, binary or armored.
///
/// GnuPG keyring files interleave trust packets with the key packets; those
/// are dropped before the certificates are assembled.
pub fn read_certificates(data: &[u8]) -> pgp::errors::Result<Vec<Certificate>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let keys = if is_armored(data) {
        let (keys, _headers) = SignedPublicKey::from_armor_many(data)?;
        keys.collect::<pgp::errors::Result<Vec<_>>>()?
    } else {
        keyring_packets(data).collect::<pgp::errors::Result<Vec<_>>>()?
    };
    Ok(keys.into_iter().map(Certificate::new).collect())
}

fn keyring_packets<'a, R: BufRead + 'a>(
    source: R,
) -> Box<dyn Iterator<Item = pgp::errors::Result<SignedPublicKey>> + 'a> {
    let packets = PacketParser::new(source).filter(|packet| match packet {
        Ok(Packet::Trust(_) | Packet::Marker(_)) => false,
        Err(pgp::errors::Error::Unsupported { .. }) => {
            warn!("Skipping unsupported keyring packet");
            false
        }
        _ => true,
    });
    SignedPublicKey::from_packets(packets.peekable())
}

/// Read the signature packets of a detached signature, binary or armored.
pub fn read_signatures(data: &[u8]) -> pgp::errors::Result<Vec<Signature>> {
    let (signatures, _headers) = StandaloneSignature::from_reader_many(data)?;
    signatures
        .map(|sig| sig.map(|standalone| standalone.signature))
        .collect()
}

/// Binary OpenPGP data always starts with a byte with the high bit set.
pub fn is_armored(data: &[u8]) -> bool {
    data.first().is_some_and(|b| b & 0x80 == 0)
}
