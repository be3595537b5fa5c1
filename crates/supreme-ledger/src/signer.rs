//! Admin key loading and transaction signing.
//!
//! Flow account keys pair a curve with a hash. Admin keys are registered as
//! ECDSA P-256 with SHA3-256; secp256k1 with SHA2-256 is also accepted.
//! A signature is the raw 64-byte `r || s` pair over
//! `HASH(domain_tag || rlp(message))`; the domain tag is prepended by the
//! caller (see `envelope`), this module only hashes and signs.

use std::path::PathBuf;
use std::sync::Arc;

use alloy::primitives::B256;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use serde::Deserialize;
use thiserror::Error;
use zeroize::Zeroizing;

// =============================================================================
// KeySource and KeyRing
// =============================================================================

/// Source of the admin private key(s).
///
/// The value is one hex key, or a comma-separated list with one key per
/// account key slot.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Load from environment variable (development).
    EnvVar { var_name: String },
    /// Load from file (production, recommend 0600 permissions).
    File { path: PathBuf },
}

/// Signature and hash algorithm of the admin account keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureAlgorithm {
    /// `ECDSA_P256` + `SHA3_256`.
    #[default]
    P256Sha3,
    /// `ECDSA_secp256k1` + `SHA2_256`.
    Secp256k1Sha2,
}

/// Key management errors.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Failed to decode hex: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("No private key configured")]
    Empty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Signing errors.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("No private key for key slot {0}")]
    NoKeyForSlot(usize),

    #[error("P-256 signing failed: {0}")]
    P256(#[from] p256::ecdsa::Error),

    #[error("secp256k1 signing failed: {0}")]
    Secp256k1(#[from] alloy::signers::Error),
}

/// One private key, tagged with its algorithm.
enum SlotKey {
    P256(p256::ecdsa::SigningKey),
    Secp256k1(PrivateKeySigner),
}

impl SlotKey {
    fn from_bytes(bytes: &[u8], algorithm: SignatureAlgorithm) -> Result<Self, KeyError> {
        match algorithm {
            SignatureAlgorithm::P256Sha3 => p256::ecdsa::SigningKey::from_slice(bytes)
                .map(Self::P256)
                .map_err(|e| KeyError::InvalidKey(e.to_string())),
            SignatureAlgorithm::Secp256k1Sha2 => PrivateKeySigner::from_slice(bytes)
                .map(Self::Secp256k1)
                .map_err(|e| KeyError::InvalidKey(e.to_string())),
        }
    }

    fn sign(&self, message: &[u8]) -> Result<[u8; 64], SignerError> {
        let mut out = [0u8; 64];
        match self {
            Self::P256(key) => {
                let signature: p256::ecdsa::Signature = key.sign_prehash(&sha3_digest(message))?;
                out.copy_from_slice(&signature.to_bytes());
            }
            Self::Secp256k1(signer) => {
                let signature = signer.sign_hash_sync(&sha2_digest(message))?;
                out[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
                out[32..].copy_from_slice(&signature.s().to_be_bytes::<32>());
            }
        }
        Ok(out)
    }

    /// Uncompressed public key without the SEC1 `0x04` tag, as Flow lists it.
    fn public_key(&self) -> Vec<u8> {
        let point = match self {
            Self::P256(key) => key.verifying_key().to_encoded_point(false).as_bytes().to_vec(),
            Self::Secp256k1(signer) => signer
                .credential()
                .verifying_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec(),
        };
        point[1..].to_vec()
    }
}

/// Private keys backing the admin account's key slots.
///
/// Security notes:
/// - Key material lives only inside the signing keys (zeroized on drop).
/// - Never log private key material.
pub struct KeyRing {
    keys: Vec<SlotKey>,
    algorithm: SignatureAlgorithm,
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("keys", &self.keys.len())
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl KeyRing {
    /// Load keys from the given source.
    ///
    /// # Errors
    /// Returns `KeyError` if the variable/file is missing, hex decoding fails,
    /// or a key is not a valid scalar for `algorithm`.
    pub fn load(source: &KeySource, algorithm: SignatureAlgorithm) -> Result<Self, KeyError> {
        let raw: Zeroizing<String> = match source {
            KeySource::EnvVar { var_name } => Zeroizing::new(
                std::env::var(var_name).map_err(|_| KeyError::EnvVarNotFound(var_name.clone()))?,
            ),
            KeySource::File { path } => Zeroizing::new(std::fs::read_to_string(path)?),
        };
        Self::from_hex_list_with(&raw, algorithm)
    }

    /// Parse a comma-separated list of P-256 hex keys (`0x` prefix optional).
    pub fn from_hex_list(list: &str) -> Result<Self, KeyError> {
        Self::from_hex_list_with(list, SignatureAlgorithm::default())
    }

    pub fn from_hex_list_with(list: &str, algorithm: SignatureAlgorithm) -> Result<Self, KeyError> {
        fn parse_hex_key(hex_str: &str) -> Result<Zeroizing<Vec<u8>>, KeyError> {
            let trimmed = hex_str.trim().trim_start_matches("0x");
            Ok(Zeroizing::new(hex::decode(trimmed)?))
        }

        let keys = list
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(|part| SlotKey::from_bytes(&parse_hex_key(part)?, algorithm))
            .collect::<Result<Vec<_>, _>>()?;

        if keys.is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(Self { keys, algorithm })
    }

    /// Number of distinct private keys loaded.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Private key for an account key slot. A single loaded key backs every slot.
    fn key_for(&self, key_index: usize) -> Result<&SlotKey, SignerError> {
        if self.keys.len() == 1 {
            return Ok(&self.keys[0]);
        }
        self.keys
            .get(key_index)
            .ok_or(SignerError::NoKeyForSlot(key_index))
    }

    /// Sign `message` (already domain-tagged) with the key for `key_index`.
    pub fn sign(&self, key_index: usize, message: &[u8]) -> Result<[u8; 64], SignerError> {
        self.key_for(key_index)?.sign(message)
    }

    /// Hex public key for `key_index`, comparable with the account's key list.
    pub fn public_key_hex(&self, key_index: usize) -> Result<String, SignerError> {
        Ok(hex::encode(self.key_for(key_index)?.public_key()))
    }

    /// A [`PayloadSigner`] bound to one key slot.
    pub fn slot_signer(self: &Arc<Self>, key_index: usize) -> SlotSigner {
        SlotSigner {
            ring: Arc::clone(self),
            key_index,
        }
    }
}

/// SHA3-256 digest of `message`.
pub fn sha3_digest(message: &[u8]) -> [u8; 32] {
    <sha3::Sha3_256 as sha3::Digest>::digest(message).into()
}

/// SHA2-256 digest of `message`.
pub fn sha2_digest(message: &[u8]) -> B256 {
    B256::from_slice(&<sha2::Sha256 as sha2::Digest>::digest(message))
}

/// Anything that can sign a domain-tagged transaction message.
///
/// Used for co-authorizers whose keys are not in the admin ring.
pub trait PayloadSigner: Send + Sync {
    fn sign(&self, message: &[u8]) -> Result<[u8; 64], SignerError>;
}

/// One slot of a shared [`KeyRing`].
#[derive(Debug, Clone)]
pub struct SlotSigner {
    ring: Arc<KeyRing>,
    key_index: usize,
}

impl PayloadSigner for SlotSigner {
    fn sign(&self, message: &[u8]) -> Result<[u8; 64], SignerError> {
        self.ring.sign(self.key_index, message)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::hazmat::PrehashVerifier;

    // Well-known test private keys (DO NOT use in production)
    const TEST_PRIVATE_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const SECOND_PRIVATE_KEY: &str =
        "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    fn scalar(hex_key: &str) -> Vec<u8> {
        hex::decode(hex_key.trim_start_matches("0x")).unwrap()
    }

    #[test]
    fn test_from_hex_list_single_key_backs_every_slot() {
        let ring = KeyRing::from_hex_list(TEST_PRIVATE_KEY).unwrap();
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.algorithm(), SignatureAlgorithm::P256Sha3);
        assert_eq!(ring.public_key_hex(0).unwrap(), ring.public_key_hex(7).unwrap());
        assert_eq!(ring.sign(0, b"abc").unwrap(), ring.sign(7, b"abc").unwrap());
    }

    #[test]
    fn test_from_hex_list_one_key_per_slot() {
        let list = format!("{TEST_PRIVATE_KEY}, {}", SECOND_PRIVATE_KEY.trim_start_matches("0x"));
        let ring = KeyRing::from_hex_list(&list).unwrap();
        assert_eq!(ring.len(), 2);
        assert_ne!(ring.public_key_hex(0).unwrap(), ring.public_key_hex(1).unwrap());
        assert!(matches!(ring.sign(2, b"abc"), Err(SignerError::NoKeyForSlot(2))));
    }

    #[test]
    fn test_from_hex_list_rejects_garbage() {
        assert!(matches!(KeyRing::from_hex_list("zz"), Err(KeyError::HexDecode(_))));
        assert!(matches!(KeyRing::from_hex_list(" , "), Err(KeyError::Empty)));
        assert!(matches!(
            KeyRing::from_hex_list("0x00"),
            Err(KeyError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_load_from_missing_env_var() {
        let source = KeySource::EnvVar {
            var_name: "SUPREME_TEST_KEY_THAT_DOES_NOT_EXIST".to_string(),
        };
        assert!(matches!(
            KeyRing::load(&source, SignatureAlgorithm::P256Sha3),
            Err(KeyError::EnvVarNotFound(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("supreme-key-{}.hex", std::process::id()));
        std::fs::write(&path, format!("{TEST_PRIVATE_KEY}\n")).unwrap();
        let ring = KeyRing::load(&KeySource::File { path: path.clone() }, SignatureAlgorithm::P256Sha3)
            .unwrap();
        assert_eq!(ring.len(), 1);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_p256_signature_verifies_over_sha3_digest() {
        let ring = KeyRing::from_hex_list(TEST_PRIVATE_KEY).unwrap();
        let message = b"FLOW-V0.0-transaction payload";

        let sig_bytes = ring.sign(0, message).unwrap();
        assert_eq!(sig_bytes, ring.sign(0, message).unwrap(), "RFC 6979 signatures are deterministic");

        let signing_key = p256::ecdsa::SigningKey::from_slice(&scalar(TEST_PRIVATE_KEY)).unwrap();
        let verifying_key = signing_key.verifying_key();
        let signature = p256::ecdsa::Signature::from_slice(&sig_bytes).unwrap();
        let digest = <sha3::Sha3_256 as sha3::Digest>::digest(message);
        assert!(verifying_key.verify_prehash(&digest, &signature).is_ok());

        // Not valid over the SHA2-256 digest.
        assert!(verifying_key
            .verify_prehash(&sha2_digest(message).0, &signature)
            .is_err());

        let expected_public = hex::encode(&verifying_key.to_encoded_point(false).as_bytes()[1..]);
        assert_eq!(ring.public_key_hex(0).unwrap(), expected_public);
        assert_eq!(expected_public.len(), 128);
    }

    #[test]
    fn test_secp256k1_signature_recovers_signer() {
        let ring =
            KeyRing::from_hex_list_with(TEST_PRIVATE_KEY, SignatureAlgorithm::Secp256k1Sha2).unwrap();
        let message = b"FLOW-V0.0-transaction payload";
        let sig_bytes = ring.sign(0, message).unwrap();

        let signer = PrivateKeySigner::from_slice(&scalar(TEST_PRIVATE_KEY)).unwrap();
        let full = signer.sign_hash_sync(&sha2_digest(message)).unwrap();
        assert_eq!(&sig_bytes[..32], &full.r().to_be_bytes::<32>());
        assert_eq!(&sig_bytes[32..], &full.s().to_be_bytes::<32>());
        let recovered = full.recover_address_from_prehash(&sha2_digest(message)).unwrap();
        assert_eq!(recovered, signer.address());
        assert_ne!(
            ring.public_key_hex(0).unwrap(),
            KeyRing::from_hex_list(TEST_PRIVATE_KEY).unwrap().public_key_hex(0).unwrap()
        );
    }

    #[test]
    fn test_algorithm_parses_from_config() {
        #[derive(Deserialize)]
        struct Wrapper {
            algorithm: SignatureAlgorithm,
        }
        let w: Wrapper = serde_json::from_str(r#"{"algorithm":"secp256k1_sha2"}"#).unwrap();
        assert_eq!(w.algorithm, SignatureAlgorithm::Secp256k1Sha2);
        let w: Wrapper = serde_json::from_str(r#"{"algorithm":"p256_sha3"}"#).unwrap();
        assert_eq!(w.algorithm, SignatureAlgorithm::P256Sha3);
    }

    #[test]
    fn test_slot_signer_matches_ring() {
        let ring = Arc::new(KeyRing::from_hex_list(TEST_PRIVATE_KEY).unwrap());
        let slot = ring.slot_signer(0);
        assert_eq!(
            PayloadSigner::sign(&slot, b"abc").unwrap(),
            ring.sign(0, b"abc").unwrap()
        );
    }

    #[test]
    fn test_debug_does_not_leak_keys() {
        let ring = KeyRing::from_hex_list(TEST_PRIVATE_KEY).unwrap();
        let rendered = format!("{ring:?}");
        assert!(!rendered.contains("ac0974"));
    }
}
