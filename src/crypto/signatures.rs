use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::encoding;

pub type PrivateKey = SigningKey;
pub type KeyPair = (SigningKey, PublicKey);

/// Recipient identity of an output: raw 32-byte ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<&SigningKey> for PublicKey {
    fn from(key: &SigningKey) -> Self {
        PublicKey(key.verifying_key().to_bytes())
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        PublicKey(key.to_bytes())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        encoding::serialize_array(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        encoding::deserialize_array::<D, 32>(deserializer).map(PublicKey)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0[..8]))
    }
}

/// Predicate deciding whether `signature` authorises `message` for `public_key`.
///
/// Implementations must not panic on malformed keys or signatures; they
/// answer `false` instead. `Sync` is required so checks can run on the
/// rayon pool.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &[u8]) -> bool;
}

/// Ed25519 verification backed by `ed25519-dalek`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(public_key.as_bytes()) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify(message, &signature).is_ok()
    }
}

impl<V: SignatureVerifier + ?Sized> SignatureVerifier for &V {
    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &[u8]) -> bool {
        (**self).verify(public_key, message, signature)
    }
}

/// Deterministic keypair, mostly for tests and the demo driver.
pub fn keypair_from_seed(seed: [u8; 32]) -> KeyPair {
    let signing = SigningKey::from_bytes(&seed);
    let public = PublicKey::from(&signing);
    (signing, public)
}

pub fn generate_keypair() -> KeyPair {
    let signing = SigningKey::generate(&mut OsRng);
    let public = PublicKey::from(&signing);
    (signing, public)
}

/// Detached ed25519 signature bytes over `message`.
pub fn sign(key: &PrivateKey, message: &[u8]) -> Vec<u8> {
    key.sign(message).to_bytes().to_vec()
}
