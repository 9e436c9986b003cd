//! Hashing and signature primitives consumed by the ledger core.

pub mod encoding;
pub mod sha512;
pub mod signatures;

pub use sha512::{sha512_hash, Hash};
pub use signatures::{
    generate_keypair, keypair_from_seed, sign, Ed25519Verifier, KeyPair, PrivateKey, PublicKey,
    SignatureVerifier,
};
