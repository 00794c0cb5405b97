//! # yac-crypto
//!
//! Cryptographic primitives backing the YAC crypto provider.
//!
//! - Keccak-256 hashing
//! - ECDSA signing/verification (secp256k1, low-s normalized)
//! - Key (de)serialization
//! - Address derivation

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod hash;
mod signature;

pub use error::CryptoError;
pub use hash::{keccak256, keccak256_concat};
pub use signature::{
    decode_private_key, decode_public_key, encode_private_key, encode_public_key,
    public_key_to_address, sign, verify, PrivateKey, PublicKey, Signature,
};
