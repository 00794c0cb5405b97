//! # yac-primitives
//!
//! Primitive types shared by the YAC crates.
//!
//! - [`H256`]: 32-byte digest (block hashes, proposal hashes, signing digests)
//! - [`Address`]: 20-byte peer identifier derived from a public key

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod error;
mod hash;

pub use address::{Address, AddressError};
pub use error::PrimitiveError;
pub use hash::{Hash, HashError, H256};

/// Consensus round number
pub type Round = u64;
