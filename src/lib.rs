//! akin-rs - Near-duplicate text detection with MinHash signatures and
//! banded Locality-Sensitive Hashing.

// Allow some pedantic clippy lints that are acceptable in this codebase
#![allow(clippy::cast_precision_loss)] // usize to f64 for jaccard ratios
#![allow(clippy::cast_possible_truncation)] // i128 hash output to u64 bucket ids
#![allow(clippy::cast_sign_loss)] // i128 hash output to u64 bucket ids
#![allow(clippy::module_name_repetitions)] // types named after modules
#![allow(clippy::similar_names)] // similar variable names
#![allow(clippy::format_push_string)] // acceptable for simple string building
#![allow(clippy::return_self_not_must_use)] // builders don't need must_use
#![allow(clippy::implicit_hasher)] // generic over label type already

pub mod band_store;
pub mod defaults;
pub mod hash;
pub mod index;
pub mod prng;
pub mod shingle;
pub mod signature;

pub use band_store::{BandBucketStore, BandStoreError};
pub use hash::{hash, hash64, HashWidth};
pub use index::{IndexError, LSHIndex};
pub use prng::SplitMix64;
pub use shingle::{NGramType, ShingleError, Shingler, Shingles};
pub use signature::{Signature, SignatureBuilder, SignatureError};
