//! Signature construction (C3): two strategies — multi-hash and
//! bottom-k — that reduce a document's shingle set to a fixed-length
//! integer tuple of identical shape.

use std::fmt;

use rayon::prelude::*;

use crate::defaults;
use crate::hash::{self, HashWidth};
use crate::prng;
use crate::shingle::{NGramType, ShingleError, Shingler};

/// An immutable, ordered signature: `permutations` signed integers,
/// equal iff every position matches. Narrower `hash_bits` widths are
/// stored sign-extended into `i128` so both strategies share one
/// in-memory shape regardless of configured width.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(Vec<i128>);

impl Signature {
    pub fn new(values: Vec<i128>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[i128] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    InvalidNGramType(String),
    InvalidHashBits(u32),
    InvalidShingleSize { n_gram: usize, units: usize },
    InsufficientShingles { shingles: usize, permutations: usize },
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureError::InvalidNGramType(got) => {
                write!(f, "only \"char\" and \"term\" n_gram types are supported, got {got:?}")
            }
            SignatureError::InvalidHashBits(bits) => {
                write!(f, "only 32, 64 and 128 bit hashes are supported, got {bits}")
            }
            SignatureError::InvalidShingleSize { n_gram, units } => write!(
                f,
                "shingle n_gram size {n_gram} must not exceed text length {units}"
            ),
            SignatureError::InsufficientShingles { shingles, permutations } => write!(
                f,
                "n permutations ({permutations}) must be less than n shingles ({shingles}) for the bottom-k method"
            ),
        }
    }
}

impl std::error::Error for SignatureError {}

impl From<ShingleError> for SignatureError {
    fn from(err: ShingleError) -> Self {
        match err {
            ShingleError::InvalidNGramType(got) => SignatureError::InvalidNGramType(got),
            ShingleError::InvalidShingleSize { n_gram, units } => {
                SignatureError::InvalidShingleSize { n_gram, units }
            }
        }
    }
}

/// Shared, validated configuration for either signature strategy.
#[derive(Debug, Clone, Copy)]
struct ShingleConfig {
    n_gram: usize,
    n_gram_type: NGramType,
    hash_bits: HashWidth,
}

impl ShingleConfig {
    fn new(n_gram: usize, n_gram_type: &str, hash_bits: u32) -> Result<Self, SignatureError> {
        let n_gram_type = NGramType::from_str(n_gram_type)?;
        let hash_bits =
            HashWidth::from_bits(hash_bits).ok_or(SignatureError::InvalidHashBits(hash_bits))?;
        Ok(Self { n_gram, n_gram_type, hash_bits })
    }
}

/// Either signature-building strategy, sharing shingling and hashing but
/// differing in how the per-document signature is assembled.
#[derive(Debug, Clone)]
pub enum SignatureBuilder {
    /// Uses `permutations` independent hash seeds, one minimum per seed.
    /// Slower, more stable under corpus growth.
    MultiHash { config: ShingleConfig, permutations: usize, seed: u64, hash_seeds: Vec<u64> },
    /// Uses a single hash seed and keeps the `permutations` smallest
    /// hash values. Faster, less stable across differently-sized
    /// documents.
    BottomK { config: ShingleConfig, permutations: usize, seed: u64 },
}

impl SignatureBuilder {
    pub fn multi_hash(
        n_gram: usize,
        n_gram_type: &str,
        permutations: usize,
        hash_bits: u32,
        seed: Option<u64>,
    ) -> Result<Self, SignatureError> {
        let config = ShingleConfig::new(n_gram, n_gram_type, hash_bits)?;
        let master_seed = seed.unwrap_or_else(|| rand::random());
        let hash_seeds = prng::derive_seeds(master_seed, permutations);
        Ok(SignatureBuilder::MultiHash { config, permutations, seed: master_seed, hash_seeds })
    }

    pub fn multi_hash_default(seed: Option<u64>) -> Result<Self, SignatureError> {
        Self::multi_hash(
            defaults::N_GRAM,
            defaults::N_GRAM_TYPE,
            defaults::PERMUTATIONS,
            defaults::HASH_BITS,
            seed,
        )
    }

    pub fn bottom_k(
        n_gram: usize,
        n_gram_type: &str,
        permutations: usize,
        hash_bits: u32,
        seed: Option<u64>,
    ) -> Result<Self, SignatureError> {
        let config = ShingleConfig::new(n_gram, n_gram_type, hash_bits)?;
        let master_seed = seed.unwrap_or_else(|| rand::random());
        Ok(SignatureBuilder::BottomK { config, permutations, seed: master_seed })
    }

    pub fn bottom_k_default(seed: Option<u64>) -> Result<Self, SignatureError> {
        Self::bottom_k(
            defaults::N_GRAM,
            defaults::N_GRAM_TYPE,
            defaults::PERMUTATIONS,
            defaults::HASH_BITS,
            seed,
        )
    }

    fn config(&self) -> ShingleConfig {
        match self {
            SignatureBuilder::MultiHash { config, .. } => *config,
            SignatureBuilder::BottomK { config, .. } => *config,
        }
    }

    /// Builds the signature for a single document.
    pub fn transform_one(&self, text: &str) -> Result<Signature, SignatureError> {
        let config = self.config();
        let shingler = Shingler::new(config.n_gram, config.n_gram_type);
        match self {
            SignatureBuilder::MultiHash { hash_seeds, .. } => {
                let shingles: Vec<String> = shingler.shingles(text)?.collect();
                let mut mins = vec![i128::MAX; hash_seeds.len()];
                for shingle in &shingles {
                    let bytes = shingle.as_bytes();
                    for (i, &seed) in hash_seeds.iter().enumerate() {
                        let h = hash::hash(bytes, seed, config.hash_bits);
                        if h < mins[i] {
                            mins[i] = h;
                        }
                    }
                }
                Ok(Signature(mins))
            }
            SignatureBuilder::BottomK { permutations, seed, .. } => {
                let mut hashes: Vec<i128> = shingler
                    .shingles(text)?
                    .map(|s| hash::hash(s.as_bytes(), *seed, config.hash_bits))
                    .collect();
                if hashes.len() <= *permutations {
                    return Err(SignatureError::InsufficientShingles {
                        shingles: hashes.len(),
                        permutations: *permutations,
                    });
                }
                hashes.sort_unstable();
                hashes.truncate(*permutations);
                Ok(Signature(hashes))
            }
        }
    }

    /// Builds signatures for an entire corpus. Per-document work is pure
    /// and is fanned out across `rayon`'s thread pool, then re-collected
    /// in input order so the result is identical regardless of how work
    /// was scheduled.
    pub fn transform(&self, corpus: &[&str]) -> Result<Vec<Signature>, SignatureError> {
        corpus.par_iter().map(|text| self.transform_one(text)).collect()
    }
}
