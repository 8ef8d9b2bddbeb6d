//! Band-bucket storage (C4): `no_of_bands` independent maps from
//! bucket-id to the set of labels currently occupying that bucket.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BandStoreError {
    InvalidArity(usize),
    MissingLabel,
}

impl fmt::Display for BandStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BandStoreError::InvalidArity(n) => {
                write!(f, "number of bands must be 1 or greater, got {n}")
            }
            BandStoreError::MissingLabel => write!(f, "label is not present in the given bucket"),
        }
    }
}

impl std::error::Error for BandStoreError {}

/// A fixed-length sequence of `N` per-band `bucket-id -> labels` maps.
///
/// Each band owns a genuinely independent `HashMap`: built with
/// `(0..n).map(|_| HashMap::new()).collect()` rather than
/// `vec![HashMap::new(); n]`, which for any non-`Copy` container clones
/// one map `n` times rather than aliasing a single one — but the
/// original Python implementation's `[{}] * n_arrays` *did* alias a
/// single dict across every band (`examples/original_source/akin/_data_structures.py`),
/// so a mutation through band 0 silently showed up in every other band.
/// This store is written so that hazard cannot recur even if the
/// per-band container is swapped out later.
#[derive(Debug)]
pub struct BandBucketStore<L> {
    bands: Vec<HashMap<u64, Vec<L>>>,
}

impl<L: Eq + Hash + Clone> BandBucketStore<L> {
    pub fn new(no_of_bands: usize) -> Result<Self, BandStoreError> {
        if no_of_bands < 1 {
            return Err(BandStoreError::InvalidArity(no_of_bands));
        }
        Ok(Self { bands: (0..no_of_bands).map(|_| HashMap::new()).collect() })
    }

    pub fn no_of_bands(&self) -> usize {
        self.bands.len()
    }

    /// Appends `label` to the set at `bands[band_id][bucket_id]`,
    /// creating the set if absent. A label already present in that
    /// bucket is not duplicated.
    pub fn add(&mut self, band_id: usize, bucket_id: u64, label: L) {
        let bucket = self.bands[band_id].entry(bucket_id).or_default();
        if !bucket.contains(&label) {
            bucket.push(label);
        }
    }

    /// Removes `label` from `bands[band_id][bucket_id]`. Deletes the
    /// bucket key entirely once its label set becomes empty. Fails with
    /// `MissingLabel` if the label was not present.
    pub fn remove(&mut self, band_id: usize, bucket_id: u64, label: &L) -> Result<(), BandStoreError> {
        let band = &mut self.bands[band_id];
        let Some(bucket) = band.get_mut(&bucket_id) else {
            return Err(BandStoreError::MissingLabel);
        };
        let Some(pos) = bucket.iter().position(|l| l == label) else {
            return Err(BandStoreError::MissingLabel);
        };
        bucket.remove(pos);
        if bucket.is_empty() {
            band.remove(&bucket_id);
        }
        Ok(())
    }

    /// Returns the (possibly empty) set of labels at `bands[band_id][bucket_id]`.
    pub fn get(&self, band_id: usize, bucket_id: u64) -> &[L] {
        self.bands[band_id].get(&bucket_id).map_or(&[], Vec::as_slice)
    }

    /// Union of every label present in every bucket across every band.
    pub fn all_labels(&self) -> Vec<L> {
        let mut seen: Vec<L> = Vec::new();
        for band in &self.bands {
            for bucket in band.values() {
                for label in bucket {
                    if !seen.contains(label) {
                        seen.push(label.clone());
                    }
                }
            }
        }
        seen
    }
}
