//! Banded LSH index (C5): groups signatures into candidate buckets and
//! filters candidates down to near-duplicates.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::band_store::BandBucketStore;
use crate::defaults;
use crate::hash;
use crate::signature::Signature;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    InvalidBanding { permutations: usize, no_of_bands: usize },
    PermutationMismatch { expected: usize, got: usize },
    DuplicateLabel,
    MissingLabel,
    InvalidSensitivity { sensitivity: usize, no_of_bands: usize },
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::InvalidBanding { permutations, no_of_bands } => write!(
                f,
                "no_of_bands ({no_of_bands}) must be between 1 and permutations ({permutations})"
            ),
            IndexError::PermutationMismatch { expected, got } => write!(
                f,
                "signature has {got} permutations, expected {expected} to match this index"
            ),
            IndexError::DuplicateLabel => write!(f, "label already exists in this index"),
            IndexError::MissingLabel => write!(f, "label does not exist in this index"),
            IndexError::InvalidSensitivity { sensitivity, no_of_bands } => write!(
                f,
                "sensitivity ({sensitivity}) must be <= no_of_bands ({no_of_bands})"
            ),
        }
    }
}

impl std::error::Error for IndexError {}

/// Renders a band's signature slice the way the original implementation's
/// `str(tuple(...))` did, so the textual input to the bucket hash is
/// bit-for-bit reproducible: `"(a, b, c)"`, or `"(a,)"` for a single
/// element, matching Python's trailing-comma singleton-tuple syntax.
fn render_band(values: &[i128]) -> String {
    let mut s = String::from("(");
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            s.push_str(", ");
        }
        s.push_str(&v.to_string());
    }
    if values.len() == 1 {
        s.push(',');
    }
    s.push(')');
    s
}

/// A banded LSH index over signatures of a fixed, generic label type.
///
/// Each `Label` currently stored maps to the signature it was inserted
/// with, so queries can re-derive its bucket ids and compute Jaccard
/// estimates against candidates found in those buckets.
pub struct LSHIndex<L: Eq + Hash + Clone> {
    permutations: usize,
    no_of_bands: usize,
    band_size: usize,
    seed: u64,
    buckets: BandBucketStore<L>,
    signatures: HashMap<L, Signature>,
}

impl<L: Eq + Hash + Clone + fmt::Debug> LSHIndex<L> {
    /// Builds an index for signatures of length `permutations`. Defaults
    /// `no_of_bands` to `permutations / 2` when not given, matching the
    /// original model's default banding granularity.
    pub fn new(
        permutations: usize,
        no_of_bands: Option<usize>,
        seed: u64,
    ) -> Result<Self, IndexError> {
        let no_of_bands = no_of_bands.unwrap_or(permutations / 2);
        if no_of_bands < 1 || no_of_bands > permutations {
            return Err(IndexError::InvalidBanding { permutations, no_of_bands });
        }
        let band_size = (permutations + no_of_bands - 1) / no_of_bands;
        let buckets = BandBucketStore::new(no_of_bands)
            .map_err(|_| IndexError::InvalidBanding { permutations, no_of_bands })?;
        Ok(Self {
            permutations,
            no_of_bands,
            band_size,
            seed,
            buckets,
            signatures: HashMap::new(),
        })
    }

    pub fn with_defaults(permutations: usize) -> Result<Self, IndexError> {
        Self::new(permutations, None, defaults::LSH_SEED)
    }

    pub fn permutations(&self) -> usize {
        self.permutations
    }

    pub fn no_of_bands(&self) -> usize {
        self.no_of_bands
    }

    /// Splits `signature` into `no_of_bands` contiguous slices (the
    /// final one possibly shorter, hashed as-is rather than padded) and
    /// hashes each band's canonical rendering to a 64-bit bucket id.
    fn band_bucket_ids(&self, signature: &Signature) -> Vec<u64> {
        let values = signature.values();
        let mut ids = Vec::with_capacity(self.no_of_bands);
        let mut i = 0;
        while i < self.permutations {
            let end = (i + self.band_size).min(values.len());
            let band = render_band(&values[i..end]);
            let bucket_id = hash::hash64(band.as_bytes(), self.seed) as u64;
            ids.push(bucket_id);
            i += self.band_size;
        }
        ids
    }

    /// Estimated Jaccard similarity between two signatures, treating
    /// their permutation values as sets.
    fn jaccard_similarity(a: &Signature, b: &Signature) -> f64 {
        use std::collections::HashSet;
        let set_a: HashSet<&i128> = a.values().iter().collect();
        let set_b: HashSet<&i128> = b.values().iter().collect();
        let intersection = set_a.intersection(&set_b).count();
        let union = set_a.union(&set_b).count();
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    }

    /// Filters a label's co-occurrence counts down to near-duplicates,
    /// optionally pairing each survivor with its estimated similarity.
    fn candidate_duplicates(
        &self,
        query_signature: &Signature,
        candidates: &HashMap<L, usize>,
        sensitivity: usize,
        jaccard_threshold: Option<f64>,
        include_similarity: bool,
    ) -> Vec<(L, Option<f64>)> {
        if jaccard_threshold.is_some() || sensitivity != 1 || include_similarity {
            let mut matches = Vec::new();
            for (candidate, &occurrence_count) in candidates {
                if sensitivity != 1 && occurrence_count < sensitivity {
                    continue;
                }
                if jaccard_threshold.is_some() || include_similarity {
                    let candidate_signature = &self.signatures[candidate];
                    let ratio = Self::jaccard_similarity(query_signature, candidate_signature);
                    if let Some(threshold) = jaccard_threshold {
                        if ratio < threshold {
                            continue;
                        }
                    }
                    if include_similarity {
                        matches.push((candidate.clone(), Some(ratio)));
                    } else {
                        matches.push((candidate.clone(), None));
                    }
                } else {
                    matches.push((candidate.clone(), None));
                }
            }
            matches
        } else {
            candidates.keys().cloned().map(|c| (c, None)).collect()
        }
    }

    /// Inserts `signatures` under `labels`, all-or-nothing: every
    /// `(label, signature)` pair is validated before any is stored, so a
    /// rejected batch leaves the index entirely unchanged.
    pub fn update(&mut self, signatures: &[Signature], labels: &[L]) -> Result<(), IndexError> {
        for signature in signatures {
            if signature.len() != self.permutations {
                return Err(IndexError::PermutationMismatch {
                    expected: self.permutations,
                    got: signature.len(),
                });
            }
        }
        let mut batch_labels = std::collections::HashSet::with_capacity(labels.len());
        for label in labels {
            if self.signatures.contains_key(label) || !batch_labels.insert(label) {
                return Err(IndexError::DuplicateLabel);
            }
        }

        log::debug!("inserting {} labels into LSH index", labels.len());
        for (signature, label) in signatures.iter().zip(labels) {
            let bucket_ids = self.band_bucket_ids(signature);
            self.signatures.insert(label.clone(), signature.clone());
            for (band_id, bucket_id) in bucket_ids.into_iter().enumerate() {
                self.buckets.add(band_id, bucket_id, label.clone());
            }
        }
        Ok(())
    }

    /// Removes `labels` and their signatures from the index.
    pub fn remove(&mut self, labels: &[L]) -> Result<(), IndexError> {
        let mut batch_labels = std::collections::HashSet::with_capacity(labels.len());
        for label in labels {
            if !self.signatures.contains_key(label) || !batch_labels.insert(label) {
                return Err(IndexError::MissingLabel);
            }
        }

        for label in labels {
            let signature = self.signatures.remove(label).expect("checked above");
            let bucket_ids = self.band_bucket_ids(&signature);
            for (band_id, bucket_id) in bucket_ids.into_iter().enumerate() {
                self.buckets
                    .remove(band_id, bucket_id, label)
                    .expect("label was present in every band it hashed into");
            }
            log::trace!("removed label {label:?} from LSH index");
        }
        Ok(())
    }

    /// Returns near-duplicates of `label`, self excluded.
    pub fn query(
        &self,
        label: &L,
        min_jaccard: Option<f64>,
        sensitivity: usize,
        include_similarity: bool,
    ) -> Result<Vec<(L, Option<f64>)>, IndexError> {
        if sensitivity > self.no_of_bands {
            return Err(IndexError::InvalidSensitivity { sensitivity, no_of_bands: self.no_of_bands });
        }
        let signature = self
            .signatures
            .get(label)
            .ok_or(IndexError::MissingLabel)?;

        // A candidate's count latches at 1 on its first shared bucket;
        // further co-occurrences in later bands do not raise it. Mirrors
        // the reference implementation's counting behaviour exactly.
        let mut co_occurrence: HashMap<L, usize> = HashMap::new();
        for (band_id, bucket_id) in self.band_bucket_ids(signature).into_iter().enumerate() {
            for candidate in self.buckets.get(band_id, bucket_id) {
                co_occurrence.entry(candidate.clone()).or_insert(1);
            }
        }
        co_occurrence.remove(label);

        log::debug!(
            "query label {label:?}: {} raw candidates before filtering",
            co_occurrence.len()
        );
        let matches =
            self.candidate_duplicates(signature, &co_occurrence, sensitivity, min_jaccard, include_similarity);
        Ok(matches)
    }

    /// Builds a `label -> near-duplicates` map over every label in
    /// `labels` (or every label in the index, when `None`).
    pub fn adjacency_list(
        &self,
        labels: Option<&[L]>,
        min_jaccard: Option<f64>,
        sensitivity: usize,
    ) -> Result<HashMap<L, Vec<(L, Option<f64>)>>, IndexError> {
        if sensitivity > self.no_of_bands {
            return Err(IndexError::InvalidSensitivity { sensitivity, no_of_bands: self.no_of_bands });
        }
        let owned_labels: Vec<L>;
        let labels: &[L] = match labels {
            Some(labels) => labels,
            None => {
                owned_labels = self.signatures.keys().cloned().collect();
                &owned_labels
            }
        };

        let mut result = HashMap::with_capacity(labels.len());
        for label in labels {
            let near_duplicates = self.query(label, min_jaccard, sensitivity, false)?;
            result.insert(label.clone(), near_duplicates);
        }
        Ok(result)
    }

    /// All distinct signatures currently stored in the index. Two labels
    /// sharing an identical signature contribute one entry, not two.
    pub fn all_signatures(&self) -> impl Iterator<Item = &Signature> {
        let unique: std::collections::HashSet<&Signature> = self.signatures.values().collect();
        unique.into_iter()
    }

    pub fn contains(&self, label: &L) -> bool {
        self.signatures.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(values: &[i128]) -> Signature {
        Signature::new(values.to_vec())
    }

    #[test]
    fn render_band_matches_python_tuple_repr() {
        assert_eq!(render_band(&[45, 48]), "(45, 48)");
        assert_eq!(render_band(&[12]), "(12,)");
        assert_eq!(render_band(&[45, 48, 21, 13, 29, 87, 43, 32, 12][8..9]), "(12,)");
    }

    #[test]
    fn new_rejects_bands_outside_permutation_range() {
        assert!(LSHIndex::<u32>::new(10, Some(0), 1).is_err());
        assert!(LSHIndex::<u32>::new(10, Some(11), 1).is_err());
        assert!(LSHIndex::<u32>::new(10, Some(5), 1).is_ok());
    }

    #[test]
    fn default_banding_halves_permutations() {
        let index = LSHIndex::<u32>::with_defaults(20).unwrap();
        assert_eq!(index.no_of_bands(), 10);
    }

    #[test]
    fn nine_value_signature_bands_into_five_with_a_short_final_band() {
        // Mirrors the literal scenario from the original test suite: a
        // 9-element signature split into 5 bands has band sizes
        // [2, 2, 2, 2, 1] and the final band is hashed unpadded.
        let index = LSHIndex::<u32>::new(9, Some(5), 1).unwrap();
        let signature = sig(&[45, 48, 21, 13, 29, 87, 43, 32, 12]);
        let bucket_ids = index.band_bucket_ids(&signature);
        assert_eq!(bucket_ids.len(), 5);

        let expected_renders = ["(45, 48)", "(21, 13)", "(29, 87)", "(43, 32)", "(12,)"];
        for (i, expected) in expected_renders.iter().enumerate() {
            let expected_id = hash::hash64(expected.as_bytes(), 1) as u64;
            assert_eq!(bucket_ids[i], expected_id);
        }
    }

    #[test]
    fn update_is_all_or_nothing_on_duplicate_label() {
        let mut index = LSHIndex::<&str>::new(10, Some(5), 1).unwrap();
        let sigs = vec![sig(&[1; 10]), sig(&[2; 10])];
        index.update(&sigs[..1], &["a"]).unwrap();
        let err = index.update(&sigs, &["b", "a"]).unwrap_err();
        assert_eq!(err, IndexError::DuplicateLabel);
        assert!(!index.contains(&"b"));
    }

    #[test]
    fn update_rejects_a_label_repeated_within_one_batch() {
        let mut index = LSHIndex::<&str>::new(10, Some(5), 1).unwrap();
        let sigs = vec![sig(&[1; 10]), sig(&[2; 10])];
        let err = index.update(&sigs, &["x", "x"]).unwrap_err();
        assert_eq!(err, IndexError::DuplicateLabel);
        assert!(index.is_empty());
    }

    #[test]
    fn update_rejects_mismatched_permutation_length() {
        let mut index = LSHIndex::<&str>::new(10, Some(5), 1).unwrap();
        let err = index.update(&[sig(&[1; 9])], &["a"]).unwrap_err();
        assert!(matches!(err, IndexError::PermutationMismatch { expected: 10, got: 9 }));
    }

    #[test]
    fn query_excludes_the_label_itself() {
        let mut index = LSHIndex::<&str>::new(10, Some(5), 1).unwrap();
        let identical = sig(&[7; 10]);
        index.update(&[identical.clone(), identical], &["a", "b"]).unwrap();
        let results = index.query(&"a", None, 1, false).unwrap();
        assert!(results.iter().all(|(label, _)| *label != "a"));
        assert!(results.iter().any(|(label, _)| *label == "b"));
    }

    #[test]
    fn query_rejects_sensitivity_above_no_of_bands() {
        let mut index = LSHIndex::<&str>::new(10, Some(5), 1).unwrap();
        index.update(&[sig(&[1; 10])], &["a"]).unwrap();
        let err = index.query(&"a", None, 6, false).unwrap_err();
        assert!(matches!(err, IndexError::InvalidSensitivity { sensitivity: 6, no_of_bands: 5 }));
    }

    #[test]
    fn candidate_duplicates_respects_sensitivity_threshold() {
        let index = LSHIndex::<&str>::new(10, Some(5), 1).unwrap();
        let query_signature = sig(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let mut candidates = HashMap::new();
        candidates.insert("low", 1usize);
        candidates.insert("high", 3usize);
        let matches = index.candidate_duplicates(&query_signature, &candidates, 2, None, false);
        let labels: Vec<&str> = matches.iter().map(|(l, _)| *l).collect();
        assert!(labels.contains(&"high"));
        assert!(!labels.contains(&"low"));
    }

    #[test]
    fn candidate_duplicates_applies_jaccard_threshold() {
        let mut index = LSHIndex::<&str>::new(4, Some(2), 1).unwrap();
        let query_signature = sig(&[1, 2, 3, 4]);
        let similar_signature = sig(&[1, 2, 3, 99]);
        let dissimilar_signature = sig(&[10, 20, 30, 40]);
        index
            .update(
                &[similar_signature.clone(), dissimilar_signature.clone()],
                &["similar", "dissimilar"],
            )
            .unwrap();
        let mut candidates = HashMap::new();
        candidates.insert("similar", 1usize);
        candidates.insert("dissimilar", 1usize);
        let matches =
            index.candidate_duplicates(&query_signature, &candidates, 1, Some(0.5), false);
        let labels: Vec<&str> = matches.iter().map(|(l, _)| *l).collect();
        assert!(labels.contains(&"similar"));
        assert!(!labels.contains(&"dissimilar"));
    }

    #[test]
    fn candidate_duplicates_matches_literal_reference_table() {
        // The exact query signature, candidate co-occurrence counts, and
        // expected survivors at each threshold are taken verbatim from the
        // original implementation's own test suite, using each candidate
        // signature as its own label.
        let mut index = LSHIndex::<Signature>::new(5, Some(2), 1).unwrap();
        let query_signature = sig(&[13435, 54564, 54623, 41224, 21813]);
        let candidate_defs: [(&[i128], usize); 5] = [
            (&[13435, 54564, 54623, 41224, 21813], 1),
            (&[13435, 54564, 54621, 41224, 21813], 2),
            (&[65435, 45435, 54545, 45876, 22312], 1),
            (&[65435, 65435, 65435, 65435, 15435], 3),
            (&[13435, 54564, 65435, 65435, 65435], 1),
        ];
        let mut candidates: HashMap<Signature, usize> = HashMap::new();
        for (values, count) in candidate_defs {
            let signature = sig(values);
            index.update(&[signature.clone()], &[signature.clone()]).unwrap();
            candidates.insert(signature, count);
        }

        let matches_at = |sensitivity: usize, jaccard: Option<f64>| -> std::collections::HashSet<Vec<i128>> {
            index
                .candidate_duplicates(&query_signature, &candidates, sensitivity, jaccard, false)
                .into_iter()
                .map(|(label, _)| label.values().to_vec())
                .collect()
        };

        assert_eq!(matches_at(1, None).len(), 5);

        let sensitivity_2 = matches_at(2, None);
        assert_eq!(sensitivity_2.len(), 2);
        assert!(sensitivity_2.contains(&vec![13435, 54564, 54621, 41224, 21813]));
        assert!(sensitivity_2.contains(&vec![65435, 65435, 65435, 65435, 15435]));

        let sensitivity_3 = matches_at(3, None);
        assert_eq!(sensitivity_3, std::collections::HashSet::from([vec![65435, 65435, 65435, 65435, 15435]]));

        let jaccard_033 = matches_at(1, Some(0.33));
        assert_eq!(jaccard_033.len(), 3);
        assert!(jaccard_033.contains(&vec![13435, 54564, 65435, 65435, 65435]));

        let jaccard_066 = matches_at(1, Some(0.66));
        assert_eq!(jaccard_066.len(), 2);
        assert!(!jaccard_066.contains(&vec![13435, 54564, 65435, 65435, 65435]));

        let jaccard_1 = matches_at(1, Some(1.0));
        assert_eq!(
            jaccard_1,
            std::collections::HashSet::from([vec![13435, 54564, 54623, 41224, 21813]])
        );
    }

    #[test]
    fn include_similarity_attaches_jaccard_ratio() {
        let index = LSHIndex::<&str>::new(4, Some(2), 1).unwrap();
        let query_signature = sig(&[1, 2, 3, 4]);
        let mut candidates = HashMap::new();
        candidates.insert("x", 1usize);
        let matches =
            index.candidate_duplicates(&query_signature, &candidates, 1, None, true);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].1.is_some());
    }

    #[test]
    fn remove_then_query_raises_missing_label() {
        let mut index = LSHIndex::<&str>::new(10, Some(5), 1).unwrap();
        index.update(&[sig(&[1; 10])], &["a"]).unwrap();
        index.remove(&["a"]).unwrap();
        assert!(!index.contains(&"a"));
        let err = index.query(&"a", None, 1, false).unwrap_err();
        assert_eq!(err, IndexError::MissingLabel);
    }

    #[test]
    fn remove_missing_label_is_all_or_nothing() {
        let mut index = LSHIndex::<&str>::new(10, Some(5), 1).unwrap();
        index.update(&[sig(&[1; 10])], &["a"]).unwrap();
        let err = index.remove(&["a", "missing"]).unwrap_err();
        assert_eq!(err, IndexError::MissingLabel);
        assert!(index.contains(&"a"));
    }

    #[test]
    fn remove_rejects_a_label_repeated_within_one_batch() {
        let mut index = LSHIndex::<&str>::new(10, Some(5), 1).unwrap();
        index.update(&[sig(&[1; 10])], &["a"]).unwrap();
        let err = index.remove(&["a", "a"]).unwrap_err();
        assert_eq!(err, IndexError::MissingLabel);
        assert!(index.contains(&"a"));
    }

    #[test]
    fn query_co_occurrence_count_latches_at_one_band() {
        // band_size = 1 over 10 bands: a candidate sharing every
        // permutation value with the query co-occurs in all 10 bands, but
        // the co-occurrence count still only satisfies sensitivity <= 1,
        // mirroring the reference implementation's counting behaviour.
        let mut index = LSHIndex::<&str>::new(10, Some(10), 1).unwrap();
        let identical = sig(&[9; 10]);
        index.update(&[identical.clone(), identical], &["a", "b"]).unwrap();
        assert!(!index.query(&"a", None, 1, false).unwrap().is_empty());
        assert!(index.query(&"a", None, 2, false).unwrap().is_empty());
    }

    #[test]
    fn adjacency_list_excludes_self_for_every_label() {
        let mut index = LSHIndex::<&str>::new(10, Some(5), 1).unwrap();
        let identical = sig(&[3; 10]);
        index
            .update(&[identical.clone(), identical.clone(), identical], &["a", "b", "c"])
            .unwrap();
        let adjacency = index.adjacency_list(None, None, 1).unwrap();
        for (label, neighbours) in &adjacency {
            assert!(neighbours.iter().all(|(other, _)| other != label));
        }
        assert_eq!(adjacency.len(), 3);
    }

    #[test]
    fn all_signatures_reflects_current_contents() {
        let mut index = LSHIndex::<&str>::new(10, Some(5), 1).unwrap();
        index.update(&[sig(&[1; 10]), sig(&[2; 10])], &["a", "b"]).unwrap();
        assert_eq!(index.all_signatures().count(), 2);
    }

    #[test]
    fn all_signatures_deduplicates_labels_sharing_one_signature() {
        let mut index = LSHIndex::<&str>::new(10, Some(5), 1).unwrap();
        let shared = sig(&[4; 10]);
        index.update(&[shared.clone(), shared], &["a", "b"]).unwrap();
        assert_eq!(index.all_signatures().count(), 1);
    }
}
