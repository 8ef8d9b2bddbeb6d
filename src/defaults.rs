//! Default configuration constants (`spec.md` §6), centralised the way
//! the teacher crate's own `defaults.rs` centralises its thresholds
//! rather than inlining magic numbers at each call site.

/// Default shingle window size for `SignatureBuilder`.
pub const N_GRAM: usize = 9;
/// Default shingle unit: `"char"` or `"term"`.
pub const N_GRAM_TYPE: &str = "char";
/// Default signature length.
pub const PERMUTATIONS: usize = 100;
/// Default hash primitive output width.
pub const HASH_BITS: u32 = 64;

/// Default `LSHIndex` seed when none is supplied.
pub const LSH_SEED: u64 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        assert!(N_GRAM > 0);
        assert!(PERMUTATIONS > 0);
        assert!(matches!(N_GRAM_TYPE, "char" | "term"));
        assert!(matches!(HASH_BITS, 32 | 64 | 128));
    }
}
