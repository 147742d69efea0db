//! Perceptual fingerprint comparison.
//!
//! Fingerprints are 64-bit perceptual hashes. Two fingerprints are compared
//! by Hamming distance, which is mapped onto a `0..=100` similarity score:
//! identical fingerprints score 100, fully inverted ones score 0.

/// Width of a perceptual fingerprint in bits.
pub const FINGERPRINT_BITS: u32 = 64;

/// Score at or above which a pair becomes a duplicate candidate.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 95.0;

/// Number of differing bits between two fingerprints.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Similarity score in `[0, 100]`.
pub fn similarity(a: u64, b: u64) -> f64 {
    let same = FINGERPRINT_BITS - hamming_distance(a, b);
    f64::from(same) * 100.0 / f64::from(FINGERPRINT_BITS)
}

/// Whether two fingerprints are close enough to be reviewed as duplicates.
pub fn is_candidate(a: u64, b: u64, threshold: f64) -> bool {
    similarity(a, b) >= threshold
}
