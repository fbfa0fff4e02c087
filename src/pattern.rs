//! Deterministic access-pattern generation.
//!
//! Random-access experiments need the same index stream on every run and on
//! every variant being compared, otherwise throughput differences measure
//! the pattern instead of the prefetch strategy. A fixed linear congruential
//! generator provides that stream; the full sequence is materialized up
//! front so generation cost never lands inside a timed region.

use crate::error::{BenchError, Result};

/// Multiplier of the index-stream LCG
pub const LCG_MULTIPLIER: u64 = 1103515245;
/// Increment of the index-stream LCG
pub const LCG_INCREMENT: u64 = 12345;

/// Linear congruential generator over the full 64-bit state, taking the
/// upper bits for index reduction since the low bits cycle quickly
#[derive(Debug, Clone, Copy)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Advance the state and return it
    #[inline(always)]
    pub fn next_raw(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        self.state
    }

    /// Advance and reduce to an index in `0..modulus`
    #[inline(always)]
    pub fn next_index(&mut self, modulus: usize) -> usize {
        ((self.next_raw() >> 16) % modulus as u64) as usize
    }
}

/// Pre-generated random index stream with lookahead padding.
///
/// The sequence holds `accesses + lookahead` entries so a driver walking
/// positions `0..accesses` may always read `at(i + d)` for any prefetch
/// distance `d <= lookahead` without a bounds branch in the hot loop.
/// Identical parameters produce an identical sequence, and growing only the
/// lookahead appends entries without disturbing the access prefix.
#[derive(Debug, Clone)]
pub struct IndexSequence {
    indices: Vec<usize>,
    accesses: usize,
}

impl IndexSequence {
    /// Generate the padded sequence. `modulus` must be nonzero.
    pub fn generate(seed: u64, accesses: usize, lookahead: usize, modulus: usize) -> Result<Self> {
        assert!(modulus > 0, "index modulus must be nonzero");

        let total = accesses
            .checked_add(lookahead)
            .ok_or_else(|| BenchError::allocation(usize::MAX, std::mem::align_of::<usize>()))?;

        let mut indices = Vec::new();
        indices.try_reserve_exact(total).map_err(|_| {
            BenchError::allocation(
                total * std::mem::size_of::<usize>(),
                std::mem::align_of::<usize>(),
            )
        })?;

        let mut lcg = Lcg::new(seed);
        for _ in 0..total {
            indices.push(lcg.next_index(modulus));
        }

        Ok(Self { indices, accesses })
    }

    /// Number of timed accesses (excludes the lookahead padding)
    #[inline(always)]
    pub fn accesses(&self) -> usize {
        self.accesses
    }

    /// Lookahead entries available past the access prefix
    pub fn lookahead(&self) -> usize {
        self.indices.len() - self.accesses
    }

    /// Index at position `i`, valid for `i < accesses + lookahead`
    #[inline(always)]
    pub fn at(&self, i: usize) -> usize {
        self.indices[i]
    }

    /// Full padded view
    pub fn as_slice(&self) -> &[usize] {
        &self.indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_known_prefix() {
        // Recurrence spelled out with literal constants so a change to the
        // module constants fails loudly
        let mut expected_state: u64 = 12345;
        let mut lcg = Lcg::new(12345);
        for _ in 0..3 {
            expected_state = expected_state.wrapping_mul(1103515245).wrapping_add(12345);
            let expected_index = ((expected_state >> 16) % 1024) as usize;
            assert_eq!(lcg.next_index(1024), expected_index);
        }
    }

    #[test]
    fn test_sequence_deterministic() {
        let a = IndexSequence::generate(12345, 10_000, 8, 8192).unwrap();
        let b = IndexSequence::generate(12345, 10_000, 8, 8192).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_sequence_in_range() {
        let seq = IndexSequence::generate(54321, 50_000, 256, 4096).unwrap();
        assert!(seq.as_slice().iter().all(|&idx| idx < 4096));
    }

    #[test]
    fn test_sequence_padding_length() {
        let seq = IndexSequence::generate(7, 1000, 64, 512).unwrap();
        assert_eq!(seq.accesses(), 1000);
        assert_eq!(seq.lookahead(), 64);
        assert_eq!(seq.as_slice().len(), 1064);
    }

    #[test]
    fn test_lookahead_growth_keeps_prefix() {
        let short = IndexSequence::generate(99, 5000, 0, 2048).unwrap();
        let long = IndexSequence::generate(99, 5000, 256, 2048).unwrap();
        assert_eq!(short.as_slice(), &long.as_slice()[..5000]);
    }

    #[test]
    fn test_different_seeds_diverge() {
        let a = IndexSequence::generate(12345, 1000, 0, 1 << 20).unwrap();
        let b = IndexSequence::generate(54321, 1000, 0, 1 << 20).unwrap();
        assert_ne!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_spread_covers_buckets() {
        // Coarse uniformity: every quarter of a small modulus gets hits
        let seq = IndexSequence::generate(1, 4000, 0, 64).unwrap();
        let mut hits = [0usize; 4];
        for &idx in seq.as_slice() {
            hits[idx / 16] += 1;
        }
        assert!(hits.iter().all(|&h| h > 0), "bucket hits: {:?}", hits);
    }
}
