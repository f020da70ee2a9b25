use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Maps logical play positions onto backing-list indices.
///
/// Always a permutation of `0..len()`. Growth appends identity slots and
/// re-randomizes only a caller-chosen suffix, so positions that were
/// already played keep resolving to the same file.
#[derive(Debug, Clone)]
pub struct ShuffleIndex {
    order: Vec<usize>,
    rng: StdRng,
}

impl ShuffleIndex {
    /// Identity over `0..size`, then shuffle everything from `pinned` on.
    pub fn new(size: usize, pinned: usize) -> Self {
        Self::with_rng(size, pinned, StdRng::from_entropy())
    }

    /// Same as [`ShuffleIndex::new`] with an explicit generator (seeded in tests).
    pub fn with_rng(size: usize, pinned: usize, rng: StdRng) -> Self {
        let mut index = Self {
            order: (0..size).collect(),
            rng,
        };
        index.reshuffle_from(pinned);
        index
    }

    /// O(1) lookup. Panics when `position >= len()`; the queue bounds-checks first.
    pub fn resolve(&self, position: usize) -> usize {
        self.order[position]
    }

    /// Append `added` identity slots, then reshuffle `[reshuffle_from, len)`.
    pub fn extend(&mut self, added: usize, reshuffle_from: usize) {
        if added == 0 {
            return;
        }
        let old_len = self.order.len();
        self.order.extend(old_len..old_len + added);
        self.reshuffle_from(reshuffle_from);
    }

    /// Fresh order for a new lap.
    pub fn reshuffle_all(&mut self) {
        self.reshuffle_from(0);
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.order
    }

    // Fisher-Yates restricted to the tail; never touches slots before `from`.
    fn reshuffle_from(&mut self, from: usize) {
        let from = from.min(self.order.len());
        self.order[from..].shuffle(&mut self.rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(size: usize, pinned: usize, seed: u64) -> ShuffleIndex {
        ShuffleIndex::with_rng(size, pinned, StdRng::seed_from_u64(seed))
    }

    fn is_permutation(values: &[usize]) -> bool {
        let mut sorted = values.to_vec();
        sorted.sort_unstable();
        sorted.iter().copied().eq(0..values.len())
    }

    #[test]
    fn test_new_is_always_a_permutation() {
        for size in 0..40 {
            for seed in 0..5 {
                let index = seeded(size, 0, seed);
                assert_eq!(index.len(), size);
                assert!(is_permutation(index.as_slice()), "size {size} seed {seed}");
            }
        }
    }

    #[test]
    fn test_pinned_prefix_maps_to_itself() {
        for seed in 0..20 {
            let index = seeded(12, 3, seed);
            for position in 0..3 {
                assert_eq!(index.resolve(position), position);
            }
            assert!(is_permutation(index.as_slice()));
        }
    }

    #[test]
    fn test_pinned_prefix_larger_than_size_is_identity() {
        let index = seeded(4, 10, 7);
        assert_eq!(index.as_slice(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_extend_keeps_history_and_mixes_new_slots_into_tail() {
        for seed in 0..20 {
            let mut index = seeded(5, 0, seed);
            let before: Vec<usize> = (0..3).map(|p| index.resolve(p)).collect();
            let old_tail: Vec<usize> = (3..5).map(|p| index.resolve(p)).collect();

            index.extend(2, 3);

            assert_eq!(index.len(), 7);
            assert!(is_permutation(index.as_slice()));
            let after: Vec<usize> = (0..3).map(|p| index.resolve(p)).collect();
            assert_eq!(before, after);

            let mut tail: Vec<usize> = (3..7).map(|p| index.resolve(p)).collect();
            tail.sort_unstable();
            let mut expected = old_tail.clone();
            expected.extend([5, 6]);
            expected.sort_unstable();
            assert_eq!(tail, expected);
        }
    }

    #[test]
    fn test_extend_past_end_only_appends() {
        let mut index = seeded(3, 3, 1);
        index.extend(2, 99);
        assert_eq!(index.as_slice(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_extend_by_zero_is_noop() {
        let mut index = seeded(6, 0, 4);
        let before = index.as_slice().to_vec();
        index.extend(0, 0);
        assert_eq!(index.as_slice(), before.as_slice());
    }

    #[test]
    fn test_reshuffle_all_keeps_value_set() {
        let mut index = seeded(30, 1, 9);
        index.reshuffle_all();
        assert!(is_permutation(index.as_slice()));

        // 30 elements: at least one of a few reshuffles must move something
        let first = index.as_slice().to_vec();
        let moved = (0..5).any(|_| {
            index.reshuffle_all();
            index.as_slice() != first.as_slice()
        });
        assert!(moved);
    }
}
