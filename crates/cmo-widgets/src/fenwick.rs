#![forbid(unsafe_code)]

//! Fenwick (binary indexed) tree over `u32` values with `u64` prefix sums.
//!
//! Backs variable item heights: `prefix(i)` is the bottom edge of item `i`,
//! and `find_prefix(offset)` maps a scroll offset back to an item index.
//!
//! # Operations
//!
//! | Operation | Time |
//! |-----------|------|
//! | `get` | O(1) |
//! | `set` / `add` | O(log n) |
//! | `prefix` / `total` | O(log n) |
//! | `find_prefix` | O(log n) |
//! | `push` | O(log n) |
//! | `truncate` | O(1) amortized |
//! | `insert` / `remove` | O(log n) at the tail, O(n) elsewhere |
//!
//! # Invariants
//!
//! 1. `tree[k]` (1-based) holds the sum of `values[k - lowbit(k) .. k]`.
//! 2. `values.len() + 1 == tree.len()`.

/// Prefix-sum tree.
#[derive(Debug, Clone, Default)]
pub struct FenwickTree {
    tree: Vec<u64>,
    values: Vec<u32>,
}

#[inline]
fn lowbit(k: usize) -> usize {
    k & k.wrapping_neg()
}

impl FenwickTree {
    /// Create a tree of `len` zeros.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            tree: vec![0; len + 1],
            values: vec![0; len],
        }
    }

    /// Build from values in O(n).
    #[must_use]
    pub fn from_values(values: &[u32]) -> Self {
        let mut tree = vec![0u64; values.len() + 1];
        for (i, &v) in values.iter().enumerate() {
            let k = i + 1;
            tree[k] += u64::from(v);
            let parent = k + lowbit(k);
            if parent < tree.len() {
                tree[parent] += tree[k];
            }
        }
        Self {
            tree,
            values: values.to_vec(),
        }
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the tree holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `idx` (0 when out of range).
    #[must_use]
    pub fn get(&self, idx: usize) -> u32 {
        self.values.get(idx).copied().unwrap_or(0)
    }

    /// Overwrite the value at `idx`. Out-of-range indices are ignored.
    pub fn set(&mut self, idx: usize, value: u32) {
        let Some(old) = self.values.get(idx).copied() else {
            return;
        };
        if old == value {
            return;
        }
        self.values[idx] = value;
        let mut k = idx + 1;
        if value > old {
            let delta = u64::from(value - old);
            while k < self.tree.len() {
                self.tree[k] += delta;
                k += lowbit(k);
            }
        } else {
            let delta = u64::from(old - value);
            while k < self.tree.len() {
                self.tree[k] -= delta;
                k += lowbit(k);
            }
        }
    }

    /// Sum of values `0..=idx`. Clamped to the last value.
    #[must_use]
    pub fn prefix(&self, idx: usize) -> u64 {
        if self.values.is_empty() {
            return 0;
        }
        let mut k = idx.min(self.values.len() - 1) + 1;
        let mut sum = 0;
        while k > 0 {
            sum += self.tree[k];
            k -= lowbit(k);
        }
        sum
    }

    /// Sum of all values.
    #[must_use]
    pub fn total(&self) -> u64 {
        match self.values.len() {
            0 => 0,
            n => self.prefix(n - 1),
        }
    }

    /// Largest index `i` with `prefix(i) <= target`, or `None` when
    /// `values[0] > target` (or the tree is empty).
    #[must_use]
    pub fn find_prefix(&self, target: u64) -> Option<usize> {
        let n = self.values.len();
        if n == 0 {
            return None;
        }
        let mut pos = 0usize;
        let mut remaining = target;
        let mut step = 1usize << (usize::BITS - 1 - n.leading_zeros());
        while step > 0 {
            let next = pos + step;
            if next <= n && self.tree[next] <= remaining {
                pos = next;
                remaining -= self.tree[next];
            }
            step >>= 1;
        }
        pos.checked_sub(1)
    }

    /// Append a value.
    pub fn push(&mut self, value: u32) {
        let k = self.values.len() + 1;
        let below = k - lowbit(k);
        let before = if k > 1 { self.prefix(k - 2) } else { 0 };
        let excluded = if below > 0 { self.prefix(below - 1) } else { 0 };
        self.values.push(value);
        self.tree.push(u64::from(value) + before - excluded);
    }

    /// Drop values past `len`.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.values.len() {
            return;
        }
        self.values.truncate(len);
        self.tree.truncate(len + 1);
    }

    /// Insert `value` before `idx`, shifting later values up.
    ///
    /// `idx` is clamped to `len()`.
    pub fn insert(&mut self, idx: usize, value: u32) {
        if idx >= self.values.len() {
            self.push(value);
            return;
        }
        let mut values = std::mem::take(&mut self.values);
        values.insert(idx, value);
        *self = Self::from_values(&values);
    }

    /// Remove and return the value at `idx`, shifting later values down.
    pub fn remove(&mut self, idx: usize) -> Option<u32> {
        let last = self.values.len().checked_sub(1)?;
        if idx > last {
            return None;
        }
        if idx == last {
            let value = self.values[last];
            self.truncate(last);
            return Some(value);
        }
        let mut values = std::mem::take(&mut self.values);
        let value = values.remove(idx);
        *self = Self::from_values(&values);
        Some(value)
    }

    /// Grow with `fill` or shrink to `len`.
    pub fn resize(&mut self, len: usize, fill: u32) {
        if len < self.values.len() {
            self.truncate(len);
        } else {
            self.values.reserve(len - self.values.len());
            while self.values.len() < len {
                self.push(fill);
            }
        }
    }

    /// Values as a slice.
    #[must_use]
    pub fn values(&self) -> &[u32] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn naive_prefix(values: &[u32], idx: usize) -> u64 {
        values[..=idx].iter().map(|&v| u64::from(v)).sum()
    }

    #[test]
    fn empty_tree() {
        let t = FenwickTree::new(0);
        assert!(t.is_empty());
        assert_eq!(t.total(), 0);
        assert_eq!(t.prefix(3), 0);
        assert_eq!(t.find_prefix(10), None);
    }

    #[test]
    fn prefix_and_total() {
        let t = FenwickTree::from_values(&[3, 1, 4, 1, 5]);
        assert_eq!(t.prefix(0), 3);
        assert_eq!(t.prefix(2), 8);
        assert_eq!(t.total(), 14);
        assert_eq!(t.prefix(99), 14);
    }

    #[test]
    fn set_updates_later_prefixes_only() {
        let mut t = FenwickTree::from_values(&[10, 10, 10, 10]);
        t.set(1, 25);
        assert_eq!(t.prefix(0), 10);
        assert_eq!(t.prefix(1), 35);
        assert_eq!(t.prefix(3), 55);
        t.set(1, 5);
        assert_eq!(t.prefix(3), 35);
        t.set(9, 100);
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn find_prefix_boundaries() {
        let t = FenwickTree::from_values(&[10, 10, 10]);
        assert_eq!(t.find_prefix(0), None);
        assert_eq!(t.find_prefix(9), None);
        assert_eq!(t.find_prefix(10), Some(0));
        assert_eq!(t.find_prefix(19), Some(0));
        assert_eq!(t.find_prefix(20), Some(1));
        assert_eq!(t.find_prefix(1_000), Some(2));
    }

    #[test]
    fn push_and_truncate() {
        let mut t = FenwickTree::new(0);
        for v in 1..=9 {
            t.push(v);
        }
        assert_eq!(t.total(), 45);
        t.truncate(4);
        assert_eq!(t.total(), 10);
        t.resize(6, 100);
        assert_eq!(t.total(), 210);
    }

    #[test]
    fn insert_and_remove_shift_positions() {
        let mut t = FenwickTree::from_values(&[10, 20, 30]);
        t.insert(1, 5);
        assert_eq!(t.values(), &[10, 5, 20, 30]);
        assert_eq!(t.prefix(2), 35);
        t.insert(99, 7);
        assert_eq!(t.total(), 72);
        assert_eq!(t.remove(0), Some(10));
        assert_eq!(t.remove(3), Some(7));
        assert_eq!(t.remove(3), None);
        assert_eq!(t.values(), &[5, 20, 30]);
        assert_eq!(t.prefix(1), 25);
    }

    proptest! {
        #[test]
        fn splices_match_vec(
            initial in proptest::collection::vec(0u32..500, 0..60),
            ops in proptest::collection::vec((any::<bool>(), 0usize..80, 0u32..500), 0..40),
        ) {
            let mut t = FenwickTree::from_values(&initial);
            let mut model = initial;
            for (insert, idx, value) in ops {
                if insert {
                    t.insert(idx, value);
                    model.insert(idx.min(model.len()), value);
                } else {
                    let expected = (idx < model.len()).then(|| model.remove(idx));
                    prop_assert_eq!(t.remove(idx), expected);
                }
            }
            prop_assert_eq!(t.values(), model.as_slice());
            for i in 0..model.len() {
                prop_assert_eq!(t.prefix(i), naive_prefix(&model, i));
            }
        }

        #[test]
        fn prefix_matches_naive(values in proptest::collection::vec(0u32..500, 1..200)) {
            let t = FenwickTree::from_values(&values);
            for i in 0..values.len() {
                prop_assert_eq!(t.prefix(i), naive_prefix(&values, i));
            }
        }

        #[test]
        fn push_matches_bulk_build(values in proptest::collection::vec(0u32..500, 0..200)) {
            let mut pushed = FenwickTree::new(0);
            for &v in &values {
                pushed.push(v);
            }
            let built = FenwickTree::from_values(&values);
            for i in 0..values.len() {
                prop_assert_eq!(pushed.prefix(i), built.prefix(i));
            }
        }

        #[test]
        fn find_prefix_is_largest_fitting(
            values in proptest::collection::vec(1u32..100, 1..100),
            target in 0u64..10_000,
        ) {
            let t = FenwickTree::from_values(&values);
            match t.find_prefix(target) {
                Some(i) => {
                    prop_assert!(t.prefix(i) <= target);
                    if i + 1 < values.len() {
                        prop_assert!(t.prefix(i + 1) > target);
                    }
                }
                None => prop_assert!(u64::from(values[0]) > target),
            }
        }
    }
}
