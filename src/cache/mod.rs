//! Kernel row cache
//!
//! Memoizes rows of the Gram matrix K(x_i, ·) so coordinate descent and SGD
//! do not recompute kernel values across passes. Rows live in a fixed arena
//! of `n_samples`-long buffers; an LRU map from sample index to arena slot
//! keeps the recency order, so a hit, an insertion and an eviction are all
//! O(1). Each slot remembers how many leading columns are valid, and a
//! request past that mark computes only the missing columns.

use crate::core::{Dataset, Result, SolverError};
use crate::kernel::KernelSpec;
use lru::LruCache;
use std::mem::size_of;
use std::num::NonZeroUsize;

/// Bounded LRU cache of kernel rows for one dataset
pub struct KernelRowCache {
    kernel: KernelSpec,
    n_samples: usize,
    capacity_bytes: usize,
    /// Sample index -> arena slot, in recency order. `None` means recompute
    /// mode: nothing is retained.
    slots: Option<LruCache<usize, usize>>,
    arena: Vec<Vec<f64>>,
    /// Number of valid leading columns of each arena slot
    filled: Vec<usize>,
    /// Row buffer handed out in recompute mode
    scratch: Vec<f64>,
    diag: Option<Vec<f64>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    kernel_evaluations: u64,
}

impl KernelRowCache {
    /// Create a cache for a dataset of `n_samples` samples
    ///
    /// A capacity of zero selects recompute mode. Any other capacity must
    /// hold at least one full row of `n_samples` values.
    pub fn new(kernel: KernelSpec, n_samples: usize, capacity_bytes: usize) -> Result<Self> {
        if n_samples == 0 {
            return Err(SolverError::EmptyDataset);
        }
        kernel.validate()?;

        let row_bytes = n_samples * size_of::<f64>();
        let slots = if capacity_bytes == 0 {
            None
        } else {
            let max_rows = (capacity_bytes / row_bytes).min(n_samples);
            match NonZeroUsize::new(max_rows) {
                Some(rows) => Some(LruCache::new(rows)),
                None => {
                    return Err(SolverError::Capacity {
                        capacity_bytes,
                        row_bytes,
                    });
                }
            }
        };

        log::debug!(
            "kernel cache for {} samples: {} rows of {} bytes",
            n_samples,
            slots.as_ref().map_or(0, |s| s.cap().get()),
            row_bytes
        );

        Ok(Self {
            kernel,
            n_samples,
            capacity_bytes,
            slots,
            arena: Vec::new(),
            filled: Vec::new(),
            scratch: Vec::new(),
            diag: None,
            hits: 0,
            misses: 0,
            evictions: 0,
            kernel_evaluations: 0,
        })
    }

    /// Create a cache sized for a dataset
    pub fn for_dataset<D: Dataset + ?Sized>(
        kernel: KernelSpec,
        ds: &D,
        capacity_bytes: usize,
    ) -> Result<Self> {
        let cache = Self::new(kernel, ds.n_samples(), capacity_bytes)?;
        cache.check_compatible(ds)?;
        Ok(cache)
    }

    pub fn kernel(&self) -> &KernelSpec {
        &self.kernel
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    /// Maximum number of rows retained, 0 in recompute mode
    pub fn capacity_rows(&self) -> usize {
        self.slots.as_ref().map_or(0, |s| s.cap().get())
    }

    pub fn is_recompute_mode(&self) -> bool {
        self.slots.is_none()
    }

    /// Check that a dataset matches the shape this cache was built for
    pub fn check_compatible<D: Dataset + ?Sized>(&self, ds: &D) -> Result<()> {
        if ds.n_samples() != self.n_samples {
            return Err(SolverError::DimensionMismatch {
                expected: self.n_samples,
                actual: ds.n_samples(),
            });
        }
        if self.kernel.is_precomputed() && ds.n_features() != self.n_samples {
            return Err(SolverError::InvalidDataset(format!(
                "a precomputed kernel must be square, got {} x {}",
                ds.n_samples(),
                ds.n_features()
            )));
        }
        Ok(())
    }

    /// Kernel values K(x_i, x_j) for j in [0, upto)
    ///
    /// Columns not yet computed for row `i` are evaluated and stored, and
    /// the least recently used row is evicted when the arena is full.
    pub fn get_row<D: Dataset + ?Sized>(&mut self, ds: &D, i: usize, upto: usize) -> &[f64] {
        let upto = upto.min(self.n_samples);

        let Some(slots) = self.slots.as_mut() else {
            self.misses += 1;
            self.kernel_evaluations += upto as u64;
            self.scratch.clear();
            let kernel = self.kernel;
            self.scratch
                .extend((0..upto).map(|j| kernel.evaluate(ds, i, ds, j)));
            return &self.scratch;
        };

        let slot = match slots.get(&i) {
            Some(&slot) => slot,
            None => {
                let slot = if self.arena.len() < slots.cap().get() {
                    self.arena.push(vec![0.0; self.n_samples]);
                    self.filled.push(0);
                    self.arena.len() - 1
                } else {
                    match slots.pop_lru() {
                        Some((_, slot)) => {
                            self.evictions += 1;
                            slot
                        }
                        None => {
                            self.arena.push(vec![0.0; self.n_samples]);
                            self.filled.push(0);
                            self.arena.len() - 1
                        }
                    }
                };
                self.filled[slot] = 0;
                slots.put(i, slot);
                slot
            }
        };

        let valid = self.filled[slot];
        if valid >= upto {
            self.hits += 1;
        } else {
            self.misses += 1;
            self.kernel_evaluations += (upto - valid) as u64;
            let kernel = self.kernel;
            let row = &mut self.arena[slot];
            for (j, value) in row.iter_mut().enumerate().take(upto).skip(valid) {
                *value = kernel.evaluate(ds, i, ds, j);
            }
            self.filled[slot] = upto;
        }

        &self.arena[slot][..upto]
    }

    /// Full kernel row of sample `i`
    pub fn full_row<D: Dataset + ?Sized>(&mut self, ds: &D, i: usize) -> &[f64] {
        let n = self.n_samples;
        self.get_row(ds, i, n)
    }

    /// Diagonal K(x_i, x_i), computed once and kept until `clear`
    pub fn compute_diag<D: Dataset + ?Sized>(&mut self, ds: &D) -> &[f64] {
        if self.diag.is_none() {
            let kernel = self.kernel;
            let diag: Vec<f64> = (0..self.n_samples)
                .map(|i| kernel.evaluate(ds, i, ds, i))
                .collect();
            self.kernel_evaluations += self.n_samples as u64;
            self.diag = Some(diag);
        }
        self.diag.as_deref().unwrap_or_default()
    }

    /// Compute and retain the given rows ahead of a fit
    pub fn prefetch<D: Dataset + ?Sized>(&mut self, ds: &D, indices: &[usize], upto: usize) {
        for &i in indices {
            self.get_row(ds, i, upto);
        }
    }

    /// Number of valid cached columns of row `i`, without touching recency
    pub fn valid_len(&self, i: usize) -> usize {
        self.slots
            .as_ref()
            .and_then(|s| s.peek(&i))
            .map_or(0, |&slot| self.filled[slot])
    }

    /// Whether row `i` is currently retained
    pub fn contains(&self, i: usize) -> bool {
        self.slots.as_ref().map_or(false, |s| s.contains(&i))
    }

    /// Number of retained rows
    pub fn len(&self) -> usize {
        self.slots.as_ref().map_or(0, |s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached row and the diagonal
    pub fn clear(&mut self) {
        if let Some(slots) = self.slots.as_mut() {
            slots.clear();
        }
        self.arena.clear();
        self.filled.clear();
        self.diag = None;
    }

    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
        self.kernel_evaluations = 0;
    }

    /// Get cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            kernel_evaluations: self.kernel_evaluations,
            rows: self.len(),
            capacity_rows: self.capacity_rows(),
        }
    }
}

impl std::fmt::Debug for KernelRowCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelRowCache")
            .field("kernel", &self.kernel)
            .field("n_samples", &self.n_samples)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Kernel function calls made on behalf of the cache
    pub kernel_evaluations: u64,
    pub rows: usize,
    pub capacity_rows: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DenseDataset;
    use approx::assert_relative_eq;

    fn toy(n: usize) -> DenseDataset {
        let rows = (0..n)
            .map(|i| vec![i as f64 * 0.5, 1.0 - i as f64 * 0.25])
            .collect();
        DenseDataset::from_rows(rows).expect("Should build dataset")
    }

    fn row_bytes(n: usize) -> usize {
        n * size_of::<f64>()
    }

    #[test]
    fn test_repeated_row_hits_without_evaluations() {
        let ds = toy(4);
        let mut cache = KernelRowCache::for_dataset(KernelSpec::Rbf { gamma: 0.5 }, &ds, 1 << 20)
            .expect("Should build cache");

        let first = cache.full_row(&ds, 2).to_vec();
        let evaluations = cache.stats().kernel_evaluations;
        assert_eq!(evaluations, 4);

        let second = cache.full_row(&ds, 2).to_vec();
        assert_eq!(first, second);
        assert_eq!(cache.stats().kernel_evaluations, evaluations);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);

        for (j, &value) in first.iter().enumerate() {
            assert_relative_eq!(value, KernelSpec::Rbf { gamma: 0.5 }.evaluate(&ds, 2, &ds, j));
        }
    }

    #[test]
    fn test_partial_rows_extend_on_demand() {
        let ds = toy(6);
        let mut cache = KernelRowCache::for_dataset(KernelSpec::Linear, &ds, 1 << 20)
            .expect("Should build cache");

        assert_eq!(cache.get_row(&ds, 1, 2).len(), 2);
        assert_eq!(cache.valid_len(1), 2);
        assert_eq!(cache.stats().kernel_evaluations, 2);

        // Shorter request is served from the valid prefix
        cache.get_row(&ds, 1, 1);
        assert_eq!(cache.stats().kernel_evaluations, 2);
        assert_eq!(cache.stats().hits, 1);

        // Longer request computes only the missing columns
        let row = cache.get_row(&ds, 1, 5).to_vec();
        assert_eq!(row.len(), 5);
        assert_eq!(cache.valid_len(1), 5);
        assert_eq!(cache.stats().kernel_evaluations, 5);
        assert_relative_eq!(row[4], KernelSpec::Linear.evaluate(&ds, 1, &ds, 4));
    }

    #[test]
    fn test_lru_eviction() {
        let ds = toy(4);
        let mut cache = KernelRowCache::for_dataset(KernelSpec::Linear, &ds, 2 * row_bytes(4))
            .expect("Should build cache");
        assert_eq!(cache.capacity_rows(), 2);

        cache.full_row(&ds, 0);
        cache.full_row(&ds, 1);
        cache.full_row(&ds, 0); // 1 is now least recently used
        cache.full_row(&ds, 2); // evicts 1

        assert!(cache.contains(0));
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.len(), 2);

        // Row 1 has to be recomputed in full and pushes out row 0
        let before = cache.stats().kernel_evaluations;
        cache.full_row(&ds, 1);
        assert_eq!(cache.stats().kernel_evaluations, before + 4);
        assert!(!cache.contains(0), "row 0 should have been evicted");
        assert_eq!(cache.valid_len(2), 4);
    }

    #[test]
    fn test_recompute_mode() {
        let ds = toy(3);
        let mut cache =
            KernelRowCache::for_dataset(KernelSpec::Linear, &ds, 0).expect("Should build cache");
        assert!(cache.is_recompute_mode());

        let a = cache.full_row(&ds, 1).to_vec();
        let b = cache.full_row(&ds, 1).to_vec();
        assert_eq!(a, b);
        assert_eq!(cache.stats().kernel_evaluations, 6);
        assert_eq!(cache.stats().hits, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_below_one_row_is_an_error() {
        let result = KernelRowCache::new(KernelSpec::Linear, 100, 10);
        assert!(matches!(
            result,
            Err(SolverError::Capacity {
                capacity_bytes: 10,
                row_bytes: 800
            })
        ));
    }

    #[test]
    fn test_capacity_is_capped_at_n_samples() {
        let cache = KernelRowCache::new(KernelSpec::Linear, 3, 1 << 30).expect("Should build");
        assert_eq!(cache.capacity_rows(), 3);
    }

    #[test]
    fn test_diag_and_clear() {
        let ds = toy(3);
        let mut cache = KernelRowCache::for_dataset(KernelSpec::Linear, &ds, 1 << 20)
            .expect("Should build cache");

        let diag = cache.compute_diag(&ds).to_vec();
        assert_eq!(diag.len(), 3);
        assert_relative_eq!(diag[0], 1.0);
        cache.compute_diag(&ds);
        assert_eq!(cache.stats().kernel_evaluations, 3);

        cache.prefetch(&ds, &[0, 2], 3);
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.valid_len(0), 0);
        cache.reset_stats();
        assert_eq!(cache.hit_rate(), 0.0);
    }

    #[test]
    fn test_precomputed_must_be_square() {
        let ds = toy(3);
        let result = KernelRowCache::for_dataset(KernelSpec::Precomputed, &ds, 0);
        assert!(matches!(result, Err(SolverError::InvalidDataset(_))));
    }
}
