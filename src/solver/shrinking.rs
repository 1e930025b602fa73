//! Active-set shrinking for coordinate descent
//!
//! Coordinates that look settled for a whole window of consecutive passes
//! are dropped from the active set, which shrinks the work per pass. Since
//! the active set keeps moving, shrunk coordinates are periodically brought
//! back and re-examined, and a full unshrink always precedes a convergence
//! verdict.

use std::collections::VecDeque;

/// Active set with a per-coordinate shrinking history
#[derive(Debug, Clone)]
pub struct ActiveSet {
    /// Every eligible coordinate, in ascending order
    eligible: Vec<usize>,
    /// Coordinates currently visited
    active: Vec<usize>,
    /// Whether each coordinate was a shrink candidate, for the last
    /// `window` passes
    history: Vec<VecDeque<bool>>,
    shrunk: Vec<bool>,
    window: usize,
    unshrink_interval: usize,
    n_shrunk: usize,
}

impl ActiveSet {
    /// Create an active set over `eligible` coordinates of a `dim`-wide problem
    ///
    /// # Arguments
    /// * `window` - Consecutive candidate passes required before shrinking
    /// * `unshrink_interval` - Passes between re-scans of shrunk coordinates
    pub fn new(
        mut eligible: Vec<usize>,
        dim: usize,
        window: usize,
        unshrink_interval: usize,
    ) -> Self {
        eligible.sort_unstable();
        eligible.dedup();
        Self {
            active: eligible.clone(),
            eligible,
            history: vec![VecDeque::with_capacity(window); dim],
            shrunk: vec![false; dim],
            window: window.max(1),
            unshrink_interval: unshrink_interval.max(1),
            n_shrunk: 0,
        }
    }

    /// Coordinates currently visited, ascending
    pub fn active(&self) -> &[usize] {
        &self.active
    }

    pub fn eligible(&self) -> &[usize] {
        &self.eligible
    }

    pub fn n_active(&self) -> usize {
        self.active.len()
    }

    pub fn has_shrunk(&self) -> bool {
        self.n_shrunk > 0
    }

    pub fn is_shrunk(&self, j: usize) -> bool {
        self.shrunk[j]
    }

    /// Record whether coordinate `j` looked settled in this pass
    pub fn record(&mut self, j: usize, candidate: bool) {
        let history = &mut self.history[j];
        if history.len() >= self.window {
            history.pop_front();
        }
        history.push_back(candidate);
    }

    /// Drop every coordinate whose whole window is made of candidate passes
    ///
    /// Returns the number of coordinates removed.
    pub fn shrink(&mut self) -> usize {
        let window = self.window;
        let history = &self.history;
        let shrunk = &mut self.shrunk;
        let before = self.active.len();

        self.active.retain(|&j| {
            let settled = history[j].len() == window && history[j].iter().all(|&c| c);
            if settled {
                shrunk[j] = true;
            }
            !settled
        });

        let removed = before - self.active.len();
        self.n_shrunk += removed;
        if removed > 0 {
            log::debug!("shrinking removed {} coordinates, {} active", removed, self.active.len());
        }
        removed
    }

    /// Whether shrunk coordinates are due for a re-scan after `pass` passes
    pub fn unshrink_due(&self, pass: usize) -> bool {
        self.has_shrunk() && pass > 0 && pass % self.unshrink_interval == 0
    }

    /// Bring every shrunk coordinate back and forget the history
    pub fn unshrink(&mut self) {
        if self.has_shrunk() {
            log::debug!("unshrinking {} coordinates", self.n_shrunk);
        }
        self.active.clone_from(&self.eligible);
        for &j in &self.eligible {
            self.shrunk[j] = false;
            self.history[j].clear();
        }
        self.n_shrunk = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_set_creation() {
        let set = ActiveSet::new(vec![3, 1, 1, 0], 5, 2, 10);
        assert_eq!(set.active(), &[0, 1, 3]);
        assert_eq!(set.n_active(), 3);
        assert!(!set.has_shrunk());
    }

    #[test]
    fn test_shrink_needs_full_window() {
        let mut set = ActiveSet::new((0..3).collect(), 3, 3, 10);

        for _ in 0..2 {
            set.record(0, true);
            set.record(1, false);
            set.record(2, true);
        }
        assert_eq!(set.shrink(), 0, "history is shorter than the window");

        set.record(0, true);
        set.record(1, true);
        set.record(2, false);
        assert_eq!(set.shrink(), 1);
        assert_eq!(set.active(), &[1, 2]);
        assert!(set.is_shrunk(0));
        assert!(set.has_shrunk());
    }

    #[test]
    fn test_window_forgets_old_passes() {
        let mut set = ActiveSet::new(vec![0], 1, 2, 10);
        set.record(0, false);
        set.record(0, true);
        assert_eq!(set.shrink(), 0);
        set.record(0, true);
        assert_eq!(set.shrink(), 1);
        assert_eq!(set.n_active(), 0);
    }

    #[test]
    fn test_unshrink_restores_everything() {
        let mut set = ActiveSet::new(vec![0, 2, 4], 5, 1, 3);
        set.record(2, true);
        set.shrink();
        assert_eq!(set.active(), &[0, 4]);

        assert!(!set.unshrink_due(2));
        assert!(set.unshrink_due(3));

        set.unshrink();
        assert_eq!(set.active(), &[0, 2, 4]);
        assert!(!set.is_shrunk(2));
        assert!(!set.has_shrunk());

        // History was reset, a single candidate pass is needed again
        set.record(4, true);
        assert_eq!(set.shrink(), 1);
        assert_eq!(set.active(), &[0, 2]);
    }
}
