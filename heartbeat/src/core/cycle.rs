//! Shuffled visiting order over the configured repositories.
//!
//! A cycle is a permutation of `[0, repo_count)` plus a cursor. Every index is
//! visited exactly once before the order is reshuffled, and a reshuffle only
//! happens once the cursor has walked off the end.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Durable visiting order (`state.json` -> `cycle`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    /// Permutation of repo indices.
    pub order: Vec<usize>,
    /// Next unvisited slot in `order` (`0..=order.len()`).
    pub position: usize,
}

impl Cycle {
    /// Fresh uniformly shuffled cycle over `repo_count` indices.
    pub fn shuffled<R: Rng + ?Sized>(repo_count: usize, rng: &mut R) -> Self {
        let mut order: Vec<usize> = (0..repo_count).collect();
        order.shuffle(rng);
        Self { order, position: 0 }
    }

    /// Replace the order with a new permutation of the same length and rewind.
    pub fn reshuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        *self = Self::shuffled(self.order.len(), rng);
    }

    /// True when every slot of the current order has been visited.
    pub fn is_exhausted(&self) -> bool {
        self.position >= self.order.len()
    }

    /// Slots `position..position + batch`, truncated at the end of the order.
    pub fn window(&self, batch: usize) -> &[usize] {
        if self.is_exhausted() {
            return &[];
        }
        let end = self.position.saturating_add(batch).min(self.order.len());
        &self.order[self.position..end]
    }

    /// Move the cursor forward by `count`; reshuffle at the cycle boundary.
    ///
    /// Returns true if a new permutation was generated.
    pub fn advance<R: Rng + ?Sized>(&mut self, count: usize, rng: &mut R) -> bool {
        self.position = self.position.saturating_add(count);
        if self.is_exhausted() {
            self.reshuffle(rng);
            return true;
        }
        false
    }

    /// Check the cycle against the live repo count.
    ///
    /// Returns a list of violations; empty means the cycle can be resumed.
    pub fn violations(&self, repo_count: usize) -> Vec<String> {
        let mut errors = Vec::new();
        if self.order.len() != repo_count {
            errors.push(format!(
                "order has {} entries but {} repos are configured",
                self.order.len(),
                repo_count
            ));
        }
        let mut seen = HashSet::new();
        for &index in &self.order {
            if index >= repo_count {
                errors.push(format!("index {index} out of range"));
            } else if !seen.insert(index) {
                errors.push(format!("duplicate index {index}"));
            }
        }
        if self.position > self.order.len() {
            errors.push(format!(
                "position {} past end of order ({})",
                self.position,
                self.order.len()
            ));
        }
        errors
    }

    pub fn is_consistent(&self, repo_count: usize) -> bool {
        self.violations(repo_count).is_empty()
    }
}
