use rand::Rng;

use crate::core::{DbError, Result};

/// Weighted choice over a fixed set of entries.
///
/// Each entry is repeated `weight` times and a pick is a uniform draw over
/// the expanded list, so an entry wins with probability weight / total.
/// Zero-weight entries never win.
#[derive(Debug, Clone)]
pub struct WeightTable<T> {
    entries: Vec<T>,
}

impl<T: Clone> WeightTable<T> {
    pub fn new(weights: impl IntoIterator<Item = (T, u32)>) -> Result<Self> {
        let mut entries = Vec::new();
        for (entry, weight) in weights {
            for _ in 0..weight {
                entries.push(entry.clone());
            }
        }
        if entries.is_empty() {
            return Err(DbError::NotConfigured(
                "weight table has no entry with a positive weight".into(),
            ));
        }
        Ok(Self { entries })
    }

    pub fn pick(&self) -> T {
        self.pick_with(&mut rand::thread_rng())
    }

    pub fn pick_with<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        self.entries[rng.gen_range(0..self.entries.len())].clone()
    }

    /// Length of the expanded list (the sum of weights).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
