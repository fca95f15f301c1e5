use rand::Rng;

use super::WeightTable;
use crate::core::{DbError, Result};

/// Draws the replica a request reads from.
#[derive(Debug, Clone)]
pub struct ReplicaSelector {
    table: Option<WeightTable<usize>>,
}

impl ReplicaSelector {
    /// `(replica index, weight)` pairs. An empty list yields a selector whose
    /// draws fail.
    pub fn new(weights: Vec<(usize, u32)>) -> Result<Self> {
        if weights.is_empty() {
            return Ok(Self { table: None });
        }
        Ok(Self {
            table: Some(WeightTable::new(weights)?),
        })
    }

    pub fn decide_replica(&self) -> Result<usize> {
        self.decide_replica_with(&mut rand::thread_rng())
    }

    pub fn decide_replica_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<usize> {
        self.table
            .as_ref()
            .map(|table| table.pick_with(rng))
            .ok_or_else(|| DbError::NotConfigured("no read replicas configured".into()))
    }
}
