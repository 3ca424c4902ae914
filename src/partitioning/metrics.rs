//! Quality measures for a [`PartitionMap`].
//!
//! Intended for logging and tests; none of these affect where blocks go.

use super::PartitionMap;
use crate::data::metadata::{MeshMetadata, MetadataFlags};
use itertools::{Itertools, MinMaxResult};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PartitionMetrics {
    /// Fewest and most blocks any rank receives.
    pub min_blocks: usize,
    pub max_blocks: usize,
    /// Heaviest rank's load over the mean load, `1.0` is perfect balance.
    /// Load is cell count when the metadata carries block sizes, else blocks.
    pub imbalance: f64,
    /// Blocks whose destination differs from their current owner.
    pub moved_blocks: usize,
}

impl PartitionMetrics {
    pub fn of(map: &PartitionMap, remote: &MeshMetadata) -> Self {
        let counts = map.counts();
        let (min_blocks, max_blocks) = match counts.iter().copied().minmax() {
            MinMaxResult::NoElements => (0, 0),
            MinMaxResult::OneElement(x) => (x, x),
            MinMaxResult::MinMax(lo, hi) => (lo, hi),
        };

        let mut load = vec![0u64; map.world_size()];
        let sized = remote.flags.contains(MetadataFlags::BLOCK_SIZE)
            && remote.block_num_cells.len() == remote.block_ids.len();
        if sized {
            for (&b, &cells) in remote.block_ids.iter().zip(&remote.block_num_cells) {
                if let Some(r) = map.owner(b) {
                    load[r] += cells as u64;
                }
            }
        } else {
            for (r, &c) in counts.iter().enumerate() {
                load[r] = c as u64;
            }
        }
        let total: u64 = load.iter().sum();
        let mean = total as f64 / load.len().max(1) as f64;
        let heaviest = load.iter().copied().max().unwrap_or(0) as f64;
        let imbalance = if mean > 0.0 { heaviest / mean } else { 1.0 };

        let moved_blocks = if remote.flags.contains(MetadataFlags::BLOCK_DECOMP) {
            remote
                .block_ids
                .iter()
                .zip(&remote.block_owner)
                .filter(|&(&b, &r)| map.owner(b) != Some(r))
                .count()
        } else {
            0
        };

        Self {
            min_blocks,
            max_blocks,
            imbalance,
            moved_blocks,
        }
    }
}
