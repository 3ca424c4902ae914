//! Contiguous chunks: rank `r` receives one run of consecutive block ids and
//! the first `num_blocks % world_size` ranks take one extra block.

use super::{PartitionMap, Partitioner, check_inputs};
use crate::data::metadata::MeshMetadata;
use crate::sensei_error::SenseiError;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPartitioner;

impl BlockPartitioner {
    /// Destination of block `b`.
    pub fn rank_of(b: usize, num_blocks: usize, world_size: usize) -> usize {
        let base = num_blocks / world_size;
        let extra = num_blocks % world_size;
        // the first `extra` ranks hold `base + 1` blocks each
        let split = extra * (base + 1);
        if b < split {
            b / (base + 1)
        } else {
            extra + (b - split) / base.max(1)
        }
    }
}

impl Partitioner for BlockPartitioner {
    fn name(&self) -> &'static str {
        "block"
    }

    fn partition(
        &self,
        remote: &MeshMetadata,
        local: &MeshMetadata,
    ) -> Result<PartitionMap, SenseiError> {
        let (n, size) = check_inputs(self.name(), remote, local)?;
        PartitionMap::from_fn(n, size, |b| Self::rank_of(b, n, size))
    }
}
