use super::{PartitionMap, Partitioner, check_inputs};
use crate::data::metadata::MeshMetadata;
use crate::sensei_error::SenseiError;
use serde::{Deserialize, Serialize};

/// Round-robin: block `b` goes to rank `b % world_size`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CyclicPartitioner;

impl Partitioner for CyclicPartitioner {
    fn name(&self) -> &'static str {
        "cyclic"
    }

    fn partition(
        &self,
        remote: &MeshMetadata,
        local: &MeshMetadata,
    ) -> Result<PartitionMap, SenseiError> {
        let (n, size) = check_inputs(self.name(), remote, local)?;
        PartitionMap::from_fn(n, size, |b| b % size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioning::consumer_view;

    #[test]
    fn deals_blocks_in_turn() {
        let remote = MeshMetadata {
            num_blocks: 5,
            ..MeshMetadata::default()
        };
        let map = CyclicPartitioner.partition(&remote, &consumer_view(2)).unwrap();
        assert_eq!(map.owners(), &[0, 1, 0, 1, 0]);
    }
}
