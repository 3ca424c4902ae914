//! Planar partitioning: consecutive runs of `plane_size` blocks travel
//! together and the runs are dealt round-robin over the consumer ranks.

use super::{PartitionMap, Partitioner, check_inputs};
use crate::data::metadata::MeshMetadata;
use crate::sensei_error::SenseiError;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanarPartitioner {
    plane_size: i64,
}

impl PlanarPartitioner {
    /// Fails with `InvalidConfiguration` unless `plane_size >= 1`.
    pub fn new(plane_size: i64) -> Result<Self, SenseiError> {
        let p = Self { plane_size };
        p.check()?;
        Ok(p)
    }

    pub fn plane_size(&self) -> i64 {
        self.plane_size
    }

    fn check(&self) -> Result<(), SenseiError> {
        if self.plane_size < 1 {
            return Err(SenseiError::InvalidConfiguration(format!(
                "plane_size must be at least 1, got {}",
                self.plane_size
            )));
        }
        Ok(())
    }

    /// Destination of block `b` in a world of `world_size` ranks.
    #[inline]
    pub fn rank_of(&self, b: usize, world_size: usize) -> usize {
        (b / self.plane_size as usize) % world_size
    }
}

impl Partitioner for PlanarPartitioner {
    fn name(&self) -> &'static str {
        "planar"
    }

    fn partition(
        &self,
        remote: &MeshMetadata,
        local: &MeshMetadata,
    ) -> Result<PartitionMap, SenseiError> {
        // deserialized values bypass `new`
        self.check()?;
        let (num_blocks, world_size) = check_inputs(self.name(), remote, local)?;
        log::debug!(
            "planar: {num_blocks} blocks in planes of {} over {world_size} ranks",
            self.plane_size
        );
        PartitionMap::from_fn(num_blocks, world_size, |b| self.rank_of(b, world_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioning::consumer_view;

    fn remote(num_blocks: usize) -> MeshMetadata {
        MeshMetadata {
            mesh_name: "mesh".into(),
            num_blocks,
            num_blocks_local: vec![num_blocks],
            ..MeshMetadata::default()
        }
    }

    #[test]
    fn planes_are_dealt_round_robin() {
        let p = PlanarPartitioner::new(2).unwrap();
        let map = p.partition(&remote(10), &consumer_view(3)).unwrap();
        assert_eq!(map.owners(), &[0, 0, 1, 1, 2, 2, 0, 0, 1, 1]);
    }

    #[test]
    fn bad_plane_size_is_a_configuration_error() {
        assert!(matches!(
            PlanarPartitioner::new(0),
            Err(SenseiError::InvalidConfiguration(_))
        ));
        let p = PlanarPartitioner { plane_size: -2 };
        assert!(matches!(
            p.partition(&remote(4), &consumer_view(2)),
            Err(SenseiError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn empty_mesh_or_world_is_invalid_metadata() {
        let p = PlanarPartitioner::new(1).unwrap();
        assert!(matches!(
            p.partition(&remote(0), &consumer_view(2)),
            Err(SenseiError::InvalidMetadata(_))
        ));
        let empty_world = MeshMetadata {
            num_blocks: 4,
            ..MeshMetadata::default()
        };
        assert!(matches!(
            p.partition(&empty_world, &MeshMetadata::default()),
            Err(SenseiError::InvalidMetadata(_))
        ));
    }
}
