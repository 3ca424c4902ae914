//! Block-to-rank assignment for in-transit analysis.
//!
//! A partitioner looks at the producer's metadata (the *remote* view) and the
//! consumer group's metadata (the *local* view) and decides which consumer
//! rank receives each producer block. Partitioners are pure: the same inputs
//! give the same [`PartitionMap`] on every rank, so no communication is
//! needed to agree on it.

pub mod block;
pub mod cyclic;
pub mod mapped;
pub mod metrics;
pub mod planar;

pub use block::BlockPartitioner;
pub use cyclic::CyclicPartitioner;
pub use mapped::MappedPartitioner;
pub use metrics::PartitionMetrics;
pub use planar::PlanarPartitioner;

use crate::data::metadata::{MeshMetadata, MetadataFlags};
use crate::sensei_error::SenseiError;
use serde::{Deserialize, Serialize};

pub type Rank = usize;

/// Decides the destination rank of every producer block.
pub trait Partitioner {
    /// Short identifier, matching the `type` attribute in configuration.
    fn name(&self) -> &'static str;

    fn partition(
        &self,
        remote: &MeshMetadata,
        local: &MeshMetadata,
    ) -> Result<PartitionMap, SenseiError>;
}

impl<P: Partitioner + ?Sized> Partitioner for Box<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn partition(
        &self,
        remote: &MeshMetadata,
        local: &MeshMetadata,
    ) -> Result<PartitionMap, SenseiError> {
        (**self).partition(remote, local)
    }
}

/// Owner rank of each block, indexed by block id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMap {
    owners: Vec<Rank>,
    world_size: usize,
}

impl PartitionMap {
    /// Wrap an owner vector, checking every rank is below `world_size`.
    pub fn new(owners: Vec<Rank>, world_size: usize) -> Result<Self, SenseiError> {
        if world_size == 0 {
            return Err(SenseiError::InvalidMetadata(
                "partition over an empty world".into(),
            ));
        }
        if let Some((b, &r)) = owners.iter().enumerate().find(|&(_, &r)| r >= world_size) {
            return Err(SenseiError::InvalidMetadata(format!(
                "block {b} assigned to rank {r} in a world of {world_size}"
            )));
        }
        Ok(Self { owners, world_size })
    }

    pub fn from_fn(
        num_blocks: usize,
        world_size: usize,
        f: impl Fn(usize) -> Rank,
    ) -> Result<Self, SenseiError> {
        Self::new((0..num_blocks).map(f).collect(), world_size)
    }

    pub fn num_blocks(&self) -> usize {
        self.owners.len()
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    pub fn owner(&self, block_id: usize) -> Option<Rank> {
        self.owners.get(block_id).copied()
    }

    pub fn owners(&self) -> &[Rank] {
        &self.owners
    }

    /// Block ids assigned to `rank`, ascending.
    pub fn blocks_for(&self, rank: Rank) -> Vec<usize> {
        self.owners
            .iter()
            .enumerate()
            .filter_map(|(b, &r)| (r == rank).then_some(b))
            .collect()
    }

    /// Number of blocks per rank.
    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.world_size];
        for &r in &self.owners {
            counts[r] += 1;
        }
        counts
    }

    /// `remote` re-owned by this map, still as a global view.
    pub fn reowned(&self, remote: &MeshMetadata) -> Result<MeshMetadata, SenseiError> {
        if !remote.flags.contains(MetadataFlags::BLOCK_DECOMP) {
            return Err(SenseiError::InvalidMetadata(format!(
                "{}: repartitioning needs the block decomposition",
                remote.mesh_name
            )));
        }
        if remote.num_blocks != self.num_blocks() {
            return Err(SenseiError::InvalidMetadata(format!(
                "{}: map covers {} blocks, mesh has {}",
                remote.mesh_name,
                self.num_blocks(),
                remote.num_blocks
            )));
        }
        let mut out = remote.clone();
        out.global_view = true;
        out.block_owner = remote
            .block_ids
            .iter()
            .map(|&b| {
                self.owner(b).ok_or_else(|| {
                    SenseiError::InvalidMetadata(format!("block id {b} out of range"))
                })
            })
            .collect::<Result<_, _>>()?;
        out.num_blocks_local = self.counts();
        Ok(out)
    }

    /// The view `rank` holds once the blocks have moved.
    pub fn apply(&self, remote: &MeshMetadata, rank: Rank) -> Result<MeshMetadata, SenseiError> {
        self.reowned(remote)?.local_view(rank)
    }
}

/// Consumer world size: the local view's rank count, else the remote's.
pub(crate) fn world_size_of(remote: &MeshMetadata, local: &MeshMetadata) -> usize {
    match local.num_blocks_local.len() {
        0 => remote.num_blocks_local.len(),
        n => n,
    }
}

/// Shared argument checks for the arithmetic partitioners.
pub(crate) fn check_inputs(
    name: &str,
    remote: &MeshMetadata,
    local: &MeshMetadata,
) -> Result<(usize, usize), SenseiError> {
    let num_blocks = remote.num_blocks;
    let world_size = world_size_of(remote, local);
    if num_blocks == 0 {
        return Err(SenseiError::InvalidMetadata(format!(
            "{name}: `{}` has no blocks",
            remote.mesh_name
        )));
    }
    if world_size == 0 {
        return Err(SenseiError::InvalidMetadata(format!(
            "{name}: consumer world size is zero"
        )));
    }
    Ok((num_blocks, world_size))
}

/// Metadata describing a consumer group of `world_size` ranks that holds
/// nothing yet; the usual `local` argument of [`Partitioner::partition`].
pub fn consumer_view(world_size: usize) -> MeshMetadata {
    MeshMetadata {
        global_view: true,
        num_blocks_local: vec![0; world_size],
        ..MeshMetadata::default()
    }
}

/// Build a partitioner from a `<partitioner type=".." .../>` element.
pub fn partitioner_from_xml(node: roxmltree::Node<'_, '_>) -> Result<Box<dyn Partitioner>, SenseiError> {
    let kind = node.attribute("type").unwrap_or("block");
    let p: Box<dyn Partitioner> = match kind {
        "block" => Box::new(BlockPartitioner),
        "cyclic" => Box::new(CyclicPartitioner),
        "planar" => {
            let plane_size = match node.attribute("plane_size") {
                Some(s) => s.trim().parse::<i64>().map_err(|e| {
                    SenseiError::InvalidConfiguration(format!("plane_size `{s}`: {e}"))
                })?,
                None => {
                    return Err(SenseiError::InvalidConfiguration(
                        "planar partitioner needs plane_size".into(),
                    ));
                }
            };
            Box::new(PlanarPartitioner::new(plane_size)?)
        }
        "mapped" => {
            let owners = node.attribute("block_owner").ok_or_else(|| {
                SenseiError::InvalidConfiguration("mapped partitioner needs block_owner".into())
            })?;
            Box::new(MappedPartitioner::parse(owners)?)
        }
        other => {
            return Err(SenseiError::InvalidConfiguration(format!(
                "unknown partitioner type `{other}`"
            )));
        }
    };
    log::info!("configured {} partitioner", p.name());
    Ok(p)
}

#[cfg(test)]
mod tests;
