//! Move mesh blocks to the ranks a [`PartitionMap`] assigns them to.
//!
//! Every rank packs the blocks it currently holds into one wire message per
//! destination and a single all-to-all delivers them. Ranks that hold or
//! receive nothing still take part in the collective.

use crate::algs::communicator::Communicator;
use crate::algs::wire::{decode_blocks, encode_blocks};
use crate::data::array::Association;
use crate::data::mesh::{BlockMesh, MultiBlockMesh};
use crate::data::metadata::MeshMetadata;
use crate::partitioning::PartitionMap;
use crate::sensei_error::SenseiError;
use itertools::Itertools;

/// Collective: returns the blocks `map` assigns to this rank.
///
/// `remote_md` is the producer's global view; blocks it lists but nobody
/// sent are reported with a warning and left absent.
pub fn redistribute<C>(
    comm: &C,
    remote_md: &MeshMetadata,
    map: &PartitionMap,
    local_mesh: &MultiBlockMesh,
) -> Result<MultiBlockMesh, SenseiError>
where
    C: Communicator + ?Sized,
{
    let size = comm.size();
    if map.world_size() != size {
        return Err(SenseiError::InvalidConfiguration(format!(
            "partition map spans {} ranks, communicator has {size}",
            map.world_size()
        )));
    }

    let by_dest = local_mesh
        .blocks()
        .map(|b| {
            map.owner(b.block_id).map(|r| (r, b)).ok_or_else(|| {
                SenseiError::InvalidMetadata(format!(
                    "{}: block {} not covered by a map of {} blocks",
                    local_mesh.name,
                    b.block_id,
                    map.num_blocks()
                ))
            })
        })
        .collect::<Result<Vec<(usize, &BlockMesh)>, _>>()?
        .into_iter()
        .into_group_map();

    let sends: Vec<Vec<u8>> = (0..size)
        .map(|p| match by_dest.get(&p) {
            Some(blocks) => encode_blocks(blocks.iter().copied()),
            None => Vec::new(),
        })
        .collect();
    log::debug!(
        "rank {} sends {} blocks of `{}` to {} ranks",
        comm.rank(),
        local_mesh.num_local_blocks(),
        local_mesh.name,
        by_dest.len()
    );

    let received = comm.all_to_all_bytes(sends)?;
    let mut out = MultiBlockMesh::new(local_mesh.name.clone(), remote_md.num_blocks);
    for (src, buf) in received.iter().enumerate() {
        if buf.is_empty() {
            continue;
        }
        for block in decode_blocks(buf)? {
            if map.owner(block.block_id) != Some(comm.rank()) {
                return Err(SenseiError::Wire(format!(
                    "rank {src} sent block {} which is not ours",
                    block.block_id
                )));
            }
            out.set_block(block);
        }
    }

    let missing: Vec<usize> = map
        .blocks_for(comm.rank())
        .into_iter()
        .filter(|b| remote_md.block_ids.contains(b) && out.block(*b).is_none())
        .collect();
    if !missing.is_empty() {
        log::warn!(
            "`{}`: blocks {missing:?} assigned to rank {} never arrived",
            local_mesh.name,
            comm.rank()
        );
    }
    Ok(out)
}

/// Collective: ship one array of `source` to the blocks of `target` that
/// `map` placed on this rank.
///
/// `source` holds the producer-side blocks with the array attached.
pub fn redistribute_array<C>(
    comm: &C,
    remote_md: &MeshMetadata,
    map: &PartitionMap,
    source: &MultiBlockMesh,
    association: Association,
    array_name: &str,
    target: &mut MultiBlockMesh,
) -> Result<(), SenseiError>
where
    C: Communicator + ?Sized,
{
    let mut carrier = MultiBlockMesh::new(source.name.clone(), source.num_blocks);
    for block in source.blocks() {
        let mut light = block.structure_only();
        if let Some(array) = block.array(association, array_name) {
            light.insert_array(array.clone());
        }
        carrier.set_block(light);
    }
    let moved = redistribute(comm, remote_md, map, &carrier)?;
    for block in moved.blocks() {
        let (Some(array), Some(dest)) = (
            block.array(association, array_name),
            target.block_mut(block.block_id),
        ) else {
            continue;
        };
        dest.insert_array(array.clone());
    }
    Ok(())
}
