//! `MeshMetadata`: the shape of a distributed mesh without its bulk data.
//!
//! Metadata is the currency exchanged between data adaptors, analyses and
//! partitioners. Adaptors build a fresh value each timestep and never mutate
//! it after returning it; callers may clone it freely.
//!
//! A metadata value is either a *local view* (block-level vectors describe
//! only this rank's blocks and `num_blocks_local` has a single entry) or a
//! *global view* (block-level vectors cover every block and
//! `num_blocks_local[r]` is the count held by rank `r`). Use
//! [`MeshMetadata::globalize_view`] to turn the former into the latter.

use crate::algs::communicator::Communicator;
use crate::data::array::{Association, ScalarType};
use crate::data::mesh::{Bounds, Extent, MeshType};
use crate::sensei_error::SenseiError;
use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// Which optional block-level sections of a [`MeshMetadata`] are populated.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetadataFlags(u32);

impl MetadataFlags {
    pub const NONE: MetadataFlags = MetadataFlags(0);
    /// `block_owner` and `block_ids`.
    pub const BLOCK_DECOMP: MetadataFlags = MetadataFlags(1);
    /// `block_num_points` and `block_num_cells`.
    pub const BLOCK_SIZE: MetadataFlags = MetadataFlags(1 << 1);
    pub const BLOCK_EXTENTS: MetadataFlags = MetadataFlags(1 << 2);
    pub const BLOCK_BOUNDS: MetadataFlags = MetadataFlags(1 << 3);
    /// `array_range` and `block_array_range`.
    pub const ARRAY_RANGE: MetadataFlags = MetadataFlags(1 << 4);

    pub fn contains(self, other: MetadataFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: MetadataFlags) {
        self.0 |= other.0;
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for MetadataFlags {
    type Output = MetadataFlags;
    fn bitor(self, rhs: MetadataFlags) -> MetadataFlags {
        MetadataFlags(self.0 | rhs.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshMetadata {
    pub global_view: bool,
    pub mesh_name: String,
    pub mesh_type: MeshType,
    pub block_type: MeshType,
    /// Global block count.
    pub num_blocks: usize,
    /// Blocks held per rank (global view) or `[held here]` (local view).
    pub num_blocks_local: Vec<usize>,
    pub extent: Option<Extent>,
    pub bounds: Option<Bounds>,
    pub num_points: usize,
    pub num_cells: usize,
    pub num_ghost_cells: usize,
    pub num_ghost_nodes: usize,
    /// Geometry does not change between timesteps.
    pub static_mesh: bool,

    pub num_arrays: usize,
    pub array_name: Vec<String>,
    pub array_centering: Vec<Association>,
    pub array_type: Vec<ScalarType>,
    pub array_components: Vec<usize>,
    pub array_range: Vec<[f64; 2]>,

    pub block_owner: Vec<usize>,
    pub block_ids: Vec<usize>,
    pub block_num_points: Vec<usize>,
    pub block_num_cells: Vec<usize>,
    pub block_extents: Vec<Extent>,
    pub block_bounds: Vec<Bounds>,
    /// Indexed `[block][array]`.
    pub block_array_range: Vec<Vec<[f64; 2]>>,

    pub flags: MetadataFlags,
}

impl MeshMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an array, keeping the four array sequences in step.
    pub fn add_array(
        &mut self,
        name: impl Into<String>,
        centering: Association,
        ty: ScalarType,
        components: usize,
    ) {
        self.array_name.push(name.into());
        self.array_centering.push(centering);
        self.array_type.push(ty);
        self.array_components.push(components.max(1));
        self.num_arrays = self.array_name.len();
    }

    /// Position of the array `name` with the given centering.
    pub fn array_index(&self, name: &str, centering: Association) -> Option<usize> {
        self.array_name
            .iter()
            .zip(&self.array_centering)
            .position(|(n, &c)| n == name && c == centering)
    }

    pub fn has_array(&self, name: &str, centering: Association) -> bool {
        self.array_index(name, centering).is_some()
    }

    /// Number of ranks described by a global view.
    pub fn world_size(&self) -> usize {
        self.num_blocks_local.len()
    }

    /// Check the structural invariants. Errors are [`SenseiError::InvalidMetadata`].
    pub fn validate(&self) -> Result<(), SenseiError> {
        let bad = |msg: String| Err(SenseiError::InvalidMetadata(format!("{}: {msg}", self.mesh_name)));

        if self.num_blocks == 0 {
            return bad("num_blocks must be positive".into());
        }
        let n = self.num_arrays;
        if self.array_name.len() != n
            || self.array_centering.len() != n
            || self.array_type.len() != n
            || self.array_components.len() != n
        {
            return bad(format!(
                "array sequences have lengths {}/{}/{}/{} but num_arrays is {n}",
                self.array_name.len(),
                self.array_centering.len(),
                self.array_type.len(),
                self.array_components.len()
            ));
        }
        if self.global_view {
            let sum: usize = self.num_blocks_local.iter().sum();
            if sum != self.num_blocks {
                return bad(format!(
                    "num_blocks_local sums to {sum} but num_blocks is {}",
                    self.num_blocks
                ));
            }
        } else if self.num_blocks_local.len() > 1 {
            return bad("a local view carries a single num_blocks_local entry".into());
        }

        let view_len = self.block_ids.len();
        let f = self.flags;
        if f.contains(MetadataFlags::BLOCK_DECOMP) {
            if self.block_owner.len() != view_len {
                return bad("block_owner and block_ids differ in length".into());
            }
            if self.global_view && view_len != self.num_blocks {
                return bad(format!(
                    "global view lists {view_len} of {} blocks",
                    self.num_blocks
                ));
            }
            if let Some(&b) = self.block_ids.iter().find(|&&b| b >= self.num_blocks) {
                return bad(format!("block id {b} out of range"));
            }
            if self.global_view {
                let ws = self.world_size();
                if let Some(&r) = self.block_owner.iter().find(|&&r| r >= ws) {
                    return bad(format!("block owner {r} outside world of {ws}"));
                }
            }
        }
        if f.contains(MetadataFlags::BLOCK_SIZE)
            && (self.block_num_points.len() != view_len || self.block_num_cells.len() != view_len)
        {
            return bad("block size vectors do not match block_ids".into());
        }
        if f.contains(MetadataFlags::BLOCK_EXTENTS) && self.block_extents.len() != view_len {
            return bad("block_extents does not match block_ids".into());
        }
        if f.contains(MetadataFlags::BLOCK_BOUNDS) && self.block_bounds.len() != view_len {
            return bad("block_bounds does not match block_ids".into());
        }
        if f.contains(MetadataFlags::ARRAY_RANGE) {
            if self.array_range.len() != n {
                return bad("array_range does not match num_arrays".into());
            }
            if self.block_array_range.len() != view_len
                || self.block_array_range.iter().any(|r| r.len() != n)
            {
                return bad("block_array_range is not [blocks][arrays]".into());
            }
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus a check that the optional sections in
    /// `required` are present and that a global view spans `world_size` ranks.
    pub fn validate_for(
        &self,
        world_size: usize,
        required: MetadataFlags,
    ) -> Result<(), SenseiError> {
        self.validate()?;
        if !self.flags.contains(required) {
            return Err(SenseiError::InvalidMetadata(format!(
                "{}: flags {:#x} missing required {:#x}",
                self.mesh_name,
                self.flags.bits(),
                required.bits()
            )));
        }
        if self.global_view && self.world_size() != world_size {
            return Err(SenseiError::InvalidMetadata(format!(
                "{}: num_blocks_local has {} entries for {world_size} ranks",
                self.mesh_name,
                self.world_size()
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SenseiError> {
        bincode::serialize(self).map_err(|e| SenseiError::Wire(e.to_string()))
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, SenseiError> {
        bincode::deserialize(buf).map_err(|e| SenseiError::Wire(e.to_string()))
    }

    /// Gather every rank's local view into one global view (collective).
    ///
    /// Block-level vectors are concatenated in rank order. Array descriptions
    /// must agree across ranks that hold blocks.
    pub fn globalize_view<C>(&self, comm: &C) -> Result<MeshMetadata, SenseiError>
    where
        C: Communicator + ?Sized,
    {
        if self.global_view {
            return Ok(self.clone());
        }
        self.validate_local()?;
        let parts = comm
            .all_gather_bytes(&self.to_bytes()?)?
            .iter()
            .map(|b| MeshMetadata::from_bytes(b))
            .collect::<Result<Vec<_>, _>>()?;
        Self::merge_local_views(&parts)
    }

    fn validate_local(&self) -> Result<(), SenseiError> {
        if self.num_blocks_local.len() != 1 {
            return Err(SenseiError::InvalidMetadata(format!(
                "{}: local view needs exactly one num_blocks_local entry",
                self.mesh_name
            )));
        }
        Ok(())
    }

    /// Merge local views indexed by rank.
    pub fn merge_local_views(parts: &[MeshMetadata]) -> Result<MeshMetadata, SenseiError> {
        let first = parts
            .first()
            .ok_or_else(|| SenseiError::InvalidMetadata("no views to merge".into()))?;
        let mut out = MeshMetadata {
            global_view: true,
            mesh_name: first.mesh_name.clone(),
            mesh_type: first.mesh_type,
            block_type: first.block_type,
            static_mesh: parts.iter().all(|p| p.static_mesh),
            flags: first.flags,
            ..MeshMetadata::default()
        };

        // arrays come from the first rank that holds data
        let reference = parts
            .iter()
            .find(|p| p.num_blocks_local.first().copied().unwrap_or(0) > 0)
            .unwrap_or(first);
        out.num_arrays = reference.num_arrays;
        out.array_name = reference.array_name.clone();
        out.array_centering = reference.array_centering.clone();
        out.array_type = reference.array_type.clone();
        out.array_components = reference.array_components.clone();

        let has_ranges = out.flags.contains(MetadataFlags::ARRAY_RANGE);
        if has_ranges {
            out.array_range = vec![[f64::INFINITY, f64::NEG_INFINITY]; out.num_arrays];
        }

        for (rank, p) in parts.iter().enumerate() {
            if p.mesh_name != out.mesh_name || p.flags != out.flags {
                return Err(SenseiError::InvalidMetadata(format!(
                    "rank {rank} describes `{}` with flags {:#x}, expected `{}` with {:#x}",
                    p.mesh_name,
                    p.flags.bits(),
                    out.mesh_name,
                    out.flags.bits()
                )));
            }
            let held = p.num_blocks_local.first().copied().unwrap_or(0);
            if held > 0 && p.array_name != out.array_name {
                return Err(SenseiError::InvalidMetadata(format!(
                    "rank {rank} disagrees on the arrays of `{}`",
                    out.mesh_name
                )));
            }
            out.num_blocks_local.push(held);
            out.num_points += p.num_points;
            out.num_cells += p.num_cells;
            out.num_ghost_cells += p.num_ghost_cells;
            out.num_ghost_nodes += p.num_ghost_nodes;
            out.extent = match (out.extent, p.extent) {
                (Some(a), Some(b)) => Some(a.union(&b)),
                (a, b) => a.or(b),
            };
            out.bounds = match (out.bounds, p.bounds) {
                (Some(a), Some(b)) => Some(a.union(&b)),
                (a, b) => a.or(b),
            };

            out.block_owner.extend_from_slice(&p.block_owner);
            out.block_ids.extend_from_slice(&p.block_ids);
            out.block_num_points.extend_from_slice(&p.block_num_points);
            out.block_num_cells.extend_from_slice(&p.block_num_cells);
            out.block_extents.extend_from_slice(&p.block_extents);
            out.block_bounds.extend_from_slice(&p.block_bounds);
            out.block_array_range.extend(p.block_array_range.iter().cloned());
            if has_ranges && held > 0 {
                for (acc, r) in out.array_range.iter_mut().zip(&p.array_range) {
                    acc[0] = acc[0].min(r[0]);
                    acc[1] = acc[1].max(r[1]);
                }
            }
        }
        out.num_blocks = out.num_blocks_local.iter().sum();
        out.validate()?;
        Ok(out)
    }

    /// The local view of `rank` cut out of a global view.
    pub fn local_view(&self, rank: usize) -> Result<MeshMetadata, SenseiError> {
        if !self.global_view {
            return Ok(self.clone());
        }
        if !self.flags.contains(MetadataFlags::BLOCK_DECOMP) {
            return Err(SenseiError::InvalidMetadata(format!(
                "{}: a local view needs the block decomposition",
                self.mesh_name
            )));
        }
        let keep: Vec<usize> = self
            .block_owner
            .iter()
            .enumerate()
            .filter_map(|(i, &r)| (r == rank).then_some(i))
            .collect();
        fn pick<T: Clone>(v: &[T], keep: &[usize]) -> Vec<T> {
            if v.is_empty() {
                return Vec::new();
            }
            keep.iter().map(|&i| v[i].clone()).collect()
        }
        let mut out = self.clone();
        out.global_view = false;
        out.num_blocks_local = vec![keep.len()];
        out.block_owner = pick(&self.block_owner, &keep);
        out.block_ids = pick(&self.block_ids, &keep);
        out.block_num_points = pick(&self.block_num_points, &keep);
        out.block_num_cells = pick(&self.block_num_cells, &keep);
        out.block_extents = pick(&self.block_extents, &keep);
        out.block_bounds = pick(&self.block_bounds, &keep);
        out.block_array_range = pick(&self.block_array_range, &keep);
        if self.flags.contains(MetadataFlags::BLOCK_SIZE) {
            out.num_points = out.block_num_points.iter().sum();
            out.num_cells = out.block_num_cells.iter().sum();
        }
        Ok(out)
    }
}
