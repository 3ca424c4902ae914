//! Block-structured mesh storage handed out by data adaptors.
//!
//! A [`MultiBlockMesh`] has one slot per global block; only the blocks this
//! rank holds are present. The core never looks at cell topology beyond
//! counts, extents and bounding boxes.

use crate::data::array::{Association, FieldArray};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Mesh / block kind tag.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum MeshType {
    #[default]
    Unknown = 0,
    ImageData = 1,
    RectilinearGrid = 2,
    StructuredGrid = 3,
    UnstructuredGrid = 4,
    PolyData = 5,
    MultiBlock = 6,
}

impl MeshType {
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => MeshType::ImageData,
            2 => MeshType::RectilinearGrid,
            3 => MeshType::StructuredGrid,
            4 => MeshType::UnstructuredGrid,
            5 => MeshType::PolyData,
            6 => MeshType::MultiBlock,
            _ => MeshType::Unknown,
        }
    }
}

/// Inclusive point-index extent `[i0, i1] x [j0, j1] x [k0, k1]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent(pub [i64; 6]);

impl Extent {
    /// The empty extent (every max below its min).
    pub const EMPTY: Extent = Extent([0, -1, 0, -1, 0, -1]);

    pub fn from_start_and_dims(start: [i64; 3], dims: [i64; 3]) -> Self {
        Extent([
            start[0],
            start[0] + dims[0] - 1,
            start[1],
            start[1] + dims[1] - 1,
            start[2],
            start[2] + dims[2] - 1,
        ])
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|d| self.0[2 * d] > self.0[2 * d + 1])
    }

    /// Number of points along each axis.
    pub fn point_dims(&self) -> [usize; 3] {
        let mut out = [0usize; 3];
        for (d, n) in out.iter_mut().enumerate() {
            let len = self.0[2 * d + 1] - self.0[2 * d] + 1;
            *n = len.max(0) as usize;
        }
        out
    }

    /// Number of cells along each axis; a flat axis counts as one.
    pub fn cell_dims(&self) -> [usize; 3] {
        let p = self.point_dims();
        let mut out = [0usize; 3];
        for d in 0..3 {
            out[d] = if p[d] == 0 { 0 } else { (p[d] - 1).max(1) };
        }
        out
    }

    pub fn num_points(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        self.point_dims().iter().product()
    }

    pub fn num_cells(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        self.cell_dims().iter().product()
    }

    /// Smallest extent containing both.
    pub fn union(&self, other: &Extent) -> Extent {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let mut e = self.0;
        for d in 0..3 {
            e[2 * d] = e[2 * d].min(other.0[2 * d]);
            e[2 * d + 1] = e[2 * d + 1].max(other.0[2 * d + 1]);
        }
        Extent(e)
    }
}

/// Axis-aligned box `[x0, x1, y0, y1, z0, z1]`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds(pub [f64; 6]);

impl Bounds {
    pub const EMPTY: Bounds = Bounds([
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
    ]);

    pub fn is_empty(&self) -> bool {
        (0..3).any(|d| self.0[2 * d] > self.0[2 * d + 1])
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        let mut b = self.0;
        for d in 0..3 {
            b[2 * d] = b[2 * d].min(other.0[2 * d]);
            b[2 * d + 1] = b[2 * d + 1].max(other.0[2 * d + 1]);
        }
        Bounds(b)
    }
}

/// Uniform-grid geometry: `x = origin + i * spacing`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageGeometry {
    pub origin: [f64; 3],
    pub spacing: [f64; 3],
}

impl Default for ImageGeometry {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            spacing: [1.0; 3],
        }
    }
}

/// One block of a distributed mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockMesh {
    pub block_id: usize,
    pub kind: MeshType,
    pub extent: Option<Extent>,
    /// Absent when the mesh was requested structure-only.
    pub geometry: Option<ImageGeometry>,
    /// Explicit point coordinates (`x y z` triples) for non-image blocks.
    pub points: Option<Arc<[f64]>>,
    pub num_points: usize,
    pub num_cells: usize,
    point_arrays: BTreeMap<String, FieldArray>,
    cell_arrays: BTreeMap<String, FieldArray>,
}

impl BlockMesh {
    /// An image-data block over `extent`.
    pub fn image(block_id: usize, extent: Extent, geometry: Option<ImageGeometry>) -> Self {
        Self {
            block_id,
            kind: MeshType::ImageData,
            extent: Some(extent),
            geometry,
            points: None,
            num_points: extent.num_points(),
            num_cells: extent.num_cells(),
            point_arrays: BTreeMap::new(),
            cell_arrays: BTreeMap::new(),
        }
    }

    /// A block with explicit sizes and no structured extent.
    pub fn unstructured(block_id: usize, num_points: usize, num_cells: usize) -> Self {
        Self {
            block_id,
            kind: MeshType::UnstructuredGrid,
            extent: None,
            geometry: None,
            points: None,
            num_points,
            num_cells,
            point_arrays: BTreeMap::new(),
            cell_arrays: BTreeMap::new(),
        }
    }

    pub fn with_points(mut self, xyz: Arc<[f64]>) -> Self {
        self.num_points = xyz.len() / 3;
        self.points = Some(xyz);
        self
    }

    /// Bounding box of the block's geometry, `None` for structure-only blocks.
    pub fn bounds(&self) -> Option<Bounds> {
        if let (Some(ext), Some(g)) = (self.extent, self.geometry) {
            if ext.is_empty() {
                return None;
            }
            let mut b = [0.0; 6];
            for d in 0..3 {
                b[2 * d] = g.origin[d] + ext.0[2 * d] as f64 * g.spacing[d];
                b[2 * d + 1] = g.origin[d] + ext.0[2 * d + 1] as f64 * g.spacing[d];
            }
            return Some(Bounds(b));
        }
        let xyz = self.points.as_ref()?;
        if xyz.len() < 3 {
            return None;
        }
        let b = xyz.chunks_exact(3).fold(Bounds::EMPTY, |acc, p| {
            acc.union(&Bounds([p[0], p[0], p[1], p[1], p[2], p[2]]))
        });
        Some(b)
    }

    /// Number of tuples an array with this centering must carry.
    pub fn num_tuples(&self, association: Association) -> usize {
        match association {
            Association::Point => self.num_points,
            Association::Cell => self.num_cells,
        }
    }

    fn arrays(&self, association: Association) -> &BTreeMap<String, FieldArray> {
        match association {
            Association::Point => &self.point_arrays,
            Association::Cell => &self.cell_arrays,
        }
    }

    pub fn insert_array(&mut self, array: FieldArray) {
        let map = match array.association {
            Association::Point => &mut self.point_arrays,
            Association::Cell => &mut self.cell_arrays,
        };
        map.insert(array.name.clone(), array);
    }

    pub fn array(&self, association: Association, name: &str) -> Option<&FieldArray> {
        self.arrays(association).get(name)
    }

    pub fn has_array(&self, association: Association, name: &str) -> bool {
        self.arrays(association).contains_key(name)
    }

    /// Arrays with the given centering, ordered by name.
    pub fn array_iter(&self, association: Association) -> impl Iterator<Item = &FieldArray> {
        self.arrays(association).values()
    }

    /// Copy of the block without geometry or arrays.
    pub fn structure_only(&self) -> Self {
        Self {
            geometry: None,
            points: None,
            point_arrays: BTreeMap::new(),
            cell_arrays: BTreeMap::new(),
            ..self.clone()
        }
    }
}

/// A distributed mesh as seen from one rank.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiBlockMesh {
    pub name: String,
    pub num_blocks: usize,
    blocks: BTreeMap<usize, BlockMesh>,
    /// Release epoch of the adaptor that produced this handle.
    pub(crate) generation: u64,
}

impl MultiBlockMesh {
    pub fn new(name: impl Into<String>, num_blocks: usize) -> Self {
        Self {
            name: name.into(),
            num_blocks,
            blocks: BTreeMap::new(),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn set_block(&mut self, block: BlockMesh) {
        self.blocks.insert(block.block_id, block);
    }

    pub fn take_block(&mut self, block_id: usize) -> Option<BlockMesh> {
        self.blocks.remove(&block_id)
    }

    pub fn block(&self, block_id: usize) -> Option<&BlockMesh> {
        self.blocks.get(&block_id)
    }

    pub fn block_mut(&mut self, block_id: usize) -> Option<&mut BlockMesh> {
        self.blocks.get_mut(&block_id)
    }

    /// Locally present blocks in ascending block id order.
    pub fn blocks(&self) -> impl Iterator<Item = &BlockMesh> {
        self.blocks.values()
    }

    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut BlockMesh> {
        self.blocks.values_mut()
    }

    pub fn local_block_ids(&self) -> Vec<usize> {
        self.blocks.keys().copied().collect()
    }

    pub fn num_local_blocks(&self) -> usize {
        self.blocks.len()
    }
}
