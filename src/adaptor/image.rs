//! Data adaptor for the `parallel3d` miniapp: a uniform grid split into one
//! image block per rank.
//!
//! The simulation hands over its point arrays once per timestep; the adaptor
//! keeps reference-counted views of them and never copies the values.

use crate::adaptor::{AdaptorLifecycle, AdaptorState, DataAdaptor};
use crate::algs::communicator::Communicator;
use crate::data::array::{ArrayValues, Association, FieldArray, GHOST_ARRAY_NAME, ScalarType};
use crate::data::mesh::{BlockMesh, Extent, ImageGeometry, MeshType, MultiBlockMesh};
use crate::data::metadata::{MeshMetadata, MetadataFlags};
use crate::sensei_error::SenseiError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name of the only mesh this adaptor exposes.
pub const MESH_NAME: &str = "mesh";

/// Where this rank's block sits in the global grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageLayout {
    /// Global point dimensions.
    pub global_dims: [usize; 3],
    /// Point dimensions of the local block.
    pub local_dims: [usize; 3],
    /// Global index of the local block's first point.
    pub start: [usize; 3],
    /// Blocks along each axis.
    pub block_grid: [usize; 3],
    /// 3-D position of the local block in the block grid.
    pub block: [usize; 3],
}

impl ImageLayout {
    pub fn num_blocks(&self) -> usize {
        self.block_grid.iter().product()
    }

    /// Flat block id, x fastest.
    pub fn block_id(&self) -> usize {
        let [nx, ny, _] = self.block_grid;
        self.block[0] + nx * (self.block[1] + ny * self.block[2])
    }

    pub fn extent(&self) -> Extent {
        Extent::from_start_and_dims(
            self.start.map(|s| s as i64),
            self.local_dims.map(|d| d as i64),
        )
    }

    pub fn whole_extent(&self) -> Extent {
        Extent::from_start_and_dims([0; 3], self.global_dims.map(|d| d as i64))
    }

    fn check(&self) -> Result<(), SenseiError> {
        for d in 0..3 {
            if self.block_grid[d] == 0 || self.block[d] >= self.block_grid[d] {
                return Err(SenseiError::InvalidConfiguration(format!(
                    "block {:?} outside block grid {:?}",
                    self.block, self.block_grid
                )));
            }
            if self.local_dims[d] == 0 || self.start[d] + self.local_dims[d] > self.global_dims[d] {
                return Err(SenseiError::InvalidConfiguration(format!(
                    "local block at {:?} with dims {:?} exceeds global dims {:?}",
                    self.start, self.local_dims, self.global_dims
                )));
            }
        }
        Ok(())
    }
}

/// `parallel3d` data adaptor.
pub struct ImageDataAdaptor<C: Communicator + ?Sized> {
    comm: Arc<C>,
    layout: ImageLayout,
    geometry: ImageGeometry,
    arrays: BTreeMap<String, ArrayValues>,
    ghosts: Option<ArrayValues>,
    lifecycle: AdaptorLifecycle,
}

impl<C: Communicator + ?Sized> std::fmt::Debug for ImageDataAdaptor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageDataAdaptor")
            .field("rank", &self.comm.rank())
            .field("layout", &self.layout)
            .field("arrays", &self.arrays.keys().collect::<Vec<_>>())
            .field("ghosts", &self.ghosts.is_some())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl<C: Communicator + ?Sized> ImageDataAdaptor<C> {
    pub fn new(comm: Arc<C>, layout: ImageLayout) -> Result<Self, SenseiError> {
        layout.check()?;
        let mut lifecycle = AdaptorLifecycle::new();
        lifecycle.initialize();
        log::debug!(
            "rank {} holds image block {} of {} at {:?}",
            comm.rank(),
            layout.block_id(),
            layout.num_blocks(),
            layout.extent()
        );
        Ok(Self {
            comm,
            layout,
            geometry: ImageGeometry::default(),
            arrays: BTreeMap::new(),
            ghosts: None,
            lifecycle,
        })
    }

    pub fn with_geometry(mut self, geometry: ImageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    fn num_local_points(&self) -> usize {
        self.layout.extent().num_points()
    }

    fn check_len(&self, name: &str, values: &ArrayValues) -> Result<(), SenseiError> {
        let expected = self.num_local_points();
        if values.len() != expected {
            return Err(SenseiError::InvalidConfiguration(format!(
                "point array `{name}` has {} values, block has {expected} points",
                values.len()
            )));
        }
        Ok(())
    }

    /// Expose a point array for the current timestep.
    pub fn set_point_array(
        &mut self,
        name: impl Into<String>,
        values: impl Into<ArrayValues>,
    ) -> Result<(), SenseiError> {
        let name = name.into();
        let values = values.into();
        self.check_len(&name, &values)?;
        self.arrays.insert(name, values);
        Ok(())
    }

    /// Per-point ghost flags; non-zero marks a ghost point.
    pub fn set_ghost_array(&mut self, values: Arc<[u8]>) -> Result<(), SenseiError> {
        let values = ArrayValues::from(values);
        self.check_len(GHOST_ARRAY_NAME, &values)?;
        self.ghosts = Some(values);
        Ok(())
    }

    fn local_metadata(&self) -> MeshMetadata {
        let layout = &self.layout;
        let extent = layout.extent();
        let block = BlockMesh::image(layout.block_id(), extent, Some(self.geometry));
        let whole = BlockMesh::image(0, layout.whole_extent(), Some(self.geometry));

        let mut md = MeshMetadata::new();
        md.mesh_name = MESH_NAME.to_string();
        md.mesh_type = MeshType::MultiBlock;
        md.block_type = MeshType::ImageData;
        md.num_blocks = layout.num_blocks();
        md.num_blocks_local = vec![1];
        md.extent = Some(layout.whole_extent());
        md.bounds = whole.bounds();
        md.num_points = block.num_points;
        md.num_cells = block.num_cells;
        md.static_mesh = true;
        for (name, values) in &self.arrays {
            md.add_array(name.clone(), Association::Point, values.scalar_type(), 1);
        }
        if let Some(ghosts) = &self.ghosts {
            md.add_array(GHOST_ARRAY_NAME, Association::Point, ScalarType::U8, 1);
            md.num_ghost_nodes = (0..ghosts.len())
                .filter(|&i| ghosts.get_f64(i).is_some_and(|g| g != 0.0))
                .count();
        }

        md.block_owner = vec![self.comm.rank()];
        md.block_ids = vec![block.block_id];
        md.block_num_points = vec![block.num_points];
        md.block_num_cells = vec![block.num_cells];
        md.block_extents = vec![extent];
        md.block_bounds = block.bounds().into_iter().collect();
        md.flags = MetadataFlags::BLOCK_DECOMP
            | MetadataFlags::BLOCK_SIZE
            | MetadataFlags::BLOCK_EXTENTS
            | MetadataFlags::BLOCK_BOUNDS;
        md
    }
}

impl<C: Communicator + ?Sized> DataAdaptor for ImageDataAdaptor<C> {
    fn number_of_meshes(&self) -> Result<usize, SenseiError> {
        self.lifecycle.require_initialized("number_of_meshes")?;
        Ok(1)
    }

    /// Collective: every rank must ask for the same mesh.
    fn mesh_metadata(&self, mesh_id: usize) -> Result<MeshMetadata, SenseiError> {
        self.lifecycle.require_initialized("mesh_metadata")?;
        if mesh_id != 0 {
            return Err(SenseiError::InvalidMeshId { id: mesh_id, count: 1 });
        }
        self.local_metadata().globalize_view(self.comm.as_ref())
    }

    fn mesh(
        &mut self,
        mesh_name: &str,
        structure_only: bool,
    ) -> Result<MultiBlockMesh, SenseiError> {
        self.lifecycle.require_populated("mesh")?;
        if mesh_name != MESH_NAME {
            return Err(SenseiError::MeshNotFound(mesh_name.to_string()));
        }
        let geometry = (!structure_only).then_some(self.geometry);
        let mut mesh = MultiBlockMesh::new(MESH_NAME, self.layout.num_blocks());
        mesh.set_block(BlockMesh::image(
            self.layout.block_id(),
            self.layout.extent(),
            geometry,
        ));
        Ok(mesh.with_generation(self.lifecycle.generation()))
    }

    fn add_array(
        &mut self,
        mesh: &mut MultiBlockMesh,
        mesh_name: &str,
        association: Association,
        array_name: &str,
    ) -> Result<(), SenseiError> {
        self.lifecycle.require_current(mesh)?;
        if mesh_name != MESH_NAME {
            return Err(SenseiError::MeshNotFound(mesh_name.to_string()));
        }
        let values = match association {
            Association::Point if array_name == GHOST_ARRAY_NAME => self.ghosts.as_ref(),
            Association::Point => self.arrays.get(array_name),
            Association::Cell => None,
        };
        let values = values.ok_or_else(|| SenseiError::ArrayNotFound {
            mesh: mesh_name.to_string(),
            array: array_name.to_string(),
            association,
        })?;
        for block in mesh.blocks_mut() {
            block.insert_array(FieldArray::scalar(array_name, association, values.clone()));
        }
        Ok(())
    }

    fn release_data(&mut self) -> Result<(), SenseiError> {
        self.arrays.clear();
        self.ghosts = None;
        self.lifecycle.release();
        Ok(())
    }

    fn set_data_time(&mut self, time: f64) {
        self.lifecycle.set_time(time);
    }

    fn set_data_time_step(&mut self, step: u64) {
        self.lifecycle.set_time_step(step);
    }

    fn data_time(&self) -> f64 {
        self.lifecycle.time()
    }

    fn data_time_step(&self) -> u64 {
        self.lifecycle.time_step()
    }

    fn state(&self) -> AdaptorState {
        self.lifecycle.state()
    }
}
