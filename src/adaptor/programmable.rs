//! A [`DataAdaptor`] assembled from closures.
//!
//! Simulations without a native adaptor (and most tests) register one
//! callback per capability instead of implementing the trait. A capability
//! whose callback was never registered fails with
//! [`SenseiError::NotImplemented`].
//!
//! ```
//! use sensei::adaptor::{DataAdaptor, ProgrammableDataAdaptor};
//! use sensei::data::{Association, MeshMetadata, ScalarType};
//! use sensei::sensei_error::SenseiError;
//!
//! let da = ProgrammableDataAdaptor::new()
//!     .with_number_of_meshes(|| Ok(1))
//!     .with_mesh_metadata(|id| {
//!         if id != 0 {
//!             return Err(SenseiError::InvalidMeshId { id, count: 1 });
//!         }
//!         let mut md = MeshMetadata::new();
//!         md.mesh_name = "image".into();
//!         md.add_array("data", Association::Point, ScalarType::F64, 1);
//!         Ok(md)
//!     });
//! assert_eq!(da.mesh_metadata(0).unwrap().array_name, vec!["data".to_string()]);
//! ```

use crate::adaptor::{AdaptorLifecycle, AdaptorState, DataAdaptor};
use crate::data::array::Association;
use crate::data::mesh::MultiBlockMesh;
use crate::data::metadata::MeshMetadata;
use crate::sensei_error::SenseiError;

pub type NumberOfMeshesFn = Box<dyn Fn() -> Result<usize, SenseiError>>;
pub type MeshMetadataFn = Box<dyn Fn(usize) -> Result<MeshMetadata, SenseiError>>;
pub type MeshFn = Box<dyn FnMut(&str, bool) -> Result<MultiBlockMesh, SenseiError>>;
pub type AddArrayFn =
    Box<dyn FnMut(&mut MultiBlockMesh, &str, Association, &str) -> Result<(), SenseiError>>;
pub type ReleaseDataFn = Box<dyn FnMut() -> Result<(), SenseiError>>;

/// Closure-backed data adaptor. Starts out `Initialized`.
pub struct ProgrammableDataAdaptor {
    number_of_meshes: Option<NumberOfMeshesFn>,
    mesh_metadata: Option<MeshMetadataFn>,
    mesh: Option<MeshFn>,
    add_array: Option<AddArrayFn>,
    release_data: Option<ReleaseDataFn>,
    lifecycle: AdaptorLifecycle,
}

impl Default for ProgrammableDataAdaptor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgrammableDataAdaptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgrammableDataAdaptor")
            .field("number_of_meshes", &self.number_of_meshes.is_some())
            .field("mesh_metadata", &self.mesh_metadata.is_some())
            .field("mesh", &self.mesh.is_some())
            .field("add_array", &self.add_array.is_some())
            .field("release_data", &self.release_data.is_some())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl ProgrammableDataAdaptor {
    pub fn new() -> Self {
        let mut lifecycle = AdaptorLifecycle::new();
        lifecycle.initialize();
        Self {
            number_of_meshes: None,
            mesh_metadata: None,
            mesh: None,
            add_array: None,
            release_data: None,
            lifecycle,
        }
    }

    pub fn with_number_of_meshes<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Result<usize, SenseiError> + 'static,
    {
        self.number_of_meshes = Some(Box::new(f));
        self
    }

    pub fn with_mesh_metadata<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) -> Result<MeshMetadata, SenseiError> + 'static,
    {
        self.mesh_metadata = Some(Box::new(f));
        self
    }

    pub fn with_mesh<F>(mut self, f: F) -> Self
    where
        F: FnMut(&str, bool) -> Result<MultiBlockMesh, SenseiError> + 'static,
    {
        self.mesh = Some(Box::new(f));
        self
    }

    pub fn with_add_array<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut MultiBlockMesh, &str, Association, &str) -> Result<(), SenseiError>
            + 'static,
    {
        self.add_array = Some(Box::new(f));
        self
    }

    pub fn with_release_data<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> Result<(), SenseiError> + 'static,
    {
        self.release_data = Some(Box::new(f));
        self
    }

    /// Declare that the callbacks now see a new timestep's data.
    pub fn mark_populated(&mut self) -> Result<(), SenseiError> {
        self.lifecycle.populate()
    }
}

impl DataAdaptor for ProgrammableDataAdaptor {
    fn number_of_meshes(&self) -> Result<usize, SenseiError> {
        self.lifecycle.require_initialized("number_of_meshes")?;
        let f = self
            .number_of_meshes
            .as_ref()
            .ok_or(SenseiError::NotImplemented("number_of_meshes"))?;
        f()
    }

    fn mesh_metadata(&self, mesh_id: usize) -> Result<MeshMetadata, SenseiError> {
        self.lifecycle.require_initialized("mesh_metadata")?;
        let f = self
            .mesh_metadata
            .as_ref()
            .ok_or(SenseiError::NotImplemented("mesh_metadata"))?;
        if let Some(count) = self.number_of_meshes.as_ref() {
            let count = count()?;
            if mesh_id >= count {
                return Err(SenseiError::InvalidMeshId { id: mesh_id, count });
            }
        }
        f(mesh_id)
    }

    fn mesh(
        &mut self,
        mesh_name: &str,
        structure_only: bool,
    ) -> Result<MultiBlockMesh, SenseiError> {
        self.lifecycle.require_populated("mesh")?;
        let f = self
            .mesh
            .as_mut()
            .ok_or(SenseiError::NotImplemented("mesh"))?;
        let mesh = f(mesh_name, structure_only)?;
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
        let f = self
            .add_array
            .as_mut()
            .ok_or(SenseiError::NotImplemented("add_array"))?;
        f(mesh, mesh_name, association, array_name)
    }

    /// Runs the release callback (when registered) once per populated
    /// timestep; repeated calls are no-ops.
    fn release_data(&mut self) -> Result<(), SenseiError> {
        if self.lifecycle.state() != AdaptorState::Populated {
            return Ok(());
        }
        if let Some(f) = self.release_data.as_mut() {
            f()?;
        }
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
