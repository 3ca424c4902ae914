//! Producer-side data adaptors.
//!
//! A simulation exposes its in-memory meshes through the [`DataAdaptor`]
//! trait. Analyses pull metadata first, then the mesh structure, then only
//! the arrays they need. Everything handed out is valid for the current
//! timestep only: [`DataAdaptor::release_data`] invalidates all mesh handles
//! in bulk.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized -> Initialized -> Populated <-> Released
//! ```
//!
//! `mesh` and `add_array` are only valid while `Populated`.

pub mod image;
pub mod in_transit;
pub mod programmable;

pub use image::ImageDataAdaptor;
pub use in_transit::InTransitDataAdaptor;
pub use programmable::ProgrammableDataAdaptor;

use crate::data::array::Association;
use crate::data::mesh::MultiBlockMesh;
use crate::data::metadata::MeshMetadata;
use crate::sensei_error::SenseiError;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a data adaptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdaptorState {
    Uninitialized,
    Initialized,
    Populated,
    Released,
}

/// The producer capability set.
pub trait DataAdaptor {
    /// Number of distinct named meshes currently exposed.
    fn number_of_meshes(&self) -> Result<usize, SenseiError>;

    /// Metadata of mesh `mesh_id`. Cheap, repeatable, side-effect free.
    fn mesh_metadata(&self, mesh_id: usize) -> Result<MeshMetadata, SenseiError>;

    /// Handle to the named mesh, valid until the next `release_data`.
    ///
    /// With `structure_only` the adaptor may leave out coordinates.
    fn mesh(&mut self, mesh_name: &str, structure_only: bool)
    -> Result<MultiBlockMesh, SenseiError>;

    /// Attach the named array to every local block of `mesh`.
    fn add_array(
        &mut self,
        mesh: &mut MultiBlockMesh,
        mesh_name: &str,
        association: Association,
        array_name: &str,
    ) -> Result<(), SenseiError>;

    /// Drop every handle produced since the last release. Idempotent.
    fn release_data(&mut self) -> Result<(), SenseiError>;

    fn set_data_time(&mut self, time: f64);
    fn set_data_time_step(&mut self, step: u64);
    fn data_time(&self) -> f64;
    fn data_time_step(&self) -> u64;

    fn state(&self) -> AdaptorState;

    /// Metadata of the mesh called `mesh_name`.
    fn mesh_metadata_by_name(&self, mesh_name: &str) -> Result<MeshMetadata, SenseiError> {
        for id in 0..self.number_of_meshes()? {
            let md = self.mesh_metadata(id)?;
            if md.mesh_name == mesh_name {
                return Ok(md);
            }
        }
        Err(SenseiError::MeshNotFound(mesh_name.to_string()))
    }
}

/// State machine, clock and handle generation shared by the concrete
/// adaptors.
#[derive(Clone, Debug)]
pub struct AdaptorLifecycle {
    state: AdaptorState,
    time: f64,
    time_step: u64,
    generation: u64,
}

impl Default for AdaptorLifecycle {
    fn default() -> Self {
        Self {
            state: AdaptorState::Uninitialized,
            time: 0.0,
            time_step: 0,
            generation: 0,
        }
    }
}

impl AdaptorLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AdaptorState {
        self.state
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn time_step(&self) -> u64 {
        self.time_step
    }

    /// Epoch stamped onto every mesh handed out while populated.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn initialize(&mut self) {
        if self.state == AdaptorState::Uninitialized {
            self.state = AdaptorState::Initialized;
        }
    }

    /// New timestep data is in place.
    pub fn populate(&mut self) -> Result<(), SenseiError> {
        match self.state {
            AdaptorState::Uninitialized => Err(SenseiError::InvalidState {
                op: "populate",
                state: self.state,
            }),
            _ => {
                self.state = AdaptorState::Populated;
                Ok(())
            }
        }
    }

    /// Record the simulation time; an initialized adaptor becomes populated.
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
        self.mark_populated();
    }

    pub fn set_time_step(&mut self, step: u64) {
        self.time_step = step;
        self.mark_populated();
    }

    fn mark_populated(&mut self) {
        if self.state != AdaptorState::Uninitialized {
            self.state = AdaptorState::Populated;
        }
    }

    /// `Populated -> Released`; any other state is left alone.
    pub fn release(&mut self) {
        if self.state == AdaptorState::Populated {
            self.state = AdaptorState::Released;
            self.generation += 1;
        }
    }

    pub fn require_initialized(&self, op: &'static str) -> Result<(), SenseiError> {
        match self.state {
            AdaptorState::Uninitialized => Err(SenseiError::InvalidState {
                op,
                state: self.state,
            }),
            _ => Ok(()),
        }
    }

    pub fn require_populated(&self, op: &'static str) -> Result<(), SenseiError> {
        match self.state {
            AdaptorState::Populated => Ok(()),
            state => Err(SenseiError::InvalidState { op, state }),
        }
    }

    /// `mesh` must have been produced in the current generation.
    pub fn require_current(&self, mesh: &MultiBlockMesh) -> Result<(), SenseiError> {
        self.require_populated("add_array")?;
        if mesh.generation() != self.generation {
            return Err(SenseiError::StaleHandle {
                mesh: mesh.name.clone(),
                handle: mesh.generation(),
                current: self.generation,
            });
        }
        Ok(())
    }
}
