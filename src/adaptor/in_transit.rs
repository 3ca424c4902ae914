//! Data adaptor that repartitions another adaptor's blocks before handing
//! them to analyses.
//!
//! Every rank of the communicator wraps its own producer adaptor. Asking for
//! a mesh pulls the producer's local blocks, lets the [`Partitioner`] pick a
//! destination for each block and moves them with one all-to-all exchange.
//! Arrays requested later follow the same placement. All data-bearing calls
//! are collective.

use crate::adaptor::{AdaptorLifecycle, AdaptorState, DataAdaptor};
use crate::algs::communicator::Communicator;
use crate::algs::exchange::{redistribute, redistribute_array};
use crate::data::array::Association;
use crate::data::mesh::MultiBlockMesh;
use crate::data::metadata::MeshMetadata;
use crate::partitioning::{PartitionMap, PartitionMetrics, Partitioner, consumer_view};
use crate::sensei_error::SenseiError;
use hashbrown::HashMap;
use std::sync::Arc;

/// Producer-side state kept per mesh for the current timestep.
struct Placement {
    remote: MeshMetadata,
    map: PartitionMap,
    source: MultiBlockMesh,
}

/// Repartitioning view of the producer `P`. Name a concrete `P` to reach it
/// through [`producer_mut`](Self::producer_mut) between steps.
pub struct InTransitDataAdaptor<C, P = dyn DataAdaptor>
where
    C: Communicator + ?Sized,
    P: DataAdaptor + ?Sized,
{
    comm: Arc<C>,
    producer: Box<P>,
    partitioner: Box<dyn Partitioner>,
    placements: HashMap<String, Placement>,
    lifecycle: AdaptorLifecycle,
}

impl<C, P> std::fmt::Debug for InTransitDataAdaptor<C, P>
where
    C: Communicator + ?Sized,
    P: DataAdaptor + ?Sized,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InTransitDataAdaptor")
            .field("rank", &self.comm.rank())
            .field("partitioner", &self.partitioner.name())
            .field("meshes", &self.placements.keys().collect::<Vec<_>>())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl<C, P> InTransitDataAdaptor<C, P>
where
    C: Communicator + ?Sized,
    P: DataAdaptor + ?Sized,
{
    pub fn new(
        comm: Arc<C>,
        producer: Box<P>,
        partitioner: Box<dyn Partitioner>,
    ) -> Self {
        let mut lifecycle = AdaptorLifecycle::new();
        lifecycle.initialize();
        Self {
            comm,
            producer,
            partitioner,
            placements: HashMap::new(),
            lifecycle,
        }
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    pub fn producer_mut(&mut self) -> &mut P {
        &mut self.producer
    }

    pub fn partitioner(&self) -> &dyn Partitioner {
        self.partitioner.as_ref()
    }

    /// Producer metadata as a global view.
    fn remote_metadata(&self, mesh_id: usize) -> Result<MeshMetadata, SenseiError> {
        self.producer
            .mesh_metadata(mesh_id)?
            .globalize_view(self.comm.as_ref())
    }

    fn remote_metadata_by_name(&self, mesh_name: &str) -> Result<MeshMetadata, SenseiError> {
        for id in 0..self.producer.number_of_meshes()? {
            let md = self.remote_metadata(id)?;
            if md.mesh_name == mesh_name {
                return Ok(md);
            }
        }
        Err(SenseiError::MeshNotFound(mesh_name.to_string()))
    }

    fn plan(&self, remote: &MeshMetadata) -> Result<PartitionMap, SenseiError> {
        let map = self
            .partitioner
            .partition(remote, &consumer_view(self.comm.size()))?;
        if self.comm.rank() == 0 {
            let m = PartitionMetrics::of(&map, remote);
            log::debug!(
                "{} partition of `{}`: {}..{} blocks per rank, imbalance {:.2}, {} moved",
                self.partitioner.name(),
                remote.mesh_name,
                m.min_blocks,
                m.max_blocks,
                m.imbalance,
                m.moved_blocks
            );
        }
        Ok(map)
    }
}

impl<C, P> DataAdaptor for InTransitDataAdaptor<C, P>
where
    C: Communicator + ?Sized,
    P: DataAdaptor + ?Sized,
{
    fn number_of_meshes(&self) -> Result<usize, SenseiError> {
        self.lifecycle.require_initialized("number_of_meshes")?;
        self.producer.number_of_meshes()
    }

    /// Collective. The view this rank holds after repartitioning.
    fn mesh_metadata(&self, mesh_id: usize) -> Result<MeshMetadata, SenseiError> {
        self.lifecycle.require_initialized("mesh_metadata")?;
        let remote = self.remote_metadata(mesh_id)?;
        let map = self.plan(&remote)?;
        map.reowned(&remote)
    }

    /// Collective.
    fn mesh(
        &mut self,
        mesh_name: &str,
        structure_only: bool,
    ) -> Result<MultiBlockMesh, SenseiError> {
        self.lifecycle.require_populated("mesh")?;
        let remote = self.remote_metadata_by_name(mesh_name)?;
        let map = self.plan(&remote)?;
        let source = self.producer.mesh(mesh_name, structure_only)?;
        let moved = redistribute(self.comm.as_ref(), &remote, &map, &source)?;
        self.placements.insert(
            mesh_name.to_string(),
            Placement { remote, map, source },
        );
        Ok(moved.with_generation(self.lifecycle.generation()))
    }

    /// Collective.
    fn add_array(
        &mut self,
        mesh: &mut MultiBlockMesh,
        mesh_name: &str,
        association: Association,
        array_name: &str,
    ) -> Result<(), SenseiError> {
        self.lifecycle.require_current(mesh)?;
        let placement = self
            .placements
            .get_mut(mesh_name)
            .ok_or_else(|| SenseiError::MeshNotFound(mesh_name.to_string()))?;
        self.producer
            .add_array(&mut placement.source, mesh_name, association, array_name)?;
        redistribute_array(
            self.comm.as_ref(),
            &placement.remote,
            &placement.map,
            &placement.source,
            association,
            array_name,
            mesh,
        )
    }

    fn release_data(&mut self) -> Result<(), SenseiError> {
        self.placements.clear();
        self.producer.release_data()?;
        self.lifecycle.release();
        Ok(())
    }

    fn set_data_time(&mut self, time: f64) {
        self.producer.set_data_time(time);
        self.lifecycle.set_time(time);
    }

    fn set_data_time_step(&mut self, step: u64) {
        self.producer.set_data_time_step(step);
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
