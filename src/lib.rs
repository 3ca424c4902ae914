#![cfg_attr(docsrs, feature(doc_cfg))]
//! # sensei-rs
//!
//! sensei-rs is the core of an in situ / in transit analysis framework. A
//! running simulation exposes its distributed meshes through a data adaptor;
//! analyses pull only the metadata, structure and arrays they need, every
//! timestep, without copying the simulation's buffers.
//!
//! ## Features
//! - [`DataAdaptor`](adaptor::DataAdaptor) with an explicit lifecycle and
//!   generation-stamped mesh handles that go stale on release
//! - [`MeshMetadata`](data::MeshMetadata) in local and global views,
//!   gathered across ranks with bincode
//! - Block partitioners (block, cyclic, planar, mapped) and an all-to-all
//!   block exchange for in transit analysis
//! - A parallel histogram and an XML-configured analysis front end
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! sensei-rs = "0.3"
//! # features = ["mpi-support"]
//! ```
//!
//! Simulations normally only touch [`bridge::Bridge`]; everything else is
//! for writing new adaptors and analyses.
//!
//! ## Collectives
//! Every call that talks to other ranks blocks until all ranks of the
//! communicator reach it. There are no timeouts. Such calls are marked
//! *collective* in their docs and must be made by every rank in the same
//! order.

pub mod adaptor;
pub mod algs;
pub mod analysis;
pub mod bridge;
pub mod data;
pub mod partitioning;
pub mod sensei_error;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::adaptor::{
        AdaptorState, DataAdaptor, ImageDataAdaptor, InTransitDataAdaptor,
        ProgrammableDataAdaptor,
    };
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, LocalComm, NoComm};
    pub use crate::analysis::{AnalysisAdaptor, ConfigurableAnalysis, Histogram, HistogramConfig};
    pub use crate::bridge::{Bridge, BridgeArrays};
    pub use crate::data::{
        Association, BlockMesh, FieldArray, MeshMetadata, MeshType, MetadataFlags,
        MultiBlockMesh, ScalarType,
    };
    pub use crate::partitioning::{PartitionMap, Partitioner, PlanarPartitioner};
    pub use crate::sensei_error::SenseiError;
}
