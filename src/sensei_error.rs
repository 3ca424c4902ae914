//! SenseiError: Unified error type for sensei public APIs
//!
//! Local, per-call errors (bad identifiers, unset callbacks, missing results)
//! are recoverable: the caller skips the analysis for the current timestep.
//! Collective failures are not; see [`SenseiError::is_fatal`].

use crate::data::array::Association;
use crate::adaptor::AdaptorState;
use thiserror::Error;

/// Unified error type for sensei operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SenseiError {
    /// An adaptor method was called outside its valid lifecycle phase.
    #[error("invalid adaptor state: `{op}` is not allowed while {state:?}")]
    InvalidState {
        op: &'static str,
        state: AdaptorState,
    },
    /// A mesh handle from an earlier timestep was used after `release_data`.
    #[error("stale mesh handle for `{mesh}` (generation {handle}, adaptor at {current})")]
    StaleHandle {
        mesh: String,
        handle: u64,
        current: u64,
    },
    /// Mesh index outside `[0, number_of_meshes)`.
    #[error("invalid mesh id {id} (adaptor exposes {count} meshes)")]
    InvalidMeshId { id: usize, count: usize },
    /// No mesh with the requested name.
    #[error("no mesh named `{0}`")]
    MeshNotFound(String),
    /// The array does not exist on the mesh with the given centering.
    #[error("array `{array}` ({association}) not found on mesh `{mesh}`")]
    ArrayNotFound {
        mesh: String,
        array: String,
        association: Association,
    },
    /// Bad user-supplied parameters (partitioner plane size, bin count, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Metadata violates one of its structural invariants.
    #[error("invalid mesh metadata: {0}")]
    InvalidMetadata(String),
    /// A programmable adaptor callback was never registered.
    #[error("`{0}` is not implemented by this adaptor")]
    NotImplemented(&'static str),
    /// Result queried before the first successful execute.
    #[error("no result available: `{0}` has not executed successfully")]
    NoResultAvailable(&'static str),
    /// A collective or point-to-point exchange failed.
    #[error("communication failure: {0}")]
    CommunicationFailure(String),
    /// Malformed payload received from a peer.
    #[error("wire decode error: {0}")]
    Wire(String),
    /// The XML configuration could not be parsed.
    #[error("configuration parse error in `{path}`: {message}")]
    ConfigParse { path: String, message: String },
    /// File system failure (config read, result output).
    #[error("I/O error on `{path}`: {message}")]
    Io { path: String, message: String },
}

impl SenseiError {
    /// True for errors that must terminate the whole run.
    ///
    /// A failed collective leaves peers blocked in the same call, so nothing
    /// after it can be trusted on any rank.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SenseiError::CommunicationFailure(_))
    }

    pub(crate) fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        SenseiError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
