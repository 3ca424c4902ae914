//! Data module: field arrays, block meshes and mesh metadata

pub mod array;
pub mod mesh;
pub mod metadata;

pub use array::{ArrayValues, Association, FieldArray, GHOST_ARRAY_NAME, ScalarType};
pub use mesh::{BlockMesh, Bounds, Extent, ImageGeometry, MeshType, MultiBlockMesh};
pub use metadata::{MeshMetadata, MetadataFlags};
