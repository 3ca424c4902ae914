#![allow(dead_code)]
use sensei::adaptor::ProgrammableDataAdaptor;
use sensei::algs::communicator::LocalComm;
use sensei::data::{
    Association, BlockMesh, FieldArray, GHOST_ARRAY_NAME, MeshMetadata, MetadataFlags,
    MultiBlockMesh, ScalarType,
};
use sensei::sensei_error::SenseiError;
use std::sync::Arc;
use std::thread;

/// The 22-value array whose 7-bin histogram is `{1,2,4,6,5,3,1}`.
pub const HISTOGRAM_DATA: [f64; 22] = [
    0., 1., 1., 2., 2., 2., 2., 3., 3., 3., 3., 3., 3., 4., 4., 4., 4., 4., 5., 5., 5., 6.,
];

/// Run `f` on every rank of a fresh local universe; results in rank order.
pub fn on_ranks<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(LocalComm) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let handles: Vec<_> = LocalComm::universe(n)
        .into_iter()
        .map(|c| {
            let f = f.clone();
            thread::spawn(move || f(c))
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

/// One block of point data, as a simulation would hold it.
#[derive(Clone, Debug)]
pub struct PointBlock {
    pub block_id: usize,
    pub data: Arc<[f64]>,
    pub ghosts: Option<Arc<[u8]>>,
}

impl PointBlock {
    pub fn new(block_id: usize, data: &[f64]) -> Self {
        Self {
            block_id,
            data: data.into(),
            ghosts: None,
        }
    }

    pub fn with_ghosts(mut self, ghosts: &[u8]) -> Self {
        self.ghosts = Some(ghosts.into());
        self
    }
}

/// A programmable adaptor exposing mesh `mesh_name` with a point array
/// `data` over `blocks`, as this rank's local view of `num_blocks` blocks.
pub fn point_data_adaptor(
    mesh_name: &str,
    rank: usize,
    num_blocks: usize,
    blocks: Vec<PointBlock>,
) -> ProgrammableDataAdaptor {
    let blocks = Arc::new(blocks);
    let name = mesh_name.to_string();

    let md_blocks = blocks.clone();
    let md_name = name.clone();
    let mesh_blocks = blocks.clone();
    let array_blocks = blocks;

    ProgrammableDataAdaptor::new()
        .with_number_of_meshes(|| Ok(1))
        .with_mesh_metadata(move |id| {
            if id != 0 {
                return Err(SenseiError::InvalidMeshId { id, count: 1 });
            }
            let mut md = MeshMetadata::new();
            md.mesh_name = md_name.clone();
            md.num_blocks = num_blocks;
            md.num_blocks_local = vec![md_blocks.len()];
            md.block_ids = md_blocks.iter().map(|b| b.block_id).collect();
            md.block_owner = vec![rank; md_blocks.len()];
            md.block_num_points = md_blocks.iter().map(|b| b.data.len()).collect();
            md.block_num_cells = vec![0; md_blocks.len()];
            md.num_points = md.block_num_points.iter().sum();
            md.flags = MetadataFlags::BLOCK_DECOMP | MetadataFlags::BLOCK_SIZE;
            md.add_array("data", Association::Point, ScalarType::F64, 1);
            if md_blocks.iter().any(|b| b.ghosts.is_some()) {
                md.add_array(GHOST_ARRAY_NAME, Association::Point, ScalarType::U8, 1);
            }
            Ok(md)
        })
        .with_mesh(move |mesh_name, _structure_only| {
            if mesh_name != name {
                return Err(SenseiError::MeshNotFound(mesh_name.to_string()));
            }
            let mut mesh = MultiBlockMesh::new(mesh_name, num_blocks);
            for b in mesh_blocks.iter() {
                mesh.set_block(BlockMesh::unstructured(b.block_id, b.data.len(), 0));
            }
            Ok(mesh)
        })
        .with_add_array(move |mesh, mesh_name, association, array_name| {
            let missing = || SenseiError::ArrayNotFound {
                mesh: mesh_name.to_string(),
                array: array_name.to_string(),
                association,
            };
            if association != Association::Point {
                return Err(missing());
            }
            for b in array_blocks.iter() {
                let array = match array_name {
                    "data" => FieldArray::scalar("data", association, b.data.clone()),
                    GHOST_ARRAY_NAME => match &b.ghosts {
                        Some(g) => FieldArray::scalar(GHOST_ARRAY_NAME, association, g.clone()),
                        None => continue,
                    },
                    _ => return Err(missing()),
                };
                if let Some(block) = mesh.block_mut(b.block_id) {
                    block.insert_array(array);
                }
            }
            Ok(())
        })
}

/// Split `values` into `parts` nearly equal runs.
pub fn split(values: &[f64], parts: usize) -> Vec<Vec<f64>> {
    let chunk = values.len().div_ceil(parts);
    let mut out: Vec<Vec<f64>> = values.chunks(chunk).map(<[f64]>::to_vec).collect();
    out.resize(parts, Vec::new());
    out
}

