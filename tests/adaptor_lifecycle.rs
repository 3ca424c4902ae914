mod util;

use sensei::adaptor::image::{ImageDataAdaptor, ImageLayout, MESH_NAME};
use sensei::adaptor::{AdaptorState, DataAdaptor, ProgrammableDataAdaptor};
use sensei::algs::NoComm;
use sensei::data::{Association, MeshMetadata, MultiBlockMesh};
use sensei::sensei_error::SenseiError;
use std::sync::Arc;
use util::*;

fn image() -> ImageDataAdaptor<NoComm> {
    let layout = ImageLayout {
        global_dims: [3, 3, 1],
        local_dims: [3, 3, 1],
        start: [0; 3],
        block_grid: [1; 3],
        block: [0; 3],
    };
    ImageDataAdaptor::new(Arc::new(NoComm), layout).unwrap()
}

fn is_invalid_state<T: std::fmt::Debug>(r: Result<T, SenseiError>) -> bool {
    matches!(r, Err(SenseiError::InvalidState { .. }))
}

#[test]
fn mesh_requires_populated_adaptor() {
    let mut da = image();
    assert_eq!(da.state(), AdaptorState::Initialized);
    assert!(is_invalid_state(da.mesh(MESH_NAME, false)));

    da.set_data_time(0.5);
    assert_eq!(da.state(), AdaptorState::Populated);
    assert_eq!(da.data_time(), 0.5);
    let mesh = da.mesh(MESH_NAME, false).unwrap();
    assert_eq!(mesh.num_local_blocks(), 1);

    da.release_data().unwrap();
    assert!(is_invalid_state(da.mesh(MESH_NAME, false)));
}

#[test]
fn add_array_after_release_is_invalid_state() {
    let mut da = image();
    da.set_data_time_step(7);
    da.set_point_array("pressure", vec![1.0f64; 9]).unwrap();
    let mut mesh = da.mesh(MESH_NAME, true).unwrap();
    da.release_data().unwrap();
    assert!(is_invalid_state(da.add_array(
        &mut mesh,
        MESH_NAME,
        Association::Point,
        "pressure"
    )));
}

#[test]
fn release_twice_is_harmless() {
    let mut da = image();
    da.release_data().unwrap();
    da.set_data_time(1.0);
    da.release_data().unwrap();
    da.release_data().unwrap();
    assert_eq!(da.state(), AdaptorState::Released);

    let mut p = ProgrammableDataAdaptor::new();
    p.mark_populated().unwrap();
    p.release_data().unwrap();
    p.release_data().unwrap();
}

#[test]
fn handles_from_earlier_steps_are_stale() {
    let mut da = point_data_adaptor("image", 0, 1, vec![PointBlock::new(0, &[1.0, 2.0])]);
    da.set_data_time_step(0);
    let mut old = da.mesh("image", true).unwrap();
    da.release_data().unwrap();
    da.set_data_time_step(1);
    assert!(matches!(
        da.add_array(&mut old, "image", Association::Point, "data"),
        Err(SenseiError::StaleHandle { .. })
    ));
    let mut fresh = da.mesh("image", true).unwrap();
    da.add_array(&mut fresh, "image", Association::Point, "data")
        .unwrap();
}

#[test]
fn unknown_array_or_centering_is_array_not_found() {
    let mut da = point_data_adaptor("image", 0, 1, vec![PointBlock::new(0, &[1.0])]);
    da.set_data_time(0.0);
    let mut mesh = da.mesh("image", false).unwrap();
    assert!(matches!(
        da.add_array(&mut mesh, "image", Association::Cell, "data"),
        Err(SenseiError::ArrayNotFound { .. })
    ));
    assert!(matches!(
        da.add_array(&mut mesh, "image", Association::Point, "velocity"),
        Err(SenseiError::ArrayNotFound { .. })
    ));
}

#[test]
fn programmable_adaptor_delegates_metadata() {
    let da = ProgrammableDataAdaptor::new().with_mesh_metadata(|id| {
        if id != 0 {
            return Err(SenseiError::InvalidMeshId { id, count: 1 });
        }
        let mut md = MeshMetadata::new();
        md.mesh_name = "image".into();
        md.add_array(
            "data",
            Association::Point,
            sensei::data::ScalarType::F64,
            1,
        );
        Ok(md)
    });
    let md = da.mesh_metadata(0).unwrap();
    assert_eq!(md.mesh_name, "image");
    assert_eq!(md.array_name, vec!["data".to_string()]);
    assert_eq!(
        da.mesh_metadata(1),
        Err(SenseiError::InvalidMeshId { id: 1, count: 1 })
    );
}

#[test]
fn programmable_adaptor_without_add_array_callback() {
    let mut da = ProgrammableDataAdaptor::new()
        .with_mesh(|name, _| Ok(MultiBlockMesh::new(name, 1)));
    da.set_data_time(0.0);
    let mut mesh = da.mesh("image", false).unwrap();
    assert_eq!(
        da.add_array(&mut mesh, "image", Association::Point, "data"),
        Err(SenseiError::NotImplemented("add_array"))
    );
    assert_eq!(
        da.mesh_metadata(0),
        Err(SenseiError::NotImplemented("mesh_metadata"))
    );
}

#[test]
fn metadata_lookup_by_name() {
    let da = point_data_adaptor("image", 0, 1, vec![PointBlock::new(0, &[1.0])]);
    assert_eq!(da.mesh_metadata_by_name("image").unwrap().num_blocks, 1);
    assert_eq!(
        da.mesh_metadata_by_name("other"),
        Err(SenseiError::MeshNotFound("other".into()))
    );
}
