use proptest::prelude::*;
use sensei::algs::wire::{KIND_BLOCKS, WIRE_VERSION, decode_blocks, encode_blocks, points_from};
use sensei::data::{Association, BlockMesh, Extent, FieldArray, ImageGeometry};
use sensei::sensei_error::SenseiError;

fn sample_block() -> BlockMesh {
    let mut b = BlockMesh::image(
        3,
        Extent([0, 2, 0, 1, 0, 0]),
        Some(ImageGeometry {
            origin: [1.0, 2.0, 3.0],
            spacing: [0.5, 0.5, 1.0],
        }),
    );
    b.insert_array(FieldArray::new(
        "velocity",
        Association::Point,
        3,
        vec![0.0f64; 18],
    ));
    b.insert_array(FieldArray::scalar("id", Association::Cell, vec![1i64, 2]));
    b
}

#[test]
fn empty_message_decodes_to_nothing() {
    let bytes = encode_blocks(std::iter::empty());
    assert!(decode_blocks(&bytes).unwrap().is_empty());
}

#[test]
fn foreign_version_is_rejected() {
    let mut bytes = encode_blocks([&sample_block()]);
    bytes[..2].copy_from_slice(&(WIRE_VERSION + 1).to_le_bytes());
    assert!(matches!(decode_blocks(&bytes), Err(SenseiError::Wire(_))));
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut bytes = encode_blocks([&sample_block()]);
    bytes.push(0);
    assert!(matches!(decode_blocks(&bytes), Err(SenseiError::Wire(_))));
}

#[test]
fn oversized_block_count_is_a_wire_error() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&WIRE_VERSION.to_le_bytes());
    bytes.extend_from_slice(&KIND_BLOCKS.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    assert!(matches!(decode_blocks(&bytes), Err(SenseiError::Wire(_))));
}

#[test]
fn every_truncation_fails_cleanly() {
    let bytes = encode_blocks([&sample_block()]);
    for cut in 0..bytes.len() {
        assert!(
            matches!(decode_blocks(&bytes[..cut]), Err(SenseiError::Wire(_))),
            "cut at {cut} decoded"
        );
    }
}

#[test]
fn multi_component_arrays_keep_their_shape() {
    let got = decode_blocks(&encode_blocks([&sample_block()])).unwrap();
    let v = got[0].array(Association::Point, "velocity").unwrap();
    assert_eq!(v.components, 3);
    assert_eq!(v.num_tuples(), 6);
    assert_eq!(got[0], sample_block());
}

proptest! {
    #[test]
    fn unstructured_blocks_survive_the_wire(
        blocks in prop::collection::vec(
            (
                0usize..1000,
                prop::collection::vec(-1e6f64..1e6, 0..32),
                prop::collection::vec(any::<i32>(), 0..8),
            ),
            0..6,
        )
    ) {
        let sent: Vec<BlockMesh> = blocks
            .into_iter()
            .map(|(id, xs, cells)| {
                let xyz: Vec<[f64; 3]> = xs.iter().map(|&x| [x, -x, 0.5 * x]).collect();
                let mut b = BlockMesh::unstructured(id, 0, cells.len())
                    .with_points(points_from(&xyz));
                b.insert_array(FieldArray::scalar("x", Association::Point, xs));
                b.insert_array(FieldArray::scalar("cell_id", Association::Cell, cells));
                b
            })
            .collect();
        let got = decode_blocks(&encode_blocks(&sent)).unwrap();
        prop_assert_eq!(got, sent);
    }
}
