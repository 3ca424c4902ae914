use super::*;
use crate::data::array::{Association, ScalarType};

fn remote(num_blocks: usize) -> MeshMetadata {
    let mut md = MeshMetadata::new();
    md.global_view = true;
    md.mesh_name = "mesh".into();
    md.num_blocks = num_blocks;
    md.num_blocks_local = vec![num_blocks];
    md.block_ids = (0..num_blocks).rev().collect();
    md.block_owner = vec![0; num_blocks];
    md.block_num_points = vec![8; num_blocks];
    md.block_num_cells = vec![1; num_blocks];
    md.flags = MetadataFlags::BLOCK_DECOMP | MetadataFlags::BLOCK_SIZE;
    md.add_array("data", Association::Cell, ScalarType::F32, 1);
    md
}

#[test]
fn map_rejects_out_of_world_ranks() {
    assert!(PartitionMap::new(vec![0, 2], 2).is_err());
    assert!(PartitionMap::new(vec![], 0).is_err());
    let m = PartitionMap::new(vec![1, 0, 1], 2).unwrap();
    assert_eq!(m.blocks_for(1), vec![0, 2]);
    assert_eq!(m.counts(), vec![1, 2]);
    assert_eq!(m.owner(3), None);
}

#[test]
fn apply_moves_block_metadata() {
    let md = remote(4);
    let map = PartitionMap::new(vec![0, 1, 0, 1], 2).unwrap();
    let g = map.reowned(&md).unwrap();
    assert_eq!(g.block_owner, vec![1, 0, 1, 0]);
    assert_eq!(g.num_blocks_local, vec![2, 2]);
    g.validate_for(2, MetadataFlags::BLOCK_DECOMP).unwrap();

    let l1 = map.apply(&md, 1).unwrap();
    assert!(!l1.global_view);
    assert_eq!(l1.block_ids, vec![3, 1]);
    assert_eq!(l1.num_points, 16);
}

#[test]
fn world_size_falls_back_to_remote() {
    let md = remote(3);
    assert_eq!(world_size_of(&md, &consumer_view(4)), 4);
    assert_eq!(world_size_of(&md, &MeshMetadata::new()), 1);
}

#[test]
fn partitioners_from_xml() {
    let doc = roxmltree::Document::parse(
        r#"<sensei>
             <partitioner type="planar" plane_size="3"/>
             <partitioner type="mapped" block_owner="1 0 1"/>
             <partitioner type="planar" plane_size="0"/>
             <partitioner type="spiral"/>
             <partitioner/>
           </sensei>"#,
    )
    .unwrap();
    let nodes: Vec<_> = doc.root_element().children().filter(|n| n.is_element()).collect();
    assert_eq!(partitioner_from_xml(nodes[0]).unwrap().name(), "planar");
    assert_eq!(partitioner_from_xml(nodes[1]).unwrap().name(), "mapped");
    assert!(matches!(
        partitioner_from_xml(nodes[2]),
        Err(SenseiError::InvalidConfiguration(_))
    ));
    assert!(partitioner_from_xml(nodes[3]).is_err());
    assert_eq!(partitioner_from_xml(nodes[4]).unwrap().name(), "block");
}


#[test]
fn deserialized_planar_is_rechecked() {
    let p: PlanarPartitioner = serde_json::from_str(r#"{"plane_size":0}"#).unwrap();
    assert!(matches!(
        p.partition(&remote(4), &consumer_view(2)),
        Err(SenseiError::InvalidConfiguration(_))
    ));
    let p: PlanarPartitioner = serde_json::from_str(r#"{"plane_size":2}"#).unwrap();
    assert_eq!(p.partition(&remote(4), &consumer_view(2)).unwrap().owners(), &[0, 0, 1, 1]);
}

#[test]
fn partition_map_serializes_owners() {
    let map = PartitionMap::new(vec![1, 0, 1], 2).unwrap();
    let v = serde_json::to_value(&map).unwrap();
    assert_eq!(v["owners"], serde_json::json!([1, 0, 1]));
    assert_eq!(v["world_size"], 2);
}
