mod util;

use sensei::algs::communicator::{Communicator, LocalComm, MAX_USER_TAG};
use sensei::data::{Association, MeshMetadata, ScalarType};
use sensei::sensei_error::SenseiError;
use serial_test::serial;
use util::*;

#[test]
#[serial]
fn tags_keep_streams_apart() {
    let out = on_ranks(2, |c: LocalComm| {
        if c.rank() == 0 {
            c.send(1, 2, b"second").unwrap();
            c.send(1, 1, b"first").unwrap();
            Vec::new()
        } else {
            vec![c.recv(0, 1).unwrap(), c.recv(0, 2).unwrap()]
        }
    });
    assert_eq!(out[1], vec![b"first".to_vec(), b"second".to_vec()]);
}

#[test]
fn reserved_tags_and_bad_peers_fail() {
    let comms = LocalComm::universe(2);
    assert!(matches!(
        comms[0].send(1, MAX_USER_TAG + 1, &[]),
        Err(SenseiError::CommunicationFailure(_))
    ));
    assert!(matches!(
        comms[0].send(5, 0, &[]),
        Err(SenseiError::CommunicationFailure(_))
    ));
    assert!(SenseiError::CommunicationFailure("x".into()).is_fatal());
}

#[test]
#[serial]
fn metadata_globalizes_over_four_ranks() {
    let out = on_ranks(4, |c: LocalComm| {
        let rank = c.rank();
        let mut md = MeshMetadata::new();
        md.mesh_name = "mesh".into();
        // rank r holds r blocks
        md.num_blocks = rank.max(1);
        md.num_blocks_local = vec![rank];
        md.num_cells = rank * 10;
        md.add_array("data", Association::Cell, ScalarType::F32, 3);
        md.globalize_view(&c).unwrap()
    });
    for g in out {
        assert!(g.global_view);
        assert_eq!(g.num_blocks_local, vec![0, 1, 2, 3]);
        assert_eq!(g.num_blocks, 6);
        assert_eq!(g.num_cells, 60);
        assert_eq!(g.array_components, vec![3]);
    }
}

#[test]
#[serial]
fn barrier_and_gather_in_sequence() {
    let out = on_ranks(3, |c: LocalComm| {
        c.barrier().unwrap();
        let a = c.all_gather_bytes(&[c.rank() as u8]).unwrap();
        c.barrier().unwrap();
        let b = c.all_gather_bytes(&[10 + c.rank() as u8]).unwrap();
        (a, b)
    });
    for (a, b) in out {
        assert_eq!(a, vec![vec![0], vec![1], vec![2]]);
        assert_eq!(b, vec![vec![10], vec![11], vec![12]]);
    }
}
