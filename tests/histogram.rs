mod util;

use sensei::adaptor::DataAdaptor;
use sensei::algs::communicator::{LocalComm, NoComm};
use sensei::analysis::{AnalysisAdaptor, Histogram, HistogramConfig, HistogramResult};
use sensei::data::Association;
use sensei::sensei_error::SenseiError;
use serial_test::serial;
use std::sync::Arc;
use util::*;

fn config(bins: usize) -> HistogramConfig {
    HistogramConfig {
        mesh_name: "image".into(),
        array_name: "data".into(),
        association: Association::Point,
        bins,
        file_name: None,
    }
}

#[test]
fn seven_bins_over_reference_data() {
    let mut da = point_data_adaptor("image", 0, 1, vec![PointBlock::new(0, &HISTOGRAM_DATA)]);
    da.set_data_time(0.0);
    let mut h = Histogram::new(Arc::new(NoComm), config(7)).unwrap();
    assert!(h.execute(&mut da).unwrap());
    let r = h.histogram().unwrap();
    assert_eq!(r.min, 0.0);
    assert_eq!(r.max, 6.0);
    assert_eq!(r.bins, vec![1, 2, 4, 6, 5, 3, 1]);
    assert_eq!(r.total(), 22);
}

#[test]
fn no_result_before_first_execute() {
    let h = Histogram::new(Arc::new(NoComm), config(7)).unwrap();
    assert_eq!(h.histogram(), Err(SenseiError::NoResultAvailable("histogram")));
}

#[test]
fn missing_array_skips_and_keeps_previous_result() {
    let mut good = point_data_adaptor("image", 0, 1, vec![PointBlock::new(0, &HISTOGRAM_DATA)]);
    good.set_data_time(0.0);
    let mut h = Histogram::new(Arc::new(NoComm), config(7)).unwrap();
    assert!(h.execute(&mut good).unwrap());
    let before = h.histogram().unwrap().clone();

    let mut other = point_data_adaptor("other", 0, 1, vec![PointBlock::new(0, &[9.0])]);
    other.set_data_time(1.0);
    assert!(!h.execute(&mut other).unwrap());
    assert_eq!(h.histogram().unwrap(), &before);

    let mut wrong_name = Histogram::new(
        Arc::new(NoComm),
        HistogramConfig {
            array_name: "pressure".into(),
            ..config(7)
        },
    )
    .unwrap();
    assert!(!wrong_name.execute(&mut good).unwrap());
    assert!(wrong_name.histogram().is_err());
}

#[test]
fn execute_before_populate_is_invalid_state() {
    let mut da = point_data_adaptor("image", 0, 1, vec![PointBlock::new(0, &HISTOGRAM_DATA)]);
    let mut h = Histogram::new(Arc::new(NoComm), config(7)).unwrap();
    assert!(matches!(
        h.execute(&mut da),
        Err(SenseiError::InvalidState { .. })
    ));
}

#[test]
fn ghost_points_are_excluded() {
    let block = PointBlock::new(0, &[0.0, 1.0, 100.0, 2.0]).with_ghosts(&[0, 0, 1, 0]);
    let mut da = point_data_adaptor("image", 0, 1, vec![block]);
    da.set_data_time(0.0);
    let mut h = Histogram::new(Arc::new(NoComm), config(2)).unwrap();
    assert!(h.execute(&mut da).unwrap());
    let r = h.histogram().unwrap();
    assert_eq!((r.min, r.max), (0.0, 2.0));
    assert_eq!(r.bins, vec![1, 2]);
}

#[test]
fn constant_array_lands_in_first_bin() {
    let mut da = point_data_adaptor("image", 0, 1, vec![PointBlock::new(0, &[3.0; 5])]);
    da.set_data_time(0.0);
    let mut h = Histogram::new(Arc::new(NoComm), config(4)).unwrap();
    h.execute(&mut da).unwrap();
    assert_eq!(h.histogram().unwrap().bins, vec![5, 0, 0, 0]);
}

#[test]
#[serial]
fn ranks_agree_with_a_single_rank() {
    let parts = split(&HISTOGRAM_DATA, 3);
    let results: Vec<HistogramResult> = on_ranks(3, move |comm: LocalComm| {
        use sensei::algs::Communicator;
        let rank = comm.rank();
        let block = PointBlock::new(rank, &parts[rank]);
        let mut da = point_data_adaptor("image", rank, 3, vec![block]);
        da.set_data_time_step(4);
        let mut h = Histogram::new(Arc::new(comm), config(7)).unwrap();
        assert!(h.execute(&mut da).unwrap());
        h.histogram().unwrap().clone()
    });
    for r in results {
        assert_eq!(r.bins, vec![1, 2, 4, 6, 5, 3, 1]);
        assert_eq!((r.min, r.max), (0.0, 6.0));
    }
}

#[test]
#[serial]
fn rank_without_values_still_takes_part() {
    let results = on_ranks(2, |comm: LocalComm| {
        use sensei::algs::Communicator;
        let rank = comm.rank();
        let blocks = if rank == 0 {
            vec![PointBlock::new(0, &[1.0, 2.0, 3.0])]
        } else {
            Vec::new()
        };
        let mut da = point_data_adaptor("image", rank, 1, blocks);
        da.set_data_time(0.0);
        let mut h = Histogram::new(Arc::new(comm), config(2)).unwrap();
        h.execute(&mut da).unwrap();
        h.histogram().unwrap().bins.clone()
    });
    assert_eq!(results, vec![vec![1, 2], vec![1, 2]]);
}

#[test]
fn rank_zero_appends_results_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.hist");
    let mut da = point_data_adaptor("image", 0, 1, vec![PointBlock::new(0, &HISTOGRAM_DATA)]);
    let mut h = Histogram::new(
        Arc::new(NoComm),
        HistogramConfig {
            file_name: Some(path.clone()),
            ..config(7)
        },
    )
    .unwrap();
    for step in 0..2 {
        da.set_data_time_step(step);
        h.execute(&mut da).unwrap();
        da.release_data().unwrap();
    }
    let text = std::fs::read_to_string(&path).unwrap();
    let headers = text.lines().filter(|l| l.starts_with('#')).count();
    assert_eq!(headers, 2);
    let counts: Vec<u64> = text
        .lines()
        .filter(|l| !l.starts_with('#'))
        .take(7)
        .map(|l| l.rsplit(' ').next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(counts, vec![1, 2, 4, 6, 5, 3, 1]);
}

#[test]
fn non_finite_values_are_not_counted() {
    let block = PointBlock::new(0, &[0.0, 1.0, f64::NAN, 2.0, f64::INFINITY]);
    let mut da = point_data_adaptor("image", 0, 1, vec![block]);
    da.set_data_time(0.0);
    let mut h = Histogram::new(Arc::new(NoComm), config(2)).unwrap();
    assert!(h.execute(&mut da).unwrap());
    let r = h.histogram().unwrap();
    assert_eq!((r.min, r.max), (0.0, 2.0));
    assert_eq!(r.bins, vec![1, 2]);
    assert_eq!(r.total(), 3);
}

#[test]
fn result_survives_an_unwritable_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("data.hist");
    let mut da = point_data_adaptor("image", 0, 1, vec![PointBlock::new(0, &HISTOGRAM_DATA)]);
    da.set_data_time(0.0);
    let mut h = Histogram::new(
        Arc::new(NoComm),
        HistogramConfig {
            file_name: Some(path),
            ..config(7)
        },
    )
    .unwrap();
    assert!(matches!(h.execute(&mut da), Err(SenseiError::Io { .. })));
    assert_eq!(h.histogram().unwrap().bins, vec![1, 2, 4, 6, 5, 3, 1]);
}
