//! Parallel histogram of one mesh array.
//!
//! Every rank bins its own values against the global range, then the bucket
//! counts are summed across the communicator. Bucket `k` covers
//! `[min + k*w, min + (k+1)*w)` with `w = (max - min) / bins`; the last
//! bucket also includes `max`.

use crate::adaptor::DataAdaptor;
use crate::algs::communicator::Communicator;
use crate::analysis::AnalysisAdaptor;
use crate::data::array::{Association, GHOST_ARRAY_NAME};
use crate::data::mesh::MultiBlockMesh;
use crate::sensei_error::SenseiError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramConfig {
    pub mesh_name: String,
    pub array_name: String,
    pub association: Association,
    pub bins: usize,
    /// Rank 0 appends each result here when set.
    pub file_name: Option<PathBuf>,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            mesh_name: "mesh".into(),
            array_name: String::new(),
            association: Association::Point,
            bins: 10,
            file_name: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramResult {
    pub min: f64,
    pub max: f64,
    pub bins: Vec<u64>,
}

impl HistogramResult {
    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / self.bins.len() as f64
    }

    pub fn total(&self) -> u64 {
        self.bins.iter().sum()
    }
}

/// Bucket of `x` in `[min, max]` split into `bins` buckets.
#[inline]
pub fn bucket_of(x: f64, min: f64, max: f64, bins: usize) -> usize {
    if max <= min {
        return 0;
    }
    let k = ((x - min) / (max - min) * bins as f64).floor();
    if k <= 0.0 {
        0
    } else {
        (k as usize).min(bins - 1)
    }
}

/// Count `values` into `bins` buckets spanning `[min, max]`.
pub fn bin_counts(values: &[f64], min: f64, max: f64, bins: usize) -> Vec<u64> {
    let mut counts = vec![0u64; bins];
    if bins == 0 {
        return counts;
    }
    for &x in values {
        counts[bucket_of(x, min, max, bins)] += 1;
    }
    counts
}

pub struct Histogram<C: Communicator + ?Sized> {
    comm: Arc<C>,
    config: HistogramConfig,
    result: Option<HistogramResult>,
}

impl<C: Communicator + ?Sized> std::fmt::Debug for Histogram<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Histogram")
            .field("config", &self.config)
            .field("result", &self.result)
            .finish()
    }
}

impl<C: Communicator + ?Sized> Histogram<C> {
    /// Fails with `InvalidConfiguration` for zero bins or an empty array name.
    pub fn new(comm: Arc<C>, config: HistogramConfig) -> Result<Self, SenseiError> {
        if config.bins == 0 {
            return Err(SenseiError::InvalidConfiguration(
                "histogram needs at least one bin".into(),
            ));
        }
        if config.array_name.is_empty() {
            return Err(SenseiError::InvalidConfiguration(
                "histogram needs an array name".into(),
            ));
        }
        Ok(Self {
            comm,
            config,
            result: None,
        })
    }

    pub fn config(&self) -> &HistogramConfig {
        &self.config
    }

    /// The most recent successful result.
    pub fn histogram(&self) -> Result<&HistogramResult, SenseiError> {
        self.result
            .as_ref()
            .ok_or(SenseiError::NoResultAvailable("histogram"))
    }

    /// Local values of the configured array, ghosts and non-finite values
    /// removed.
    fn local_values(&self, mesh: &MultiBlockMesh) -> Vec<f64> {
        let assoc = self.config.association;
        let mut values = Vec::new();
        for block in mesh.blocks() {
            let Some(array) = block.array(assoc, &self.config.array_name) else {
                continue;
            };
            let ghosts = block.array(assoc, GHOST_ARRAY_NAME);
            for i in 0..array.num_tuples() {
                let ghost = ghosts
                    .and_then(|g| g.values.get_f64(i))
                    .is_some_and(|g| g != 0.0);
                if ghost {
                    continue;
                }
                match array.tuple_value(i) {
                    Some(x) if x.is_finite() => values.push(x),
                    _ => {}
                }
            }
        }
        values
    }

    fn skip(&self, why: &str) -> Result<bool, SenseiError> {
        log::warn!(
            "histogram of {} array `{}` on `{}` skipped: {why}",
            self.config.association,
            self.config.array_name,
            self.config.mesh_name
        );
        Ok(false)
    }

    fn write(
        config: &HistogramConfig,
        result: &HistogramResult,
        step: u64,
        time: f64,
    ) -> Result<(), SenseiError> {
        let Some(path) = &config.file_name else {
            return Ok(());
        };
        let name = path.display().to_string();
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SenseiError::io(&name, e))?;
        let w = result.bin_width();
        let mut text = format!(
            "# {} step {step} time {time} min {} max {}\n",
            config.array_name, result.min, result.max
        );
        for (k, n) in result.bins.iter().enumerate() {
            let lo = result.min + k as f64 * w;
            text.push_str(&format!("{lo} {} {n}\n", lo + w));
        }
        f.write_all(text.as_bytes())
            .map_err(|e| SenseiError::io(&name, e))
    }
}

impl<C: Communicator + ?Sized> AnalysisAdaptor for Histogram<C> {
    fn name(&self) -> &str {
        "histogram"
    }

    fn execute(&mut self, data: &mut dyn DataAdaptor) -> Result<bool, SenseiError> {
        let mesh_name = self.config.mesh_name.clone();
        let array_name = self.config.array_name.clone();
        let assoc = self.config.association;

        let md = match data.mesh_metadata_by_name(&mesh_name) {
            Ok(md) => md,
            Err(SenseiError::MeshNotFound(_)) => return self.skip("no such mesh"),
            Err(e) => return Err(e),
        };
        if !md.has_array(&array_name, assoc) {
            return self.skip("no such array");
        }

        let mut mesh = data.mesh(&mesh_name, true)?;
        match data.add_array(&mut mesh, &mesh_name, assoc, &array_name) {
            Ok(()) => {}
            Err(SenseiError::ArrayNotFound { .. }) => return self.skip("array not provided"),
            Err(e) => return Err(e),
        }
        if md.has_array(GHOST_ARRAY_NAME, assoc) {
            match data.add_array(&mut mesh, &mesh_name, assoc, GHOST_ARRAY_NAME) {
                Ok(()) | Err(SenseiError::ArrayNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let values = self.local_values(&mesh);
        let (lo, hi) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            });
        let min = self.comm.all_reduce_min(lo)?;
        let max = self.comm.all_reduce_max(hi)?;

        let bins = self.config.bins;
        let result = if min > max {
            // no rank had a single value
            HistogramResult {
                min: 0.0,
                max: 0.0,
                bins: vec![0; bins],
            }
        } else {
            let mut counts = bin_counts(&values, min, max, bins);
            self.comm.all_reduce_sum_u64(&mut counts)?;
            HistogramResult {
                min,
                max,
                bins: counts,
            }
        };
        log::debug!(
            "histogram of `{array_name}`: [{}, {}] {:?}",
            result.min,
            result.max,
            result.bins
        );
        let result = self.result.insert(result);
        if self.comm.rank() == 0 {
            // the result is kept on every rank even if the file cannot be written
            Self::write(&self.config, result, data.data_time_step(), data.data_time())?;
        }
        Ok(true)
    }

    fn finalize(&mut self) -> Result<(), SenseiError> {
        Ok(())
    }
}
