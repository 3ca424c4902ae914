//! Analyses selected at run time by an XML file.
//!
//! ```xml
//! <sensei>
//!   <analysis type="histogram" mesh="mesh" array="pressure"
//!             association="point" bins="10" file="pressure.hist"/>
//!   <analysis type="histogram" array="density" enabled="0"/>
//!   <partitioner type="planar" plane_size="4"/>
//! </sensei>
//! ```
//!
//! Rank 0 reads the file and broadcasts it, so only one rank touches the
//! file system. An analysis that fails to configure is reported by rank 0
//! and left out; the others still run.

use crate::adaptor::DataAdaptor;
use crate::algs::communicator::Communicator;
use crate::analysis::AnalysisAdaptor;
use crate::analysis::histogram::{Histogram, HistogramConfig};
use crate::data::array::Association;
use crate::partitioning::{Partitioner, partitioner_from_xml};
use crate::sensei_error::SenseiError;
use std::path::Path;
use std::sync::Arc;

pub struct ConfigurableAnalysis<C: Communicator + ?Sized> {
    comm: Arc<C>,
    analyses: Vec<Box<dyn AnalysisAdaptor>>,
    partitioner: Option<Box<dyn Partitioner>>,
}

impl<C: Communicator + ?Sized> std::fmt::Debug for ConfigurableAnalysis<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.analyses.iter().map(|a| a.name()).collect();
        f.debug_struct("ConfigurableAnalysis")
            .field("analyses", &names)
            .field("partitioner", &self.partitioner.as_ref().map(|p| p.name()))
            .finish()
    }
}

/// Collective: rank 0 reads `path`; every rank gets its bytes.
///
/// The length goes first; zero tells the other ranks the read failed.
pub fn read_broadcast<C>(comm: &C, path: &Path) -> Result<Vec<u8>, SenseiError>
where
    C: Communicator + ?Sized,
{
    let name = path.display().to_string();
    let mut local_err = None;
    let mut body = Vec::new();
    if comm.rank() == 0 {
        match std::fs::read(path) {
            Ok(bytes) => body = bytes,
            Err(e) => {
                log::error!("failed to read `{name}`: {e}");
                local_err = Some(SenseiError::io(&name, e));
            }
        }
    }
    let mut len = (body.len() as u64).to_le_bytes().to_vec();
    comm.broadcast_bytes(&mut len, 0)?;
    let n = len
        .as_slice()
        .try_into()
        .map(u64::from_le_bytes)
        .map_err(|_| SenseiError::CommunicationFailure("malformed length broadcast".into()))?;
    if n == 0 {
        return Err(local_err.unwrap_or_else(|| SenseiError::Io {
            path: name,
            message: "empty or unreadable on rank 0".into(),
        }));
    }
    comm.broadcast_bytes(&mut body, 0)?;
    Ok(body)
}

impl<C: Communicator + ?Sized + 'static> ConfigurableAnalysis<C> {
    /// No analyses; add them with [`push`](Self::push).
    pub fn empty(comm: Arc<C>) -> Self {
        Self {
            comm,
            analyses: Vec::new(),
            partitioner: None,
        }
    }

    /// Collective.
    pub fn from_file(comm: Arc<C>, path: impl AsRef<Path>) -> Result<Self, SenseiError> {
        let path = path.as_ref();
        let bytes = read_broadcast(comm.as_ref(), path)?;
        let text = std::str::from_utf8(&bytes).map_err(|e| SenseiError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_xml(comm, text, &path.display().to_string())
    }

    /// Build from XML already present on every rank. `origin` names the
    /// source in error messages.
    pub fn from_xml(comm: Arc<C>, xml: &str, origin: &str) -> Result<Self, SenseiError> {
        let parse_err = |message: String| SenseiError::ConfigParse {
            path: origin.to_string(),
            message,
        };
        let doc = roxmltree::Document::parse(xml).map_err(|e| parse_err(e.to_string()))?;
        let root = doc.root_element();
        if root.tag_name().name() != "sensei" {
            return Err(parse_err(format!(
                "root element is <{}>, expected <sensei>",
                root.tag_name().name()
            )));
        }

        let mut out = Self::empty(comm);
        let rank = out.comm.rank();
        for node in root.children().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "analysis" => {
                    if !enabled(node) {
                        continue;
                    }
                    let kind = node.attribute("type").unwrap_or("");
                    match out.add_from_xml(kind, node) {
                        Ok(()) => log::info!("configured {kind} analysis"),
                        Err(e) if rank == 0 => log::error!("failed to add `{kind}` analysis: {e}"),
                        Err(_) => {}
                    }
                }
                "partitioner" => match partitioner_from_xml(node) {
                    Ok(p) => out.partitioner = Some(p),
                    Err(e) if rank == 0 => log::error!("failed to configure partitioner: {e}"),
                    Err(_) => {}
                },
                other => log::debug!("ignoring <{other}> in {origin}"),
            }
        }
        Ok(out)
    }

    fn add_from_xml(&mut self, kind: &str, node: roxmltree::Node<'_, '_>) -> Result<(), SenseiError> {
        match kind {
            "histogram" => {
                let config = histogram_config(node)?;
                let h = Histogram::new(self.comm.clone(), config)?;
                self.push(Box::new(h));
                Ok(())
            }
            _ => Err(SenseiError::NotImplemented("analysis type")),
        }
    }

    pub fn push(&mut self, analysis: Box<dyn AnalysisAdaptor>) {
        self.analyses.push(analysis);
    }

    pub fn len(&self) -> usize {
        self.analyses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }

    pub fn analyses(&self) -> &[Box<dyn AnalysisAdaptor>] {
        &self.analyses
    }

    /// The configured `<partitioner>`, if any.
    pub fn partitioner(&self) -> Option<&dyn Partitioner> {
        self.partitioner.as_deref()
    }

    pub fn take_partitioner(&mut self) -> Option<Box<dyn Partitioner>> {
        self.partitioner.take()
    }
}

fn enabled(node: roxmltree::Node<'_, '_>) -> bool {
    match node.attribute("enabled") {
        None => true,
        Some(v) => v.trim().parse::<i64>().map(|v| v != 0).unwrap_or(false),
    }
}

fn histogram_config(node: roxmltree::Node<'_, '_>) -> Result<HistogramConfig, SenseiError> {
    let array_name = node.attribute("array").ok_or_else(|| {
        SenseiError::InvalidConfiguration("`histogram` missing required attribute `array`".into())
    })?;
    let association = match node.attribute("association") {
        None => Association::Point,
        Some(a) => a.parse().unwrap_or_else(|e| {
            log::warn!("{e}; using point association");
            Association::Point
        }),
    };
    let bins = match node.attribute("bins") {
        None => 10,
        Some(b) => b.trim().parse::<usize>().map_err(|e| {
            SenseiError::InvalidConfiguration(format!("histogram bins `{b}`: {e}"))
        })?,
    };
    Ok(HistogramConfig {
        mesh_name: node.attribute("mesh").unwrap_or("mesh").to_string(),
        array_name: array_name.to_string(),
        association,
        bins,
        file_name: node.attribute("file").map(Into::into),
    })
}

impl<C: Communicator + ?Sized> AnalysisAdaptor for ConfigurableAnalysis<C> {
    fn name(&self) -> &str {
        "configurable"
    }

    /// Runs every analysis. Only fatal errors stop the loop.
    fn execute(&mut self, data: &mut dyn DataAdaptor) -> Result<bool, SenseiError> {
        for analysis in &mut self.analyses {
            match analysis.execute(data) {
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => log::warn!("{} analysis failed this step: {e}", analysis.name()),
            }
        }
        Ok(true)
    }

    fn finalize(&mut self) -> Result<(), SenseiError> {
        let mut first_err = None;
        for analysis in &mut self.analyses {
            if let Err(e) = analysis.finalize() {
                log::warn!("{} analysis failed to finalize: {e}", analysis.name());
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
