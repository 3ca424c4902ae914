//! The three calls a simulation makes: initialize once, update every
//! timestep, finalize at shutdown.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sensei::algs::NoComm;
//! use sensei::bridge::{Bridge, BridgeArrays};
//! use sensei::adaptor::image::ImageLayout;
//!
//! let layout = ImageLayout {
//!     global_dims: [8, 8, 8],
//!     local_dims: [8, 8, 8],
//!     start: [0; 3],
//!     block_grid: [1; 3],
//!     block: [0; 3],
//! };
//! let mut bridge = Bridge::initialize(Arc::new(NoComm), layout, "sensei.xml")?;
//! let field: Arc<[f64]> = vec![0.0; 512].into();
//! for step in 0..10 {
//!     bridge.update(step, step as f64 * 0.1, BridgeArrays {
//!         pressure: field.clone(),
//!         temperature: field.clone(),
//!         density: field.clone(),
//!     })?;
//! }
//! bridge.finalize()?;
//! # Ok::<(), sensei::sensei_error::SenseiError>(())
//! ```

use crate::adaptor::DataAdaptor;
use crate::adaptor::image::{ImageDataAdaptor, ImageLayout};
use crate::adaptor::in_transit::InTransitDataAdaptor;
use crate::algs::communicator::Communicator;
use crate::analysis::{AnalysisAdaptor, ConfigurableAnalysis};
use crate::partitioning::Partitioner;
use crate::sensei_error::SenseiError;
use std::path::Path;
use std::sync::Arc;

/// One timestep of `parallel3d` point fields for the local block.
#[derive(Clone, Debug)]
pub struct BridgeArrays {
    pub pressure: Arc<[f64]>,
    pub temperature: Arc<[f64]>,
    pub density: Arc<[f64]>,
}

/// Where the analyses read from: the simulation's blocks as they are, or
/// repartitioned by the configured `<partitioner>`.
enum Staging<C: Communicator + ?Sized + 'static> {
    InSitu(ImageDataAdaptor<C>),
    InTransit(InTransitDataAdaptor<C, ImageDataAdaptor<C>>),
}

impl<C: Communicator + ?Sized + 'static> Staging<C> {
    fn image(&self) -> &ImageDataAdaptor<C> {
        match self {
            Staging::InSitu(da) => da,
            Staging::InTransit(it) => it.producer(),
        }
    }

    fn image_mut(&mut self) -> &mut ImageDataAdaptor<C> {
        match self {
            Staging::InSitu(da) => da,
            Staging::InTransit(it) => it.producer_mut(),
        }
    }

    fn adaptor_mut(&mut self) -> &mut dyn DataAdaptor {
        match self {
            Staging::InSitu(da) => da,
            Staging::InTransit(it) => it,
        }
    }
}

pub struct Bridge<C: Communicator + ?Sized + 'static> {
    data: Staging<C>,
    analysis: ConfigurableAnalysis<C>,
}

impl<C: Communicator + ?Sized + 'static> std::fmt::Debug for Bridge<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("data", self.data.image())
            .field("partitioner", &self.partitioner())
            .field("analysis", &self.analysis)
            .finish()
    }
}

impl<C: Communicator + ?Sized + 'static> Bridge<C> {
    /// Collective: builds the data adaptor and reads `config_file`.
    ///
    /// A `<partitioner>` in the file moves the blocks between ranks before
    /// the analyses see them.
    pub fn initialize(
        comm: Arc<C>,
        layout: ImageLayout,
        config_file: impl AsRef<Path>,
    ) -> Result<Self, SenseiError> {
        let analysis = ConfigurableAnalysis::from_file(comm.clone(), config_file)?;
        Self::with_analysis(comm, layout, analysis)
    }

    /// Use an analysis built elsewhere. Its partitioner, if any, is taken
    /// over by the bridge.
    pub fn with_analysis(
        comm: Arc<C>,
        layout: ImageLayout,
        mut analysis: ConfigurableAnalysis<C>,
    ) -> Result<Self, SenseiError> {
        let image = ImageDataAdaptor::new(comm.clone(), layout)?;
        let data = match analysis.take_partitioner() {
            Some(partitioner) => {
                if comm.rank() == 0 {
                    log::info!(
                        "analyses read blocks placed by the {} partitioner",
                        partitioner.name()
                    );
                }
                let it = InTransitDataAdaptor::new(comm, Box::new(image), partitioner);
                Staging::InTransit(it)
            }
            None => Staging::InSitu(image),
        };
        Ok(Self { data, analysis })
    }

    /// The simulation-side adaptor.
    pub fn data(&self) -> &ImageDataAdaptor<C> {
        self.data.image()
    }

    /// Name of the partitioner analyses read through, if one was configured.
    pub fn partitioner(&self) -> Option<&'static str> {
        match &self.data {
            Staging::InSitu(_) => None,
            Staging::InTransit(it) => Some(it.partitioner().name()),
        }
    }

    pub fn analysis(&self) -> &ConfigurableAnalysis<C> {
        &self.analysis
    }

    fn expose(&mut self, timestep: u64, time: f64, arrays: BridgeArrays) -> Result<(), SenseiError> {
        let da = self.data.adaptor_mut();
        da.set_data_time_step(timestep);
        da.set_data_time(time);
        let image = self.data.image_mut();
        image.set_point_array("pressure", arrays.pressure)?;
        image.set_point_array("temperature", arrays.temperature)?;
        image.set_point_array("density", arrays.density)
    }

    /// Collective: expose this step's arrays, run the analyses, release.
    ///
    /// Local analysis failures are logged and skipped; a communication
    /// failure is returned. Data is released on every path.
    pub fn update(
        &mut self,
        timestep: u64,
        time: f64,
        arrays: BridgeArrays,
    ) -> Result<(), SenseiError> {
        let result = match self.expose(timestep, time, arrays) {
            Ok(()) => self.analysis.execute(self.data.adaptor_mut()).map(|_| ()),
            Err(e) => Err(e),
        };
        let released = self.data.adaptor_mut().release_data();
        result.and(released)
    }

    pub fn finalize(mut self) -> Result<(), SenseiError> {
        self.analysis.finalize()
    }
}
