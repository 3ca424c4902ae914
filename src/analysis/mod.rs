//! Consumer side: analyses that pull data through a [`DataAdaptor`].

pub mod configurable;
pub mod histogram;

pub use configurable::ConfigurableAnalysis;
pub use histogram::{Histogram, HistogramConfig, HistogramResult};

use crate::adaptor::DataAdaptor;
use crate::sensei_error::SenseiError;

/// An analysis run once per timestep.
pub trait AnalysisAdaptor {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Process the current timestep.
    ///
    /// `Ok(false)` means the analysis skipped this step (for example its
    /// array is missing) and left its previous results untouched.
    fn execute(&mut self, data: &mut dyn DataAdaptor) -> Result<bool, SenseiError>;

    /// Release held resources. Results stay queryable.
    fn finalize(&mut self) -> Result<(), SenseiError>;
}

impl<A: AnalysisAdaptor + ?Sized> AnalysisAdaptor for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn execute(&mut self, data: &mut dyn DataAdaptor) -> Result<bool, SenseiError> {
        (**self).execute(data)
    }
    fn finalize(&mut self) -> Result<(), SenseiError> {
        (**self).finalize()
    }
}
