//! Communication and data-movement algorithms.

pub mod communicator;
pub mod exchange;
pub mod wire;

pub use communicator::{Communicator, LocalComm, NoComm};
pub use exchange::{redistribute, redistribute_array};
