#![allow(non_snake_case)]
//! RustSPN: stochastic Petri net construction and discrete-event simulation.

pub mod config;
pub mod net;
pub mod options;
pub mod report;
pub mod sim;

pub use net::{Net, NetConfig, NetError};
pub use report::SimulationReport;
pub use sim::{Outcome, SimError, SimulationOptions, replicate, simulate};
