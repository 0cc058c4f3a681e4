//! Sensor module - serial link, line decoder and simulation

pub mod decoder;
mod discovery;
mod link;
mod simulator;

pub use decoder::{decode, LineFormat, ANALOG_THRESHOLD};
pub use discovery::{discover, select_port};
pub use link::{LinkCommand, LinkHandle, LinkManager};
pub use simulator::{SensorSimulator, SimTick, SimulationSession};
