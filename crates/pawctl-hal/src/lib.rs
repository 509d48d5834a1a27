//! `pawctl-hal` – Hardware Abstraction Layer
//!
//! The only crate that knows what the robot's hardware looks like.
//!
//! # Modules
//!
//! - [`actuator`] – the shared [`Actuator`] trait (poses, preset actions,
//!   halt, idle wait) and the [`Capabilities`] it reports once at startup.
//! - [`sensor`] – [`DistanceSensor`] and [`TouchSensor`] traits.
//! - [`distance`] – [`DistanceProbe`]: best-effort multi-accessor distance
//!   reads and the median-filtered read used for hand detection.
//! - [`sim`] – [`SimRobot`][sim::SimRobot]: a recording, scriptable robot for
//!   tests and hardware-free runs.

pub mod actuator;
pub mod distance;
pub mod sensor;
pub mod sim;

pub use actuator::{Actuator, Capabilities, Indicator};
pub use distance::DistanceProbe;
pub use sensor::{DistanceSensor, TouchSensor};
pub use sim::{HalCall, SimRobot};
