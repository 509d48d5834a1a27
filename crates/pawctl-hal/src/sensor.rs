//! Sensor traits: the ultrasonic range finder and the head touch pad.

use pawctl_types::{HardwareError, TouchReading};

/// A single way of reading the ultrasonic distance sensor.
///
/// Some firmware builds expose several accessors for the same sensor; each
/// one is registered separately with a
/// [`DistanceProbe`][crate::distance::DistanceProbe].
pub trait DistanceSensor: Send + Sync {
    /// Raw reading in centimetres.  Values `<= 0` mean "no echo".
    fn read_distance_cm(&self) -> Result<f32, HardwareError>;
}

/// The capacitive touch pad on the robot's head.
pub trait TouchSensor: Send + Sync {
    fn read_touch(&self) -> Result<TouchReading, HardwareError>;
}
