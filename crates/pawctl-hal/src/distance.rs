//! [`DistanceProbe`] – best-effort and filtered distance sampling.
//!
//! The probe holds an ordered list of [`DistanceSensor`] accessors (the
//! primary accessor first, then fallbacks).  [`DistanceProbe::read_best_effort`]
//! returns the first positive reading; a probe whose accessors all fail or
//! report "no echo" yields [`DistanceSample::Invalid`].
//!
//! An accessor that answers [`HardwareError::Unsupported`] is disabled for
//! the rest of the run and logged once, instead of being retried every tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use pawctl_types::{DistanceSample, HardwareError};
use tracing::{debug, warn};

use crate::sensor::DistanceSensor;

/// Readings above this are treated as implausible by the filtered read.
pub const MAX_PLAUSIBLE_CM: f32 = 250.0;

struct Accessor {
    name: String,
    sensor: Arc<dyn DistanceSensor>,
    disabled: AtomicBool,
}

/// Ordered set of distance accessors.
#[derive(Default)]
pub struct DistanceProbe {
    accessors: Vec<Accessor>,
}

impl DistanceProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an accessor.  Accessors are tried in registration order.
    pub fn with_accessor(
        mut self,
        name: impl Into<String>,
        sensor: Arc<dyn DistanceSensor>,
    ) -> Self {
        self.accessors.push(Accessor {
            name: name.into(),
            sensor,
            disabled: AtomicBool::new(false),
        });
        self
    }

    /// `true` when at least one accessor is still enabled.
    pub fn is_available(&self) -> bool {
        self.accessors
            .iter()
            .any(|a| !a.disabled.load(Ordering::Relaxed))
    }

    /// Return the first reading `> 0` from the accessor list, or
    /// [`DistanceSample::Invalid`] when none produced one.
    pub fn read_best_effort(&self) -> DistanceSample {
        for accessor in &self.accessors {
            if accessor.disabled.load(Ordering::Relaxed) {
                continue;
            }
            match accessor.sensor.read_distance_cm() {
                Ok(cm) => {
                    let sample = DistanceSample::from_raw(cm);
                    if sample.is_valid() {
                        return sample;
                    }
                }
                Err(HardwareError::Unsupported(what)) => {
                    warn!(
                        accessor = %accessor.name,
                        %what,
                        "distance accessor unsupported; disabling it"
                    );
                    accessor.disabled.store(true, Ordering::Relaxed);
                }
                Err(e) => {
                    debug!(
                        accessor = %accessor.name,
                        error = %e,
                        "distance read failed; trying next accessor"
                    );
                }
            }
        }
        DistanceSample::Invalid
    }

    /// Take `samples` best-effort reads `delay` apart, discard readings
    /// outside `(0, 250]` cm and return the median of the rest.
    ///
    /// Returns `None` when every reading was discarded.
    pub fn read_filtered(&self, samples: usize, delay: Duration) -> Option<f32> {
        let mut values = Vec::with_capacity(samples);
        for i in 0..samples {
            if let Some(cm) = self.read_best_effort().cm()
                && cm <= MAX_PLAUSIBLE_CM
            {
                values.push(cm);
            }
            if i + 1 < samples && !delay.is_zero() {
                thread::sleep(delay);
            }
        }
        median(&mut values)
    }
}

/// Median of `values`; the mean of the two middle values for even counts.
fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
