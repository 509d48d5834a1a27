//! In-process simulated robot for tests and hardware-free runs.
//!
//! [`SimRobot`] implements [`Actuator`], [`DistanceSensor`] and
//! [`TouchSensor`].  Every actuator call is recorded in order so
//! tests can assert on exactly what reached the "hardware", and sensor
//! readings are served from scripts.
//!
//! # Example
//!
//! ```rust
//! use pawctl_hal::actuator::Actuator;
//! use pawctl_hal::sim::{HalCall, SimRobot};
//! use pawctl_types::{JointGroup, Pose};
//!
//! let robot = SimRobot::builder().with_distance_script([40.0, 12.0]).build();
//! robot
//!     .set_pose(JointGroup::Head, &Pose::from([0, 0, -20]), Some(25))
//!     .expect("sim set_pose must succeed");
//! assert!(matches!(robot.calls()[0], HalCall::SetPose { .. }));
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use pawctl_types::{HardwareError, JointGroup, Pose, TouchReading};
use tracing::debug;

use crate::actuator::{Actuator, Capabilities, Indicator};
use crate::sensor::{DistanceSensor, TouchSensor};

/// One recorded actuator call.
#[derive(Debug, Clone, PartialEq)]
pub enum HalCall {
    SetPose {
        group: JointGroup,
        pose: Pose,
        speed: Option<u16>,
    },
    Preset {
        name: String,
        speed: u16,
        steps: u32,
    },
    WaitIdle,
    Halt,
    Indicator(Indicator),
    Sound(String),
    Release,
}

struct SimState {
    calls: Vec<HalCall>,
    joints: HashMap<JointGroup, Pose>,
    distances: VecDeque<f32>,
    resting_distance: f32,
    touches: VecDeque<TouchReading>,
}

/// Simulated quadruped.  Construct with [`SimRobot::builder`].
pub struct SimRobot {
    capabilities: Capabilities,
    failing_actions: HashSet<String>,
    /// How long each `wait_until_idle` blocks; past the caller's timeout the
    /// call fails with [`HardwareError::Timeout`].
    idle_delay: Option<Duration>,
    state: Mutex<SimState>,
}

impl SimRobot {
    pub fn builder() -> SimRobotBuilder {
        SimRobotBuilder::default()
    }

    /// All recorded actuator calls, oldest first.
    pub fn calls(&self) -> Vec<HalCall> {
        self.state.lock().calls.clone()
    }

    /// Poses written to `group`, oldest first.
    pub fn writes_to(&self, group: JointGroup) -> Vec<Pose> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                HalCall::SetPose { group: g, pose, .. } if *g == group => Some(pose.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of times the preset action `name` was run.
    pub fn preset_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, HalCall::Preset { name: n, .. } if n == name))
            .count()
    }

    pub fn halt_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, HalCall::Halt))
            .count()
    }

    fn record(&self, call: HalCall) {
        debug!(?call, "sim actuator call");
        self.state.lock().calls.push(call);
    }
}

impl Actuator for SimRobot {
    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn set_pose(
        &self,
        group: JointGroup,
        pose: &Pose,
        speed: Option<u16>,
    ) -> Result<(), HardwareError> {
        if !self.capabilities.supports_group(group) {
            return Err(HardwareError::Unsupported(format!("{group} servos")));
        }
        self.record(HalCall::SetPose {
            group,
            pose: pose.clone(),
            speed,
        });
        self.state.lock().joints.insert(group, pose.clone());
        Ok(())
    }

    fn run_preset_action(
        &self,
        name: &str,
        speed: u16,
        step_count: u32,
    ) -> Result<(), HardwareError> {
        if !self.capabilities.supports_action(name) {
            return Err(HardwareError::Unsupported(format!("preset action '{name}'")));
        }
        self.record(HalCall::Preset {
            name: name.to_string(),
            speed,
            steps: step_count,
        });
        if self.failing_actions.contains(name) {
            return Err(HardwareError::fault("body", format!("action '{name}' failed")));
        }
        Ok(())
    }

    fn wait_until_idle(&self, timeout: Duration) -> Result<(), HardwareError> {
        self.record(HalCall::WaitIdle);
        let Some(delay) = self.idle_delay else {
            return Ok(());
        };
        thread::sleep(delay.min(timeout));
        if delay > timeout {
            return Err(HardwareError::Timeout {
                operation: "wait_until_idle".to_string(),
                waited: timeout,
            });
        }
        Ok(())
    }

    fn halt_all(&self) -> Result<(), HardwareError> {
        self.record(HalCall::Halt);
        Ok(())
    }

    fn read_joint_angles(&self, group: JointGroup) -> Result<Pose, HardwareError> {
        if !self.capabilities.supports_group(group) {
            return Err(HardwareError::Unsupported(format!("{group} servos")));
        }
        Ok(self
            .state
            .lock()
            .joints
            .get(&group)
            .cloned()
            .unwrap_or_default())
    }

    fn set_indicator(&self, mode: Indicator) -> Result<(), HardwareError> {
        if !self.capabilities.indicator {
            return Err(HardwareError::Unsupported("indicator".to_string()));
        }
        self.record(HalCall::Indicator(mode));
        Ok(())
    }

    fn play_sound(&self, name: &str) -> Result<(), HardwareError> {
        if !self.capabilities.sound {
            return Err(HardwareError::Unsupported(format!("sound '{name}'")));
        }
        self.record(HalCall::Sound(name.to_string()));
        Ok(())
    }

    fn release(&self) -> Result<(), HardwareError> {
        self.record(HalCall::Release);
        Ok(())
    }
}

impl DistanceSensor for SimRobot {
    fn read_distance_cm(&self) -> Result<f32, HardwareError> {
        let mut state = self.state.lock();
        Ok(state
            .distances
            .pop_front()
            .unwrap_or(state.resting_distance))
    }
}

impl TouchSensor for SimRobot {
    fn read_touch(&self) -> Result<TouchReading, HardwareError> {
        Ok(self
            .state
            .lock()
            .touches
            .pop_front()
            .unwrap_or(TouchReading::Code("N".to_string())))
    }
}

/// Builder for [`SimRobot`].
pub struct SimRobotBuilder {
    capabilities: Capabilities,
    failing_actions: HashSet<String>,
    idle_delay: Option<Duration>,
    distances: Vec<f32>,
    resting_distance: f32,
    touches: Vec<TouchReading>,
    joints: HashMap<JointGroup, Pose>,
}

impl Default for SimRobotBuilder {
    fn default() -> Self {
        let mut joints = HashMap::new();
        joints.insert(JointGroup::Head, Pose::from([0, 0, 0]));
        joints.insert(JointGroup::Tail, Pose::from([0]));
        joints.insert(JointGroup::Legs, Pose::from([0; 8]));
        Self {
            capabilities: Capabilities {
                indicator: true,
                sound: true,
                ..Capabilities::default()
            },
            failing_actions: HashSet::new(),
            idle_delay: None,
            distances: Vec::new(),
            resting_distance: 100.0,
            touches: Vec::new(),
            joints,
        }
    }
}

impl SimRobotBuilder {
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Distance readings served in order before falling back to the resting
    /// distance.
    pub fn with_distance_script(mut self, readings: impl IntoIterator<Item = f32>) -> Self {
        self.distances.extend(readings);
        self
    }

    pub fn with_resting_distance(mut self, cm: f32) -> Self {
        self.resting_distance = cm;
        self
    }

    /// Touch readings served in order before falling back to "untouched".
    pub fn with_touch_script(mut self, readings: impl IntoIterator<Item = TouchReading>) -> Self {
        self.touches.extend(readings);
        self
    }

    /// Make `name` fail with a hardware fault (after being recorded).
    pub fn with_failing_action(mut self, name: impl Into<String>) -> Self {
        self.failing_actions.insert(name.into());
        self
    }

    /// Make every `wait_until_idle` call block for the caller's full
    /// timeout and then fail.
    pub fn with_stuck_motion(mut self) -> Self {
        self.idle_delay = Some(Duration::MAX);
        self
    }

    /// Make every `wait_until_idle` call block for `delay` (or the caller's
    /// timeout, whichever is shorter).
    pub fn with_idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = Some(delay);
        self
    }

    pub fn build(self) -> SimRobot {
        SimRobot {
            capabilities: self.capabilities,
            failing_actions: self.failing_actions,
            idle_delay: self.idle_delay,
            state: Mutex::new(SimState {
                calls: Vec::new(),
                joints: self.joints,
                distances: self.distances.into(),
                resting_distance: self.resting_distance,
                touches: self.touches.into(),
            }),
        }
    }
}
