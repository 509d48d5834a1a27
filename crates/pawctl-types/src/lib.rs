use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Hardware angle unit used by every servo group.
pub type Angle = i32;

/// Independently addressable servo groups of the quadruped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JointGroup {
    /// Yaw / roll / pitch servos of the head.
    Head,
    /// The single tail servo.
    Tail,
    /// All eight leg servos, front-left first.
    Legs,
}

impl fmt::Display for JointGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JointGroup::Head => write!(f, "head"),
            JointGroup::Tail => write!(f, "tail"),
            JointGroup::Legs => write!(f, "legs"),
        }
    }
}

/// Ordered per-joint servo angles for one [`JointGroup`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Pose(Vec<Angle>);

impl Pose {
    pub fn new(angles: Vec<Angle>) -> Self {
        Self(angles)
    }

    pub fn angles(&self) -> &[Angle] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` when both poses address the same number of joints and every
    /// per-joint delta is at most `deadband`.
    pub fn within_deadband(&self, other: &Pose, deadband: Angle) -> bool {
        self.len() == other.len()
            && self
                .0
                .iter()
                .zip(&other.0)
                .all(|(a, b)| (a - b).abs() <= deadband)
    }

    /// Copy of this pose with `delta` added to joint `index`.
    ///
    /// Out-of-range indices leave the pose unchanged.
    pub fn offset(&self, index: usize, delta: Angle) -> Pose {
        let mut angles = self.0.clone();
        if let Some(a) = angles.get_mut(index) {
            *a += delta;
        }
        Pose(angles)
    }
}

impl<const N: usize> From<[Angle; N]> for Pose {
    fn from(angles: [Angle; N]) -> Self {
        Self(angles.to_vec())
    }
}

impl From<Vec<Angle>> for Pose {
    fn from(angles: Vec<Angle>) -> Self {
        Self(angles)
    }
}

/// Coarse body posture tracked by the command coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseState {
    #[default]
    Unknown,
    Sit,
    Stand,
    Lie,
}

impl fmt::Display for PoseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoseState::Unknown => write!(f, "unknown"),
            PoseState::Sit => write!(f, "sit"),
            PoseState::Stand => write!(f, "stand"),
            PoseState::Lie => write!(f, "lie"),
        }
    }
}

/// One distance reading in centimetres.
///
/// Zero, negative, non-finite and missing readings all collapse into
/// [`DistanceSample::Invalid`]; an invalid sample is never "far away".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DistanceSample {
    Valid(f32),
    Invalid,
}

impl DistanceSample {
    pub fn from_raw(cm: f32) -> Self {
        if cm.is_finite() && cm > 0.0 {
            DistanceSample::Valid(cm)
        } else {
            DistanceSample::Invalid
        }
    }

    pub fn cm(&self) -> Option<f32> {
        match self {
            DistanceSample::Valid(cm) => Some(*cm),
            DistanceSample::Invalid => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, DistanceSample::Valid(_))
    }
}

impl fmt::Display for DistanceSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceSample::Valid(cm) => write!(f, "{cm:.2} cm"),
            DistanceSample::Invalid => write!(f, "invalid"),
        }
    }
}

/// Raw value returned by a touch sensor.
///
/// Touch boards report in several shapes; [`TouchReading::is_touched`]
/// folds them into a single boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TouchReading {
    Bool(bool),
    Level(f32),
    /// Letter codes such as `N`, `L`, `R`, `LS`, `RS`.
    Code(String),
    Channels(Vec<bool>),
}

impl TouchReading {
    pub fn is_touched(&self) -> bool {
        match self {
            TouchReading::Bool(b) => *b,
            TouchReading::Level(v) => *v != 0.0,
            TouchReading::Code(code) => !matches!(
                code.trim().to_ascii_uppercase().as_str(),
                "" | "N" | "NONE" | "NO" | "0" | "FALSE"
            ),
            TouchReading::Channels(channels) => channels.iter().any(|c| *c),
        }
    }
}

/// State of the obstacle-avoidance patrol loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatrolState {
    SafeWalking,
    DangerHalted,
    SensorInvalid,
}

impl fmt::Display for PatrolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatrolState::SafeWalking => write!(f, "SAFE_WALKING"),
            PatrolState::DangerHalted => write!(f, "DANGER_HALTED"),
            PatrolState::SensorInvalid => write!(f, "SENSOR_INVALID"),
        }
    }
}

/// Status event routed over the event bus to operator-facing consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"pawctl-runtime::patrol"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Patrol distance telemetry; `None` when the sample was invalid.
    Distance { cm: Option<f32> },
    PatrolTransition { from: PatrolState, to: PatrolState },
    Touch { touched: bool },
    PoseChanged { pose: PoseState },
    HardwareFault { component: String, message: String },
    Notice(String),
}

/// Failure of a single actuator or sensor call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HardwareError {
    #[error("hardware fault on {component}: {details}")]
    Fault { component: String, details: String },

    #[error("unsupported capability: {0}")]
    Unsupported(String),

    #[error("{operation} timed out after {waited:?}")]
    Timeout { operation: String, waited: Duration },
}

impl HardwareError {
    pub fn fault(component: impl Into<String>, details: impl Into<String>) -> Self {
        HardwareError::Fault {
            component: component.into(),
            details: details.into(),
        }
    }
}

/// Operator command that could not be interpreted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("empty command")]
    Empty,
}

/// Umbrella error for the controller.
#[derive(Error, Debug)]
pub enum PawError {
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to start {task} thread: {source}")]
    Spawn {
        task: String,
        #[source]
        source: std::io::Error,
    },
}
