//! Tunables for every behaviour, grouped per concern.
//!
//! [`ControllerConfig::default`] carries the values the robot was tuned
//! with; the `pawctl` binary layers its TOML file and `PAWCTL_*`
//! environment overrides on top.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use pawctl_kernel::HeadFilterConfig;
use pawctl_types::{Angle, Pose};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Joint indices
// ─────────────────────────────────────────────────────────────────────────────

/// Head servo order is `[yaw, pitch, roll]`.
pub const HEAD_YAW: usize = 0;
pub const HEAD_PITCH: usize = 1;

/// Leg servo order is `[FL0, FL1, FR0, FR1, BL0, BL1, BR0, BR1]`.
pub const FRONT_LEFT_SHOULDER: usize = 0;
pub const FRONT_LEFT_KNEE: usize = 1;
pub const BACK_LEFT_KNEE: usize = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Gait
// ─────────────────────────────────────────────────────────────────────────────

/// How the patrol issues forward steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gait {
    /// One short `forward` burst every tick.
    #[default]
    Tick,
    /// One long burst, re-issued only after the refresh interval or a halt.
    Continuous,
}

impl fmt::Display for Gait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gait::Tick => write!(f, "tick"),
            Gait::Continuous => write!(f, "continuous"),
        }
    }
}

impl FromStr for Gait {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tick" => Ok(Gait::Tick),
            "continuous" => Ok(Gait::Continuous),
            other => Err(format!("unknown gait '{other}' (expected 'tick' or 'continuous')")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-concern tunables
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct HeadTuning {
    pub deadband: Angle,
    pub min_interval: Duration,
    pub dispatch_period: Duration,
    /// Suppression opened around stand and lie.
    pub body_action_suppress: Duration,
    /// Suppression held for the whole sit sequence.
    pub sit_suppress: Duration,
    /// Extra suppression once the sit has finished.
    pub post_sit_suppress: Duration,
    /// Absolute head pose taken just before sitting.
    pub sit_tilt_pose: Pose,
    pub sit_tilt_speed: u16,
    /// How long a caller waits for a single setup pose to reach the servos.
    pub flush_timeout: Duration,
}

impl HeadTuning {
    pub fn filter_config(&self) -> HeadFilterConfig {
        HeadFilterConfig {
            deadband: self.deadband,
            min_interval: self.min_interval,
            dispatch_period: self.dispatch_period,
        }
    }
}

impl Default for HeadTuning {
    fn default() -> Self {
        Self {
            deadband: 4,
            min_interval: Duration::from_millis(100),
            dispatch_period: Duration::from_millis(10),
            body_action_suppress: Duration::from_millis(800),
            sit_suppress: Duration::from_millis(2200),
            post_sit_suppress: Duration::from_millis(400),
            sit_tilt_pose: Pose::from([0, 0, -20]),
            sit_tilt_speed: 25,
            flush_timeout: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionTuning {
    pub stand_speed: u16,
    /// Two-phase stand used when getting up from a sit.
    pub stand_from_sit_speeds: (u16, u16),
    pub stand_from_sit_pause: Duration,
    pub sit_speeds: (u16, u16),
    pub sit_pause: Duration,
    pub lie_speeds: (u16, u16),
    pub lie_pause: Duration,
    /// Preset names tried in order for lying down.
    pub lie_actions: Vec<String>,
    /// Upper bound on every "wait until the body is idle".
    pub idle_timeout: Duration,
    /// Upper bound on waiting for a stopped background task to exit.
    pub task_join_timeout: Duration,
}

impl Default for TransitionTuning {
    fn default() -> Self {
        Self {
            stand_speed: 35,
            stand_from_sit_speeds: (22, 32),
            stand_from_sit_pause: Duration::from_millis(250),
            sit_speeds: (28, 38),
            sit_pause: Duration::from_millis(200),
            lie_speeds: (28, 38),
            lie_pause: Duration::from_millis(200),
            lie_actions: ["lie", "lie_down", "rest"].iter().map(|s| s.to_string()).collect(),
            idle_timeout: Duration::from_secs(5),
            task_join_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatrolTuning {
    /// Readings below this many centimetres halt the walk.
    pub danger_distance_cm: f32,
    pub forward_speed: u16,
    pub forward_steps: u32,
    /// Stepping cadence, independent of the sampling rate.
    pub tick: Duration,
    pub loop_period: Duration,
    pub danger_poll: Duration,
    pub invalid_retry: Duration,
    pub start_stand_speed: u16,
    pub start_settle: Duration,
    pub alert_stance: Pose,
    pub alert_stance_speed: u16,
    pub tail_centre_speed: u16,
    pub status_min_interval: Duration,
    pub status_min_delta_cm: f32,
    pub enable_bark: bool,
    pub gait: Gait,
    pub continuous_steps: u32,
    pub continuous_refresh: Duration,
}

impl Default for PatrolTuning {
    fn default() -> Self {
        Self {
            danger_distance_cm: 18.0,
            forward_speed: 98,
            forward_steps: 2,
            tick: Duration::from_millis(50),
            loop_period: Duration::from_millis(10),
            danger_poll: Duration::from_millis(50),
            invalid_retry: Duration::from_millis(100),
            start_stand_speed: 80,
            start_settle: Duration::from_millis(300),
            alert_stance: Pose::from([0, 80, 0, 80, 30, 75, 30, 75]),
            alert_stance_speed: 70,
            tail_centre_speed: 80,
            status_min_interval: Duration::from_millis(250),
            status_min_delta_cm: 1.0,
            enable_bark: false,
            gait: Gait::Tick,
            continuous_steps: 8,
            continuous_refresh: Duration::from_millis(600),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TouchTuning {
    pub poll: Duration,
    /// Raw signal must read "touched" this long before a press is confirmed.
    pub on_stable: Duration,
    /// Raw signal must read "untouched" this long before a release is confirmed.
    pub off_stable: Duration,
}

impl Default for TouchTuning {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(20),
            on_stable: Duration::from_millis(60),
            off_stable: Duration::from_millis(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WagTuning {
    /// Tail rest position ("centre-down").
    pub centre: Angle,
    pub swing: Angle,
    pub interval: Duration,
    pub speed: u16,
    pub return_speed: u16,
}

impl Default for WagTuning {
    fn default() -> Self {
        Self {
            centre: -20,
            swing: 40,
            interval: Duration::from_millis(50),
            speed: 200,
            return_speed: 150,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanTuning {
    /// How long each scan pose is held.
    pub dwell: Duration,
    pub step_speed: u16,
    pub yaw: Angle,
    pub pitch_up: Angle,
    pub pitch_down: Angle,
    pub diagonal_yaw: Angle,
    pub diagonal_pitch: Angle,
    /// Pitch offset added to the home pose before scanning.
    pub forward_tilt: Angle,
    pub forward_speed: u16,
    pub forward_settle: Duration,
    pub home_speed: u16,
    pub home_settle: Duration,
}

impl Default for ScanTuning {
    fn default() -> Self {
        Self {
            dwell: Duration::from_millis(4500),
            step_speed: 150,
            yaw: 40,
            pitch_up: 15,
            pitch_down: -20,
            diagonal_yaw: 12,
            diagonal_pitch: 4,
            forward_tilt: -30,
            forward_speed: 25,
            forward_settle: Duration::from_millis(250),
            home_speed: 35,
            home_settle: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PawTuning {
    pub hand_min_cm: f32,
    pub hand_max_cm: f32,
    pub hand_timeout: Duration,
    pub samples: usize,
    pub sample_delay: Duration,
    pub retry_pause: Duration,
    pub head_pitch_delta: Angle,
    pub head_speed: u16,
    pub head_pause: Duration,
    /// Offsets applied to the front-left shoulder and knee.
    pub lift_deltas: (Angle, Angle),
    pub back_support: Angle,
    pub leg_speed: u16,
    pub lift_pause: Duration,
    pub hold: Duration,
    pub restore_pause: Duration,
}

impl Default for PawTuning {
    fn default() -> Self {
        Self {
            hand_min_cm: 10.0,
            hand_max_cm: 20.0,
            hand_timeout: Duration::from_secs(10),
            samples: 7,
            sample_delay: Duration::from_millis(50),
            retry_pause: Duration::from_millis(100),
            head_pitch_delta: -60,
            head_speed: 35,
            head_pause: Duration::from_millis(250),
            lift_deltas: (-60, -30),
            back_support: 5,
            leg_speed: 25,
            lift_pause: Duration::from_millis(1300),
            hold: Duration::from_secs(1),
            restore_pause: Duration::from_secs(1),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ControllerConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Every tunable of the controller.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControllerConfig {
    pub head: HeadTuning,
    pub transitions: TransitionTuning,
    pub patrol: PatrolTuning,
    pub touch: TouchTuning,
    pub wag: WagTuning,
    pub scan: ScanTuning,
    pub paw: PawTuning,
}

impl ControllerConfig {
    /// Reject combinations the behaviours cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.head.deadband < 0 {
            return Err("head deadband must not be negative".to_string());
        }
        if self.head.dispatch_period.is_zero() {
            return Err("head dispatch period must be non-zero".to_string());
        }
        let danger = self.patrol.danger_distance_cm;
        if danger.is_nan() || danger <= 0.0 {
            return Err(format!(
                "danger distance must be positive, got {}",
                self.patrol.danger_distance_cm
            ));
        }
        if self.patrol.tick.is_zero() || self.patrol.loop_period.is_zero() {
            return Err("patrol tick and loop period must be non-zero".to_string());
        }
        if self.touch.poll.is_zero() {
            return Err("touch poll interval must be non-zero".to_string());
        }
        if self.paw.hand_min_cm > self.paw.hand_max_cm {
            return Err("paw hand window is empty".to_string());
        }
        if self.transitions.lie_actions.is_empty() {
            return Err("at least one lie action name is required".to_string());
        }
        Ok(())
    }
}
