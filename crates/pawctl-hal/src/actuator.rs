//! Generic `Actuator` trait for the quadruped's servo groups.
//!
//! Drivers implement this trait once; the rest of the controller only ever
//! talks to the trait, so a real servo board and the in-process
//! [`SimRobot`][crate::sim::SimRobot] are interchangeable.
//!
//! Optional hardware (LED strip, speaker, a missing tail servo, …) is
//! described by [`Capabilities`], which callers read **once** at startup
//! instead of probing the driver on every tick.

use std::time::Duration;

use pawctl_types::{HardwareError, JointGroup, Pose};

/// LED indicator modes used by the patrol behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// Fast red pulse while an obstacle blocks the path.
    Alert,
    /// Slow white breathing while walking normally.
    Calm,
}

/// What a driver supports, resolved once when the controller starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub head: bool,
    pub tail: bool,
    pub legs: bool,
    pub indicator: bool,
    pub sound: bool,
    /// Names accepted by [`Actuator::run_preset_action`].
    pub preset_actions: Vec<String>,
}

impl Capabilities {
    pub fn supports_group(&self, group: JointGroup) -> bool {
        match group {
            JointGroup::Head => self.head,
            JointGroup::Tail => self.tail,
            JointGroup::Legs => self.legs,
        }
    }

    pub fn supports_action(&self, name: &str) -> bool {
        self.preset_actions.iter().any(|a| a == name)
    }

    /// Return the first of `candidates` that the driver supports.
    pub fn resolve_action<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        candidates
            .iter()
            .copied()
            .find(|name| self.supports_action(name))
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            head: true,
            tail: true,
            legs: true,
            indicator: false,
            sound: false,
            preset_actions: ["stand", "sit", "lie", "forward"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// The shared actuator interface of the robot.
///
/// All methods take `&self`: one driver instance is shared (behind an
/// `Arc`) by the coordinator and every behaviour task, so implementations
/// must serialise access to the underlying bus themselves.
pub trait Actuator: Send + Sync {
    /// Describe the optional hardware this driver exposes.
    fn capabilities(&self) -> Capabilities;

    /// Move `group` to `pose`.  `speed` is driver-specific; `None` means the
    /// driver default.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError`] if the command cannot be applied.
    fn set_pose(&self, group: JointGroup, pose: &Pose, speed: Option<u16>)
    -> Result<(), HardwareError>;

    /// Queue a named whole-body action (`"sit"`, `"forward"`, …).
    fn run_preset_action(&self, name: &str, speed: u16, step_count: u32)
    -> Result<(), HardwareError>;

    /// Block until every queued motion has completed, at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Timeout`] when the actuators are still busy
    /// after `timeout`.
    fn wait_until_idle(&self, timeout: Duration) -> Result<(), HardwareError>;

    /// Stop all motion immediately and flush queued actions.  Must be
    /// idempotent: halting an idle robot is not an error.
    fn halt_all(&self) -> Result<(), HardwareError>;

    /// Read the current servo angles of `group`.
    fn read_joint_angles(&self, group: JointGroup) -> Result<Pose, HardwareError>;

    fn set_indicator(&self, _mode: Indicator) -> Result<(), HardwareError> {
        Err(HardwareError::Unsupported("indicator".to_string()))
    }

    fn play_sound(&self, name: &str) -> Result<(), HardwareError> {
        Err(HardwareError::Unsupported(format!("sound '{name}'")))
    }

    /// Release the hardware at shutdown.
    fn release(&self) -> Result<(), HardwareError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_action_returns_first_supported_candidate() {
        let caps = Capabilities {
            preset_actions: vec!["rest".into(), "lie_down".into()],
            ..Capabilities::default()
        };
        assert_eq!(
            caps.resolve_action(&["lie", "lie_down", "rest"]),
            Some("lie_down")
        );
        assert_eq!(caps.resolve_action(&["wag_tail"]), None);
    }

    #[test]
    fn supports_group_follows_flags() {
        let caps = Capabilities {
            tail: false,
            ..Capabilities::default()
        };
        assert!(caps.supports_group(JointGroup::Head));
        assert!(!caps.supports_group(JointGroup::Tail));
    }
}
