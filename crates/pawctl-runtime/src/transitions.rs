//! Whole-body pose transitions: stand, sit and lie.
//!
//! Each transition opens a head suppression window first so no background
//! behaviour can jerk the head around while the body moves, then runs the
//! preset action in one or two phases, waiting (bounded) for the body to go
//! idle after each phase.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pawctl_hal::{Actuator, Capabilities};
use pawctl_kernel::HeadFilter;
use pawctl_types::HardwareError;
use tracing::{debug, info, warn};

use crate::config::{ControllerConfig, HeadTuning, TransitionTuning};

pub struct PoseTransitions {
    actuator: Arc<dyn Actuator>,
    head: Option<Arc<HeadFilter>>,
    tuning: TransitionTuning,
    head_tuning: HeadTuning,
    /// First supported lie preset, resolved once.
    lie_action: Option<String>,
}

impl PoseTransitions {
    pub fn new(
        actuator: Arc<dyn Actuator>,
        head: Option<Arc<HeadFilter>>,
        config: &ControllerConfig,
        capabilities: &Capabilities,
    ) -> Self {
        let candidates: Vec<&str> = config
            .transitions
            .lie_actions
            .iter()
            .map(String::as_str)
            .collect();
        let lie_action = capabilities.resolve_action(&candidates).map(str::to_string);
        match &lie_action {
            Some(name) => debug!(action = %name, "lie preset resolved"),
            None => warn!(tried = ?candidates, "no supported lie preset; 'lie' is disabled"),
        }
        Self {
            actuator,
            head,
            tuning: config.transitions.clone(),
            head_tuning: config.head.clone(),
            lie_action,
        }
    }

    /// Stand up.  Coming from a sit uses a slower two-phase stand.
    pub fn stand(&self, from_sit: bool) -> Result<(), HardwareError> {
        self.suppress_head(self.head_tuning.body_action_suppress);
        if from_sit {
            let (first, second) = self.tuning.stand_from_sit_speeds;
            self.run_phases("stand", first, second, self.tuning.stand_from_sit_pause, None)?;
        } else {
            self.run_action("stand", self.tuning.stand_speed)?;
        }
        info!(from_sit, "standing");
        Ok(())
    }

    /// Sit down, tilting the head to the sit pose first.
    pub fn sit(&self) -> Result<(), HardwareError> {
        let window = self.head_tuning.sit_suppress;
        self.suppress_head(window);

        if let Some(head) = &self.head {
            // Let exactly the tilt pose through, then close the window again.
            head.suppress(Duration::ZERO);
            head.submit(
                self.head_tuning.sit_tilt_pose.clone(),
                Some(self.head_tuning.sit_tilt_speed),
            );
            if !head.wait_flushed(self.head_tuning.flush_timeout) {
                debug!("sit tilt pose still pending when the sit began");
            }
            head.suppress(window);
        }

        let (first, second) = self.tuning.sit_speeds;
        self.run_phases("sit", first, second, self.tuning.sit_pause, Some(window))?;
        self.suppress_head(self.head_tuning.post_sit_suppress);
        info!("sitting");
        Ok(())
    }

    /// Lie down using the first lie preset the hardware supports.
    pub fn lie(&self) -> Result<(), HardwareError> {
        let Some(action) = self.lie_action.as_deref() else {
            return Err(HardwareError::Unsupported(format!(
                "lie action (tried {})",
                self.tuning.lie_actions.join(", ")
            )));
        };
        self.suppress_head(self.head_tuning.body_action_suppress);
        let (first, second) = self.tuning.lie_speeds;
        self.run_phases(action, first, second, self.tuning.lie_pause, None)?;
        info!(action, "lying down");
        Ok(())
    }

    /// Block until the body is idle, at most the configured idle timeout.
    pub fn wait_idle(&self) -> Result<(), HardwareError> {
        self.actuator.wait_until_idle(self.tuning.idle_timeout)
    }

    fn run_action(&self, name: &str, speed: u16) -> Result<(), HardwareError> {
        self.actuator.run_preset_action(name, speed, 1)?;
        self.wait_idle()
    }

    /// Two runs of the same preset with a pause in between.  `resuppress`
    /// re-opens the head window around the second phase.
    fn run_phases(
        &self,
        name: &str,
        first: u16,
        second: u16,
        pause: Duration,
        resuppress: Option<Duration>,
    ) -> Result<(), HardwareError> {
        self.run_action(name, first)?;
        if let Some(window) = resuppress {
            self.suppress_head(window);
        }
        thread::sleep(pause);
        if let Some(window) = resuppress {
            self.suppress_head(window);
        }
        self.run_action(name, second)
    }

    fn suppress_head(&self, window: Duration) {
        if let Some(head) = &self.head {
            head.suppress(window);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawctl_hal::{HalCall, SimRobot};
    use pawctl_kernel::{HeadFilterConfig, StopSignal};
    use pawctl_types::{JointGroup, Pose};

    fn fast_config() -> ControllerConfig {
        let mut cfg = ControllerConfig::default();
        cfg.transitions.sit_pause = Duration::from_millis(1);
        cfg.transitions.stand_from_sit_pause = Duration::from_millis(1);
        cfg.transitions.lie_pause = Duration::from_millis(1);
        cfg
    }

    fn presets(robot: &SimRobot) -> Vec<(String, u16)> {
        robot
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                HalCall::Preset { name, speed, .. } => Some((name, speed)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn stand_from_sit_runs_two_phases() {
        let robot = Arc::new(SimRobot::builder().build());
        let cfg = fast_config();
        let t = PoseTransitions::new(robot.clone(), None, &cfg, &robot.capabilities());
        t.stand(true).unwrap();
        assert_eq!(
            presets(&robot),
            vec![("stand".to_string(), 22), ("stand".to_string(), 32)]
        );
        t.stand(false).unwrap();
        assert_eq!(presets(&robot).last(), Some(&("stand".to_string(), 35)));
    }

    #[test]
    fn sit_writes_the_tilt_pose_then_suppresses_the_head() {
        let robot = Arc::new(SimRobot::builder().build());
        let cfg = fast_config();
        let head = Arc::new(HeadFilter::new(robot.clone(), HeadFilterConfig::default()));
        let shutdown = StopSignal::new();
        let dispatcher = head.spawn_dispatcher(shutdown.clone()).unwrap();

        let caps = robot.capabilities();
        let t = PoseTransitions::new(robot.clone(), Some(head.clone()), &cfg, &caps);
        t.sit().unwrap();

        assert_eq!(robot.writes_to(JointGroup::Head), vec![Pose::from([0, 0, -20])]);
        assert_eq!(
            presets(&robot),
            vec![("sit".to_string(), 28), ("sit".to_string(), 38)]
        );
        assert!(head.is_suppressed());

        shutdown.set();
        dispatcher.join().unwrap();
    }

    #[test]
    fn lie_uses_first_supported_preset() {
        let robot = Arc::new(
            SimRobot::builder()
                .with_capabilities(Capabilities {
                    preset_actions: vec!["stand".into(), "rest".into()],
                    ..Capabilities::default()
                })
                .build(),
        );
        let cfg = fast_config();
        let t = PoseTransitions::new(robot.clone(), None, &cfg, &robot.capabilities());
        t.lie().unwrap();
        assert_eq!(robot.preset_count("rest"), 2);
    }

    #[test]
    fn lie_without_any_preset_is_unsupported() {
        let robot = Arc::new(
            SimRobot::builder()
                .with_capabilities(Capabilities {
                    preset_actions: vec!["stand".into()],
                    ..Capabilities::default()
                })
                .build(),
        );
        let t = PoseTransitions::new(robot.clone(), None, &fast_config(), &robot.capabilities());
        assert!(matches!(t.lie(), Err(HardwareError::Unsupported(_))));
        assert!(robot.calls().is_empty());
    }

    #[test]
    fn failing_phase_aborts_the_transition() {
        let robot = Arc::new(SimRobot::builder().with_failing_action("sit").build());
        let t = PoseTransitions::new(robot.clone(), None, &fast_config(), &robot.capabilities());
        assert!(t.sit().is_err());
        assert_eq!(robot.preset_count("sit"), 1);
    }
}
