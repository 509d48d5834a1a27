//! "Give paw": sit, look down for a hand, lift the front-left leg.
//!
//! Runs in the foreground on the command loop.  The hand wait is bounded by
//! a timeout and cancellable through the supplied [`StopSignal`]; the head
//! always returns to its neutral pose and a lifted leg is always put back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pawctl_hal::{Actuator, DistanceProbe};
use pawctl_kernel::{HeadFilter, StopSignal};
use pawctl_types::{HardwareError, JointGroup, Pose};
use tracing::{debug, info, warn};

use crate::config::{BACK_LEFT_KNEE, FRONT_LEFT_KNEE, FRONT_LEFT_SHOULDER, HEAD_PITCH, PawTuning};
use crate::transitions::PoseTransitions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PawOutcome {
    /// A hand was detected and the paw was given.
    Given,
    NoHand,
    Cancelled,
}

pub struct Paw {
    actuator: Arc<dyn Actuator>,
    head: Option<Arc<HeadFilter>>,
    distance: Arc<DistanceProbe>,
    transitions: Arc<PoseTransitions>,
    tuning: PawTuning,
    flush_timeout: Duration,
}

impl Paw {
    pub fn new(
        actuator: Arc<dyn Actuator>,
        head: Option<Arc<HeadFilter>>,
        distance: Arc<DistanceProbe>,
        transitions: Arc<PoseTransitions>,
        tuning: PawTuning,
        flush_timeout: Duration,
    ) -> Self {
        Self {
            actuator,
            head,
            distance,
            transitions,
            tuning,
            flush_timeout,
        }
    }

    pub fn run(&self, cancel: &StopSignal) -> Result<PawOutcome, HardwareError> {
        self.transitions.sit()?;

        let neutral = self.neutral_head();
        if let Some(neutral) = &neutral {
            let down = neutral.offset(HEAD_PITCH, self.tuning.head_pitch_delta);
            self.move_head(down, cancel);
        }

        let outcome = self.wait_for_hand(cancel);

        if let Some(neutral) = neutral {
            self.move_head(neutral, cancel);
        }

        match outcome {
            PawOutcome::Given => {
                info!("hand detected; giving paw");
                self.give_paw(cancel)?;
            }
            PawOutcome::NoHand => info!("no hand detected"),
            PawOutcome::Cancelled => info!("paw cancelled"),
        }
        Ok(outcome)
    }

    fn neutral_head(&self) -> Option<Pose> {
        self.head.as_ref()?;
        match self.actuator.read_joint_angles(JointGroup::Head) {
            Ok(pose) => Some(pose),
            Err(e) => {
                warn!(error = %e, "head angles unavailable; paw continues without head movement");
                None
            }
        }
    }

    /// Submit `pose` right away, bypassing any suppression left by the sit.
    fn move_head(&self, pose: Pose, cancel: &StopSignal) {
        let Some(head) = &self.head else {
            return;
        };
        head.suppress(Duration::ZERO);
        head.submit(pose, Some(self.tuning.head_speed));
        if !head.wait_flushed(self.flush_timeout) {
            debug!("paw head pose still pending");
        }
        cancel.wait_timeout(self.tuning.head_pause);
    }

    fn wait_for_hand(&self, cancel: &StopSignal) -> PawOutcome {
        let deadline = Instant::now() + self.tuning.hand_timeout;
        let window = self.tuning.hand_min_cm..=self.tuning.hand_max_cm;
        info!(
            min_cm = self.tuning.hand_min_cm,
            max_cm = self.tuning.hand_max_cm,
            "waiting for a hand in front of the sensor"
        );

        while Instant::now() < deadline {
            if cancel.is_set() {
                return PawOutcome::Cancelled;
            }
            if let Some(cm) = self
                .distance
                .read_filtered(self.tuning.samples, self.tuning.sample_delay)
            {
                debug!(distance_cm = cm, "hand probe");
                if window.contains(&cm) {
                    return PawOutcome::Given;
                }
            }
            if cancel.wait_timeout(self.tuning.retry_pause) {
                return PawOutcome::Cancelled;
            }
        }
        PawOutcome::NoHand
    }

    /// Lift the front-left leg relative to the current sitting pose, hold it
    /// and put it back.
    fn give_paw(&self, cancel: &StopSignal) -> Result<(), HardwareError> {
        let sitting = self.actuator.read_joint_angles(JointGroup::Legs)?;
        let (shoulder, knee) = self.tuning.lift_deltas;
        let lifted = sitting
            .offset(FRONT_LEFT_SHOULDER, shoulder)
            .offset(FRONT_LEFT_KNEE, knee)
            .offset(BACK_LEFT_KNEE, self.tuning.back_support);

        self.actuator
            .set_pose(JointGroup::Legs, &lifted, Some(self.tuning.leg_speed))?;
        if !cancel.wait_timeout(self.tuning.lift_pause) {
            cancel.wait_timeout(self.tuning.hold);
        }
        self.actuator
            .set_pose(JointGroup::Legs, &sitting, Some(self.tuning.leg_speed))?;
        cancel.wait_timeout(self.tuning.restore_pause);
        Ok(())
    }
}
