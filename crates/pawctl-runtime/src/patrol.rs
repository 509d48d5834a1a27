//! Obstacle-avoidance patrol.
//!
//! The decision logic is the pure [`PatrolMachine`]: feed it one distance
//! sample and whether a step is due, get back the [`PatrolAction`] to take.
//! [`Patrol::run`] wraps it in the sampling loop, owns the stepping cadence
//! ([`Stepper`]) and the throttled status output ([`StatusThrottle`]).
//!
//! | From | Sample | To | Action |
//! |---|---|---|---|
//! | any | invalid | `SENSOR_INVALID` | halt |
//! | not `DANGER_HALTED` | `d < danger` | `DANGER_HALTED` | halt + alert |
//! | `DANGER_HALTED` | `d < danger` | `DANGER_HALTED` | wait |
//! | any | `d >= danger` | `SAFE_WALKING` | step when due |

use std::sync::Arc;
use std::time::{Duration, Instant};

use pawctl_hal::{Actuator, Capabilities, DistanceProbe, Indicator};
use pawctl_kernel::StopSignal;
use pawctl_middleware::{EventBus, Topic};
use pawctl_types::{
    DistanceSample, Event, EventPayload, HardwareError, JointGroup, PatrolState, Pose,
};
use tracing::{debug, error, info, warn};

use crate::config::{Gait, PatrolTuning};

const SOURCE: &str = "pawctl-runtime::patrol";

/// Back-off after the hardware refused a forward step.
const STEP_FAILURE_BACKOFF: Duration = Duration::from_millis(500);

// ─────────────────────────────────────────────────────────────────────────────
// State machine
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatrolAction {
    /// Issue one forward step.
    Step,
    Halt,
    /// Halt, then take the alert pose.
    HaltAndAlert,
    /// Nothing to do this iteration.
    Wait,
}

#[derive(Debug, Clone)]
pub struct PatrolMachine {
    state: PatrolState,
    danger_cm: f32,
}

impl PatrolMachine {
    pub fn new(danger_cm: f32) -> Self {
        Self {
            state: PatrolState::SafeWalking,
            danger_cm,
        }
    }

    pub fn state(&self) -> PatrolState {
        self.state
    }

    pub fn on_sample(&mut self, sample: DistanceSample, step_due: bool) -> PatrolAction {
        let Some(cm) = sample.cm() else {
            self.state = PatrolState::SensorInvalid;
            return PatrolAction::Halt;
        };

        if cm < self.danger_cm {
            if self.state == PatrolState::DangerHalted {
                return PatrolAction::Wait;
            }
            self.state = PatrolState::DangerHalted;
            return PatrolAction::HaltAndAlert;
        }

        self.state = PatrolState::SafeWalking;
        if step_due {
            PatrolAction::Step
        } else {
            PatrolAction::Wait
        }
    }

    /// Sleep between samples for the current state.
    pub fn poll_interval(&self, tuning: &PatrolTuning) -> Duration {
        match self.state {
            PatrolState::SafeWalking => tuning.loop_period,
            PatrolState::DangerHalted => tuning.danger_poll,
            PatrolState::SensorInvalid => tuning.invalid_retry,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stepping cadence
// ─────────────────────────────────────────────────────────────────────────────

/// Decides when the next forward burst is due, per [`Gait`].
#[derive(Debug, Clone)]
pub struct Stepper {
    gait: Gait,
    tick: Duration,
    tick_steps: u32,
    refresh: Duration,
    burst_steps: u32,
    last_step: Option<Instant>,
}

impl Stepper {
    pub fn new(tuning: &PatrolTuning) -> Self {
        Self {
            gait: tuning.gait,
            tick: tuning.tick,
            tick_steps: tuning.forward_steps,
            refresh: tuning.continuous_refresh,
            burst_steps: tuning.continuous_steps,
            last_step: None,
        }
    }

    pub fn is_due_at(&self, now: Instant) -> bool {
        let period = match self.gait {
            Gait::Tick => self.tick,
            Gait::Continuous => self.refresh,
        };
        self.last_step
            .is_none_or(|t| now.saturating_duration_since(t) >= period)
    }

    /// Record a step issued at `now` and return its step count.
    pub fn mark_at(&mut self, now: Instant) -> u32 {
        self.last_step = Some(now);
        match self.gait {
            Gait::Tick => self.tick_steps,
            Gait::Continuous => self.burst_steps,
        }
    }

    /// Forget the last step so the next safe sample steps immediately.
    pub fn reset(&mut self) {
        self.last_step = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status throttling
// ─────────────────────────────────────────────────────────────────────────────

/// Rate-limits distance telemetry: publish when `min_interval` has passed or
/// the reading moved by at least `min_delta_cm`.
#[derive(Debug, Clone)]
pub struct StatusThrottle {
    min_interval: Duration,
    min_delta_cm: f32,
    last_at: Option<Instant>,
    last: Option<DistanceSample>,
}

impl StatusThrottle {
    pub fn new(min_interval: Duration, min_delta_cm: f32) -> Self {
        Self {
            min_interval,
            min_delta_cm,
            last_at: None,
            last: None,
        }
    }

    pub fn should_publish_at(&mut self, sample: DistanceSample, now: Instant) -> bool {
        let changed = match (self.last, sample) {
            (None, _) => true,
            (Some(DistanceSample::Valid(prev)), DistanceSample::Valid(cm)) => {
                (cm - prev).abs() >= self.min_delta_cm
            }
            (Some(DistanceSample::Invalid), DistanceSample::Valid(_)) => true,
            (Some(_), DistanceSample::Invalid) => false,
        };
        let stale = self
            .last_at
            .is_none_or(|t| now.saturating_duration_since(t) >= self.min_interval);
        if changed || stale {
            self.last_at = Some(now);
            self.last = Some(sample);
            return true;
        }
        false
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Patrol task
// ─────────────────────────────────────────────────────────────────────────────

pub struct Patrol {
    actuator: Arc<dyn Actuator>,
    capabilities: Capabilities,
    distance: Arc<DistanceProbe>,
    bus: EventBus,
    tuning: PatrolTuning,
    idle_timeout: Duration,
}

impl Patrol {
    pub fn new(
        actuator: Arc<dyn Actuator>,
        capabilities: Capabilities,
        distance: Arc<DistanceProbe>,
        bus: EventBus,
        tuning: PatrolTuning,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            actuator,
            capabilities,
            distance,
            bus,
            tuning,
            idle_timeout,
        }
    }

    /// Walk until `stop` is set.  Always ends with a hardware halt.
    pub fn run(&self, stop: StopSignal) {
        info!(
            danger_cm = self.tuning.danger_distance_cm,
            gait = %self.tuning.gait,
            "patrol started"
        );
        if self.take_start_pose(&stop) {
            let mut machine = PatrolMachine::new(self.tuning.danger_distance_cm);
            let mut stepper = Stepper::new(&self.tuning);
            let mut throttle = StatusThrottle::new(
                self.tuning.status_min_interval,
                self.tuning.status_min_delta_cm,
            );
            self.indicate(Indicator::Calm);
            self.walk_loop(&stop, &mut machine, &mut stepper, &mut throttle);
        }
        self.halt();
        self.publish(
            Topic::BehaviorStatus,
            EventPayload::Notice("patrol stopped".to_string()),
        );
        info!("patrol stopped");
    }

    fn walk_loop(
        &self,
        stop: &StopSignal,
        machine: &mut PatrolMachine,
        stepper: &mut Stepper,
        throttle: &mut StatusThrottle,
    ) {
        loop {
            if stop.is_set() {
                return;
            }

            let sample = self.distance.read_best_effort();
            let now = Instant::now();
            if throttle.should_publish_at(sample, now) {
                debug!(distance = %sample, "patrol distance");
                self.publish(Topic::Telemetry, EventPayload::Distance { cm: sample.cm() });
            }

            let before = machine.state();
            let action = machine.on_sample(sample, stepper.is_due_at(now));
            let after = machine.state();
            if before != after {
                info!(from = %before, to = %after, distance = %sample, "patrol state changed");
                self.publish(
                    Topic::BehaviorStatus,
                    EventPayload::PatrolTransition { from: before, to: after },
                );
                if after == PatrolState::SafeWalking {
                    self.indicate(Indicator::Calm);
                }
            }

            match action {
                PatrolAction::Step => {
                    if stop.is_set() {
                        return;
                    }
                    let steps = stepper.mark_at(now);
                    if let Err(e) =
                        self.actuator
                            .run_preset_action("forward", self.tuning.forward_speed, steps)
                    {
                        error!(error = %e, "forward step failed");
                        self.publish_fault(&e);
                        if stop.wait_timeout(STEP_FAILURE_BACKOFF) {
                            return;
                        }
                    }
                }
                PatrolAction::Halt => {
                    self.halt();
                    stepper.reset();
                }
                PatrolAction::HaltAndAlert => {
                    warn!(distance = %sample, "obstacle ahead; halting");
                    self.halt();
                    stepper.reset();
                    if stop.is_set() {
                        return;
                    }
                    self.alert(stop);
                }
                PatrolAction::Wait => {}
            }

            if stop.wait_timeout(machine.poll_interval(&self.tuning)) {
                return;
            }
        }
    }

    /// Returns `false` when stopped before the pose settled.
    fn take_start_pose(&self, stop: &StopSignal) -> bool {
        if let Err(e) = self
            .actuator
            .run_preset_action("stand", self.tuning.start_stand_speed, 1)
            .and_then(|_| self.actuator.wait_until_idle(self.idle_timeout))
        {
            warn!(error = %e, "patrol start pose failed; walking anyway");
        }
        !stop.wait_timeout(self.tuning.start_settle)
    }

    /// Alert pose: red indicator, tail centred, legs braced, optional bark.
    fn alert(&self, stop: &StopSignal) {
        self.indicate(Indicator::Alert);

        if self.capabilities.tail
            && let Err(e) = self.actuator.set_pose(
                JointGroup::Tail,
                &Pose::from([0]),
                Some(self.tuning.tail_centre_speed),
            )
        {
            debug!(error = %e, "tail centre failed");
        }
        if stop.is_set() {
            return;
        }
        if self.capabilities.legs {
            if let Err(e) = self.actuator.set_pose(
                JointGroup::Legs,
                &self.tuning.alert_stance,
                Some(self.tuning.alert_stance_speed),
            ) {
                warn!(error = %e, "alert stance failed");
            }
            if let Err(e) = self.actuator.wait_until_idle(self.idle_timeout) {
                debug!(error = %e, "alert stance did not settle");
            }
        }
        if stop.is_set() {
            return;
        }
        if self.tuning.enable_bark
            && self.capabilities.sound
            && let Err(e) = self.actuator.play_sound("bark")
        {
            debug!(error = %e, "bark failed");
        }
    }

    fn halt(&self) {
        if let Err(e) = self.actuator.halt_all() {
            error!(error = %e, "halt failed");
            self.publish_fault(&e);
        }
    }

    fn indicate(&self, mode: Indicator) {
        if !self.capabilities.indicator {
            return;
        }
        if let Err(e) = self.actuator.set_indicator(mode) {
            debug!(error = %e, ?mode, "indicator update failed");
        }
    }

    fn publish(&self, topic: Topic, payload: EventPayload) {
        self.bus.publish_to(topic, Event::new(SOURCE, payload));
    }

    fn publish_fault(&self, e: &HardwareError) {
        self.publish(
            Topic::SystemAlerts,
            EventPayload::HardwareFault {
                component: "patrol".to_string(),
                message: e.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawctl_hal::{HalCall, SimRobot};
    use std::thread;

    fn valid(cm: f32) -> DistanceSample {
        DistanceSample::from_raw(cm)
    }

    #[test]
    fn scenario_step_step_alert_wait_step() {
        let mut machine = PatrolMachine::new(15.0);
        let actions: Vec<_> = [40.0, 35.0, 12.0, 12.0, 20.0]
            .into_iter()
            .map(|cm| machine.on_sample(valid(cm), true))
            .collect();
        assert_eq!(
            actions,
            vec![
                PatrolAction::Step,
                PatrolAction::Step,
                PatrolAction::HaltAndAlert,
                PatrolAction::Wait,
                PatrolAction::Step,
            ]
        );
    }

    #[test]
    fn danger_is_monotonic_until_a_safe_sample() {
        let mut machine = PatrolMachine::new(18.0);
        machine.on_sample(valid(10.0), true);
        for cm in [5.0, 17.9, 1.0, 12.0] {
            assert_ne!(machine.on_sample(valid(cm), true), PatrolAction::Step);
        }
        assert_ne!(machine.on_sample(DistanceSample::Invalid, true), PatrolAction::Step);
        assert_eq!(machine.on_sample(valid(18.0), true), PatrolAction::Step);
    }

    #[test]
    fn invalid_samples_always_halt() {
        let mut machine = PatrolMachine::new(18.0);
        for _ in 0..3 {
            assert_eq!(
                machine.on_sample(DistanceSample::from_raw(-1.0), true),
                PatrolAction::Halt
            );
            assert_eq!(machine.state(), PatrolState::SensorInvalid);
        }
        assert_eq!(machine.on_sample(valid(50.0), true), PatrolAction::Step);
        assert_eq!(machine.state(), PatrolState::SafeWalking);
    }

    #[test]
    fn danger_after_invalid_alerts() {
        let mut machine = PatrolMachine::new(18.0);
        machine.on_sample(DistanceSample::Invalid, true);
        assert_eq!(machine.on_sample(valid(9.0), true), PatrolAction::HaltAndAlert);
    }

    #[test]
    fn poll_interval_follows_state() {
        let tuning = PatrolTuning::default();
        let mut machine = PatrolMachine::new(18.0);
        assert_eq!(machine.poll_interval(&tuning), tuning.loop_period);
        machine.on_sample(valid(3.0), false);
        assert_eq!(machine.poll_interval(&tuning), tuning.danger_poll);
        machine.on_sample(DistanceSample::Invalid, false);
        assert_eq!(machine.poll_interval(&tuning), tuning.invalid_retry);
    }

    #[test]
    fn tick_gait_steps_once_per_tick() {
        let tuning = PatrolTuning::default();
        let mut stepper = Stepper::new(&tuning);
        let t0 = Instant::now();
        assert!(stepper.is_due_at(t0));
        assert_eq!(stepper.mark_at(t0), 2);
        assert!(!stepper.is_due_at(t0 + Duration::from_millis(30)));
        assert!(stepper.is_due_at(t0 + Duration::from_millis(50)));
    }

    #[test]
    fn continuous_gait_refreshes_bursts_and_restarts_after_halt() {
        let tuning = PatrolTuning {
            gait: Gait::Continuous,
            ..PatrolTuning::default()
        };
        let mut stepper = Stepper::new(&tuning);
        let t0 = Instant::now();
        assert_eq!(stepper.mark_at(t0), 8);
        assert!(!stepper.is_due_at(t0 + Duration::from_millis(300)));
        assert!(stepper.is_due_at(t0 + Duration::from_millis(600)));
        stepper.reset();
        assert!(stepper.is_due_at(t0 + Duration::from_millis(1)));
    }

    #[test]
    fn status_throttle_skips_small_quick_changes() {
        let mut throttle = StatusThrottle::new(Duration::from_millis(250), 1.0);
        let t0 = Instant::now();
        assert!(throttle.should_publish_at(valid(40.0), t0));
        assert!(!throttle.should_publish_at(valid(40.4), t0 + Duration::from_millis(20)));
        assert!(throttle.should_publish_at(valid(38.0), t0 + Duration::from_millis(40)));
        let later = t0 + Duration::from_millis(60);
        assert!(!throttle.should_publish_at(DistanceSample::Invalid, later));
        assert!(throttle.should_publish_at(valid(38.1), t0 + Duration::from_millis(400)));
    }

    fn step_or_halt(calls: &[HalCall]) -> Vec<&'static str> {
        calls
            .iter()
            .filter_map(|c| match c {
                HalCall::Preset { name, .. } if name == "forward" => Some("step"),
                HalCall::Halt => Some("halt"),
                _ => None,
            })
            .collect()
    }

    fn test_tuning() -> PatrolTuning {
        PatrolTuning {
            danger_distance_cm: 15.0,
            tick: Duration::from_millis(1),
            start_settle: Duration::from_millis(1),
            danger_poll: Duration::from_millis(5),
            ..PatrolTuning::default()
        }
    }

    fn patrol_for(robot: &Arc<SimRobot>, tuning: PatrolTuning) -> Patrol {
        let probe = DistanceProbe::new().with_accessor("sim", robot.clone());
        Patrol::new(
            robot.clone(),
            robot.capabilities(),
            Arc::new(probe),
            EventBus::default(),
            tuning,
            Duration::from_secs(1),
        )
    }

    #[test]
    fn patrol_halts_and_alerts_on_obstacle_then_resumes() {
        let robot = Arc::new(
            SimRobot::builder()
                .with_distance_script([40.0, 35.0, 12.0, 12.0, 20.0])
                .build(),
        );
        let patrol = patrol_for(&robot, test_tuning());
        let stop = StopSignal::new();
        let task_stop = stop.clone();
        let handle = thread::spawn(move || patrol.run(task_stop));

        thread::sleep(Duration::from_millis(200));
        stop.set();
        handle.join().unwrap();

        let calls = robot.calls();
        let seq = step_or_halt(&calls);
        assert_eq!(&seq[..4], &["step", "step", "halt", "step"]);
        assert_eq!(calls.last(), Some(&HalCall::Halt));
        assert!(calls.contains(&HalCall::SetPose {
            group: JointGroup::Legs,
            pose: Pose::from([0, 80, 0, 80, 30, 75, 30, 75]),
            speed: Some(70),
        }));
        assert!(calls.contains(&HalCall::Indicator(Indicator::Alert)));
        assert!(!calls.iter().any(|c| matches!(c, HalCall::Sound(_))));
    }

    #[test]
    fn patrol_never_steps_blind() {
        let robot = Arc::new(SimRobot::builder().with_resting_distance(-1.0).build());
        let patrol = patrol_for(&robot, test_tuning());
        let stop = StopSignal::new();
        let task_stop = stop.clone();
        let handle = thread::spawn(move || patrol.run(task_stop));

        thread::sleep(Duration::from_millis(150));
        stop.set();
        handle.join().unwrap();

        assert_eq!(robot.preset_count("forward"), 0);
        assert!(robot.halt_count() >= 2);
    }

    #[test]
    fn stop_ends_the_walk_with_a_halt() {
        let robot = Arc::new(SimRobot::builder().build());
        let patrol = patrol_for(&robot, test_tuning());
        let stop = StopSignal::new();
        let task_stop = stop.clone();
        let handle = thread::spawn(move || patrol.run(task_stop));

        thread::sleep(Duration::from_millis(80));
        let stopped_at = Instant::now();
        stop.set();
        handle.join().unwrap();

        assert!(stopped_at.elapsed() < Duration::from_millis(200));
        assert!(robot.preset_count("forward") > 0);
        assert_eq!(robot.calls().last(), Some(&HalCall::Halt));
    }
}
