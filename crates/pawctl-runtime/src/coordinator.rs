//! [`Coordinator`] – the single serialisation point for body commands.
//!
//! The command loop owns the coordinator and calls [`Coordinator::dispatch`]
//! for every operator line, so at most one foreground transition runs at a
//! time.  Background behaviours live in one [`TaskSlot`] each, which keeps
//! at most one patrol, one idle scan and one touch watcher alive.
//!
//! Before every transition except `walk` the coordinator stops the patrol
//! (stop signal plus a direct hardware halt), stops the idle scan and waits,
//! bounded, for the body to go idle.  `pose_state` only changes after a
//! transition returned successfully.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use pawctl_hal::{Actuator, DistanceProbe, TouchSensor};
use pawctl_kernel::{HeadFilter, StopSignal};
use pawctl_middleware::{EventBus, Topic};
use pawctl_types::{
    CommandError, Event, EventPayload, HardwareError, JointGroup, PawError, PoseState,
};
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::paw::{Paw, PawOutcome};
use crate::registry::{self, BehaviorContext};
use crate::task::TaskSlot;
use crate::transitions::PoseTransitions;

const SOURCE: &str = "pawctl-runtime::coordinator";

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Sit,
    Stand,
    Lie,
    Paw,
    Walk,
    Stop,
    Quit,
    Help,
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        match normalised.as_str() {
            "" => Err(CommandError::Empty),
            "sit" => Ok(Command::Sit),
            "stand" => Ok(Command::Stand),
            "lie" | "lie down" => Ok(Command::Lie),
            "paw" => Ok(Command::Paw),
            "walk" => Ok(Command::Walk),
            "stop" => Ok(Command::Stop),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            "help" | "?" => Ok(Command::Help),
            _ => Err(CommandError::Unknown(s.trim().to_string())),
        }
    }
}

/// Operator help text.
pub const HELP: &str = "\
Commands:
  sit       - sit down (then look around)
  stand     - stand up
  lie down  - lie on the ground
  paw       - give paw (hold a hand 10-20 cm in front of the sensor)
  walk      - start walking with obstacle avoidance
  stop      - stop walking
  help      - show this list
  quit      - stand up and exit";

/// Acknowledgement for a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The command completed.
    Done(String),
    /// Nothing failed, but the command did not do what was asked.
    Notice(String),
    /// Command list followed by the registered behaviours.
    Help,
    /// The coordinator has shut down; the command loop should exit.
    Quit,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Done(msg) | Reply::Notice(msg) => write!(f, "{msg}"),
            Reply::Help => {
                write!(f, "{HELP}\n\nBehaviours:")?;
                for spec in &registry::BEHAVIORS {
                    write!(f, "\n  {:<10}- {}", spec.name, spec.summary)?;
                }
                Ok(())
            }
            Reply::Quit => write!(f, "bye"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Robot handles
// ─────────────────────────────────────────────────────────────────────────────

/// The hardware the coordinator drives.
pub struct Robot {
    pub actuator: Arc<dyn Actuator>,
    pub distance: DistanceProbe,
    /// `None` when the robot has no touch pad.
    pub touch: Option<Arc<dyn TouchSensor>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────────────────

pub struct Coordinator {
    ctx: BehaviorContext,
    transitions: Arc<PoseTransitions>,
    pose_state: PoseState,
    patrol: TaskSlot,
    scan: TaskSlot,
    touch: TaskSlot,
    dispatcher: Option<JoinHandle<()>>,
    dispatcher_stop: StopSignal,
    /// Cancels foreground work (the paw's hand wait) from another thread.
    interrupt: StopSignal,
    shut_down: bool,
}

impl Coordinator {
    /// Resolve capabilities once and wire the behaviours together.
    ///
    /// # Errors
    ///
    /// Returns [`PawError::Config`] when `config` fails validation.
    pub fn new(robot: Robot, config: ControllerConfig, bus: EventBus) -> Result<Self, PawError> {
        config.validate().map_err(PawError::Config)?;

        let capabilities = robot.actuator.capabilities();
        info!(
            head = capabilities.head,
            tail = capabilities.tail,
            legs = capabilities.legs,
            indicator = capabilities.indicator,
            sound = capabilities.sound,
            presets = ?capabilities.preset_actions,
            "robot capabilities"
        );

        let head = if capabilities.head {
            Some(Arc::new(HeadFilter::new(
                Arc::clone(&robot.actuator),
                config.head.filter_config(),
            )))
        } else {
            warn!("no head servos; head filter, idle scan and paw head moves disabled");
            None
        };
        if !robot.distance.is_available() {
            warn!("no distance accessor; walk and paw hand detection disabled");
        }
        if robot.touch.is_none() {
            warn!("no touch sensor; tail wag on touch disabled");
        }

        let transitions = Arc::new(PoseTransitions::new(
            Arc::clone(&robot.actuator),
            head.clone(),
            &config,
            &capabilities,
        ));

        let ctx = BehaviorContext {
            actuator: robot.actuator,
            capabilities,
            head,
            distance: Arc::new(robot.distance),
            touch: robot.touch,
            bus,
            config: Arc::new(config),
            head_home: Arc::new(Mutex::new(Default::default())),
        };

        Ok(Self {
            ctx,
            transitions,
            pose_state: PoseState::Unknown,
            patrol: TaskSlot::new("patrol"),
            scan: TaskSlot::new("idle-scan"),
            touch: TaskSlot::new("touch-watcher"),
            dispatcher: None,
            dispatcher_stop: StopSignal::new(),
            interrupt: StopSignal::new(),
            shut_down: false,
        })
    }

    /// Start the head dispatcher and the touch watcher, then stand up.
    ///
    /// A failed initial stand is logged; the robot simply starts in an
    /// unknown pose.
    pub fn start(&mut self) -> Result<(), PawError> {
        if let Some(head) = &self.ctx.head {
            let handle = head
                .spawn_dispatcher(self.dispatcher_stop.clone())
                .map_err(|source| PawError::Spawn {
                    task: "head-filter".to_string(),
                    source,
                })?;
            self.dispatcher = Some(handle);
        }

        Self::start_behavior(&self.ctx, &mut self.touch, "touch_wag")?;

        match self.transitions.stand(false) {
            Ok(()) => self.set_pose_state(PoseState::Stand),
            Err(e) => warn!(error = %e, "initial stand failed"),
        }
        Ok(())
    }

    pub fn pose_state(&self) -> PoseState {
        self.pose_state
    }

    pub fn is_walking(&self) -> bool {
        self.patrol.is_active()
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.is_active()
    }

    /// Signal that aborts a running paw from another thread (e.g. Ctrl-C).
    pub fn interrupt_handle(&self) -> StopSignal {
        self.interrupt.clone()
    }

    /// Parse and execute one operator line.
    pub fn dispatch(&mut self, line: &str) -> Result<Reply, PawError> {
        let command: Command = line.parse()?;
        self.execute(command)
    }

    pub fn execute(&mut self, command: Command) -> Result<Reply, PawError> {
        if self.shut_down {
            return Ok(Reply::Quit);
        }
        debug!(?command, "dispatching");
        match command {
            Command::Sit => self.sit(),
            Command::Stand => self.stand(),
            Command::Lie => self.lie(),
            Command::Paw => self.paw(),
            Command::Walk => self.walk(),
            Command::Stop => {
                self.stop_patrol();
                Ok(Reply::Done("stopped".to_string()))
            }
            Command::Help => Ok(Reply::Help),
            Command::Quit => {
                self.shutdown();
                Ok(Reply::Quit)
            }
        }
    }

    fn sit(&mut self) -> Result<Reply, PawError> {
        self.settle_body();
        if self.ctx.head.is_some() {
            match self.ctx.actuator.read_joint_angles(JointGroup::Head) {
                Ok(home) => *self.ctx.head_home.lock() = home,
                Err(e) => {
                    warn!(error = %e, "could not capture head home pose; keeping the previous one")
                }
            }
        }
        self.transitions.sit().map_err(|e| self.fail("sit", e))?;
        self.set_pose_state(PoseState::Sit);

        if self.ctx.head.is_some() {
            Self::start_behavior(&self.ctx, &mut self.scan, "idle_scan")?;
        }
        Ok(Reply::Done("sit".to_string()))
    }

    fn stand(&mut self) -> Result<Reply, PawError> {
        self.settle_body();
        let from_sit = self.pose_state == PoseState::Sit;
        self.transitions
            .stand(from_sit)
            .map_err(|e| self.fail("stand", e))?;
        self.set_pose_state(PoseState::Stand);
        Ok(Reply::Done("stand".to_string()))
    }

    fn lie(&mut self) -> Result<Reply, PawError> {
        self.settle_body();
        self.transitions.lie().map_err(|e| self.fail("lie", e))?;
        self.set_pose_state(PoseState::Lie);
        Ok(Reply::Done("lie down".to_string()))
    }

    fn paw(&mut self) -> Result<Reply, PawError> {
        self.settle_body();
        let paw = Paw::new(
            Arc::clone(&self.ctx.actuator),
            self.ctx.head.clone(),
            Arc::clone(&self.ctx.distance),
            Arc::clone(&self.transitions),
            self.ctx.config.paw.clone(),
            self.ctx.config.head.flush_timeout,
        );
        let outcome = paw.run(&self.interrupt).map_err(|e| self.fail("paw", e))?;
        self.set_pose_state(PoseState::Sit);
        Ok(match outcome {
            PawOutcome::Given => Reply::Done("paw done".to_string()),
            PawOutcome::NoHand => Reply::Notice("no hand detected".to_string()),
            PawOutcome::Cancelled => Reply::Notice("paw cancelled".to_string()),
        })
    }

    /// Start the patrol.  `pose_state` is left alone: the patrol stands up on
    /// its own thread and keeps walking even when that stand fails.
    fn walk(&mut self) -> Result<Reply, PawError> {
        if self.patrol.is_stopping() {
            return Ok(Reply::Notice(
                "previous walk is still stopping; try again shortly".to_string(),
            ));
        }
        if self.patrol.is_active() {
            return Ok(Reply::Notice(
                "walk already running (type 'stop' first)".to_string(),
            ));
        }
        let timeout = self.join_timeout();
        self.scan.stop_and_join(timeout);
        let started = Self::start_behavior(&self.ctx, &mut self.patrol, "patrol")?;
        if !started {
            return Ok(Reply::Notice("walk unavailable on this robot".to_string()));
        }
        Ok(Reply::Done("walk started (type 'stop' to stop)".to_string()))
    }

    /// Signal the patrol, halt the hardware directly, then reap the task.
    fn stop_patrol(&mut self) {
        self.patrol.request_stop();
        self.halt();
        let timeout = self.join_timeout();
        self.patrol.stop_and_join(timeout);
    }

    /// Quiesce everything that could move the body behind a transition.
    fn settle_body(&mut self) {
        self.stop_patrol();
        let timeout = self.join_timeout();
        self.scan.stop_and_join(timeout);
        if let Err(e) = self.transitions.wait_idle() {
            warn!(error = %e, "body still busy; continuing with the transition");
        }
    }

    /// Cancel every task, stand up (best effort) and release the hardware.
    /// Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        info!("shutting down");

        self.interrupt.set();
        self.stop_patrol();
        let timeout = self.join_timeout();
        self.scan.stop_and_join(timeout);
        self.touch.stop_and_join(timeout);

        let from_sit = self.pose_state == PoseState::Sit;
        match self.transitions.stand(from_sit) {
            Ok(()) => self.set_pose_state(PoseState::Stand),
            Err(e) => debug!(error = %e, "final stand failed"),
        }

        self.dispatcher_stop.set();
        if let Some(handle) = self.dispatcher.take()
            && handle.join().is_err()
        {
            warn!("head dispatcher panicked");
        }

        if let Err(e) = self.ctx.actuator.release() {
            warn!(error = %e, "actuator release failed");
        }
    }

    /// Build `name` from the registry and start it in `slot`.
    ///
    /// Returns `Ok(false)` when the hardware does not support it or the slot
    /// is already busy.
    fn start_behavior(
        ctx: &BehaviorContext,
        slot: &mut TaskSlot,
        name: &str,
    ) -> Result<bool, PawError> {
        let Some(spec) = registry::lookup(name) else {
            return Err(PawError::Config(format!("no behaviour named '{name}'")));
        };
        let behavior = match spec.build(ctx) {
            Ok(b) => b,
            Err(e) => {
                warn!(behavior = name, error = %e, "behaviour unavailable");
                ctx.bus.publish_to(
                    Topic::SystemAlerts,
                    Event::new(SOURCE, EventPayload::Notice(format!("{name} unavailable: {e}"))),
                );
                return Ok(false);
            }
        };
        slot.start(move |stop| behavior.run(stop))
            .map_err(|source| PawError::Spawn {
                task: name.to_string(),
                source,
            })
    }

    fn join_timeout(&self) -> Duration {
        self.ctx.config.transitions.task_join_timeout
    }

    fn halt(&self) {
        if let Err(e) = self.ctx.actuator.halt_all() {
            error!(error = %e, "halt failed");
            self.publish_fault("body", &e);
        }
    }

    /// Failure path of a transition: halt, report, surface the error.
    fn fail(&self, what: &str, e: HardwareError) -> PawError {
        error!(command = what, error = %e, "transition failed");
        self.halt();
        self.publish_fault(what, &e);
        PawError::Hardware(e)
    }

    fn publish_fault(&self, component: &str, e: &HardwareError) {
        self.ctx.bus.publish_to(
            Topic::SystemAlerts,
            Event::new(
                SOURCE,
                EventPayload::HardwareFault {
                    component: component.to_string(),
                    message: e.to_string(),
                },
            ),
        );
    }

    fn set_pose_state(&mut self, pose: PoseState) {
        if self.pose_state != pose {
            info!(from = %self.pose_state, to = %pose, "pose changed");
        }
        self.pose_state = pose;
        self.ctx.bus.publish_to(
            Topic::BehaviorStatus,
            Event::new(SOURCE, EventPayload::PoseChanged { pose }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawctl_hal::{HalCall, SimRobot};
    use std::thread;
    use std::time::Instant;

    fn fast_config() -> ControllerConfig {
        let mut cfg = ControllerConfig::default();
        cfg.transitions.sit_pause = Duration::from_millis(1);
        cfg.transitions.stand_from_sit_pause = Duration::from_millis(1);
        cfg.transitions.lie_pause = Duration::from_millis(1);
        cfg.patrol.start_settle = Duration::from_millis(1);
        cfg.scan.home_settle = Duration::from_millis(20);
        cfg.scan.forward_settle = Duration::from_millis(20);
        cfg.paw.hand_timeout = Duration::from_millis(100);
        cfg.paw.sample_delay = Duration::from_millis(1);
        cfg
    }

    fn coordinator(robot: &Arc<SimRobot>) -> Coordinator {
        coordinator_with(robot, fast_config())
    }

    fn coordinator_with(robot: &Arc<SimRobot>, config: ControllerConfig) -> Coordinator {
        let probe = DistanceProbe::new().with_accessor("sim", robot.clone());
        let robot_handles = Robot {
            actuator: robot.clone(),
            distance: probe,
            touch: Some(robot.clone()),
        };
        let mut c = Coordinator::new(robot_handles, config, EventBus::default()).unwrap();
        c.start().unwrap();
        c
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
    fn commands_parse_with_aliases() {
        assert_eq!("SIT".parse::<Command>(), Ok(Command::Sit));
        assert_eq!("  lie   down ".parse::<Command>(), Ok(Command::Lie));
        assert_eq!("exit".parse::<Command>(), Ok(Command::Quit));
        assert_eq!("q".parse::<Command>(), Ok(Command::Quit));
        assert_eq!("   ".parse::<Command>(), Err(CommandError::Empty));
        assert_eq!(
            "jump".parse::<Command>(),
            Err(CommandError::Unknown("jump".to_string()))
        );
    }

    #[test]
    fn startup_stands_up() {
        let robot = Arc::new(SimRobot::builder().build());
        let mut c = coordinator(&robot);
        assert_eq!(c.pose_state(), PoseState::Stand);
        assert_eq!(presets(&robot), vec![("stand".to_string(), 35)]);
        c.shutdown();
    }

    #[test]
    fn unknown_command_changes_nothing() {
        let robot = Arc::new(SimRobot::builder().build());
        let mut c = coordinator(&robot);
        let before = robot.calls().len();
        assert!(matches!(
            c.dispatch("jump"),
            Err(PawError::Command(CommandError::Unknown(_)))
        ));
        assert_eq!(robot.calls().len(), before);
        assert_eq!(c.pose_state(), PoseState::Stand);
        c.shutdown();
    }

    #[test]
    fn only_one_patrol_at_a_time() {
        let robot = Arc::new(SimRobot::builder().build());
        let mut c = coordinator(&robot);
        assert!(matches!(c.dispatch("walk"), Ok(Reply::Done(_))));
        assert!(matches!(c.dispatch("walk"), Ok(Reply::Notice(_))));
        assert!(c.is_walking());

        let halts = robot.halt_count();
        assert_eq!(c.dispatch("stop").unwrap(), Reply::Done("stopped".to_string()));
        assert!(!c.is_walking());
        assert!(robot.halt_count() > halts);
        c.shutdown();
    }

    #[test]
    fn sit_stops_the_patrol_before_moving() {
        let robot = Arc::new(SimRobot::builder().build());
        let mut c = coordinator(&robot);
        c.dispatch("walk").unwrap();
        thread::sleep(Duration::from_millis(100));
        c.dispatch("sit").unwrap();
        assert!(!c.is_walking());
        assert_eq!(c.pose_state(), PoseState::Sit);
        assert!(c.is_scanning());

        let calls = robot.calls();
        let first_sit = calls
            .iter()
            .position(|call| matches!(call, HalCall::Preset { name, .. } if name == "sit"))
            .unwrap();
        let last_step = calls
            .iter()
            .rposition(|call| matches!(call, HalCall::Preset { name, .. } if name == "forward"))
            .unwrap();
        assert!(last_step < first_sit);
        assert!(calls[last_step..first_sit].contains(&HalCall::Halt));
        c.shutdown();
    }

    #[test]
    fn stand_after_sit_is_two_phase_and_stops_the_scan() {
        let robot = Arc::new(SimRobot::builder().build());
        let mut c = coordinator(&robot);
        c.dispatch("sit").unwrap();
        c.dispatch("stand").unwrap();
        assert!(!c.is_scanning());
        let tail: Vec<_> = presets(&robot).into_iter().rev().take(2).collect();
        assert_eq!(
            tail,
            vec![("stand".to_string(), 32), ("stand".to_string(), 22)]
        );
        c.shutdown();
    }

    #[test]
    fn failed_transition_keeps_pose_state() {
        let robot = Arc::new(SimRobot::builder().with_failing_action("lie").build());
        let mut c = coordinator(&robot);
        assert!(matches!(c.dispatch("lie down"), Err(PawError::Hardware(_))));
        assert_eq!(c.pose_state(), PoseState::Stand);
        c.shutdown();
    }

    #[test]
    fn paw_without_hand_leaves_robot_sitting() {
        let robot = Arc::new(SimRobot::builder().with_resting_distance(90.0).build());
        let mut c = coordinator(&robot);
        assert_eq!(
            c.dispatch("paw").unwrap(),
            Reply::Notice("no hand detected".to_string())
        );
        assert_eq!(c.pose_state(), PoseState::Sit);
        assert!(!c.is_scanning());
        c.shutdown();
    }

    #[test]
    fn quit_stands_and_releases() {
        let robot = Arc::new(SimRobot::builder().build());
        let mut c = coordinator(&robot);
        c.dispatch("sit").unwrap();
        assert_eq!(c.dispatch("quit").unwrap(), Reply::Quit);
        assert_eq!(c.pose_state(), PoseState::Stand);
        assert_eq!(robot.calls().last(), Some(&HalCall::Release));
        assert!(!c.is_scanning());
        assert_eq!(c.dispatch("sit").unwrap(), Reply::Quit);
    }

    #[test]
    fn robot_without_head_still_sits() {
        let robot = Arc::new(
            SimRobot::builder()
                .with_capabilities(pawctl_hal::Capabilities {
                    head: false,
                    ..Default::default()
                })
                .build(),
        );
        let mut c = coordinator(&robot);
        c.dispatch("sit").unwrap();
        assert!(!c.is_scanning());
        assert!(robot.writes_to(JointGroup::Head).is_empty());
        assert_eq!(c.pose_state(), PoseState::Sit);
        c.shutdown();
    }

    #[test]
    fn help_lists_the_behaviours() {
        let text = Reply::Help.to_string();
        assert!(text.starts_with("Commands:"));
        for spec in &registry::BEHAVIORS {
            assert!(text.contains(spec.name));
            assert!(text.contains(spec.summary));
        }
    }

    #[test]
    fn walk_does_not_claim_a_stand_it_never_made() {
        let robot = Arc::new(SimRobot::builder().with_failing_action("stand").build());
        let mut c = coordinator(&robot);
        assert_eq!(c.pose_state(), PoseState::Unknown);

        assert!(matches!(c.dispatch("walk"), Ok(Reply::Done(_))));
        thread::sleep(Duration::from_millis(50));
        assert!(c.is_walking());
        assert_eq!(c.pose_state(), PoseState::Unknown);
        c.shutdown();
    }

    #[test]
    fn walk_waits_for_a_slow_patrol_to_wind_down() {
        let robot = Arc::new(
            SimRobot::builder()
                .with_idle_delay(Duration::from_millis(400))
                .build(),
        );
        let mut cfg = fast_config();
        cfg.transitions.task_join_timeout = Duration::from_millis(50);
        let mut c = coordinator_with(&robot, cfg);

        // The patrol's start pose blocks in wait_until_idle past the join bound.
        assert!(matches!(c.dispatch("walk"), Ok(Reply::Done(_))));
        assert_eq!(c.dispatch("stop").unwrap(), Reply::Done("stopped".to_string()));
        assert!(c.is_walking());
        assert_eq!(
            c.dispatch("walk").unwrap(),
            Reply::Notice("previous walk is still stopping; try again shortly".to_string())
        );

        let deadline = Instant::now() + Duration::from_secs(3);
        while c.is_walking() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!c.is_walking());
        let halts = robot.halt_count();
        assert!(matches!(c.dispatch("walk"), Ok(Reply::Done(_))));
        thread::sleep(Duration::from_millis(100));
        assert!(c.is_walking());
        assert_eq!(robot.halt_count(), halts);
        c.shutdown();
    }

    #[test]
    fn stuck_motion_does_not_hang_commands() {
        let robot = Arc::new(SimRobot::builder().with_stuck_motion().build());
        let mut cfg = fast_config();
        cfg.transitions.idle_timeout = Duration::from_millis(50);
        let mut c = coordinator_with(&robot, cfg);
        assert_eq!(c.pose_state(), PoseState::Unknown);

        let started = Instant::now();
        assert!(matches!(
            c.dispatch("sit"),
            Err(PawError::Hardware(HardwareError::Timeout { .. }))
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(c.pose_state(), PoseState::Unknown);

        let started = Instant::now();
        assert_eq!(c.dispatch("stop").unwrap(), Reply::Done("stopped".to_string()));
        assert!(started.elapsed() < Duration::from_secs(2));
        c.shutdown();
    }
}
