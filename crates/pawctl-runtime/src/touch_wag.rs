//! Touch-triggered tail wag.
//!
//! [`TouchWatcher`] polls the head touch pad, debounces the raw signal with
//! [`TouchDebouncer`] and drives a [`TailWagger`]: a confirmed press starts
//! the wag, a confirmed release stops it and returns the tail to its
//! centre-down rest position.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pawctl_hal::{Actuator, TouchSensor};
use pawctl_kernel::StopSignal;
use pawctl_middleware::{EventBus, Topic};
use pawctl_types::{Event, EventPayload, JointGroup, Pose};
use tracing::{debug, info, warn};

use crate::config::{TouchTuning, WagTuning};
use crate::task::TaskSlot;

const SOURCE: &str = "pawctl-runtime::touch_wag";

/// Upper bound on waiting for the wag thread to finish its return stroke.
const WAG_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause after centring the tail before the first swing.
const WAG_SETTLE: Duration = Duration::from_millis(50);

// ─────────────────────────────────────────────────────────────────────────────
// Debounce
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchEdge {
    Pressed,
    Released,
}

/// Two-sided debounce: a press needs the raw signal "on" for `on_stable`, a
/// release needs it "off" for `off_stable`.
#[derive(Debug, Clone)]
pub struct TouchDebouncer {
    touched: bool,
    on_since: Option<Instant>,
    off_since: Option<Instant>,
    on_stable: Duration,
    off_stable: Duration,
}

impl TouchDebouncer {
    pub fn new(initial: bool, tuning: &TouchTuning) -> Self {
        Self {
            touched: initial,
            on_since: None,
            off_since: None,
            on_stable: tuning.on_stable,
            off_stable: tuning.off_stable,
        }
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub fn update_at(&mut self, raw: bool, now: Instant) -> Option<TouchEdge> {
        if raw {
            self.off_since = None;
            let since = *self.on_since.get_or_insert(now);
            if !self.touched && now.saturating_duration_since(since) >= self.on_stable {
                self.touched = true;
                return Some(TouchEdge::Pressed);
            }
        } else {
            self.on_since = None;
            let since = *self.off_since.get_or_insert(now);
            if self.touched && now.saturating_duration_since(since) >= self.off_stable {
                self.touched = false;
                return Some(TouchEdge::Released);
            }
        }
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tail wagger
// ─────────────────────────────────────────────────────────────────────────────

/// Runs at most one wag at a time.
pub struct TailWagger {
    actuator: Arc<dyn Actuator>,
    tuning: WagTuning,
    enabled: bool,
    slot: TaskSlot,
}

impl TailWagger {
    pub fn new(actuator: Arc<dyn Actuator>, tuning: WagTuning, has_tail: bool) -> Self {
        if !has_tail {
            warn!("no tail servo; tail wag disabled");
        }
        Self {
            actuator,
            tuning,
            enabled: has_tail,
            slot: TaskSlot::new("tail-wag"),
        }
    }

    pub fn is_wagging(&self) -> bool {
        self.slot.is_active()
    }

    /// Start wagging.  A no-op while a wag is already running.
    pub fn start(&mut self) {
        if !self.enabled {
            debug!("tail wag requested but no tail servo");
            return;
        }
        let actuator = Arc::clone(&self.actuator);
        let tuning = self.tuning.clone();
        match self.slot.start(move |stop| wag(actuator.as_ref(), &tuning, &stop)) {
            Ok(true) => debug!("tail wag started"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "could not start tail wag thread"),
        }
    }

    /// Stop wagging and wait (bounded) for the tail to return to centre.
    pub fn stop(&mut self) {
        self.slot.stop_and_join(WAG_JOIN_TIMEOUT);
    }
}

fn wag(actuator: &dyn Actuator, tuning: &WagTuning, stop: &StopSignal) {
    let centre = |speed| {
        let pose = Pose::from([tuning.centre]);
        if let Err(e) = actuator.set_pose(JointGroup::Tail, &pose, Some(speed)) {
            debug!(error = %e, "tail centre failed");
        }
    };

    centre(tuning.return_speed);
    if !stop.wait_timeout(WAG_SETTLE) {
        let targets = [tuning.centre + tuning.swing, tuning.centre - tuning.swing];
        for target in targets.iter().cycle() {
            let pose = Pose::from([*target]);
            if let Err(e) = actuator.set_pose(JointGroup::Tail, &pose, Some(tuning.speed)) {
                debug!(error = %e, "tail swing failed");
            }
            if stop.wait_timeout(tuning.interval) {
                break;
            }
        }
    }
    centre(tuning.return_speed);
}

// ─────────────────────────────────────────────────────────────────────────────
// Touch watcher
// ─────────────────────────────────────────────────────────────────────────────

pub struct TouchWatcher {
    sensor: Arc<dyn TouchSensor>,
    wagger: TailWagger,
    bus: EventBus,
    tuning: TouchTuning,
}

impl TouchWatcher {
    pub fn new(
        sensor: Arc<dyn TouchSensor>,
        wagger: TailWagger,
        bus: EventBus,
        tuning: TouchTuning,
    ) -> Self {
        Self {
            sensor,
            wagger,
            bus,
            tuning,
        }
    }

    /// Poll until `stop` is set.  A failed read counts as "untouched".
    pub fn run(mut self, stop: StopSignal) {
        let initial = self.read();
        let mut debouncer = TouchDebouncer::new(initial, &self.tuning);
        info!(touched = initial, "touch watcher started");
        if initial {
            self.wagger.start();
        }

        while !stop.wait_timeout(self.tuning.poll) {
            let Some(edge) = debouncer.update_at(self.read(), Instant::now()) else {
                continue;
            };
            let touched = edge == TouchEdge::Pressed;
            info!(touched, "touch {}", if touched { "on" } else { "off" });
            self.bus.publish_to(
                Topic::BehaviorStatus,
                Event::new(SOURCE, EventPayload::Touch { touched }),
            );
            if touched {
                self.wagger.start();
            } else {
                self.wagger.stop();
            }
        }

        self.wagger.stop();
        info!("touch watcher stopped");
    }

    fn read(&self) -> bool {
        match self.sensor.read_touch() {
            Ok(reading) => reading.is_touched(),
            Err(e) => {
                debug!(error = %e, "touch read failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawctl_hal::SimRobot;
    use pawctl_types::TouchReading;
    use std::thread;

    fn at(t0: Instant, ms: u64) -> Instant {
        t0 + Duration::from_millis(ms)
    }

    #[test]
    fn glitches_shorter_than_the_window_are_rejected() {
        let tuning = TouchTuning {
            poll: Duration::from_millis(10),
            on_stable: Duration::from_millis(20),
            off_stable: Duration::from_millis(20),
        };
        let mut debouncer = TouchDebouncer::new(false, &tuning);
        let raw = [
            [false; 3].as_slice(),
            [true; 4].as_slice(),
            [false; 2].as_slice(),
            [true; 5].as_slice(),
            [false; 3].as_slice(),
        ]
        .concat();

        let t0 = Instant::now();
        let edges: Vec<_> = raw
            .iter()
            .enumerate()
            .filter_map(|(i, r)| debouncer.update_at(*r, at(t0, i as u64 * 10)))
            .collect();
        assert_eq!(edges, vec![TouchEdge::Pressed, TouchEdge::Released]);
    }

    #[test]
    fn short_dip_inside_a_touch_does_not_restart_the_wag() {
        // Windows of two poll periods; the two-sample dip spans only one.
        let tuning = TouchTuning {
            poll: Duration::from_millis(10),
            on_stable: Duration::from_millis(20),
            off_stable: Duration::from_millis(20),
        };
        let mut debouncer = TouchDebouncer::new(false, &tuning);
        let raw: Vec<bool> = std::iter::repeat_n(false, 3)
            .chain(std::iter::repeat_n(true, 4))
            .chain(std::iter::repeat_n(false, 2))
            .chain(std::iter::repeat_n(true, 5))
            .collect();
        assert_eq!(raw.len(), 14);

        let t0 = Instant::now();
        let mut edges = Vec::new();
        for (i, r) in raw.iter().enumerate() {
            if let Some(edge) = debouncer.update_at(*r, at(t0, i as u64 * 10)) {
                edges.push((i, edge));
            }
        }
        assert_eq!(edges, vec![(5, TouchEdge::Pressed)]);
        assert!(debouncer.is_touched());

        // Letting go afterwards ends the single wag.
        assert_eq!(debouncer.update_at(false, at(t0, 140)), None);
        assert_eq!(debouncer.update_at(false, at(t0, 150)), None);
        assert_eq!(debouncer.update_at(false, at(t0, 160)), Some(TouchEdge::Released));
    }

    #[test]
    fn single_sample_contact_is_ignored() {
        let mut debouncer = TouchDebouncer::new(false, &TouchTuning::default());
        let t0 = Instant::now();
        assert_eq!(debouncer.update_at(true, t0), None);
        assert_eq!(debouncer.update_at(false, at(t0, 20)), None);
        assert_eq!(debouncer.update_at(true, at(t0, 40)), None);
        assert_eq!(debouncer.update_at(true, at(t0, 80)), None);
        assert_eq!(debouncer.update_at(true, at(t0, 100)), Some(TouchEdge::Pressed));
        assert!(debouncer.is_touched());
    }

    #[test]
    fn release_needs_the_longer_off_window() {
        let mut debouncer = TouchDebouncer::new(true, &TouchTuning::default());
        let t0 = Instant::now();
        assert_eq!(debouncer.update_at(false, t0), None);
        assert_eq!(debouncer.update_at(false, at(t0, 100)), None);
        assert_eq!(debouncer.update_at(false, at(t0, 120)), Some(TouchEdge::Released));
    }

    #[test]
    fn wagger_without_tail_does_nothing() {
        let robot = Arc::new(SimRobot::builder().build());
        let mut wagger = TailWagger::new(robot.clone(), WagTuning::default(), false);
        wagger.start();
        assert!(!wagger.is_wagging());
        assert!(robot.calls().is_empty());
    }

    #[test]
    fn wag_swings_around_centre_and_returns() {
        let robot = Arc::new(SimRobot::builder().build());
        let mut wagger = TailWagger::new(robot.clone(), WagTuning::default(), true);
        wagger.start();
        wagger.start();
        thread::sleep(Duration::from_millis(200));
        wagger.stop();

        let writes = robot.writes_to(JointGroup::Tail);
        assert_eq!(writes.first(), Some(&Pose::from([-20])));
        assert_eq!(writes.get(1), Some(&Pose::from([20])));
        assert_eq!(writes.get(2), Some(&Pose::from([-60])));
        assert_eq!(writes.last(), Some(&Pose::from([-20])));
    }

    #[test]
    fn watcher_wags_once_per_stable_press() {
        let robot = Arc::new(
            SimRobot::builder()
                .with_touch_script(
                    std::iter::repeat_n(TouchReading::Code("N".into()), 3)
                        .chain(std::iter::repeat_n(TouchReading::Code("LS".into()), 20)),
                )
                .build(),
        );
        let bus = EventBus::default();
        let mut status = bus.subscribe_to(Topic::BehaviorStatus);
        let tuning = TouchTuning {
            poll: Duration::from_millis(10),
            on_stable: Duration::from_millis(30),
            off_stable: Duration::from_millis(30),
        };
        let wagger = TailWagger::new(robot.clone(), WagTuning::default(), true);
        let watcher = TouchWatcher::new(robot.clone(), wagger, bus.clone(), tuning);

        let stop = StopSignal::new();
        let task_stop = stop.clone();
        let handle = thread::spawn(move || watcher.run(task_stop));
        thread::sleep(Duration::from_millis(600));
        stop.set();
        handle.join().unwrap();

        let touches: Vec<bool> = status
            .drain()
            .into_iter()
            .filter_map(|e| match e.payload {
                EventPayload::Touch { touched } => Some(touched),
                _ => None,
            })
            .collect();
        assert_eq!(touches, vec![true, false]);
        assert_eq!(robot.writes_to(JointGroup::Tail).last(), Some(&Pose::from([-20])));
    }
}
