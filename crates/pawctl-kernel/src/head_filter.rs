//! [`HeadFilter`] – the head anti-jitter layer.
//!
//! Every writer in the controller (patrol, paw, idle scan, pose transitions)
//! submits head poses here instead of calling the actuator directly.  The
//! filter turns a stream of "what the head should look like now" requests
//! into the few hardware writes the servo link can tolerate:
//!
//! 1. **Suppression** – while a suppression window is open every submission
//!    is dropped silently.
//! 2. **Duplicate** – a pose identical to the last pose actually sent is
//!    dropped.
//! 3. **Deadband** – a pose whose every joint is within `deadband` of the
//!    last sent pose is dropped as noise.
//! 4. **Coalescing** – anything else replaces the single pending request.
//!    Intermediate requests are never applied (latest wins).
//!
//! A dispatcher thread ([`HeadFilter::spawn_dispatcher`]) wakes every
//! `dispatch_period` and commits the pending pose when the filter is not
//! suppressed and at least `min_interval` has passed since the previous
//! hardware write.  It is the only code path that writes head servos.
//!
//! Every time-dependent entry point has an `*_at(now)` twin so the rules
//! can be exercised deterministically.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pawctl_hal::Actuator;
use pawctl_types::{Angle, JointGroup, Pose};
use tracing::{debug, info, warn};

use crate::stop_signal::StopSignal;

/// Tunables of the head filter.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadFilterConfig {
    /// Largest per-joint delta still treated as noise.
    pub deadband: Angle,
    /// Minimum spacing between two hardware writes.
    pub min_interval: Duration,
    /// Wake-up period of the dispatcher thread.
    pub dispatch_period: Duration,
}

impl Default for HeadFilterConfig {
    fn default() -> Self {
        Self {
            deadband: 4,
            min_interval: Duration::from_millis(100),
            dispatch_period: Duration::from_millis(10),
        }
    }
}

/// What [`HeadFilter::submit`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Suppressed,
    Duplicate,
    WithinDeadband,
    /// Stored as the pending pose, replacing any earlier pending request.
    Pending,
}

#[derive(Debug, Clone)]
struct PendingPose {
    pose: Pose,
    speed: Option<u16>,
}

#[derive(Debug, Default)]
struct FilterState {
    last_sent_pose: Option<Pose>,
    last_sent_at: Option<Instant>,
    pending: Option<PendingPose>,
    suppress_until: Option<Instant>,
}

impl FilterState {
    fn is_suppressed(&self, now: Instant) -> bool {
        self.suppress_until.is_some_and(|until| now < until)
    }
}

/// Process-wide head command filter.  Share it behind an `Arc`.
pub struct HeadFilter {
    actuator: Arc<dyn Actuator>,
    config: HeadFilterConfig,
    state: Mutex<FilterState>,
}

impl HeadFilter {
    pub fn new(actuator: Arc<dyn Actuator>, config: HeadFilterConfig) -> Self {
        Self {
            actuator,
            config,
            state: Mutex::new(FilterState::default()),
        }
    }

    pub fn config(&self) -> &HeadFilterConfig {
        &self.config
    }

    /// Request `pose` for the head.  Never blocks on hardware.
    pub fn submit(&self, pose: Pose, speed: Option<u16>) -> SubmitOutcome {
        self.submit_at(pose, speed, Instant::now())
    }

    pub fn submit_at(&self, pose: Pose, speed: Option<u16>, now: Instant) -> SubmitOutcome {
        let mut state = self.state.lock();

        if state.is_suppressed(now) {
            return SubmitOutcome::Suppressed;
        }

        if let Some(last) = &state.last_sent_pose {
            if *last == pose {
                return SubmitOutcome::Duplicate;
            }
            if pose.within_deadband(last, self.config.deadband) {
                return SubmitOutcome::WithinDeadband;
            }
        }

        state.pending = Some(PendingPose { pose, speed });
        SubmitOutcome::Pending
    }

    /// Open or extend a suppression window of `window` starting now.
    ///
    /// The window only ever grows; a zero window instead closes any open
    /// window immediately so that one setup pose can pass.
    pub fn suppress(&self, window: Duration) {
        self.suppress_at(window, Instant::now());
    }

    pub fn suppress_at(&self, window: Duration, now: Instant) {
        let mut state = self.state.lock();
        if window.is_zero() {
            state.suppress_until = Some(now);
            return;
        }
        let until = now + window;
        state.suppress_until = Some(match state.suppress_until {
            Some(current) if current > until => current,
            _ => until,
        });
    }

    pub fn is_suppressed(&self) -> bool {
        self.is_suppressed_at(Instant::now())
    }

    pub fn is_suppressed_at(&self, now: Instant) -> bool {
        self.state.lock().is_suppressed(now)
    }

    pub fn has_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    /// Last pose that reached the hardware, if any.
    pub fn last_sent(&self) -> Option<Pose> {
        self.state.lock().last_sent_pose.clone()
    }

    /// One dispatcher step.  Returns the pose written to hardware, if any.
    pub fn dispatch_once(&self) -> Option<Pose> {
        self.dispatch_once_at(Instant::now())
    }

    pub fn dispatch_once_at(&self, now: Instant) -> Option<Pose> {
        let pending = {
            let mut state = self.state.lock();
            if state.is_suppressed(now) {
                return None;
            }
            let rate_limited = state
                .last_sent_at
                .is_some_and(|t| now.saturating_duration_since(t) < self.config.min_interval);
            if rate_limited {
                return None;
            }
            state.pending.take()?
        };

        // Hardware write happens outside the lock so submitters never wait
        // on the servo bus.
        let result = self
            .actuator
            .set_pose(JointGroup::Head, &pending.pose, pending.speed);

        let mut state = self.state.lock();
        state.last_sent_at = Some(now);
        match result {
            Ok(()) => {
                debug!(pose = ?pending.pose.angles(), "head pose committed");
                state.last_sent_pose = Some(pending.pose.clone());
                Some(pending.pose)
            }
            Err(e) => {
                warn!(error = %e, "head write failed; pose dropped");
                None
            }
        }
    }

    /// Wait until the pending pose has been committed (or dropped), at most
    /// `timeout`.  Returns `true` when nothing is pending any more.
    pub fn wait_flushed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.has_pending() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.config.dispatch_period);
        }
    }

    /// Start the dispatcher thread.  It runs until `shutdown` is set.
    pub fn spawn_dispatcher(self: &Arc<Self>, shutdown: StopSignal) -> io::Result<JoinHandle<()>> {
        let filter = Arc::clone(self);
        thread::Builder::new()
            .name("head-filter".to_string())
            .spawn(move || {
                info!(
                    deadband = filter.config.deadband,
                    min_interval_ms = filter.config.min_interval.as_millis() as u64,
                    "head anti-jitter dispatcher running"
                );
                while !shutdown.wait_timeout(filter.config.dispatch_period) {
                    filter.dispatch_once();
                }
                debug!("head dispatcher stopped");
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawctl_hal::SimRobot;

    fn filter() -> (Arc<SimRobot>, HeadFilter) {
        let robot = Arc::new(SimRobot::builder().build());
        let filter = HeadFilter::new(robot.clone(), HeadFilterConfig::default());
        (robot, filter)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_pose_is_committed() {
        let (robot, filter) = filter();
        let t0 = Instant::now();
        assert_eq!(
            filter.submit_at(Pose::from([0, 0, -20]), Some(25), t0),
            SubmitOutcome::Pending
        );
        assert_eq!(filter.dispatch_once_at(t0), Some(Pose::from([0, 0, -20])));
        assert_eq!(robot.writes_to(JointGroup::Head), vec![Pose::from([0, 0, -20])]);
        assert!(!filter.has_pending());
    }

    #[test]
    fn latest_submission_wins_within_one_tick() {
        let (robot, filter) = filter();
        let t0 = Instant::now();
        filter.submit_at(Pose::from([10, 0, 0]), None, t0);
        filter.submit_at(Pose::from([11, 0, 0]), None, t0 + ms(1));
        filter.submit_at(Pose::from([50, 0, 0]), None, t0 + ms(2));
        filter.dispatch_once_at(t0 + ms(10));
        filter.dispatch_once_at(t0 + ms(200));
        assert_eq!(robot.writes_to(JointGroup::Head), vec![Pose::from([50, 0, 0])]);
    }

    #[test]
    fn deadband_never_writes() {
        let (robot, filter) = filter();
        let t0 = Instant::now();
        filter.submit_at(Pose::from([10, 0, 0]), None, t0);
        filter.dispatch_once_at(t0);

        let mut t = t0;
        for dx in -4..=4 {
            for dz in [-4, 0, 4] {
                t += ms(150);
                let pose = Pose::from([10 + dx, dz, -dz]);
                let outcome = filter.submit_at(pose, None, t);
                assert!(matches!(
                    outcome,
                    SubmitOutcome::WithinDeadband | SubmitOutcome::Duplicate
                ));
                assert_eq!(filter.dispatch_once_at(t), None);
            }
        }
        assert_eq!(robot.writes_to(JointGroup::Head).len(), 1);
    }

    #[test]
    fn exact_duplicate_is_dropped() {
        let (_robot, filter) = filter();
        let t0 = Instant::now();
        filter.submit_at(Pose::from([5, 5, 5]), None, t0);
        filter.dispatch_once_at(t0);
        assert_eq!(
            filter.submit_at(Pose::from([5, 5, 5]), None, t0 + ms(500)),
            SubmitOutcome::Duplicate
        );
    }

    #[test]
    fn suppression_drops_every_submission() {
        let (robot, filter) = filter();
        let t0 = Instant::now();
        filter.suppress_at(Duration::from_secs(2), t0);
        for i in 0..20 {
            let t = t0 + ms(i * 90);
            assert_eq!(
                filter.submit_at(Pose::from([i as i32 * 10, 0, 0]), None, t),
                SubmitOutcome::Suppressed
            );
            assert_eq!(filter.dispatch_once_at(t), None);
        }
        assert!(robot.writes_to(JointGroup::Head).is_empty());
        assert!(!filter.is_suppressed_at(t0 + Duration::from_secs(2)));
    }

    #[test]
    fn suppression_blocks_an_already_pending_pose() {
        let (robot, filter) = filter();
        let t0 = Instant::now();
        filter.submit_at(Pose::from([30, 0, 0]), None, t0);
        filter.suppress_at(ms(800), t0);
        assert_eq!(filter.dispatch_once_at(t0 + ms(100)), None);
        assert!(robot.writes_to(JointGroup::Head).is_empty());
        assert_eq!(
            filter.dispatch_once_at(t0 + ms(801)),
            Some(Pose::from([30, 0, 0]))
        );
    }

    #[test]
    fn suppression_only_extends() {
        let (_robot, filter) = filter();
        let t0 = Instant::now();
        filter.suppress_at(Duration::from_secs(2), t0);
        filter.suppress_at(ms(400), t0 + ms(100));
        assert!(filter.is_suppressed_at(t0 + ms(1500)));
    }

    #[test]
    fn zero_window_releases_immediately() {
        let (robot, filter) = filter();
        let t0 = Instant::now();
        filter.suppress_at(Duration::from_secs(2), t0);
        filter.suppress_at(Duration::ZERO, t0 + ms(10));
        assert!(!filter.is_suppressed_at(t0 + ms(10)));
        assert_eq!(
            filter.submit_at(Pose::from([0, 0, -20]), Some(25), t0 + ms(10)),
            SubmitOutcome::Pending
        );
        assert!(filter.dispatch_once_at(t0 + ms(20)).is_some());
        filter.suppress_at(Duration::from_secs(2), t0 + ms(30));
        assert!(filter.is_suppressed_at(t0 + ms(40)));
        assert_eq!(robot.writes_to(JointGroup::Head).len(), 1);
    }

    #[test]
    fn writes_are_rate_limited() {
        let (robot, filter) = filter();
        let t0 = Instant::now();
        filter.submit_at(Pose::from([0, 0, 0]), None, t0);
        filter.dispatch_once_at(t0);
        filter.submit_at(Pose::from([20, 0, 0]), None, t0 + ms(20));
        assert_eq!(filter.dispatch_once_at(t0 + ms(50)), None);
        assert!(filter.has_pending());
        assert_eq!(
            filter.dispatch_once_at(t0 + ms(100)),
            Some(Pose::from([20, 0, 0]))
        );
        assert_eq!(robot.writes_to(JointGroup::Head).len(), 2);
    }

    #[test]
    fn deadband_is_measured_against_last_sent_not_last_submitted() {
        let (robot, filter) = filter();
        let t0 = Instant::now();
        filter.submit_at(Pose::from([0, 0, 0]), None, t0);
        filter.dispatch_once_at(t0);
        // Creeping 3 units at a time never escapes the deadband of the
        // committed pose...
        for step in 1..=4 {
            filter.submit_at(Pose::from([3, 0, 0]), None, t0 + ms(step * 200));
        }
        // ...but a jump past it does.
        filter.submit_at(Pose::from([5, 0, 0]), None, t0 + ms(1000));
        filter.dispatch_once_at(t0 + ms(1010));
        assert_eq!(
            robot.writes_to(JointGroup::Head),
            vec![Pose::from([0, 0, 0]), Pose::from([5, 0, 0])]
        );
    }

    #[test]
    fn dispatcher_thread_commits_and_stops() {
        let robot = Arc::new(SimRobot::builder().build());
        let filter = Arc::new(HeadFilter::new(robot.clone(), HeadFilterConfig::default()));
        let shutdown = StopSignal::new();
        let handle = filter.spawn_dispatcher(shutdown.clone()).unwrap();

        filter.submit(Pose::from([0, 10, 0]), Some(35));
        assert!(filter.wait_flushed(Duration::from_secs(2)));
        assert_eq!(filter.last_sent(), Some(Pose::from([0, 10, 0])));

        shutdown.set();
        handle.join().unwrap();
    }
}
