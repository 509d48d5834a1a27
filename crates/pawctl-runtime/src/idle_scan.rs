//! Idle head scan while sitting.
//!
//! The scan centres the head on the home pose captured before the sit,
//! tilts it slightly forward and then cycles through a fixed set of offsets
//! around that tilted base, holding each one for the dwell time.  Every pose
//! goes through the [`HeadFilter`]; on exit the head is sent back home.

use std::sync::Arc;
use std::time::Duration;

use pawctl_kernel::{HeadFilter, StopSignal};
use pawctl_types::Pose;
use tracing::{debug, info};

use crate::config::{HEAD_PITCH, HEAD_YAW, ScanTuning};

/// The scan cycle around `base`: left, right, up, down, two diagonals and
/// back to `base`.
pub fn scan_poses(base: &Pose, tuning: &ScanTuning) -> Vec<Pose> {
    let at = |yaw: i32, pitch: i32| base.offset(HEAD_YAW, yaw).offset(HEAD_PITCH, pitch);
    vec![
        at(-tuning.yaw, 0),
        at(tuning.yaw, 0),
        at(0, tuning.pitch_up),
        at(0, tuning.pitch_down),
        at(-tuning.diagonal_yaw, tuning.diagonal_pitch),
        at(tuning.diagonal_yaw, tuning.diagonal_pitch),
        base.clone(),
    ]
}

pub struct IdleScan {
    head: Arc<HeadFilter>,
    home: Pose,
    tuning: ScanTuning,
    flush_timeout: Duration,
}

impl IdleScan {
    pub fn new(
        head: Arc<HeadFilter>,
        home: Pose,
        tuning: ScanTuning,
        flush_timeout: Duration,
    ) -> Self {
        Self {
            head,
            home,
            tuning,
            flush_timeout,
        }
    }

    pub fn run(&self, stop: StopSignal) {
        info!(home = ?self.home.angles(), "idle scan started");
        self.head.suppress(Duration::ZERO);
        self.scan(&stop);
        self.return_home();
        info!("idle scan stopped");
    }

    fn scan(&self, stop: &StopSignal) {
        self.head.submit(self.home.clone(), Some(self.tuning.home_speed));
        if stop.wait_timeout(self.tuning.home_settle) {
            return;
        }

        let base = self.home.offset(HEAD_PITCH, self.tuning.forward_tilt);
        self.head.submit(base.clone(), Some(self.tuning.forward_speed));
        if stop.wait_timeout(self.tuning.forward_settle) {
            return;
        }

        for pose in scan_poses(&base, &self.tuning).iter().cycle() {
            if stop.is_set() {
                return;
            }
            debug!(pose = ?pose.angles(), "scan pose");
            self.head.submit(pose.clone(), Some(self.tuning.step_speed));
            if stop.wait_timeout(self.tuning.dwell) {
                return;
            }
        }
    }

    fn return_home(&self) {
        self.head.suppress(Duration::ZERO);
        self.head.submit(self.home.clone(), Some(self.tuning.home_speed));
        if !self.head.wait_flushed(self.flush_timeout) {
            debug!("home pose still pending after the scan stopped");
        }
    }
}
