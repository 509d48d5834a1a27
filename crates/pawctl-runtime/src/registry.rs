//! Static behaviour registry.
//!
//! Background behaviours are looked up by name and built from a shared
//! [`BehaviorContext`].  A factory refuses with
//! [`HardwareError::Unsupported`] when the hardware it needs is missing, so
//! the coordinator can report the feature as unavailable instead of
//! starting a task that would fail every tick.
//!
//! | Name | Behaviour |
//! |---|---|
//! | `patrol` | [`Patrol`] obstacle-avoidance walk |
//! | `idle_scan` | [`IdleScan`] head scan around the captured home pose |
//! | `touch_wag` | [`TouchWatcher`] touch-triggered tail wag |

use std::sync::Arc;

use parking_lot::Mutex;
use pawctl_hal::{Actuator, Capabilities, DistanceProbe, TouchSensor};
use pawctl_kernel::{HeadFilter, StopSignal};
use pawctl_middleware::EventBus;
use pawctl_types::{HardwareError, Pose};

use crate::config::ControllerConfig;
use crate::idle_scan::IdleScan;
use crate::patrol::Patrol;
use crate::touch_wag::{TailWagger, TouchWatcher};

/// Everything a behaviour may need, shared by all of them.
#[derive(Clone)]
pub struct BehaviorContext {
    pub actuator: Arc<dyn Actuator>,
    pub capabilities: Capabilities,
    /// `None` when the robot has no head servos.
    pub head: Option<Arc<HeadFilter>>,
    pub distance: Arc<DistanceProbe>,
    pub touch: Option<Arc<dyn TouchSensor>>,
    pub bus: EventBus,
    pub config: Arc<ControllerConfig>,
    /// Head pose captured just before the last sit.
    pub head_home: Arc<Mutex<Pose>>,
}

/// A background behaviour, ready to run on its own thread.
pub trait Behavior: Send {
    fn run(self: Box<Self>, stop: StopSignal);
}

impl Behavior for Patrol {
    fn run(self: Box<Self>, stop: StopSignal) {
        Patrol::run(&self, stop);
    }
}

impl Behavior for IdleScan {
    fn run(self: Box<Self>, stop: StopSignal) {
        IdleScan::run(&self, stop);
    }
}

impl Behavior for TouchWatcher {
    fn run(self: Box<Self>, stop: StopSignal) {
        TouchWatcher::run(*self, stop);
    }
}

pub type BehaviorFactory = fn(&BehaviorContext) -> Result<Box<dyn Behavior>, HardwareError>;

pub struct BehaviorSpec {
    pub name: &'static str,
    pub summary: &'static str,
    factory: BehaviorFactory,
}

impl BehaviorSpec {
    pub fn build(&self, ctx: &BehaviorContext) -> Result<Box<dyn Behavior>, HardwareError> {
        (self.factory)(ctx)
    }
}

pub static BEHAVIORS: [BehaviorSpec; 3] = [
    BehaviorSpec {
        name: "patrol",
        summary: "walk forward, halting in front of obstacles",
        factory: build_patrol,
    },
    BehaviorSpec {
        name: "idle_scan",
        summary: "look around while sitting",
        factory: build_idle_scan,
    },
    BehaviorSpec {
        name: "touch_wag",
        summary: "wag the tail while the head is touched",
        factory: build_touch_wag,
    },
];

pub fn lookup(name: &str) -> Option<&'static BehaviorSpec> {
    BEHAVIORS.iter().find(|b| b.name == name)
}

fn build_patrol(ctx: &BehaviorContext) -> Result<Box<dyn Behavior>, HardwareError> {
    if !ctx.capabilities.supports_action("forward") {
        return Err(HardwareError::Unsupported("preset action 'forward'".to_string()));
    }
    if !ctx.distance.is_available() {
        return Err(HardwareError::Unsupported("distance sensor".to_string()));
    }
    Ok(Box::new(Patrol::new(
        Arc::clone(&ctx.actuator),
        ctx.capabilities.clone(),
        Arc::clone(&ctx.distance),
        ctx.bus.clone(),
        ctx.config.patrol.clone(),
        ctx.config.transitions.idle_timeout,
    )))
}

fn build_idle_scan(ctx: &BehaviorContext) -> Result<Box<dyn Behavior>, HardwareError> {
    let head = ctx
        .head
        .as_ref()
        .ok_or_else(|| HardwareError::Unsupported("head servos".to_string()))?;
    Ok(Box::new(IdleScan::new(
        Arc::clone(head),
        ctx.head_home.lock().clone(),
        ctx.config.scan.clone(),
        ctx.config.head.flush_timeout,
    )))
}

fn build_touch_wag(ctx: &BehaviorContext) -> Result<Box<dyn Behavior>, HardwareError> {
    let sensor = ctx
        .touch
        .as_ref()
        .ok_or_else(|| HardwareError::Unsupported("touch sensor".to_string()))?;
    let wagger = TailWagger::new(
        Arc::clone(&ctx.actuator),
        ctx.config.wag.clone(),
        ctx.capabilities.tail,
    );
    Ok(Box::new(TouchWatcher::new(
        Arc::clone(sensor),
        wagger,
        ctx.bus.clone(),
        ctx.config.touch.clone(),
    )))
}
