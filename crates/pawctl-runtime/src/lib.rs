//! `pawctl-runtime` – Behaviours and command coordination
//!
//! Everything that decides *what* the robot does lives here.  Body motion
//! goes through [`pawctl_hal::Actuator`]; head motion always goes through the
//! kernel's [`HeadFilter`][pawctl_kernel::HeadFilter].
//!
//! # Modules
//!
//! - [`coordinator`] – [`Coordinator`]: parses operator commands, serialises
//!   pose transitions and owns the background behaviour slots.
//! - [`transitions`] – [`PoseTransitions`]: stand, sit and lie with head
//!   suppression windows.
//! - [`patrol`] – [`Patrol`][patrol::Patrol]: obstacle-avoidance walk driven
//!   by the [`PatrolMachine`][patrol::PatrolMachine] state machine.
//! - [`idle_scan`] – [`IdleScan`][idle_scan::IdleScan]: slow head scan while
//!   sitting.
//! - [`touch_wag`] – touch debounce and the tail wagger.
//! - [`paw`] – [`Paw`][paw::Paw]: the "give paw" sequence.
//! - [`registry`] – static table of background behaviours and their
//!   hardware requirements.
//! - [`task`] – [`TaskHandle`][task::TaskHandle] and
//!   [`TaskSlot`][task::TaskSlot]: cancellable worker threads.
//! - [`config`] – [`ControllerConfig`]: every tunable with its default.
//! - [`telemetry`] – [`init_tracing`]: global `tracing` subscriber setup.

pub mod config;
pub mod coordinator;
pub mod idle_scan;
pub mod patrol;
pub mod paw;
pub mod registry;
pub mod task;
pub mod telemetry;
pub mod touch_wag;
pub mod transitions;

pub use config::{ControllerConfig, Gait};
pub use coordinator::{Command, Coordinator, HELP, Reply, Robot};
pub use telemetry::init_tracing;
pub use transitions::PoseTransitions;
