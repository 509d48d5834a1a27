//! `pawctl-kernel` – Motion Safety Primitives
//!
//! The pieces every behaviour leans on to move the robot without fighting
//! other behaviours for the same servos.
//!
//! # Modules
//!
//! - [`head_filter`] – [`HeadFilter`][head_filter::HeadFilter]: the single
//!   writer of head servos.  Applies suppression windows, a per-joint
//!   deadband and latest-wins coalescing, then commits at most one pose per
//!   minimum interval from its dispatcher thread.
//! - [`stop_signal`] – [`StopSignal`][stop_signal::StopSignal]: the
//!   cooperative cancellation flag owned by each behaviour task; waits on it
//!   return early once it is set.

pub mod head_filter;
pub mod stop_signal;

pub use head_filter::{HeadFilter, HeadFilterConfig, SubmitOutcome};
pub use stop_signal::StopSignal;
