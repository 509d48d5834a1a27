//! `pawctl-middleware` – Status Bus
//!
//! Carries what the behaviours observe and decide (distance readings, patrol
//! state changes, touches, pose changes, hardware faults) to whoever wants to
//! watch, without the behaviours knowing who is listening.
//!
//! # Modules
//!
//! - [`bus`] – topic-based publish/subscribe [`EventBus`] built on Tokio
//!   broadcast channels, usable from plain threads as well as async code.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
