//! Background printer for bus status events.

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

use pawctl_middleware::{EventBus, Topic, TopicReceiver};
use pawctl_types::{Event, EventPayload, PatrolState};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Subscribe to every topic and print operator-relevant events until `stop`
/// is raised.  Subscriptions are taken before the thread starts so nothing
/// published afterwards is missed.
pub fn spawn_printer(bus: &EventBus, stop: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
    let mut receivers: Vec<TopicReceiver> =
        Topic::ALL.iter().map(|t| bus.subscribe_to(*t)).collect();
    thread::Builder::new().name("status-printer".to_string()).spawn(move || {
        while !stop.load(Ordering::SeqCst) {
            for rx in &mut receivers {
                while let Some(event) = rx.try_recv() {
                    if let Some(line) = format_event(&event) {
                        println!("\n{line}");
                    }
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    })
}

/// Render one event for the operator.  Returns `None` for events that are
/// only worth a debug log (distance telemetry, pose changes already
/// acknowledged by the command loop).
pub fn format_event(event: &Event) -> Option<String> {
    match &event.payload {
        EventPayload::Distance { cm } => {
            debug!(distance_cm = ?cm, "distance");
            None
        }
        EventPayload::PoseChanged { .. } => None,
        EventPayload::PatrolTransition { from, to } => {
            let to_text = match to {
                PatrolState::SafeWalking => to.to_string().green(),
                PatrolState::DangerHalted => to.to_string().red().bold(),
                PatrolState::SensorInvalid => to.to_string().yellow(),
            };
            Some(format!("  [patrol] {from} -> {to_text}"))
        }
        EventPayload::Touch { touched } => Some(format!(
            "  [touch] {}",
            if *touched { "on" } else { "off" }
        )),
        EventPayload::HardwareFault { component, message } => Some(format!(
            "  {} {component}: {message}",
            "[fault]".red().bold()
        )),
        EventPayload::Notice(msg) => Some(format!("  {} {msg}", "[notice]".yellow())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_is_not_printed() {
        let event = Event::new("test", EventPayload::Distance { cm: Some(42.0) });
        assert!(format_event(&event).is_none());
    }

    #[test]
    fn transitions_name_both_states() {
        let event = Event::new(
            "test",
            EventPayload::PatrolTransition {
                from: PatrolState::SafeWalking,
                to: PatrolState::DangerHalted,
            },
        );
        let line = format_event(&event).expect("printed");
        assert!(line.contains("SAFE_WALKING"));
        assert!(line.contains("DANGER_HALTED"));
    }

    #[test]
    fn printer_exits_when_stopped() {
        let bus = EventBus::default();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_printer(&bus, stop.clone()).expect("spawn");
        bus.publish_to(Topic::SystemAlerts, Event::new("test", EventPayload::Notice("hi".into())));
        stop.store(true, Ordering::SeqCst);
        assert!(handle.join().is_ok());
    }
}
