//! Beat notifier - moves beat events off the render path
//!
//! The render path pushes [BeatEvent]s into an SPSC ring; this thread drains
//! the ring and forwards each event to the broadcast channel subscribers
//! listen on. It checks the session-active flag before every send, and the
//! controller joins it during `stop()`, so nothing is delivered once `stop()`
//! has returned.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::audio::{BeatEvent, BeatReceiver};

use super::telemetry::{TelemetryEventKind, TelemetryPublisher};

/// Spawn the notifier thread for one session
pub fn spawn_notifier(
    mut receiver: BeatReceiver,
    sink: broadcast::Sender<BeatEvent>,
    active: Arc<AtomicBool>,
    poll_interval: Duration,
    telemetry: TelemetryPublisher,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("beep-notifier".to_string())
        .spawn(move || {
            let mut forwarded: u64 = 0;
            let mut reported_drops: u64 = 0;

            'session: while active.load(Ordering::Acquire) {
                while let Some(event) = receiver.pop() {
                    if !active.load(Ordering::Acquire) {
                        break 'session;
                    }
                    // Lagging or absent subscribers are not the notifier's concern
                    let _ = sink.send(event);
                    forwarded += 1;
                }

                let dropped = receiver.dropped();
                if dropped > reported_drops {
                    tracing::warn!(
                        "[Notifier] Beat ring full, {} events dropped",
                        dropped - reported_drops
                    );
                    telemetry.publish(
                        TelemetryEventKind::Warning,
                        Some(format!("{} beat events dropped", dropped - reported_drops)),
                    );
                    reported_drops = dropped;
                }

                thread::sleep(poll_interval);
            }

            tracing::debug!("[Notifier] Exiting after {} beat events", forwarded);
        })
}
