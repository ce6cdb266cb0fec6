//! Upward notifications for the embedding application
//!
//! The voice layer reports stream availability and peer departures through
//! a broadcast bus. Events are fire-and-forget: with no active subscriber
//! they are silently dropped.

use tokio::sync::broadcast;

use crate::media::StreamHandle;
use crate::presence::Identity;

/// Event channel capacity (ring buffer size)
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Voice layer event enumeration
#[derive(Debug, Clone)]
pub enum VoiceEvent {
    /// A peer's remote audio stream became available for playback
    RemoteStreamReady {
        identity: Identity,
        stream: StreamHandle,
    },
    /// A peer link record was removed (out of range, error, or teardown)
    PeerDisconnected { identity: Identity },
    /// A link failed before or during negotiation; not retried until the
    /// next reconcile cycle
    LinkFailed { identity: Identity, reason: String },
}

/// Broadcast bus for voice events
///
/// # Example
///
/// ```no_run
/// use proximity_voice::events::EventBus;
///
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = rx.recv().await {
///         println!("voice event: {:?}", event);
///     }
/// });
/// ```
pub struct EventBus {
    tx: broadcast::Sender<VoiceEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: VoiceEvent) {
        // If no subscribers, send returns Err which is normal
        let _ = self.tx.send(event);
    }

    /// Subscribe to events
    ///
    /// The receiver uses a ring buffer; a subscriber that falls too far
    /// behind receives a `Lagged` error and misses events.
    pub fn subscribe(&self) -> broadcast::Receiver<VoiceEvent> {
        self.tx.subscribe()
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
