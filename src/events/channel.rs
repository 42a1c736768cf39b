//! Crossbeam-backed event channel.
//!
//! Senders are cloned freely into the executor's worker threads and the
//! engine; the UI side holds the single receiver.

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::{Event, SessionEvent};

/// Sending half, handed to every phase
#[derive(Clone)]
pub struct EventSender {
    inner: Sender<Event>,
}

impl EventSender {
    /// Never blocks. Events are dropped once the receiver is gone, so a run
    /// without a listener behaves exactly like one with.
    pub fn send(&self, event: Event) {
        let _ = self.inner.send(event);
    }

    /// Shorthand for `SessionEvent::StateChanged`
    pub fn state_changed(&self, state: &str) {
        self.send(Event::Session(SessionEvent::StateChanged {
            state: state.to_string(),
        }));
    }
}

/// Receiving half, owned by the UI layer
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Block until the next event; None once every sender is dropped
    pub fn recv(&self) -> Option<Event> {
        self.inner.recv().ok()
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.inner.try_recv().ok()
    }

    /// Blocking iterator that ends when the run drops its senders
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }

    /// Everything queued right now, without blocking
    pub fn drain(&self) -> Vec<Event> {
        self.inner.try_iter().collect()
    }
}

/// Constructor for sender/receiver pairs
pub struct EventChannel;

impl EventChannel {
    /// Unbounded: progress events are small and a slow terminal must never
    /// stall extraction workers.
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }
}

/// A sender whose receiver is already gone
pub fn null_sender() -> EventSender {
    let (sender, _receiver) = EventChannel::new();
    sender
}
