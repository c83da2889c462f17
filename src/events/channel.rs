//! Progress sink between the curation engine and whatever displays it.
//!
//! Sending never blocks a phase: if the receiver is gone or a bounded channel
//! is full, the event is dropped.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use super::Event;

/// Sending half, cloned into every phase of a run
#[derive(Clone, Default)]
pub struct EventSender {
    sink: Option<Sender<Event>>,
}

impl EventSender {
    /// Wrap a raw crossbeam sender
    pub fn new(sender: Sender<Event>) -> Self {
        Self { sink: Some(sender) }
    }

    /// Sender that discards every event
    pub fn discarding() -> Self {
        Self::default()
    }

    /// Best-effort delivery
    pub fn send(&self, event: Event) {
        if let Some(sink) = &self.sink {
            let _ = sink.try_send(event);
        }
    }

    /// Send a free-form status line
    pub fn put_line(&self, message: impl Into<String>) {
        self.send(Event::Notice {
            message: message.into(),
        });
    }
}

/// Receiving half, owned by the UI side
pub struct EventReceiver {
    source: Receiver<Event>,
}

impl EventReceiver {
    /// Block for the next event; `None` once every sender is gone
    pub fn recv(&self) -> Option<Event> {
        self.source.recv().ok()
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.source.try_recv().ok()
    }

    /// Blocking iterator that ends when every sender is dropped
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.source.iter()
    }

    /// Every event currently queued, without blocking
    pub fn drain(&self) -> Vec<Event> {
        self.source.try_iter().collect()
    }

    /// Blocking iterator over rendered status lines
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.iter().map(|event| event.to_string())
    }
}

/// Constructors for connected sender/receiver pairs
pub struct EventChannel;

impl EventChannel {
    /// Unbounded channel. Events are small, so this suits most callers.
    pub fn new() -> (EventSender, EventReceiver) {
        Self::pair(unbounded())
    }

    /// Channel holding at most `capacity` undelivered events; overflow is
    /// dropped.
    pub fn bounded(capacity: usize) -> (EventSender, EventReceiver) {
        Self::pair(bounded(capacity.max(1)))
    }

    fn pair((sender, receiver): (Sender<Event>, Receiver<Event>)) -> (EventSender, EventReceiver) {
        (EventSender::new(sender), EventReceiver { source: receiver })
    }
}

/// Sender for runs nobody watches
pub fn null_sender() -> EventSender {
    EventSender::discarding()
}
