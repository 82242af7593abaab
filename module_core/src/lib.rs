// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Core module infrastructure of the GNSS logger.
//!
//! Every module communicates exclusively through the [`EventBus`]. Platform
//! inputs like hot-plug notifications, permission results and the logging
//! toggle are plain [`Event`]s, which keeps the connection state machine
//! testable without any platform event system.

use common::{
    device::{ConnectionState, DeviceDescriptor},
    notice::Notice,
    position::GnssFix,
    record::PersistReport,
};
use std::sync::Arc;
use strum_macros::EnumDiscriminants;

/// Represents a high-level event in the system.
///
/// Each `Event` wraps an [`EventKind`], which defines the actual type
/// and data carried by the event.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// The inner event type and associated data.
    pub kind: EventKind,
}

impl Event {
    /// Returns the discriminant of the carried [`EventKind`].
    pub fn event_type(&self) -> EventKindType {
        EventKindType::from(&self.kind)
    }
}

impl From<EventKind> for Event {
    fn from(kind: EventKind) -> Self {
        Event { kind }
    }
}

/// A thread-safe, reference-counted pointer to a [`PersistReport`].
pub type PersistReportPtr = Arc<PersistReport>;

/// Result of a permission request for a serial device.
#[derive(Clone, Debug, PartialEq)]
pub struct PermissionResult {
    pub device: DeviceDescriptor,
    pub granted: bool,
}

/// A read failure of the serial loop for the given device.
#[derive(Clone, Debug, PartialEq)]
pub struct SerialReadError {
    pub device: DeviceDescriptor,
    pub message: String,
}

/// Enumerates the different kinds of events that can be emitted
/// and transmitted via the [`EventBus`].
#[derive(Clone, Debug, PartialEq, EnumDiscriminants)]
#[strum_discriminants(name(EventKindType), derive(Hash))]
pub enum EventKind {
    /// Indicates that a module shall terminate.
    QuitEvent,

    /// The user switched logging on (`true`) or off (`false`).
    LoggingToggleEvent(bool),

    /// A serial device appeared.
    DeviceAttachedEvent(DeviceDescriptor),

    /// A serial device disappeared.
    DeviceDetachedEvent(DeviceDescriptor),

    /// The platform answered a permission request.
    PermissionResultEvent(PermissionResult),

    /// Reading from the open serial connection failed.
    SerialReadErrorEvent(SerialReadError),

    /// The connection supervisor entered a new state.
    ConnectionStateEvent(ConnectionState),

    /// A new fix was parsed from the receiver's sentence stream.
    ///
    /// Consumers like a map view only display the latest value.
    GnssFixEvent(GnssFix),

    /// A message that shall be shown to the user.
    NoticeEvent(Notice),

    /// The buffers of a finished session were flushed to storage.
    LogPersistedEvent(PersistReportPtr),
}

/// Returns a reference to the payload of an [`EventKind`] variant.
///
/// Evaluates to `Some(&payload)` if `$kind` is the given variant and `None` otherwise.
///
/// ```
/// use module_core::{EventKind, payload_ref};
///
/// let kind = EventKind::LoggingToggleEvent(true);
/// assert_eq!(payload_ref!(kind, EventKind::LoggingToggleEvent), Some(&true));
/// ```
#[macro_export]
macro_rules! payload_ref {
    ($kind:expr, $variant:path) => {
        match &$kind {
            $variant(payload) => Some(payload),
            _ => None,
        }
    };
}

/// A simple asynchronous event bus for publishing and subscribing to [`Event`]s.
///
/// The event bus uses a [`tokio::sync::broadcast::channel`] under the hood,
/// allowing multiple receivers to listen for the same stream of events.
///
/// Each published event is cloned and distributed to all active subscribers.
/// If no subscribers exist at the time of publication, the event is discarded silently.
pub struct EventBus {
    /// The broadcast sender used internally to distribute events.
    sender: tokio::sync::broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a new [`EventBus`] with a fixed buffer capacity of 100 messages.
    ///
    /// When the buffer is full, the oldest messages are dropped automatically
    /// as new ones are published.
    pub fn new() -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(100);
        EventBus { sender }
    }

    /// Subscribes to the event bus and returns a [`tokio::sync::broadcast::Receiver`].
    ///
    /// The returned receiver will receive all future events published after the
    /// subscription is created.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publishes an [`Event`] to all active subscribers.
    ///
    /// If no subscribers exist, the event is discarded silently.
    pub fn publish(&self, event: &Event) {
        let _ = self.sender.send(event.clone());
    }

    /// Returns a sender handle that publishes into this bus.
    ///
    /// Used by code that lives outside of the async runtime, e.g. signal handlers.
    pub fn sender(&self) -> tokio::sync::broadcast::Sender<Event> {
        self.sender.clone()
    }

    /// Creates a [`ModuleCtx`] bound to this [`EventBus`].
    pub fn context(&self) -> ModuleCtx {
        ModuleCtx::new(self)
    }
}

/// Provides a default instance of [`EventBus`].
impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Defines the common interface for an asynchronous module
/// that can be executed and communicate via the [`EventBus`].
#[async_trait::async_trait]
pub trait Module {
    /// Runs the module asynchronously until completion.
    ///
    /// This function typically contains the module's main event loop,
    /// reacting to messages received through the [`ModuleCtx`]. It returns
    /// after a [`EventKind::QuitEvent`] was handled.
    async fn run(&mut self) -> Result<(), ()>;
}

/// Provides a module-scoped context for interacting with the [`EventBus`].
///
/// Each `ModuleCtx` owns both a sender and a receiver, allowing the module
/// to both publish and listen for events concurrently.
pub struct ModuleCtx {
    /// The broadcast sender used to publish events.
    pub sender: tokio::sync::broadcast::Sender<Event>,

    /// The broadcast receiver used to listen for events.
    pub receiver: tokio::sync::broadcast::Receiver<Event>,
}

impl ModuleCtx {
    /// Constructs a new [`ModuleCtx`] from the given [`EventBus`].
    ///
    /// Clones the internal broadcast sender and creates a new receiver.
    pub fn new(event_bus: &EventBus) -> Self {
        ModuleCtx {
            sender: event_bus.sender.clone(),
            receiver: event_bus.subscribe(),
        }
    }

    /// Publishes an event of the given kind.
    ///
    /// Returns the number of receivers the event was delivered to, or an error
    /// if nobody is subscribed.
    pub fn publish_event(
        &self,
        kind: EventKind,
    ) -> Result<usize, tokio::sync::broadcast::error::SendError<Event>> {
        self.sender.send(Event { kind })
    }

    /// Publishes a [`Notice`] for the user.
    pub fn notify(&self, notice: Notice) {
        let _ = self.publish_event(EventKind::NoticeEvent(notice));
    }
}

pub mod test_helper;
