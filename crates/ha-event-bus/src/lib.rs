//! Event bus with typed pub/sub
//!
//! Every subscriber gets its own bounded queue (a `tokio` broadcast
//! receiver), so a slow consumer never blocks the publisher and events are
//! delivered to each subscriber in the order they were fired.

use dashmap::DashMap;
use ha_core::{Context, Event, EventData, EventType};
use std::marker::PhantomData;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Queue depth of each subscription
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Raw event as carried on the bus
pub type BusEvent = Event<serde_json::Value>;

/// Central publish/subscribe broker
pub struct EventBus {
    channels: DashMap<EventType, broadcast::Sender<BusEvent>>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Subscribe to every event of `event_type`
    pub fn subscribe(&self, event_type: impl Into<EventType>) -> broadcast::Receiver<BusEvent> {
        let event_type = event_type.into();
        trace!(event_type = %event_type, "Subscribing to event type");

        self.channels
            .entry(event_type)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe with the payload decoded into `T`
    pub fn subscribe_typed<T: EventData + serde::de::DeserializeOwned>(
        &self,
    ) -> TypedEventReceiver<T> {
        TypedEventReceiver {
            rx: self.subscribe(T::event_type()),
            _phantom: PhantomData,
        }
    }

    /// Deliver an event to every current subscriber of its type
    pub fn fire(&self, event: BusEvent) {
        debug!(event_type = %event.event_type, "Firing event");

        if let Some(sender) = self.channels.get(&event.event_type) {
            // an error only means nobody is listening right now
            let _ = sender.send(event);
        }
    }

    /// Serialize `data` and fire it under its own event type
    pub fn fire_typed<T: EventData + serde::Serialize>(&self, data: T, context: Context) {
        match serde_json::to_value(&data) {
            Ok(json) => self.fire(Event::typed(data, context).map(|_| json)),
            Err(e) => warn!(event_type = T::event_type(), "Dropping unserializable event: {}", e),
        }
    }

    /// Number of live subscribers for `event_type`
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.channels
            .get(&EventType::from(event_type))
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver yielding events with their payload decoded
pub struct TypedEventReceiver<T> {
    rx: broadcast::Receiver<BusEvent>,
    _phantom: PhantomData<T>,
}

impl<T: EventData + serde::de::DeserializeOwned> TypedEventReceiver<T> {
    /// Wait for the next event whose payload decodes as `T`
    ///
    /// Payloads that fail to decode are skipped.
    pub async fn recv(&mut self) -> Result<Event<T>, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            match serde_json::from_value::<T>(event.data.clone()) {
                Ok(data) => return Ok(event.map(|_| data)),
                Err(e) => trace!(event_type = %event.event_type, "Skipping undecodable event: {}", e),
            }
        }
    }
}
