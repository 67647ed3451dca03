//! Room-scoped publish/subscribe for order tracking.
//!
//! A room is named by an order id and backed by its own broadcast channel.
//! Delivery is at-most-once to whoever is subscribed at publish time; nothing
//! is buffered for rooms without subscribers and nothing is replayed.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::geo::GeoPoint;
use crate::models::order::Order;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocation {
    pub order_id: String,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RelayEvent {
    OrderUpdate(Box<Order>),
    DriverLocationUpdate(DriverLocation),
}

impl RelayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RelayEvent::OrderUpdate(_) => "orderUpdate",
            RelayEvent::DriverLocationUpdate(_) => "driverLocationUpdate",
        }
    }
}

pub struct Relay {
    rooms: DashMap<String, broadcast::Sender<RelayEvent>>,
    buffer_size: usize,
    metrics: Metrics,
}

impl Relay {
    pub fn new(buffer_size: usize, metrics: Metrics) -> Self {
        Self {
            rooms: DashMap::new(),
            buffer_size: buffer_size.max(1),
            metrics,
        }
    }

    /// Subscribes to `room`, creating it on first join. Dropping the returned
    /// receiver leaves the room.
    pub fn join(&self, room: &str) -> broadcast::Receiver<RelayEvent> {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .subscribe()
    }

    /// Sends `event` to everyone currently in `room` and returns how many
    /// subscribers it reached.
    pub fn publish(&self, room: &str, event: RelayEvent) -> usize {
        let name = event.name();
        let delivered = match self.rooms.get(room) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        };

        self.metrics
            .relay_events_total
            .with_label_values(&[name])
            .inc();

        if delivered == 0 {
            debug!(room, event = name, "no subscribers; event dropped");
            self.prune(room);
        }
        delivered
    }

    /// Drops `room` if nobody is subscribed any more.
    pub fn prune(&self, room: &str) {
        self.rooms
            .remove_if(room, |_, sender| sender.receiver_count() == 0);
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn subscriber_count(&self, room: &str) -> usize {
        self.rooms
            .get(room)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}
