use std::sync::Arc;

use crate::engine::lifecycle::OrderLifecycle;
use crate::observability::metrics::Metrics;
use crate::relay::Relay;
use crate::store::Stores;

pub struct AppState {
    pub stores: Stores,
    pub orders: OrderLifecycle,
    pub relay: Arc<Relay>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(dispatch_radius_km: f64, room_buffer_size: usize) -> Self {
        Self::with_stores(Stores::in_memory(), dispatch_radius_km, room_buffer_size)
    }

    /// One relay per process, handed to the lifecycle rather than reached
    /// through a global.
    pub fn with_stores(stores: Stores, dispatch_radius_km: f64, room_buffer_size: usize) -> Self {
        let metrics = Metrics::new();
        let relay = Arc::new(Relay::new(room_buffer_size, metrics.clone()));
        let orders = OrderLifecycle::new(
            stores.clone(),
            relay.clone(),
            metrics.clone(),
            dispatch_radius_km,
        );

        Self {
            stores,
            orders,
            relay,
            metrics,
        }
    }
}
