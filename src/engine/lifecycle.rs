use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::dispatch::rank_candidates;
use crate::engine::fanout::{fan_out, Audience};
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::DriverStatus;
use crate::models::notification::NotificationKind;
use crate::models::order::{
    compute_total, DriverSnapshot, GuestInfo, LineItem, Order, OrderStatus, PaymentDetails,
    RefundStatus, TrackingEntry, DEFAULT_DELIVERY_TIME, DEFAULT_PAYMENT_METHOD,
};
use crate::models::user::{Actor, Role};
use crate::observability::metrics::Metrics;
use crate::relay::{DriverLocation, Relay, RelayEvent};
use crate::store::Stores;

/// Largest accepted gap between a client-supplied total and the computed one.
const TOTAL_TOLERANCE: f64 = 0.005;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub user: Option<Uuid>,
    pub guest_info: Option<GuestInfo>,
    pub items: Vec<LineItem>,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub tax: f64,
    #[serde(default)]
    pub discount: f64,
    #[serde(default)]
    pub tip: f64,
    pub total_amount: Option<f64>,
    pub shipping_address: String,
    pub delivery_location: Option<GeoPoint>,
    pub delivery_time: Option<String>,
    pub payment_method: Option<String>,
    pub payment_details: Option<PaymentDetails>,
    #[serde(default)]
    pub is_subscription: bool,
}

/// Creates orders, assigns drivers and applies the two post-creation
/// mutations (status and refund).
///
/// Only the order write itself decides whether an operation succeeds. Driver
/// bookkeeping, admin notifications and relay events are best effort: their
/// failures are logged and counted, never returned.
#[derive(Clone)]
pub struct OrderLifecycle {
    stores: Stores,
    relay: Arc<Relay>,
    metrics: Metrics,
    radius_km: f64,
}

impl OrderLifecycle {
    pub fn new(stores: Stores, relay: Arc<Relay>, metrics: Metrics, radius_km: f64) -> Self {
        Self {
            stores,
            relay,
            metrics,
            radius_km,
        }
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    pub async fn create_order(&self, payload: NewOrder) -> Result<Order, AppError> {
        let total_amount = validate_new_order(&payload)?;
        let order_id = Uuid::new_v4();

        let driver = match &payload.delivery_location {
            Some(target) => self.claim_nearest_driver(order_id, target)?,
            None => None,
        };

        let now = Utc::now();
        let order = Order {
            id: order_id,
            user: payload.user,
            guest_info: payload.guest_info,
            items: payload.items,
            subtotal: payload.subtotal,
            delivery_fee: payload.delivery_fee,
            tax: payload.tax,
            discount: payload.discount,
            tip: payload.tip,
            total_amount,
            shipping_address: payload.shipping_address.trim().to_string(),
            delivery_location: payload.delivery_location,
            delivery_time: payload
                .delivery_time
                .unwrap_or_else(|| DEFAULT_DELIVERY_TIME.to_string()),
            payment_method: payload
                .payment_method
                .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
            payment_details: payload.payment_details.unwrap_or_default(),
            is_subscription: payload.is_subscription,
            driver,
            tracking_history: Vec::new(),
            status: OrderStatus::Pending,
            refund_status: RefundStatus::None,
            refund_reason: None,
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.stores.orders.insert_order(order.clone()) {
            if let Some(snapshot) = &order.driver {
                self.release_driver(snapshot.driver_id, order_id);
            }
            return Err(err);
        }

        if let Some(snapshot) = &order.driver {
            if let Err(err) = self
                .stores
                .drivers
                .append_assigned_order(snapshot.driver_id, order_id)
            {
                warn!(
                    order_id = %order_id,
                    driver_id = %snapshot.driver_id,
                    error = %err,
                    "failed to record order on driver; continuing"
                );
                self.metrics.record_secondary_failure("driver_update");
            }
        }

        let assignment = if order.driver.is_some() {
            "assigned"
        } else {
            "unassigned"
        };
        self.metrics
            .orders_created_total
            .with_label_values(&[assignment])
            .inc();

        self.spawn_admin_fan_out(&order);

        info!(
            order_id = %order.id,
            total = order.total_amount,
            driver_id = ?order.driver.as_ref().map(|d| d.driver_id),
            "order created"
        );

        Ok(order)
    }

    pub async fn update_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        actor: &Actor,
    ) -> Result<Order, AppError> {
        if !actor.is_admin() {
            return Err(AppError::Unauthorized(
                "only admins can change order status".to_string(),
            ));
        }

        let order = self.stores.orders.update_order(order_id, &mut |order: &mut Order| {
            let now = Utc::now();
            order.status = status;
            order.updated_at = now;
            order.tracking_history.push(TrackingEntry {
                status,
                timestamp: now,
                location: order.driver.as_ref().map(|d| d.location),
            });
            Ok(())
        })?;

        info!(order_id = %order.id, status = ?status, "order status updated");

        let room = order.id.to_string();
        self.relay
            .publish(&room, RelayEvent::OrderUpdate(Box::new(order.clone())));
        if let Some(snapshot) = &order.driver {
            self.relay.publish(
                &room,
                RelayEvent::DriverLocationUpdate(DriverLocation {
                    order_id: room.clone(),
                    location: snapshot.location,
                }),
            );
        }

        Ok(order)
    }

    pub async fn request_refund(
        &self,
        order_id: Uuid,
        reason: Option<String>,
        actor: &Actor,
    ) -> Result<Order, AppError> {
        let mut reason = reason;
        let order = self.stores.orders.update_order(order_id, &mut |order: &mut Order| {
            if order.user != Some(actor.id) {
                return Err(AppError::Unauthorized(format!(
                    "order {order_id} does not belong to the caller"
                )));
            }
            if order.status != OrderStatus::Delivered {
                return Err(AppError::InvalidState(
                    "only delivered orders can be refunded".to_string(),
                ));
            }
            if order.refund_status != RefundStatus::None {
                return Err(AppError::Conflict("refund already requested".to_string()));
            }

            order.refund_status = RefundStatus::Pending;
            order.refund_reason = reason.take();
            order.updated_at = Utc::now();
            Ok(())
        })?;

        info!(order_id = %order.id, "refund requested");
        Ok(order)
    }

    /// Moves the assigned driver's pin on the order and tells the order's room.
    pub async fn push_driver_location(
        &self,
        order_id: Uuid,
        location: GeoPoint,
        actor: &Actor,
    ) -> Result<Order, AppError> {
        location.validate()?;
        let current = self.load_order(order_id)?;

        let driver_id = match &current.driver {
            Some(snapshot) => snapshot.driver_id,
            None => {
                return Err(AppError::InvalidState(format!(
                    "order {order_id} has no assigned driver"
                )));
            }
        };

        if !actor.is_admin() && !self.is_driver_account(driver_id, actor)? {
            return Err(AppError::Unauthorized(
                "only admins or the assigned driver can report its location".to_string(),
            ));
        }

        // the driver was authorized against the order as read above
        let order = self.stores.orders.update_order(order_id, &mut |order: &mut Order| {
            match order.driver.as_mut() {
                Some(snapshot) if snapshot.driver_id == driver_id => {
                    snapshot.location = location;
                    order.updated_at = Utc::now();
                    Ok(())
                }
                _ => Err(AppError::Conflict(format!(
                    "driver assignment on order {order_id} changed"
                ))),
            }
        })?;

        let room = order.id.to_string();
        self.relay.publish(
            &room,
            RelayEvent::DriverLocationUpdate(DriverLocation {
                order_id: room.clone(),
                location,
            }),
        );

        Ok(order)
    }

    pub fn get_order(&self, order_id: Uuid) -> Result<Order, AppError> {
        self.load_order(order_id)
    }

    fn load_order(&self, order_id: Uuid) -> Result<Order, AppError> {
        self.stores
            .orders
            .get_order(order_id)?
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))
    }

    fn is_driver_account(&self, driver_id: Uuid, actor: &Actor) -> Result<bool, AppError> {
        if actor.role != Role::Rider {
            return Ok(false);
        }
        Ok(self
            .stores
            .drivers
            .get_driver(driver_id)?
            .is_some_and(|driver| driver.user == actor.id))
    }

    /// Walks the ranked candidates and claims the first one still available.
    /// A candidate lost to a concurrent order is skipped in favour of the next
    /// nearest. Store failures leave the order unassigned.
    fn claim_nearest_driver(
        &self,
        order_id: Uuid,
        target: &GeoPoint,
    ) -> Result<Option<DriverSnapshot>, AppError> {
        let timer = Instant::now();

        let drivers = match self
            .stores
            .drivers
            .list_drivers_by_status(DriverStatus::Available)
        {
            Ok(drivers) => drivers,
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "failed to load drivers; order stays unassigned");
                self.metrics.record_secondary_failure("driver_lookup");
                return Ok(None);
            }
        };

        let ranked = rank_candidates(target, &drivers, self.radius_km)?;
        let mut claimed = None;

        for candidate in ranked {
            match self.stores.drivers.claim_available(candidate.driver_id) {
                Ok(Some(driver)) => {
                    claimed = Some((driver, candidate.distance_km));
                    break;
                }
                Ok(None) => {
                    debug!(
                        order_id = %order_id,
                        driver_id = %candidate.driver_id,
                        "driver taken by another order; trying next"
                    );
                }
                Err(err) => {
                    warn!(
                        order_id = %order_id,
                        driver_id = %candidate.driver_id,
                        error = %err,
                        "failed to claim driver; trying next"
                    );
                    self.metrics.record_secondary_failure("driver_update");
                }
            }
        }

        self.metrics
            .dispatch_latency_seconds
            .observe(timer.elapsed().as_secs_f64());

        let Some((driver, distance_km)) = claimed else {
            info!(order_id = %order_id, "no available driver in range");
            return Ok(None);
        };

        let (name, phone) = match self.stores.users.get_user(driver.user) {
            Ok(Some(user)) => (user.name, user.phone),
            Ok(None) => {
                warn!(driver_id = %driver.id, "driver has no user record");
                ("Driver".to_string(), None)
            }
            Err(err) => {
                warn!(driver_id = %driver.id, error = %err, "failed to load driver user");
                ("Driver".to_string(), None)
            }
        };

        // claim_available only succeeds for drivers that ranked, and ranking
        // requires a location
        let location = driver.current_location.unwrap_or(*target);

        info!(
            order_id = %order_id,
            driver_id = %driver.id,
            distance_km,
            "driver assigned"
        );

        Ok(Some(DriverSnapshot {
            driver_id: driver.id,
            name,
            phone,
            location,
        }))
    }

    fn release_driver(&self, driver_id: Uuid, order_id: Uuid) {
        if let Err(err) = self.stores.drivers.release(driver_id) {
            warn!(
                order_id = %order_id,
                driver_id = %driver_id,
                error = %err,
                "failed to release driver after order write failed"
            );
            self.metrics.record_secondary_failure("driver_release");
        }
    }

    fn spawn_admin_fan_out(&self, order: &Order) {
        let stores = self.stores.clone();
        let metrics = self.metrics.clone();
        let order_id = order.id;
        let short_ref = order.short_ref();
        let user = order.user;
        let guest_name = order.guest_info.as_ref().and_then(|g| g.name.clone());

        tokio::spawn(async move {
            let customer = customer_name(&stores, user, guest_name);
            let message = format!("New Order #{short_ref} placed by {customer}");

            match fan_out(
                stores.users.as_ref(),
                stores.notifications.as_ref(),
                Audience::Role(Role::Admin),
                NotificationKind::Order,
                &message,
                Some(order_id),
            ) {
                Ok(count) => debug!(order_id = %order_id, count, "admins notified"),
                Err(err) => {
                    warn!(order_id = %order_id, error = %err, "admin notification failed");
                    metrics.record_secondary_failure("admin_notification");
                }
            }
        });
    }
}

fn customer_name(stores: &Stores, user: Option<Uuid>, guest_name: Option<String>) -> String {
    match user {
        Some(id) => match stores.users.get_user(id) {
            Ok(Some(user)) => user.name,
            _ => "Guest".to_string(),
        },
        None => guest_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "Guest".to_string()),
    }
}

/// Checks the checkout payload and returns the total the order will carry.
fn validate_new_order(payload: &NewOrder) -> Result<f64, AppError> {
    match (&payload.user, &payload.guest_info) {
        (Some(_), Some(_)) => {
            return Err(AppError::Validation(
                "provide either user or guestInfo, not both".to_string(),
            ));
        }
        (None, None) => {
            return Err(AppError::Validation(
                "either user or guestInfo is required".to_string(),
            ));
        }
        (None, Some(guest)) if guest.is_blank() => {
            return Err(AppError::Validation(
                "guestInfo needs at least one of name, email or phone".to_string(),
            ));
        }
        _ => {}
    }

    if payload.items.is_empty() {
        return Err(AppError::Validation("order has no items".to_string()));
    }
    for (index, item) in payload.items.iter().enumerate() {
        if item.product.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "item {index}: product is required"
            )));
        }
        if item.name.trim().is_empty() {
            return Err(AppError::Validation(format!("item {index}: name is required")));
        }
        if item.quantity < 1 {
            return Err(AppError::Validation(format!(
                "item {index}: quantity must be at least 1"
            )));
        }
        if !item.price.is_finite() || item.price < 0.0 {
            return Err(AppError::Validation(format!(
                "item {index}: price must be a non-negative number"
            )));
        }
    }

    let amounts = [
        ("subtotal", payload.subtotal),
        ("deliveryFee", payload.delivery_fee),
        ("tax", payload.tax),
        ("discount", payload.discount),
        ("tip", payload.tip),
    ];
    for (field, value) in amounts {
        if !value.is_finite() || value < 0.0 {
            return Err(AppError::Validation(format!(
                "{field} must be a non-negative number"
            )));
        }
    }

    if payload.shipping_address.trim().is_empty() {
        return Err(AppError::Validation(
            "shippingAddress is required".to_string(),
        ));
    }

    if let Some(location) = &payload.delivery_location {
        location.validate()?;
    }

    let total = compute_total(
        payload.subtotal,
        payload.delivery_fee,
        payload.tax,
        payload.discount,
        payload.tip,
    );
    if total < 0.0 {
        return Err(AppError::Validation(
            "discount exceeds the order value".to_string(),
        ));
    }

    if let Some(claimed) = payload.total_amount {
        if !claimed.is_finite() || (claimed - total).abs() > TOTAL_TOLERANCE {
            return Err(AppError::Validation(format!(
                "totalAmount {claimed} does not match computed total {total}"
            )));
        }
    }

    Ok(total)
}
