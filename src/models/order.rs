use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

pub const DEFAULT_DELIVERY_TIME: &str = "Instant (15-30 mins)";
pub const DEFAULT_PAYMENT_METHOD: &str = "Cash on Delivery";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Processing,
    #[serde(rename = "Out for Delivery")]
    OutForDelivery,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum RefundStatus {
    #[default]
    None,
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GuestInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl GuestInfo {
    pub fn is_blank(&self) -> bool {
        [&self.name, &self.email, &self.phone]
            .iter()
            .all(|field| field.as_deref().is_none_or(|v| v.trim().is_empty()))
    }
}

/// Name and price are captured at checkout and never re-derived.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub product: String,
    pub name: String,
    pub quantity: u32,
    pub price: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Copy of the assigned driver taken when the order was created. It is not
/// refreshed from the driver record afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriverSnapshot {
    pub driver_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user: Option<Uuid>,
    pub guest_info: Option<GuestInfo>,
    pub items: Vec<LineItem>,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub tax: f64,
    pub discount: f64,
    pub tip: f64,
    pub total_amount: f64,
    pub shipping_address: String,
    pub delivery_location: Option<GeoPoint>,
    pub delivery_time: String,
    pub payment_method: String,
    pub payment_details: PaymentDetails,
    pub is_subscription: bool,
    pub driver: Option<DriverSnapshot>,
    pub tracking_history: Vec<TrackingEntry>,
    pub status: OrderStatus,
    pub refund_status: RefundStatus,
    pub refund_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Last six characters of the id, used in human-readable messages.
    pub fn short_ref(&self) -> String {
        let id = self.id.simple().to_string();
        id[id.len() - 6..].to_string()
    }
}

pub fn compute_total(subtotal: f64, delivery_fee: f64, tax: f64, discount: f64, tip: f64) -> f64 {
    subtotal + delivery_fee + tax - discount + tip
}
