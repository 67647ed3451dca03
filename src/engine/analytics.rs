use serde::Serialize;

use crate::models::order::{Order, OrderStatus};

const RECENT_ORDERS: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub total_orders: usize,
    pub total_users: usize,
    pub total_sales: f64,
    pub recent_orders: Vec<Order>,
}

/// `orders` must be newest first. Cancelled orders count towards
/// `total_orders` but not towards sales.
pub fn summarize(orders: Vec<Order>, customer_count: usize) -> SalesSummary {
    let total_sales = orders
        .iter()
        .filter(|order| order.status != OrderStatus::Cancelled)
        .map(|order| order.total_amount)
        .sum();

    SalesSummary {
        total_orders: orders.len(),
        total_users: customer_count,
        total_sales,
        recent_orders: orders.into_iter().take(RECENT_ORDERS).collect(),
    }
}
