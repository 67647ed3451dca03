//! Collaborator interfaces the order core reads and writes through.
//!
//! Each trait covers one backing collection. `MemoryStore` implements all of
//! them; anything that persists documents elsewhere only has to implement the
//! same surface. List methods return records in a stable order so that
//! dispatch tie-breaking is reproducible.

pub mod memory;

use std::sync::Arc;

use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::notification::Notification;
use crate::models::order::Order;
use crate::models::user::{Role, User};

pub use memory::MemoryStore;

pub trait OrderStore: Send + Sync {
    fn insert_order(&self, order: Order) -> Result<(), AppError>;
    fn get_order(&self, id: Uuid) -> Result<Option<Order>, AppError>;
    /// Applies `apply` to the stored order as one atomic step and returns the
    /// result. Nothing is written when `apply` fails. `NotFound` if the order
    /// was never inserted.
    fn update_order(
        &self,
        id: Uuid,
        apply: &mut dyn FnMut(&mut Order) -> Result<(), AppError>,
    ) -> Result<Order, AppError>;
    /// Newest first.
    fn list_orders(&self) -> Result<Vec<Order>, AppError>;
    /// Newest first.
    fn list_orders_for_user(&self, user: Uuid) -> Result<Vec<Order>, AppError>;
}

pub trait DriverStore: Send + Sync {
    fn insert_driver(&self, driver: Driver) -> Result<(), AppError>;
    fn get_driver(&self, id: Uuid) -> Result<Option<Driver>, AppError>;
    /// Registration order.
    fn list_drivers(&self) -> Result<Vec<Driver>, AppError>;
    /// Registration order, filtered by status.
    fn list_drivers_by_status(&self, status: DriverStatus) -> Result<Vec<Driver>, AppError>;
    /// Flips the driver to `Busy` only if it is currently `Available`.
    /// Returns the updated record, or `None` when another assignment won.
    fn claim_available(&self, id: Uuid) -> Result<Option<Driver>, AppError>;
    /// Undo of `claim_available`: `Busy` back to `Available`.
    fn release(&self, id: Uuid) -> Result<(), AppError>;
    fn append_assigned_order(&self, id: Uuid, order_id: Uuid) -> Result<(), AppError>;
    fn set_driver_status(&self, id: Uuid, status: DriverStatus) -> Result<Driver, AppError>;
    fn set_driver_location(&self, id: Uuid, location: GeoPoint) -> Result<Driver, AppError>;
}

pub trait UserStore: Send + Sync {
    fn insert_user(&self, user: User) -> Result<(), AppError>;
    fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError>;
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    fn list_users(&self) -> Result<Vec<User>, AppError>;
    fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, AppError>;
}

pub trait NotificationSink: Send + Sync {
    fn insert_notifications(&self, notifications: Vec<Notification>) -> Result<(), AppError>;
    /// Newest first, at most `limit`.
    fn list_notifications_for_user(
        &self,
        user: Uuid,
        limit: usize,
    ) -> Result<Vec<Notification>, AppError>;
    fn get_notification(&self, id: Uuid) -> Result<Option<Notification>, AppError>;
    fn mark_read(&self, id: Uuid) -> Result<(), AppError>;
}

/// Handles to every collaborator, cloned into each component that needs them.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub drivers: Arc<dyn DriverStore>,
    pub users: Arc<dyn UserStore>,
    pub notifications: Arc<dyn NotificationSink>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            orders: store.clone(),
            drivers: store.clone(),
            users: store.clone(),
            notifications: store,
        }
    }
}
