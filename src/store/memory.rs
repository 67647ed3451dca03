use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::notification::Notification;
use crate::models::order::Order;
use crate::models::user::{Role, User};
use crate::store::{DriverStore, NotificationSink, OrderStore, UserStore};

/// Record tagged with its insertion sequence number.
struct Sequenced<T> {
    seq: u64,
    record: T,
}

pub struct MemoryStore {
    next_seq: AtomicU64,
    orders: DashMap<Uuid, Sequenced<Order>>,
    drivers: DashMap<Uuid, Sequenced<Driver>>,
    users: DashMap<Uuid, Sequenced<User>>,
    notifications: DashMap<Uuid, Sequenced<Notification>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_seq: AtomicU64::new(0),
            orders: DashMap::new(),
            drivers: DashMap::new(),
            users: DashMap::new(),
            notifications: DashMap::new(),
        }
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    fn sequenced<T>(&self, value: T) -> Sequenced<T> {
        Sequenced {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            record: value,
        }
    }
}

fn collect_sorted<T, F>(map: &DashMap<Uuid, Sequenced<T>>, newest_first: bool, keep: F) -> Vec<T>
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    let mut rows: Vec<(u64, T)> = map
        .iter()
        .filter(|entry| keep(&entry.value().record))
        .map(|entry| (entry.value().seq, entry.value().record.clone()))
        .collect();

    if newest_first {
        rows.sort_by(|a, b| b.0.cmp(&a.0));
    } else {
        rows.sort_by(|a, b| a.0.cmp(&b.0));
    }

    rows.into_iter().map(|(_, value)| value).collect()
}

fn driver_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("driver {id} not found"))
}

impl OrderStore for MemoryStore {
    fn insert_order(&self, order: Order) -> Result<(), AppError> {
        match self.orders.entry(order.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "order {} already exists",
                order.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(self.sequenced(order));
                Ok(())
            }
        }
    }

    fn get_order(&self, id: Uuid) -> Result<Option<Order>, AppError> {
        Ok(self.orders.get(&id).map(|entry| entry.record.clone()))
    }

    fn update_order(
        &self,
        id: Uuid,
        apply: &mut dyn FnMut(&mut Order) -> Result<(), AppError>,
    ) -> Result<Order, AppError> {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        // work on a copy so a rejected update leaves the stored order intact
        let mut draft = entry.record.clone();
        apply(&mut draft)?;
        entry.record = draft.clone();
        Ok(draft)
    }

    fn list_orders(&self) -> Result<Vec<Order>, AppError> {
        Ok(collect_sorted(&self.orders, true, |_| true))
    }

    fn list_orders_for_user(&self, user: Uuid) -> Result<Vec<Order>, AppError> {
        Ok(collect_sorted(&self.orders, true, |order| {
            order.user == Some(user)
        }))
    }
}

impl DriverStore for MemoryStore {
    fn insert_driver(&self, driver: Driver) -> Result<(), AppError> {
        self.drivers.insert(driver.id, self.sequenced(driver));
        Ok(())
    }

    fn get_driver(&self, id: Uuid) -> Result<Option<Driver>, AppError> {
        Ok(self.drivers.get(&id).map(|entry| entry.record.clone()))
    }

    fn list_drivers(&self) -> Result<Vec<Driver>, AppError> {
        Ok(collect_sorted(&self.drivers, false, |_| true))
    }

    fn list_drivers_by_status(&self, status: DriverStatus) -> Result<Vec<Driver>, AppError> {
        Ok(collect_sorted(&self.drivers, false, |driver| {
            driver.status == status
        }))
    }

    fn claim_available(&self, id: Uuid) -> Result<Option<Driver>, AppError> {
        let mut entry = self.drivers.get_mut(&id).ok_or_else(|| driver_not_found(id))?;
        if entry.record.status != DriverStatus::Available {
            return Ok(None);
        }

        entry.record.status = DriverStatus::Busy;
        entry.record.updated_at = Utc::now();
        Ok(Some(entry.record.clone()))
    }

    fn release(&self, id: Uuid) -> Result<(), AppError> {
        let mut entry = self.drivers.get_mut(&id).ok_or_else(|| driver_not_found(id))?;
        if entry.record.status == DriverStatus::Busy {
            entry.record.status = DriverStatus::Available;
            entry.record.updated_at = Utc::now();
        }
        Ok(())
    }

    fn append_assigned_order(&self, id: Uuid, order_id: Uuid) -> Result<(), AppError> {
        let mut entry = self.drivers.get_mut(&id).ok_or_else(|| driver_not_found(id))?;
        entry.record.assigned_orders.push(order_id);
        entry.record.updated_at = Utc::now();
        Ok(())
    }

    fn set_driver_status(&self, id: Uuid, status: DriverStatus) -> Result<Driver, AppError> {
        let mut entry = self.drivers.get_mut(&id).ok_or_else(|| driver_not_found(id))?;
        entry.record.status = status;
        entry.record.updated_at = Utc::now();
        Ok(entry.record.clone())
    }

    fn set_driver_location(&self, id: Uuid, location: GeoPoint) -> Result<Driver, AppError> {
        let mut entry = self.drivers.get_mut(&id).ok_or_else(|| driver_not_found(id))?;
        entry.record.current_location = Some(location);
        entry.record.updated_at = Utc::now();
        Ok(entry.record.clone())
    }
}

impl UserStore for MemoryStore {
    fn insert_user(&self, user: User) -> Result<(), AppError> {
        self.users.insert(user.id, self.sequenced(user));
        Ok(())
    }

    fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.get(&id).map(|entry| entry.record.clone()))
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .iter()
            .find(|entry| {
                entry
                    .record
                    .email
                    .as_deref()
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(email))
            })
            .map(|entry| entry.record.clone()))
    }

    fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(collect_sorted(&self.users, false, |_| true))
    }

    fn list_users_by_role(&self, role: Role) -> Result<Vec<User>, AppError> {
        Ok(collect_sorted(&self.users, false, |user| user.role == role))
    }
}

impl NotificationSink for MemoryStore {
    fn insert_notifications(&self, notifications: Vec<Notification>) -> Result<(), AppError> {
        for notification in notifications {
            self.notifications
                .insert(notification.id, self.sequenced(notification));
        }
        Ok(())
    }

    fn list_notifications_for_user(
        &self,
        user: Uuid,
        limit: usize,
    ) -> Result<Vec<Notification>, AppError> {
        let mut rows = collect_sorted(&self.notifications, true, |n| n.user == user);
        rows.truncate(limit);
        Ok(rows)
    }

    fn get_notification(&self, id: Uuid) -> Result<Option<Notification>, AppError> {
        Ok(self.notifications.get(&id).map(|entry| entry.record.clone()))
    }

    fn mark_read(&self, id: Uuid) -> Result<(), AppError> {
        let mut entry = self
            .notifications
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;
        entry.record.is_read = true;
        Ok(())
    }
}
