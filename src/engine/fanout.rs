use uuid::Uuid;

use crate::error::AppError;
use crate::models::notification::{Notification, NotificationKind};
use crate::models::user::Role;
use crate::store::{NotificationSink, UserStore};

#[derive(Debug, Clone, Copy)]
pub enum Audience {
    Role(Role),
    Everyone,
}

/// Writes one notification per recipient in a single bulk insert and returns
/// the recipient count. Nothing is written when the audience is empty.
pub fn fan_out(
    users: &dyn UserStore,
    sink: &dyn NotificationSink,
    audience: Audience,
    kind: NotificationKind,
    message: &str,
    related_id: Option<Uuid>,
) -> Result<usize, AppError> {
    let recipients = match audience {
        Audience::Role(role) => users.list_users_by_role(role)?,
        Audience::Everyone => users.list_users()?,
    };

    if recipients.is_empty() {
        return Ok(0);
    }

    let notifications: Vec<Notification> = recipients
        .iter()
        .map(|user| Notification::new(user.id, kind, message, related_id))
        .collect();
    let count = notifications.len();

    sink.insert_notifications(notifications)
        .map_err(|err| AppError::DependencyFailure(format!("notification insert failed: {err}")))?;

    Ok(count)
}
