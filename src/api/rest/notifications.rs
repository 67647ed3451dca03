use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::actor::require_admin;
use crate::engine::fanout::{fan_out, Audience};
use crate::error::AppError;
use crate::models::notification::{Notification, NotificationKind};
use crate::models::user::Actor;
use crate::state::AppState;

const INBOX_LIMIT: usize = 20;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/:id/read", put(mark_read))
        .route("/notifications/promo", post(send_promo))
}

#[derive(Deserialize)]
pub struct PromoRequest {
    pub message: String,
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Notification>>, AppError> {
    let inbox = state
        .stores
        .notifications
        .list_notifications_for_user(actor.id, INBOX_LIMIT)?;
    Ok(Json(inbox))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<Value>, AppError> {
    let notification = state
        .stores
        .notifications
        .get_notification(id)?
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;
    if notification.user != actor.id {
        return Err(AppError::Unauthorized(format!(
            "notification {id} belongs to another user"
        )));
    }

    state.stores.notifications.mark_read(id)?;
    Ok(Json(json!({ "success": true })))
}

async fn send_promo(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<PromoRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&actor)?;
    if payload.message.trim().is_empty() {
        return Err(AppError::Validation("message cannot be empty".to_string()));
    }

    let count = fan_out(
        state.stores.users.as_ref(),
        state.stores.notifications.as_ref(),
        Audience::Everyone,
        NotificationKind::Promo,
        payload.message.trim(),
        None,
    )?;

    info!(count, "promo sent");
    Ok(Json(json!({ "success": true, "count": count })))
}
