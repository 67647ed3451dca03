use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::actor::require_admin;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::user::{Actor, Role, User};
use crate::state::AppState;

/// Where new drivers are placed until they report a real position.
pub const DEFAULT_DRIVER_LOCATION: GeoPoint = GeoPoint {
    lat: 27.7172,
    lng: 85.3240,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id/status", patch(update_driver_status))
        .route("/drivers/:id/location", patch(update_driver_location))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Serialize)]
pub struct DriverAccount {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Serialize)]
pub struct DriverView {
    #[serde(flatten)]
    pub driver: Driver,
    pub account: Option<DriverAccount>,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<(StatusCode, Json<Driver>), AppError> {
    require_admin(&actor)?;

    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    if let Some(email) = payload.email.as_deref() {
        if state.stores.users.find_user_by_email(email)?.is_some() {
            return Err(AppError::Conflict(format!(
                "user with email {email} already exists"
            )));
        }
    }
    let location = payload.location.unwrap_or(DEFAULT_DRIVER_LOCATION);
    location.validate()?;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        email: payload.email,
        phone: payload.phone,
        role: Role::Rider,
        created_at: now,
    };
    let driver = Driver {
        id: Uuid::new_v4(),
        user: user.id,
        status: DriverStatus::Offline,
        current_location: Some(location),
        assigned_orders: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    state.stores.users.insert_user(user)?;
    state.stores.drivers.insert_driver(driver.clone())?;

    info!(driver_id = %driver.id, "driver registered");
    Ok((StatusCode::CREATED, Json(driver)))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<DriverView>>, AppError> {
    require_admin(&actor)?;

    let drivers = state.stores.drivers.list_drivers()?;
    let mut views = Vec::with_capacity(drivers.len());
    for driver in drivers {
        let account = state
            .stores
            .users
            .get_user(driver.user)?
            .map(|user| DriverAccount {
                name: user.name,
                email: user.email,
                phone: user.phone,
            });
        views.push(DriverView { driver, account });
    }

    Ok(Json(views))
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    authorize_driver_update(&state, id, &actor)?;

    let driver = state.stores.drivers.set_driver_status(id, payload.status)?;
    info!(driver_id = %id, status = ?driver.status, "driver status changed");
    Ok(Json(driver))
}

async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    payload.location.validate()?;
    authorize_driver_update(&state, id, &actor)?;

    let driver = state
        .stores
        .drivers
        .set_driver_location(id, payload.location)?;
    Ok(Json(driver))
}

/// Admins may update any driver; a rider only their own profile.
fn authorize_driver_update(state: &AppState, id: Uuid, actor: &Actor) -> Result<(), AppError> {
    let driver = state
        .stores
        .drivers
        .get_driver(id)?
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    if actor.is_admin() || (actor.role == Role::Rider && driver.user == actor.id) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(format!(
            "not allowed to update driver {id}"
        )))
    }
}
