use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{haversine_km, GeoPoint};
use crate::models::driver::{Driver, DriverStatus};

pub const DEFAULT_RADIUS_KM: f64 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchMatch {
    pub driver_id: Uuid,
    pub distance_km: f64,
}

/// Every eligible driver strictly inside `radius_km` of `target`, nearest
/// first. Drivers at equal distance keep their input order.
///
/// Eligible means `Available` with a known, well-formed location. A stored
/// location that fails validation is treated as unknown.
pub fn rank_candidates(
    target: &GeoPoint,
    drivers: &[Driver],
    radius_km: f64,
) -> Result<Vec<DispatchMatch>, AppError> {
    target.validate()?;
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(AppError::Validation(format!(
            "dispatch radius {radius_km} must be a positive number"
        )));
    }

    let mut ranked: Vec<DispatchMatch> = drivers
        .iter()
        .filter(|driver| driver.status == DriverStatus::Available)
        .filter_map(|driver| {
            let location = driver.current_location?;
            if let Err(err) = location.validate() {
                warn!(driver_id = %driver.id, error = %err, "skipping driver with malformed location");
                return None;
            }
            Some(DispatchMatch {
                driver_id: driver.id,
                distance_km: haversine_km(target, &location),
            })
        })
        .filter(|candidate| candidate.distance_km < radius_km)
        .collect();

    // sort_by is stable, so ties stay in input order
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    Ok(ranked)
}

/// Nearest eligible driver within the cutoff, or `None`.
pub fn select_nearest(
    target: &GeoPoint,
    drivers: &[Driver],
    radius_km: f64,
) -> Result<Option<DispatchMatch>, AppError> {
    Ok(rank_candidates(target, drivers, radius_km)?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{rank_candidates, select_nearest, DEFAULT_RADIUS_KM};
    use crate::geo::GeoPoint;
    use crate::models::driver::{Driver, DriverStatus};

    // One degree of latitude on a 6371 km sphere.
    const KM_PER_DEG_LAT: f64 = 111.194_926_644_558_73;

    const TARGET: GeoPoint = GeoPoint {
        lat: 27.7172,
        lng: 85.3240,
    };

    fn north_of_target(km: f64) -> GeoPoint {
        GeoPoint {
            lat: TARGET.lat + km / KM_PER_DEG_LAT,
            lng: TARGET.lng,
        }
    }

    fn driver(id_seed: u128, status: DriverStatus, location: Option<GeoPoint>) -> Driver {
        Driver {
            id: Uuid::from_u128(id_seed),
            user: Uuid::from_u128(id_seed + 1000),
            status,
            current_location: location,
            assigned_orders: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn picks_nearest_eligible_driver() {
        let drivers = vec![
            driver(1, DriverStatus::Available, Some(north_of_target(2.0))),
            driver(2, DriverStatus::Available, Some(north_of_target(5.0))),
            driver(3, DriverStatus::Busy, Some(north_of_target(1.0))),
            driver(4, DriverStatus::Available, None),
        ];

        let hit = select_nearest(&TARGET, &drivers, DEFAULT_RADIUS_KM)
            .unwrap()
            .unwrap();
        assert_eq!(hit.driver_id, Uuid::from_u128(1));
        assert!((hit.distance_km - 2.0).abs() < 0.01);
    }

    #[test]
    fn offline_driver_is_never_selected() {
        let drivers = vec![
            driver(1, DriverStatus::Offline, Some(north_of_target(0.1))),
            driver(2, DriverStatus::Available, Some(north_of_target(3.0))),
        ];

        let hit = select_nearest(&TARGET, &drivers, DEFAULT_RADIUS_KM)
            .unwrap()
            .unwrap();
        assert_eq!(hit.driver_id, Uuid::from_u128(2));
    }

    #[test]
    fn nobody_within_radius_means_none() {
        let drivers = vec![
            driver(1, DriverStatus::Available, Some(north_of_target(10.5))),
            driver(2, DriverStatus::Available, Some(north_of_target(42.0))),
        ];

        assert!(select_nearest(&TARGET, &drivers, DEFAULT_RADIUS_KM)
            .unwrap()
            .is_none());
    }

    #[test]
    fn empty_candidate_set_is_none() {
        assert!(select_nearest(&TARGET, &[], DEFAULT_RADIUS_KM)
            .unwrap()
            .is_none());
    }

    #[test]
    fn ties_go_to_first_in_input_order() {
        let same_spot = Some(north_of_target(1.5));
        let drivers = vec![
            driver(7, DriverStatus::Available, same_spot),
            driver(3, DriverStatus::Available, same_spot),
            driver(5, DriverStatus::Available, same_spot),
        ];

        let ranked = rank_candidates(&TARGET, &drivers, DEFAULT_RADIUS_KM).unwrap();
        let ids: Vec<Uuid> = ranked.iter().map(|m| m.driver_id).collect();
        assert_eq!(
            ids,
            vec![Uuid::from_u128(7), Uuid::from_u128(3), Uuid::from_u128(5)]
        );
    }

    #[test]
    fn ranking_is_nearest_first() {
        let drivers = vec![
            driver(1, DriverStatus::Available, Some(north_of_target(6.0))),
            driver(2, DriverStatus::Available, Some(north_of_target(0.5))),
            driver(3, DriverStatus::Available, Some(north_of_target(3.0))),
        ];

        let ranked = rank_candidates(&TARGET, &drivers, DEFAULT_RADIUS_KM).unwrap();
        let ids: Vec<Uuid> = ranked.iter().map(|m| m.driver_id).collect();
        assert_eq!(
            ids,
            vec![Uuid::from_u128(2), Uuid::from_u128(3), Uuid::from_u128(1)]
        );
    }

    #[test]
    fn malformed_target_fails_fast() {
        let drivers = vec![driver(1, DriverStatus::Available, Some(TARGET))];
        let bad = GeoPoint {
            lat: f64::NAN,
            lng: 85.0,
        };
        assert!(select_nearest(&bad, &drivers, DEFAULT_RADIUS_KM).is_err());

        let out_of_range = GeoPoint {
            lat: 95.0,
            lng: 85.0,
        };
        assert!(select_nearest(&out_of_range, &drivers, DEFAULT_RADIUS_KM).is_err());
    }

    #[test]
    fn driver_with_garbage_location_is_skipped() {
        let drivers = vec![
            driver(
                1,
                DriverStatus::Available,
                Some(GeoPoint {
                    lat: f64::NAN,
                    lng: f64::NAN,
                }),
            ),
            driver(2, DriverStatus::Available, Some(north_of_target(4.0))),
        ];

        let hit = select_nearest(&TARGET, &drivers, DEFAULT_RADIUS_KM)
            .unwrap()
            .unwrap();
        assert_eq!(hit.driver_id, Uuid::from_u128(2));
    }
}
