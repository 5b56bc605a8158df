use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::{Car, CarId, Rental, RentalId, User, UserId};

/// A single violation of the rental invariants found in stored rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// `is_used` disagrees with the number of rentals referencing the car.
    CarFlagMismatch {
        car_id: CarId,
        is_used: bool,
        active_rentals: usize,
    },
    /// The renter counter disagrees with the rentals held by the user.
    RenterCountMismatch {
        user_id: UserId,
        counter: i64,
        active_rentals: usize,
    },
    RentalWithoutUser {
        rental_id: RentalId,
        user_id: UserId,
    },
    RentalWithoutCar {
        rental_id: RentalId,
        car_id: CarId,
    },
    MultipleCarsOwned {
        user_id: UserId,
        cars: Vec<CarId>,
    },
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityIssue::CarFlagMismatch {
                car_id,
                is_used,
                active_rentals,
            } => write!(
                f,
                "car {} has is_used={} but {} active rental(s)",
                car_id, is_used, active_rentals
            ),
            IntegrityIssue::RenterCountMismatch {
                user_id,
                counter,
                active_rentals,
            } => write!(
                f,
                "user {} has rented_car={} but {} active rental(s)",
                user_id, counter, active_rentals
            ),
            IntegrityIssue::RentalWithoutUser { rental_id, user_id } => {
                write!(f, "rental {} references missing user {}", rental_id, user_id)
            }
            IntegrityIssue::RentalWithoutCar { rental_id, car_id } => {
                write!(f, "rental {} references missing car {}", rental_id, car_id)
            }
            IntegrityIssue::MultipleCarsOwned { user_id, cars } => {
                write!(f, "user {} owns {} cars: {:?}", user_id, cars.len(), cars)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub user_count: usize,
    pub car_count: usize,
    pub rental_count: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Recompute the rental invariants from a full snapshot of the three tables.
pub fn build_integrity_report(users: &[User], cars: &[Car], rentals: &[Rental]) -> IntegrityReport {
    let mut issues = Vec::new();

    let user_ids: HashSet<UserId> = users.iter().map(|u| u.id).collect();
    let car_ids: HashSet<CarId> = cars.iter().map(|c| c.id).collect();

    let mut rentals_per_car: HashMap<CarId, usize> = HashMap::new();
    let mut rentals_per_user: HashMap<UserId, usize> = HashMap::new();

    for rental in rentals {
        *rentals_per_car.entry(rental.car_id).or_insert(0) += 1;
        *rentals_per_user.entry(rental.user_id).or_insert(0) += 1;

        if !user_ids.contains(&rental.user_id) {
            issues.push(IntegrityIssue::RentalWithoutUser {
                rental_id: rental.id,
                user_id: rental.user_id,
            });
        }
        if !car_ids.contains(&rental.car_id) {
            issues.push(IntegrityIssue::RentalWithoutCar {
                rental_id: rental.id,
                car_id: rental.car_id,
            });
        }
    }

    let mut cars_per_owner: HashMap<UserId, Vec<CarId>> = HashMap::new();
    for car in cars {
        cars_per_owner.entry(car.owner_id).or_default().push(car.id);

        let active = rentals_per_car.get(&car.id).copied().unwrap_or(0);
        if car.is_used != (active == 1) {
            issues.push(IntegrityIssue::CarFlagMismatch {
                car_id: car.id,
                is_used: car.is_used,
                active_rentals: active,
            });
        }
    }

    for user in users {
        let active = rentals_per_user.get(&user.id).copied().unwrap_or(0);
        if user.rented_car_count != active as i64 {
            issues.push(IntegrityIssue::RenterCountMismatch {
                user_id: user.id,
                counter: user.rented_car_count,
                active_rentals: active,
            });
        }
    }

    let mut multi_owned: Vec<_> = cars_per_owner
        .into_iter()
        .filter(|(_, cars)| cars.len() > 1)
        .collect();
    multi_owned.sort_by_key(|(owner, _)| *owner);
    for (user_id, mut cars) in multi_owned {
        cars.sort_unstable();
        issues.push(IntegrityIssue::MultipleCarsOwned { user_id, cars });
    }

    IntegrityReport {
        user_count: users.len(),
        car_count: cars.len(),
        rental_count: rentals.len(),
        issues,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn user(id: UserId, rented: i64) -> User {
        let mut u = User::new("n".into(), "s".into(), format!("{}@x.io", id), String::new());
        u.id = id;
        u.rented_car_count = rented;
        u
    }

    fn car(id: CarId, owner: UserId, is_used: bool) -> Car {
        Car {
            id,
            owner_id: owner,
            brand: "Fiat".into(),
            description: "Panda".into(),
            color: "red".into(),
            year: 2015,
            price: 100,
            is_used,
            created_at: Utc::now(),
        }
    }

    fn rental(id: RentalId, user: UserId, car: CarId) -> Rental {
        let now = Utc::now();
        let mut r = Rental::new(user, car, 100, now, now + Duration::days(1));
        r.id = id;
        r
    }

    #[test]
    fn test_consistent_snapshot_is_healthy() {
        let users = vec![user(1, 0), user(2, 1)];
        let cars = vec![car(10, 1, true)];
        let rentals = vec![rental(100, 2, 10)];

        let report = build_integrity_report(&users, &cars, &rentals);
        assert!(report.is_healthy(), "{:?}", report.issues);
        assert_eq!(report.rental_count, 1);
    }

    #[test]
    fn test_flag_without_rental_is_reported() {
        let users = vec![user(1, 0)];
        let cars = vec![car(10, 1, true)];

        let report = build_integrity_report(&users, &cars, &[]);
        assert_eq!(
            report.issues,
            vec![IntegrityIssue::CarFlagMismatch {
                car_id: 10,
                is_used: true,
                active_rentals: 0
            }]
        );
    }

    #[test]
    fn test_counter_without_rental_is_reported() {
        let users = vec![user(2, 1)];

        let report = build_integrity_report(&users, &[], &[]);
        assert!(matches!(
            report.issues.as_slice(),
            [IntegrityIssue::RenterCountMismatch { user_id: 2, counter: 1, active_rentals: 0 }]
        ));
    }

    #[test]
    fn test_dangling_rental_references() {
        let report = build_integrity_report(&[], &[], &[rental(5, 3, 4)]);
        assert_eq!(report.issues.len(), 2);
        assert!(report
            .issues
            .contains(&IntegrityIssue::RentalWithoutUser { rental_id: 5, user_id: 3 }));
        assert!(report
            .issues
            .contains(&IntegrityIssue::RentalWithoutCar { rental_id: 5, car_id: 4 }));
    }

    #[test]
    fn test_owner_with_two_cars() {
        let users = vec![user(1, 0)];
        let cars = vec![car(11, 1, false), car(10, 1, false)];

        let report = build_integrity_report(&users, &cars, &[]);
        assert_eq!(
            report.issues,
            vec![IntegrityIssue::MultipleCarsOwned {
                user_id: 1,
                cars: vec![10, 11]
            }]
        );
    }
}
