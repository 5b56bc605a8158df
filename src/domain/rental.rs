use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{CarId, Price, UserId, ValidationErrors};

pub type RentalId = i64;

/// An active rental. The row exists from RentCar until ReturnCar deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rental {
    pub id: RentalId,
    pub user_id: UserId,
    pub car_id: CarId,
    /// Car price at the moment it was taken
    pub price: Price,
    pub taking_date: DateTime<Utc>,
    pub return_date: DateTime<Utc>,
}

impl Rental {
    /// Build a rental row; the id is assigned by the store on insert.
    pub fn new(
        user_id: UserId,
        car_id: CarId,
        price: Price,
        taking_date: DateTime<Utc>,
        return_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            car_id,
            price,
            taking_date,
            return_date,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now > self.return_date
    }
}

/// Resolve the agreed return date: the caller's choice, or `default_days` after taking.
pub fn resolve_return_date(
    taking_date: DateTime<Utc>,
    requested: Option<DateTime<Utc>>,
    default_days: i64,
) -> Result<DateTime<Utc>, ValidationErrors> {
    match requested {
        Some(date) => {
            let mut v = ValidationErrors::new();
            v.check(
                date > taking_date,
                "return_date",
                "must be after the taking date",
            );
            v.into_result().map(|_| date)
        }
        None => {
            let mut v = ValidationErrors::new();
            v.check(
                default_days >= 1,
                "return_date",
                "default rental length must be at least one day",
            );
            v.into_result()?;

            Duration::try_days(default_days)
                .and_then(|length| taking_date.checked_add_signed(length))
                .ok_or_else(|| {
                    let mut v = ValidationErrors::new();
                    v.add("return_date", "default rental length is out of range");
                    v
                })
        }
    }
}
