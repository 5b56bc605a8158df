use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::{UserId, ValidationErrors};

pub type CarId = i64;

/// Prices are whole currency units.
pub type Price = i64;

/// Year of the first production automobile; nothing older is accepted.
pub const MIN_CAR_YEAR: i32 = 1888;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarState {
    Available,
    Rented,
}

impl CarState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarState::Available => "available",
            CarState::Rented => "rented",
        }
    }
}

impl std::fmt::Display for CarState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    pub id: CarId,
    pub owner_id: UserId,
    pub brand: String,
    pub description: String,
    pub color: String,
    pub year: i32,
    pub price: Price,
    /// True while exactly one active rental references this car.
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

impl Car {
    pub fn state(&self) -> CarState {
        if self.is_used {
            CarState::Rented
        } else {
            CarState::Available
        }
    }

    pub fn is_available(&self) -> bool {
        !self.is_used
    }
}

/// Input for registering a car under an owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCar {
    pub owner_id: UserId,
    pub brand: String,
    pub description: String,
    pub color: String,
    pub year: i32,
    pub price: Price,
}

impl NewCar {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationErrors> {
        let mut v = ValidationErrors::new();
        v.check_text(&self.brand, "brand");
        v.check_text(&self.description, "description");
        v.check_text(&self.color, "color");

        v.check(self.year != 0, "year", "must be provided");
        v.check(
            self.year >= MIN_CAR_YEAR,
            "year",
            format!("must be at least {}", MIN_CAR_YEAR),
        );
        v.check(self.year <= now.year(), "year", "must not be in the future");

        v.check(self.price != 0, "price", "must be provided");
        v.check(self.price > 0, "price", "must be a positive integer");
        v.into_result()
    }

    /// Build the row to insert; the id is assigned by the store.
    pub fn into_car(self, created_at: DateTime<Utc>) -> Car {
        Car {
            id: 0,
            owner_id: self.owner_id,
            brand: self.brand,
            description: self.description,
            color: self.color,
            year: self.year,
            price: self.price,
            is_used: false,
            created_at,
        }
    }
}
