// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::path::PathBuf;

use anyhow::Result;
use autorent::application::{LedgerConfig, RentalLedger};
use autorent::domain::{Car, NewCar, NewUser, User};
use tempfile::TempDir;

pub const PASSWORD: &str = "correct horse battery";

/// Helper to create a test ledger with a temporary database
pub async fn test_ledger() -> Result<(RentalLedger, TempDir)> {
    test_ledger_with(LedgerConfig::default()).await
}

pub async fn test_ledger_with(config: LedgerConfig) -> Result<(RentalLedger, TempDir)> {
    let temp_dir = TempDir::new()?;
    let ledger = RentalLedger::init(db_path(&temp_dir), config).await?;
    Ok((ledger, temp_dir))
}

/// Path of the database file inside a test directory
pub fn db_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("test.db")
}

pub fn new_user(name: &str) -> NewUser {
    NewUser {
        name: name.to_string(),
        surname: "Tester".to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        password: PASSWORD.to_string(),
    }
}

pub fn new_car(owner_id: i64, brand: &str, price: i64) -> NewCar {
    NewCar {
        owner_id,
        brand: brand.to_string(),
        description: format!("{} hatchback", brand),
        color: "red".to_string(),
        year: 2020,
        price,
    }
}

/// Test fixture: users with and without cars
pub struct Fleet;

impl Fleet {
    pub async fn user(ledger: &RentalLedger, name: &str) -> Result<User> {
        Ok(ledger.register_user(new_user(name)).await?)
    }

    /// Register an owner and give them one car
    pub async fn owner_with_car(
        ledger: &RentalLedger,
        name: &str,
        brand: &str,
        price: i64,
    ) -> Result<(User, Car)> {
        let owner = Self::user(ledger, name).await?;
        let car = ledger.create_car(new_car(owner.id, brand, price)).await?;
        Ok((owner, car))
    }
}
