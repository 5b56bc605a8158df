use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::RentalLedger;
use crate::domain::{Car, Rental, User};

/// Database snapshot for full export. Password hashes are never included.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub users: Vec<User>,
    pub cars: Vec<Car>,
    pub rentals: Vec<Rental>,
}

/// Exporter for converting ledger data to various formats
pub struct Exporter<'a> {
    ledger: &'a RentalLedger,
}

impl<'a> Exporter<'a> {
    pub fn new(ledger: &'a RentalLedger) -> Self {
        Self { ledger }
    }

    /// Export cars to CSV format, optionally only those available to rent
    pub async fn export_cars_csv<W: Write>(&self, writer: W, available_only: bool) -> Result<usize> {
        let cars = if available_only {
            self.ledger.get_available_cars().await?
        } else {
            self.ledger.list_cars().await?
        };
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "owner_id",
            "brand",
            "description",
            "color",
            "year",
            "price",
            "state",
        ])?;

        for car in &cars {
            csv_writer.write_record([
                car.id.to_string(),
                car.owner_id.to_string(),
                car.brand.clone(),
                car.description.clone(),
                car.color.clone(),
                car.year.to_string(),
                car.price.to_string(),
                car.state().to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(cars.len())
    }

    /// Export active rentals to CSV format
    pub async fn export_rentals_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let rentals = self.ledger.list_rentals().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "user_id",
            "car_id",
            "price",
            "taking_date",
            "return_date",
        ])?;

        for rental in &rentals {
            csv_writer.write_record([
                rental.id.to_string(),
                rental.user_id.to_string(),
                rental.car_id.to_string(),
                rental.price.to_string(),
                rental.taking_date.to_rfc3339(),
                rental.return_date.to_rfc3339(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(rentals.len())
    }

    /// Export cars to a JSON array
    pub async fn export_cars_json<W: Write>(&self, writer: W, available_only: bool) -> Result<usize> {
        let cars = if available_only {
            self.ledger.get_available_cars().await?
        } else {
            self.ledger.list_cars().await?
        };
        write_json(writer, &cars)?;
        Ok(cars.len())
    }

    /// Export active rentals to a JSON array
    pub async fn export_rentals_json<W: Write>(&self, writer: W) -> Result<usize> {
        let rentals = self.ledger.list_rentals().await?;
        write_json(writer, &rentals)?;
        Ok(rentals.len())
    }

    /// Export full database as JSON snapshot, read in one transaction
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<DatabaseSnapshot> {
        let tables = self.ledger.read_all().await?;
        let snapshot = DatabaseSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            users: tables.users,
            cars: tables.cars,
            rentals: tables.rentals,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}

fn write_json<W: Write, T: Serialize>(mut writer: W, rows: &[T]) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, rows)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
