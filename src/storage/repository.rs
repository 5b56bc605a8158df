use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::domain::{Car, CarId, Price, Rental, User, UserId};

use super::MIGRATION_001_INITIAL;

/// Repository for persisting users, cars and rentals.
///
/// Row-level functions take a `&mut SqliteConnection` so the same SQL runs
/// either on a pooled connection or inside a transaction from [`Repository::begin`].
/// Guarded writes (`claim_*`, `mark_*`, `delete_available_car`) are single
/// conditional statements; they report whether the guard matched.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database file.
    /// `timeout` is the caller's deadline for one operation. Waiting for a pooled connection
    /// or on a locked database is allowed twice that, so the caller's deadline fires first
    /// and a slow store surfaces as the caller's timeout.
    pub async fn connect(
        path: &Path,
        create_if_missing: bool,
        timeout: Duration,
        max_connections: u32,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create_if_missing)
            .foreign_keys(true)
            .busy_timeout(timeout * 2);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout * 2)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database {}", path.display()))?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(path: &Path, timeout: Duration, max_connections: u32) -> Result<Self> {
        let repo = Self::connect(path, true, timeout, max_connections).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Start a transaction. Dropping it without commit rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .context("Failed to begin transaction")
    }

    /// Check out a plain connection for reads.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .context("Failed to acquire connection")
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ========================
    // User operations
    // ========================

    /// Insert a user and assign its generated id.
    pub async fn insert_user(conn: &mut SqliteConnection, user: &mut User) -> Result<()> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (name, surname, email, password_hash, owned_car, rented_car, created_at)
            VALUES (?, ?, ?, ?, 0, 0, ?)
            RETURNING id
            "#,
        )
        .bind(&user.name)
        .bind(&user.surname)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at.to_rfc3339())
        .fetch_one(&mut *conn)
        .await
        .context("Failed to insert user")?;

        user.id = row.get("id");
        Ok(())
    }

    pub async fn find_user(conn: &mut SqliteConnection, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, surname, email, password_hash, owned_car, rented_car, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch user")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    pub async fn find_user_by_email(
        conn: &mut SqliteConnection,
        email: &str,
    ) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, surname, email, password_hash, owned_car, rented_car, created_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch user by email")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    pub async fn list_users(conn: &mut SqliteConnection) -> Result<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, surname, email, password_hash, owned_car, rented_car, created_at
            FROM users
            ORDER BY id
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list users")?;

        rows.iter().map(Self::row_to_user).collect()
    }

    /// Record `car_id` as the user's car if they own none yet.
    pub async fn claim_owned_car(
        conn: &mut SqliteConnection,
        user_id: UserId,
        car_id: CarId,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET owned_car = ? WHERE id = ? AND owned_car = 0")
            .bind(car_id)
            .bind(user_id)
            .execute(&mut *conn)
            .await
            .context("Failed to update owned_car")?;
        Ok(result.rows_affected() == 1)
    }

    /// Bump the renter counter from 0 to 1. False if the user is missing or already renting.
    pub async fn claim_rental_slot(conn: &mut SqliteConnection, user_id: UserId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET rented_car = rented_car + 1 WHERE id = ? AND rented_car = 0",
        )
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .context("Failed to increment rented_car")?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn release_rental_slot(conn: &mut SqliteConnection, user_id: UserId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET rented_car = rented_car - 1 WHERE id = ? AND rented_car > 0",
        )
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .context("Failed to decrement rented_car")?;
        Ok(result.rows_affected() == 1)
    }

    fn row_to_user(row: &SqliteRow) -> Result<User> {
        let owned_car: i64 = row.get("owned_car");
        let created_at_str: String = row.get("created_at");

        Ok(User {
            id: row.get("id"),
            name: row.get("name"),
            surname: row.get("surname"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            owned_car: (owned_car != 0).then_some(owned_car),
            rented_car_count: row.get("rented_car"),
            created_at: parse_timestamp(&created_at_str).context("Invalid user created_at")?,
        })
    }

    // ========================
    // Car operations
    // ========================

    /// Insert a car and assign its generated id.
    pub async fn insert_car(conn: &mut SqliteConnection, car: &mut Car) -> Result<()> {
        let row = sqlx::query(
            r#"
            INSERT INTO car (owner_id, brand, description, color, year, price, is_used, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(car.owner_id)
        .bind(&car.brand)
        .bind(&car.description)
        .bind(&car.color)
        .bind(car.year)
        .bind(car.price)
        .bind(car.is_used)
        .bind(car.created_at.to_rfc3339())
        .fetch_one(&mut *conn)
        .await
        .context("Failed to insert car")?;

        car.id = row.get("id");
        Ok(())
    }

    pub async fn find_car(conn: &mut SqliteConnection, id: CarId) -> Result<Option<Car>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, brand, description, color, year, price, is_used, created_at
            FROM car
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch car")?;

        row.as_ref().map(Self::row_to_car).transpose()
    }

    /// List cars, optionally only those not currently rented. Ordered by id.
    pub async fn list_cars(conn: &mut SqliteConnection, available_only: bool) -> Result<Vec<Car>> {
        let query = if available_only {
            "SELECT id, owner_id, brand, description, color, year, price, is_used, created_at FROM car WHERE is_used = 0 ORDER BY id"
        } else {
            "SELECT id, owner_id, brand, description, color, year, price, is_used, created_at FROM car ORDER BY id"
        };

        let rows = sqlx::query(query)
            .fetch_all(&mut *conn)
            .await
            .context("Failed to list cars")?;

        rows.iter().map(Self::row_to_car).collect()
    }

    /// Flip an available car to rented, returning its current price.
    /// `None` if the car is missing or already rented.
    pub async fn mark_car_rented(conn: &mut SqliteConnection, id: CarId) -> Result<Option<Price>> {
        let row = sqlx::query("UPDATE car SET is_used = 1 WHERE id = ? AND is_used = 0 RETURNING price")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to set is_used flag")?;
        Ok(row.map(|row| row.get("price")))
    }

    pub async fn mark_car_available(conn: &mut SqliteConnection, id: CarId) -> Result<bool> {
        let result = sqlx::query("UPDATE car SET is_used = 0 WHERE id = ? AND is_used = 1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .context("Failed to clear is_used flag")?;
        Ok(result.rows_affected() == 1)
    }

    /// Delete a car that is not rented, returning the removed row.
    pub async fn delete_available_car(conn: &mut SqliteConnection, id: CarId) -> Result<Option<Car>> {
        let row = sqlx::query(
            r#"
            DELETE FROM car
            WHERE id = ? AND is_used = 0
            RETURNING id, owner_id, brand, description, color, year, price, is_used, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to delete car")?;

        row.as_ref().map(Self::row_to_car).transpose()
    }

    fn row_to_car(row: &SqliteRow) -> Result<Car> {
        let created_at_str: String = row.get("created_at");

        Ok(Car {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            brand: row.get("brand"),
            description: row.get("description"),
            color: row.get("color"),
            year: row.get("year"),
            price: row.get("price"),
            is_used: row.get::<i64, _>("is_used") != 0,
            created_at: parse_timestamp(&created_at_str).context("Invalid car created_at")?,
        })
    }

    // ========================
    // Rental operations
    // ========================

    /// Insert a rental and assign its generated id.
    pub async fn insert_rental(conn: &mut SqliteConnection, rental: &mut Rental) -> Result<()> {
        let row = sqlx::query(
            r#"
            INSERT INTO rented_cars (user_id, car_id, price, taking_date, return_date)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(rental.user_id)
        .bind(rental.car_id)
        .bind(rental.price)
        .bind(rental.taking_date.to_rfc3339())
        .bind(rental.return_date.to_rfc3339())
        .fetch_one(&mut *conn)
        .await
        .context("Failed to insert rental")?;

        rental.id = row.get("id");
        Ok(())
    }

    /// Delete the rental of `car_id` by `user_id`, returning the removed row.
    pub async fn delete_rental(
        conn: &mut SqliteConnection,
        user_id: UserId,
        car_id: CarId,
    ) -> Result<Option<Rental>> {
        let row = sqlx::query(
            r#"
            DELETE FROM rented_cars
            WHERE user_id = ? AND car_id = ?
            RETURNING id, user_id, car_id, price, taking_date, return_date
            "#,
        )
        .bind(user_id)
        .bind(car_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to delete rental")?;

        row.as_ref().map(Self::row_to_rental).transpose()
    }

    pub async fn find_rental_for_user(
        conn: &mut SqliteConnection,
        user_id: UserId,
    ) -> Result<Option<Rental>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, car_id, price, taking_date, return_date
            FROM rented_cars
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch rental for user")?;

        row.as_ref().map(Self::row_to_rental).transpose()
    }

    pub async fn list_rentals(conn: &mut SqliteConnection) -> Result<Vec<Rental>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, car_id, price, taking_date, return_date
            FROM rented_cars
            ORDER BY id
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list rentals")?;

        rows.iter().map(Self::row_to_rental).collect()
    }

    fn row_to_rental(row: &SqliteRow) -> Result<Rental> {
        let taking_date_str: String = row.get("taking_date");
        let return_date_str: String = row.get("return_date");

        Ok(Rental {
            id: row.get("id"),
            user_id: row.get("user_id"),
            car_id: row.get("car_id"),
            price: row.get("price"),
            taking_date: parse_timestamp(&taking_date_str).context("Invalid taking_date")?,
            return_date: parse_timestamp(&return_date_str).context("Invalid return_date")?,
        })
    }
}

/// True when the error chain holds a UNIQUE constraint violation.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|e| e.is_unique_violation())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
