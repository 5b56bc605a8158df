use std::future::Future;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
    Car, CarId, IntegrityReport, NewCar, NewUser, Rental, User, UserId, build_integrity_report,
    resolve_return_date,
};
use crate::storage::{Repository, is_unique_violation};

use super::password::{hash_password_blocking, verify_password_blocking};
use super::{AppError, ErrorKind, LedgerConfig};

/// The rental ledger: keeps users' owned/rented counters, cars' `is_used`
/// flags and rental rows consistent.
///
/// Every state change runs in a single store transaction whose first
/// statement is the guarded write, so two callers racing for the same user or
/// car serialize on the database lock and the loser sees the updated row.
/// Nothing is cached between calls.
pub struct RentalLedger {
    repo: Repository,
    config: LedgerConfig,
}

/// Every user, car and rental as of one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerTables {
    pub users: Vec<User>,
    pub cars: Vec<Car>,
    pub rentals: Vec<Rental>,
}

/// A user with the car they own and the rental they currently hold.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub user: User,
    pub owned_car: Option<Car>,
    pub rental: Option<Rental>,
    pub rented_car: Option<Car>,
}

impl RentalLedger {
    pub fn new(repo: Repository, config: LedgerConfig) -> Self {
        Self { repo, config }
    }

    /// Create (if needed) and migrate the database at the given path.
    pub async fn init(database_path: impl AsRef<Path>, config: LedgerConfig) -> Result<Self, AppError> {
        let repo = Repository::init(
            database_path.as_ref(),
            config.store_timeout,
            config.max_connections,
        )
        .await?;
        Ok(Self::new(repo, config))
    }

    /// Connect to an existing database.
    pub async fn connect(
        database_path: impl AsRef<Path>,
        config: LedgerConfig,
    ) -> Result<Self, AppError> {
        let repo = Repository::connect(
            database_path.as_ref(),
            false,
            config.store_timeout,
            config.max_connections,
        )
        .await?;
        Ok(Self::new(repo, config))
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub async fn close(&self) {
        self.repo.close().await;
    }

    /// Run one ledger operation under the store timeout and log its failure.
    async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        let after = self.config.store_timeout;
        let result = match tokio::time::timeout(after, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout { operation, after }),
        };

        if let Err(err) = &result {
            match err.kind() {
                ErrorKind::Transient => error!(operation, error = %err, "ledger operation failed"),
                kind => warn!(operation, ?kind, error = %err, "ledger operation rejected"),
            }
        }
        result
    }

    // ========================
    // User operations
    // ========================

    /// Register a new user. The email must be unused.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register_user(&self, input: NewUser) -> Result<User, AppError> {
        self.run("register_user", async {
            input.validate()?;
            let email = input.email.trim().to_string();

            {
                let mut conn = self.repo.acquire().await?;
                if Repository::find_user_by_email(&mut conn, &email).await?.is_some() {
                    return Err(AppError::EmailTaken(email));
                }
            }

            let password_hash = hash_password_blocking(input.password).await?;
            let mut user = User::new(
                input.name.trim().to_string(),
                input.surname.trim().to_string(),
                email,
                password_hash,
            );

            let mut conn = self.repo.acquire().await?;
            if let Err(e) = Repository::insert_user(&mut conn, &mut user).await {
                // Lost a race with a concurrent registration of the same email
                if is_unique_violation(&e) {
                    return Err(AppError::EmailTaken(user.email));
                }
                return Err(e.into());
            }

            info!(user_id = user.id, "registered user");
            Ok::<_, AppError>(user)
        })
        .await
    }

    /// Check credentials. Unknown email and wrong password are indistinguishable.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AppError> {
        self.run("login", async {
            let user = {
                let mut conn = self.repo.acquire().await?;
                Repository::find_user_by_email(&mut conn, email.trim())
                    .await?
                    .ok_or(AppError::InvalidCredentials)?
            };

            let matches =
                verify_password_blocking(password.to_string(), user.password_hash.clone()).await?;
            if !matches {
                return Err(AppError::InvalidCredentials);
            }

            debug!(user_id = user.id, "credentials accepted");
            Ok::<_, AppError>(user)
        })
        .await
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<User, AppError> {
        self.run("get_user", async {
            let mut conn = self.repo.acquire().await?;
            let user = Repository::find_user(&mut conn, user_id)
                .await?
                .ok_or(AppError::UserNotFound(user_id))?;
            Ok::<_, AppError>(user)
        })
        .await
    }

    /// User details together with their owned car and current rental, read from one snapshot.
    #[instrument(skip(self))]
    pub async fn get_user_profile(&self, user_id: UserId) -> Result<UserProfile, AppError> {
        self.run("get_user_profile", async {
            let mut tx = self.repo.begin().await?;
            let user = Repository::find_user(&mut tx, user_id)
                .await?
                .ok_or(AppError::UserNotFound(user_id))?;

            let owned_car = match user.owned_car {
                Some(car_id) => Repository::find_car(&mut tx, car_id).await?,
                None => None,
            };
            let rental = Repository::find_rental_for_user(&mut tx, user_id).await?;
            let rented_car = match &rental {
                Some(r) => Repository::find_car(&mut tx, r.car_id).await?,
                None => None,
            };

            Ok::<_, AppError>(UserProfile {
                user,
                owned_car,
                rental,
                rented_car,
            })
        })
        .await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        self.run("list_users", async {
            let mut conn = self.repo.acquire().await?;
            Ok::<_, AppError>(Repository::list_users(&mut conn).await?)
        })
        .await
    }

    // ========================
    // Car operations
    // ========================

    /// Register a car for an owner who does not own one yet.
    #[instrument(skip(self, input), fields(owner_id = input.owner_id, brand = %input.brand))]
    pub async fn create_car(&self, input: NewCar) -> Result<Car, AppError> {
        self.run("create_car", async {
            let now = Utc::now();
            input.validate(now)?;
            let owner_id = input.owner_id;
            let mut car = input.into_car(now);

            let mut tx = self.repo.begin().await?;
            if let Err(e) = Repository::insert_car(&mut tx, &mut car).await {
                if is_unique_violation(&e) {
                    return Err(Self::ownership_conflict(&mut tx, owner_id).await?);
                }
                return Err(e.into());
            }
            if !Repository::claim_owned_car(&mut tx, owner_id, car.id).await? {
                return Err(Self::ownership_conflict(&mut tx, owner_id).await?);
            }
            tx.commit().await.context("Failed to commit car creation")?;

            info!(car_id = car.id, "created car");
            Ok::<_, AppError>(car)
        })
        .await
    }

    /// Why an owner could not take a new car.
    async fn ownership_conflict(
        conn: &mut SqliteConnection,
        owner_id: UserId,
    ) -> Result<AppError, AppError> {
        Ok(match Repository::find_user(conn, owner_id).await? {
            None => AppError::UserNotFound(owner_id),
            Some(_) => AppError::AlreadyOwnsCar(owner_id),
        })
    }

    pub async fn get_car_info(&self, car_id: CarId) -> Result<Car, AppError> {
        self.run("get_car_info", async {
            let mut conn = self.repo.acquire().await?;
            let car = Repository::find_car(&mut conn, car_id)
                .await?
                .ok_or(AppError::CarNotFound(car_id))?;
            Ok::<_, AppError>(car)
        })
        .await
    }

    /// Cars not currently rented, by id ascending.
    pub async fn get_available_cars(&self) -> Result<Vec<Car>, AppError> {
        self.run("get_available_cars", async {
            let mut conn = self.repo.acquire().await?;
            let cars = Repository::list_cars(&mut conn, true).await?;
            debug!(count = cars.len(), "listed available cars");
            Ok::<_, AppError>(cars)
        })
        .await
    }

    pub async fn list_cars(&self) -> Result<Vec<Car>, AppError> {
        self.run("list_cars", async {
            let mut conn = self.repo.acquire().await?;
            Ok::<_, AppError>(Repository::list_cars(&mut conn, false).await?)
        })
        .await
    }

    /// Delete a car that is not rented. Returns the removed car.
    /// The owner's `owned_car` reference is left untouched.
    #[instrument(skip(self))]
    pub async fn delete_car(&self, car_id: CarId) -> Result<Car, AppError> {
        self.run("delete_car", async {
            let mut tx = self.repo.begin().await?;
            let Some(car) = Repository::delete_available_car(&mut tx, car_id).await? else {
                return Err(match Repository::find_car(&mut tx, car_id).await? {
                    None => AppError::CarNotFound(car_id),
                    Some(_) => AppError::CarInUse(car_id),
                });
            };
            tx.commit().await.context("Failed to commit car deletion")?;

            info!(owner_id = car.owner_id, "deleted car");
            Ok::<_, AppError>(car)
        })
        .await
    }

    // ========================
    // Rental operations
    // ========================

    /// Rent a car. The user must not be renting anything and the car must be available.
    /// The rental records the car's current price; `return_date` defaults to the configured
    /// rental length.
    #[instrument(skip(self))]
    pub async fn rent_car(
        &self,
        user_id: UserId,
        car_id: CarId,
        return_date: Option<DateTime<Utc>>,
    ) -> Result<Rental, AppError> {
        self.run("rent_car", async {
            let taking_date = Utc::now();
            let return_date =
                resolve_return_date(taking_date, return_date, self.config.default_rental_days)?;

            let mut tx = self.repo.begin().await?;

            if !Repository::claim_rental_slot(&mut tx, user_id).await? {
                return Err(match Repository::find_user(&mut tx, user_id).await? {
                    None => AppError::UserNotFound(user_id),
                    Some(_) => AppError::AlreadyRenting(user_id),
                });
            }

            let Some(price) = Repository::mark_car_rented(&mut tx, car_id).await? else {
                return Err(match Repository::find_car(&mut tx, car_id).await? {
                    None => AppError::CarNotFound(car_id),
                    Some(_) => AppError::CarInUse(car_id),
                });
            };

            let mut rental = Rental::new(user_id, car_id, price, taking_date, return_date);
            Repository::insert_rental(&mut tx, &mut rental).await?;
            tx.commit().await.context("Failed to commit rental")?;

            info!(rental_id = rental.id, price, "car rented");
            Ok::<_, AppError>(rental)
        })
        .await
    }

    /// Return a rented car. The exact (user, car) rental must exist; nothing changes otherwise.
    /// Returns the closed rental.
    #[instrument(skip(self))]
    pub async fn return_car(&self, user_id: UserId, car_id: CarId) -> Result<Rental, AppError> {
        self.run("return_car", async {
            let mut tx = self.repo.begin().await?;

            let Some(rental) = Repository::delete_rental(&mut tx, user_id, car_id).await? else {
                return Err(match Repository::find_user(&mut tx, user_id).await? {
                    None => AppError::UserNotFound(user_id),
                    Some(user) if !user.is_renting() => AppError::NotRenting(user_id),
                    Some(_) => AppError::RentalNotFound { user_id, car_id },
                });
            };

            // A rental row without matching counters means the tables were edited by hand.
            // Returning still converges them.
            if !Repository::release_rental_slot(&mut tx, user_id).await? {
                warn!("rented_car counter was already zero");
            }
            if !Repository::mark_car_available(&mut tx, car_id).await? {
                warn!("car was not flagged as rented");
            }
            tx.commit().await.context("Failed to commit car return")?;

            info!(rental_id = rental.id, "car returned");
            Ok::<_, AppError>(rental)
        })
        .await
    }

    pub async fn list_rentals(&self) -> Result<Vec<Rental>, AppError> {
        self.run("list_rentals", async {
            let mut conn = self.repo.acquire().await?;
            Ok::<_, AppError>(Repository::list_rentals(&mut conn).await?)
        })
        .await
    }

    // ========================
    // Integrity operations
    // ========================

    /// Read all three tables inside one transaction so they agree with each other.
    pub async fn read_all(&self) -> Result<LedgerTables, AppError> {
        self.run("read_all", async {
            let mut tx = self.repo.begin().await?;
            Self::read_tables(&mut tx).await
        })
        .await
    }

    async fn read_tables(conn: &mut SqliteConnection) -> Result<LedgerTables, AppError> {
        Ok(LedgerTables {
            users: Repository::list_users(conn).await?,
            cars: Repository::list_cars(conn, false).await?,
            rentals: Repository::list_rentals(conn).await?,
        })
    }

    /// Recompute the rental invariants from one consistent snapshot of all tables.
    #[instrument(skip(self))]
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        self.run("check_integrity", async {
            let mut tx = self.repo.begin().await?;
            let tables = Self::read_tables(&mut tx).await?;

            let report = build_integrity_report(&tables.users, &tables.cars, &tables.rentals);
            if !report.is_healthy() {
                warn!(issues = report.issues.len(), "integrity check found issues");
            }
            Ok::<_, AppError>(report)
        })
        .await
    }
}
