use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use crate::application::{LedgerConfig, RentalLedger};
use crate::domain::{Car, CarId, NewCar, NewUser, UserId};

/// autorent - car rental ledger
#[derive(Parser)]
#[command(name = "autorent")]
#[command(about = "Register cars, rent them out and return them, with owner and renter limits enforced")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "AUTORENT_DB", default_value = "autorent.db")]
    pub database: String,

    /// Upper bound for a single store operation, in seconds
    #[arg(
        long,
        default_value = "3",
        global = true,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_secs: u64,

    /// Rental length in days used when no return date is given (1 to 36500)
    #[arg(
        long,
        default_value = "7",
        global = true,
        value_parser = clap::value_parser!(i64).range(1..=36500)
    )]
    pub rental_days: i64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// User management commands
    #[command(subcommand)]
    User(UserCommands),

    /// Car management commands
    #[command(subcommand)]
    Car(CarCommands),

    /// Rent an available car
    Rent {
        /// Renting user ID
        #[arg(long)]
        user: UserId,

        /// Car ID
        #[arg(long)]
        car: CarId,

        /// Agreed return date (YYYY-MM-DD, defaults to --rental-days from now)
        #[arg(long)]
        return_date: Option<String>,
    },

    /// Return a rented car
    Return {
        /// Renting user ID
        #[arg(long)]
        user: UserId,

        /// Car ID
        #[arg(long)]
        car: CarId,
    },

    /// List active rentals
    Rentals,

    /// Verify that car flags and renter counters match the rental rows
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: cars, available, rentals, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Format: csv, json (default: csv, always json for full)
        #[arg(short, long)]
        format: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a new user
    Register {
        #[arg(long)]
        name: String,

        #[arg(long)]
        surname: String,

        /// Email (must be unique)
        #[arg(long)]
        email: String,

        /// Password, 8 to 72 bytes
        #[arg(long, env = "AUTORENT_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Check a user's credentials
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "AUTORENT_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show a user with their owned and rented car
    Show {
        /// User ID
        id: UserId,
    },

    /// List all users
    List,
}

#[derive(Subcommand)]
pub enum CarCommands {
    /// Register a car for an owner (one car per owner)
    Create {
        /// Owner user ID
        #[arg(long)]
        owner: UserId,

        #[arg(long)]
        brand: String,

        #[arg(short, long)]
        description: String,

        #[arg(long)]
        color: String,

        #[arg(long)]
        year: i32,

        /// Rental price in whole currency units
        #[arg(long)]
        price: i64,
    },

    /// Show car details
    Show {
        /// Car ID
        id: CarId,
    },

    /// List cars available to rent
    List {
        /// Include rented cars
        #[arg(short, long)]
        all: bool,
    },

    /// Delete a car that is not rented
    Delete {
        /// Car ID
        id: CarId,
    },
}

impl Cli {
    fn config(&self) -> LedgerConfig {
        LedgerConfig::default()
            .with_store_timeout(Duration::from_secs(self.timeout_secs))
            .with_default_rental_days(self.rental_days)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config();
        let database = self.database;

        match self.command {
            Commands::Init => {
                let ledger = RentalLedger::init(&database, config).await?;
                ledger.close().await;
                println!("Database initialized: {}", database);
            }

            Commands::User(user_cmd) => {
                let ledger = open(&database, config).await?;
                run_user_command(&ledger, user_cmd).await?;
            }

            Commands::Car(car_cmd) => {
                let ledger = open(&database, config).await?;
                run_car_command(&ledger, car_cmd).await?;
            }

            Commands::Rent {
                user,
                car,
                return_date,
            } => {
                let return_date = return_date
                    .map(|date_str| {
                        parse_date(&date_str).with_context(|| {
                            format!("Invalid date format '{}'. Use YYYY-MM-DD", date_str)
                        })
                    })
                    .transpose()?;

                let ledger = open(&database, config).await?;
                let rental = ledger.rent_car(user, car, return_date).await?;
                println!(
                    "Rented car {} to user {} for {} (rental {}, due {})",
                    rental.car_id,
                    rental.user_id,
                    rental.price,
                    rental.id,
                    rental.return_date.format("%Y-%m-%d")
                );
            }

            Commands::Return { user, car } => {
                let ledger = open(&database, config).await?;
                let rental = ledger.return_car(user, car).await?;
                println!(
                    "Returned car {} from user {} (rental {})",
                    rental.car_id, rental.user_id, rental.id
                );
            }

            Commands::Rentals => {
                let ledger = open(&database, config).await?;
                run_rentals_command(&ledger).await?;
            }

            Commands::Check => {
                let ledger = open(&database, config).await?;
                run_check_command(&ledger).await?;
            }

            Commands::Export {
                export_type,
                output,
                format,
            } => {
                let ledger = open(&database, config).await?;
                run_export_command(&ledger, &export_type, output.as_deref(), format.as_deref())
                    .await?;
            }
        }

        Ok(())
    }
}

async fn open(database: &str, config: LedgerConfig) -> Result<RentalLedger> {
    RentalLedger::connect(database, config)
        .await
        .with_context(|| format!("Cannot open {} (run `autorent init` first?)", database))
}

async fn run_user_command(ledger: &RentalLedger, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Register {
            name,
            surname,
            email,
            password,
        } => {
            let user = ledger
                .register_user(NewUser {
                    name,
                    surname,
                    email,
                    password,
                })
                .await?;
            println!("Registered user {}: {} <{}>", user.id, user.full_name(), user.email);
        }

        UserCommands::Login { email, password } => {
            let user = ledger.login(&email, &password).await?;
            println!("Logged in as user {} ({})", user.id, user.full_name());
        }

        UserCommands::Show { id } => {
            let profile = ledger.get_user_profile(id).await?;
            let user = &profile.user;

            println!("User: {}", user.full_name());
            println!("  ID:        {}", user.id);
            println!("  Email:     {}", user.email);
            println!("  Joined:    {}", user.created_at.format("%Y-%m-%d %H:%M:%S"));
            match (&profile.owned_car, user.owned_car) {
                (Some(car), _) => println!("  Owns:      {}", describe_car(car)),
                (None, Some(car_id)) => println!("  Owns:      car {} (deleted)", car_id),
                (None, None) => println!("  Owns:      -"),
            }
            match (&profile.rental, &profile.rented_car) {
                (Some(rental), Some(car)) => println!(
                    "  Renting:   {} until {}",
                    describe_car(car),
                    rental.return_date.format("%Y-%m-%d")
                ),
                (Some(rental), None) => println!("  Renting:   car {}", rental.car_id),
                (None, _) => println!("  Renting:   -"),
            }
        }

        UserCommands::List => {
            let users = ledger.list_users().await?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<6} {:<28} {:<32} {:<6} {:<7}", "ID", "NAME", "EMAIL", "OWNS", "RENTING");
                println!("{}", "-".repeat(83));
                for user in users {
                    println!(
                        "{:<6} {:<28} {:<32} {:<6} {:<7}",
                        user.id,
                        user.full_name(),
                        user.email,
                        user.owned_car.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
                        user.rented_car_count
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_car_command(ledger: &RentalLedger, cmd: CarCommands) -> Result<()> {
    match cmd {
        CarCommands::Create {
            owner,
            brand,
            description,
            color,
            year,
            price,
        } => {
            let car = ledger
                .create_car(NewCar {
                    owner_id: owner,
                    brand,
                    description,
                    color,
                    year,
                    price,
                })
                .await?;
            println!("Created car {}: {}", car.id, describe_car(&car));
        }

        CarCommands::Show { id } => {
            let car = ledger.get_car_info(id).await?;

            println!("Car: {}", car.brand);
            println!("  ID:          {}", car.id);
            println!("  Owner:       {}", car.owner_id);
            println!("  Description: {}", car.description);
            println!("  Color:       {}", car.color);
            println!("  Year:        {}", car.year);
            println!("  Price:       {}", car.price);
            println!("  State:       {}", car.state());
        }

        CarCommands::List { all } => {
            let cars = if all {
                ledger.list_cars().await?
            } else {
                ledger.get_available_cars().await?
            };
            if cars.is_empty() {
                println!("No cars found.");
            } else {
                println!(
                    "{:<6} {:<16} {:<10} {:<6} {:>10} {:<10}",
                    "ID", "BRAND", "COLOR", "YEAR", "PRICE", "STATE"
                );
                println!("{}", "-".repeat(63));
                for car in cars {
                    println!(
                        "{:<6} {:<16} {:<10} {:<6} {:>10} {:<10}",
                        car.id,
                        car.brand,
                        car.color,
                        car.year,
                        car.price,
                        car.state()
                    );
                }
            }
        }

        CarCommands::Delete { id } => {
            let car = ledger.delete_car(id).await?;
            println!("Deleted car {}: {}", car.id, describe_car(&car));
        }
    }
    Ok(())
}

async fn run_rentals_command(ledger: &RentalLedger) -> Result<()> {
    let rentals = ledger.list_rentals().await?;
    if rentals.is_empty() {
        println!("No active rentals.");
        return Ok(());
    }

    let now = Utc::now();
    println!(
        "{:<6} {:<6} {:<6} {:>10} {:<12} {:<12}",
        "ID", "USER", "CAR", "PRICE", "TAKEN", "DUE"
    );
    println!("{}", "-".repeat(58));
    for rental in rentals {
        println!(
            "{:<6} {:<6} {:<6} {:>10} {:<12} {:<12}{}",
            rental.id,
            rental.user_id,
            rental.car_id,
            rental.price,
            rental.taking_date.format("%Y-%m-%d"),
            rental.return_date.format("%Y-%m-%d"),
            if rental.is_overdue(now) { " OVERDUE" } else { "" }
        );
    }
    Ok(())
}

async fn run_check_command(ledger: &RentalLedger) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = ledger.check_integrity().await?;

    println!("Users:   {}", report.user_count);
    println!("Cars:    {}", report.car_count);
    println!("Rentals: {}", report.rental_count);
    println!();

    if report.is_healthy() {
        println!("OK: car flags and renter counters match the rentals");
    } else {
        println!("Found {} issue(s):", report.issues.len());
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("ledger integrity check failed");
    }
    Ok(())
}

async fn run_export_command(
    ledger: &RentalLedger,
    export_type: &str,
    output: Option<&str>,
    format: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(ledger);

    let json = match format.unwrap_or("csv") {
        "csv" => false,
        "json" => true,
        other => anyhow::bail!("Invalid format '{}'. Valid formats: csv, json", other),
    };

    // Determine output writer
    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    let (count, what) = match export_type {
        "cars" | "available" => {
            let available_only = export_type == "available";
            let count = if json {
                exporter.export_cars_json(writer, available_only).await?
            } else {
                exporter.export_cars_csv(writer, available_only).await?
            };
            (count, "cars")
        }
        "rentals" => {
            let count = if json {
                exporter.export_rentals_json(writer).await?
            } else {
                exporter.export_rentals_csv(writer).await?
            };
            (count, "rentals")
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full database: {} users, {} cars, {} rentals",
                    snapshot.users.len(),
                    snapshot.cars.len(),
                    snapshot.rentals.len()
                );
            }
            return Ok(());
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: cars, available, rentals, full",
                export_type
            );
        }
    };

    if output.is_some() {
        eprintln!("Exported {} {}", count, what);
    }
    Ok(())
}

fn describe_car(car: &Car) -> String {
    format!("{} {} ({}, {})", car.color, car.brand, car.year, car.description)
}

fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    let naive_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .context("Date must be in YYYY-MM-DD format")?;

    let naive_datetime = naive_date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;

    Ok(DateTime::from_naive_utc_and_offset(naive_datetime, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        let date = parse_date("2024-03-10").unwrap();
        assert_eq!(date.to_rfc3339(), "2024-03-10T00:00:00+00:00");
        assert!(parse_date("10/03/2024").is_err());
    }

    #[test]
    fn test_cli_parses_rent_command() {
        let cli = Cli::try_parse_from([
            "autorent",
            "--database",
            "x.db",
            "rent",
            "--user",
            "8",
            "--car",
            "5",
            "--return-date",
            "2024-05-01",
        ])
        .unwrap();

        assert_eq!(cli.database, "x.db");
        assert_eq!(cli.config().default_rental_days, 7);
        match cli.command {
            Commands::Rent {
                user,
                car,
                return_date,
            } => {
                assert_eq!((user, car), (8, 5));
                assert_eq!(return_date.as_deref(), Some("2024-05-01"));
            }
            _ => panic!("expected rent command"),
        }
    }

    #[test]
    fn test_timeout_flag_feeds_config() {
        let cli = Cli::try_parse_from(["autorent", "--timeout-secs", "10", "rentals"]).unwrap();
        assert_eq!(cli.config().store_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        assert!(Cli::try_parse_from(["autorent", "--timeout-secs", "0", "rentals"]).is_err());
    }

    #[test]
    fn test_rental_days_must_be_in_range() {
        for days in ["0", "-3", "9223372036854775"] {
            let parsed = Cli::try_parse_from(["autorent", "--rental-days", days, "rentals"]);
            assert!(parsed.is_err(), "accepted --rental-days {days}");
        }
        let cli = Cli::try_parse_from(["autorent", "--rental-days", "30", "rentals"]).unwrap();
        assert_eq!(cli.config().default_rental_days, 30);
    }
}
