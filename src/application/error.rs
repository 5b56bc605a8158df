use std::time::Duration;

use thiserror::Error;

use crate::domain::{CarId, UserId, ValidationErrors};

/// Broad failure classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input.
    Validation,
    /// A referenced user, car or rental does not exist.
    NotFound,
    /// A business rule rejected the request. Deterministic, never retry.
    Conflict,
    /// Store unavailable or too slow. Safe to retry with backoff.
    Transient,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    Validation(ValidationErrors),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Car not found: {0}")]
    CarNotFound(CarId),

    #[error("No active rental of car {car_id} by user {user_id}")]
    RentalNotFound { user_id: UserId, car_id: CarId },

    #[error("User {0} already owns a car and cannot own multiple cars")]
    AlreadyOwnsCar(UserId),

    #[error("User {0} is already renting a car and cannot rent multiple cars")]
    AlreadyRenting(UserId),

    #[error("User {0} is not currently renting a car")]
    NotRenting(UserId),

    #[error("Car {0} is currently rented")]
    CarInUse(CarId),

    #[error("Email '{0}' is already taken")]
    EmailTaken(String),

    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Database error: {0}")]
    Store(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::UserNotFound(_) | AppError::CarNotFound(_) | AppError::RentalNotFound { .. } => {
                ErrorKind::NotFound
            }
            AppError::AlreadyOwnsCar(_)
            | AppError::AlreadyRenting(_)
            | AppError::NotRenting(_)
            | AppError::CarInUse(_)
            | AppError::EmailTaken(_)
            | AppError::InvalidCredentials => ErrorKind::Conflict,
            AppError::Timeout { .. } | AppError::Store(_) => ErrorKind::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_rules_are_conflicts() {
        for err in [
            AppError::AlreadyOwnsCar(1),
            AppError::AlreadyRenting(1),
            AppError::NotRenting(1),
            AppError::CarInUse(2),
        ] {
            assert_eq!(err.kind(), ErrorKind::Conflict, "{}", err);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_missing_rows_are_not_found() {
        assert_eq!(AppError::CarNotFound(5).kind(), ErrorKind::NotFound);
        assert_eq!(
            AppError::RentalNotFound { user_id: 8, car_id: 6 }.kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_store_failures_are_retryable() {
        let timeout = AppError::Timeout {
            operation: "rent_car",
            after: Duration::from_secs(3),
        };
        assert!(timeout.is_retryable());
        assert!(AppError::from(anyhow::anyhow!("database is locked")).is_retryable());
    }

    #[test]
    fn test_already_renting_message_is_distinct() {
        let msg = AppError::AlreadyRenting(8).to_string();
        assert_eq!(
            msg,
            "User 8 is already renting a car and cannot rent multiple cars"
        );
    }
}
