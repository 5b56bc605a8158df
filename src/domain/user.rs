use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CarId, ValidationErrors};

pub type UserId = i64;

pub const MIN_PASSWORD_LEN: usize = 8;
/// Argon2 accepts more, but longer inputs were never accepted by the login flow.
pub const MAX_PASSWORD_LEN: usize = 72;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub surname: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// The car this user owns, if any. Stored as 0 when absent.
    pub owned_car: Option<CarId>,
    /// Number of active rentals; at most one in practice.
    pub rented_car_count: i64,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, surname: String, email: String, password_hash: String) -> Self {
        Self {
            id: 0,
            name,
            surname,
            email,
            password_hash,
            owned_car: None,
            rented_car_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn owns_car(&self) -> bool {
        self.owned_car.is_some()
    }

    pub fn is_renting(&self) -> bool {
        self.rented_car_count > 0
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

/// Registration input, before the password is hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut v = ValidationErrors::new();
        v.check_text(&self.name, "name");
        v.check_text(&self.surname, "surname");
        v.check_text(&self.email, "email");

        v.check(!self.password.is_empty(), "password", "must be provided");
        v.check(
            self.password.len() >= MIN_PASSWORD_LEN,
            "password",
            format!("must be at least {} bytes long", MIN_PASSWORD_LEN),
        );
        v.check(
            self.password.len() <= MAX_PASSWORD_LEN,
            "password",
            format!("must not be more than {} bytes long", MAX_PASSWORD_LEN),
        );
        v.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(password: &str) -> NewUser {
        NewUser {
            name: "Ada".into(),
            surname: "Lovelace".into(),
            email: "ada@example.com".into(),
            password: password.into(),
        }
    }

    #[test]
    fn test_new_user_starts_without_car_or_rental() {
        let user = User::new("Ada".into(), "Lovelace".into(), "ada@example.com".into(), "h".into());
        assert!(!user.owns_car());
        assert!(!user.is_renting());
        assert_eq!(user.full_name(), "Ada Lovelace");
    }

    #[test]
    fn test_password_length_bounds() {
        assert!(new_user("12345678").validate().is_ok());

        let err = new_user("short").validate().unwrap_err();
        assert_eq!(err.get("password"), Some("must be at least 8 bytes long"));

        let err = new_user(&"p".repeat(73)).validate().unwrap_err();
        assert_eq!(
            err.get("password"),
            Some("must not be more than 72 bytes long")
        );
    }

    #[test]
    fn test_missing_names_are_reported() {
        let mut input = new_user("correct horse");
        input.name.clear();
        input.surname = " ".into();

        let err = input.validate().unwrap_err();
        assert_eq!(err.get("name"), Some("must be provided"));
        assert_eq!(err.get("surname"), Some("must be provided"));
        assert_eq!(err.get("email"), None);
    }

    #[test]
    fn test_password_hash_is_not_serialized() {
        let user = User::new("Ada".into(), "L".into(), "a@b.c".into(), "$argon2id$secret".into());
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
    }
}
