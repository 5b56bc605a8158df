use std::collections::BTreeMap;
use std::fmt;

/// Longest accepted free-text field, in bytes.
pub const MAX_TEXT_LEN: usize = 500;

/// Field-level validation failures, keyed by field name.
/// Only the first message recorded for a field is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<&'static str, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` against `field` unless `ok` holds.
    pub fn check(&mut self, ok: bool, field: &'static str, message: impl Into<String>) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.entry(field).or_insert_with(|| message.into());
    }

    /// Common checks for a required, bounded text field.
    pub fn check_text(&mut self, value: &str, field: &'static str) {
        self.check(!value.trim().is_empty(), field, "must be provided");
        self.check(
            value.len() <= MAX_TEXT_LEN,
            field,
            format!("must not be more than {} bytes long", MAX_TEXT_LEN),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.errors.iter().map(|(field, msg)| (*field, msg.as_str()))
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.fields() {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{} {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_message_per_field_wins() {
        let mut v = ValidationErrors::new();
        v.add("year", "must be provided");
        v.add("year", "must be greater than 1888");

        assert_eq!(v.get("year"), Some("must be provided"));
    }

    #[test]
    fn test_check_text_rejects_blank_and_oversized() {
        let mut v = ValidationErrors::new();
        v.check_text("   ", "brand");
        v.check_text(&"x".repeat(MAX_TEXT_LEN + 1), "color");
        v.check_text("Toyota", "description");

        assert_eq!(v.get("brand"), Some("must be provided"));
        assert_eq!(v.get("color"), Some("must not be more than 500 bytes long"));
        assert_eq!(v.get("description"), None);
    }

    #[test]
    fn test_display_joins_fields_in_order() {
        let mut v = ValidationErrors::new();
        v.add("price", "must be a positive integer");
        v.add("brand", "must be provided");

        assert_eq!(
            v.to_string(),
            "brand must be provided; price must be a positive integer"
        );
        assert!(v.into_result().is_err());
    }
}
