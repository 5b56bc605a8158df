use std::time::Duration;

/// Runtime settings for a [`super::RentalLedger`].
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Upper bound for a single ledger operation against the store.
    pub store_timeout: Duration,
    /// Rental length used when the caller gives no return date.
    pub default_rental_days: i64,
    pub max_connections: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(3),
            default_rental_days: 7,
            max_connections: 5,
        }
    }
}

impl LedgerConfig {
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_default_rental_days(mut self, days: i64) -> Self {
        self.default_rental_days = days;
        self
    }
}
