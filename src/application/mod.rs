// Application layer: the rental ledger and the rules it enforces on top of storage.

pub mod config;
pub mod error;
pub mod password;
pub mod service;

pub use config::*;
pub use error::*;
pub use service::*;
