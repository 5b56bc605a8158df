mod car;
mod integrity;
mod rental;
mod user;
mod validation;

pub use car::*;
pub use integrity::*;
pub use rental::*;
pub use user::*;
pub use validation::*;
