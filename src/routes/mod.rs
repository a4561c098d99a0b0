pub mod health_checks;
pub mod user;

pub use health_checks::*;
pub use user::*;
