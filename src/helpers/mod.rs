mod backoff;
pub(crate) mod json;

pub use backoff::Backoff;
pub use json::*;
