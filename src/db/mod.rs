pub mod user;

pub use user::UserStore;
