pub mod error;
pub mod solar;
pub mod store;
pub mod user;
