pub mod delivery;
pub mod location;
