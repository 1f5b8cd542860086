//! Database entities.

pub mod ad;
pub mod asset;

pub use ad::Entity as Ad;
pub use asset::Entity as Asset;
