pub mod catalog;
pub mod delivery;
pub mod driver;
pub mod identity;
pub mod order;
pub mod payment;
