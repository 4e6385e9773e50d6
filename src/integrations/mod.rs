//! Seams to the collaborators this service does not own.

pub mod gateway;
pub mod identity;
pub mod notification;
