//! Outbound collaborator clients.

pub mod biteship;
pub mod mock;
pub mod notifier;

pub use biteship::BiteshipTracker;
pub use notifier::{HttpNotifier, LogNotifier};
