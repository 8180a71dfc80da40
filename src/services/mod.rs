//! Reconciliation core services.

pub mod applier;
pub mod confirmation;
pub mod reconciler;
pub mod scheduler;

pub use applier::{TransitionApplier, TransitionError, TransitionRequest};
pub use confirmation::{ConfirmError, ConfirmationService};
pub use reconciler::{OrderFailure, Reconciler, RunReport};
pub use scheduler::ReconcilerScheduler;
