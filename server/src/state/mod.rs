pub mod driver;
pub mod processing_store;
pub mod reconciler;
pub mod tasks;

pub use driver::{CycleDriver, CycleState};
pub use processing_store::{LedgerEntry, ProcessingStore};
pub use reconciler::InboxReconciler;
