//! The classification-and-deduplication pipeline.
//!
//! One round flows one direction: feeds produce candidates, the classifier
//! scores them, the ledger gates which survive, the notifier emits the
//! survivors and the scheduler adapts the next polling delay.

pub mod classifier;
pub mod ledger;
pub mod scheduler;

pub use ledger::AlertLedger;
pub use scheduler::Scheduler;
