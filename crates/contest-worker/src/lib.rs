//! Refund contestation service
//!
//! Drives the contestation workflow against a live case-management API.
//!
//! This crate provides:
//! - Case-management HTTP client (order listing, order details, appeal submission)
//! - Chat-completions adapter with the multimodal and text-only defense strategies
//! - Processed-orders ledger and the already-contested filter
//! - Contestation and cycle journal files
//! - Cycle scheduler

pub mod client;
pub mod config;
pub mod journal;
pub mod ledger;
pub mod prompt;
pub mod scheduler;

pub use config::ContestConfig;
pub use journal::Journal;
pub use ledger::{Ledger, LedgerStats};
pub use scheduler::{CycleRange, Scheduler};
