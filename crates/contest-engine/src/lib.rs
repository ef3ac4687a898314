//! Refund Contestation Engine
//!
//! Drives one contestation run over the orders that currently have a pending
//! refund claim:
//!
//! - Populate the queue once from an [`OrderSource`]
//! - Resolve each order's details
//! - Gate on the fields needed to write a rebuttal
//! - Generate the rebuttal and submit the appeal
//! - Record per-order failures without stopping the run
//!
//! The collaborators are traits; HTTP clients and provider adapters live in
//! the worker crate.
//!
//! ## Example
//!
//! ```ignore
//! use refund_contest_engine::{DateRange, WorkflowEngine};
//!
//! let engine = WorkflowEngine::new(source, resolver, generator, submitter);
//! let summary = engine.run(DateRange::last_days(1, today)?).await;
//! println!("{} appeals sent", summary.appeals_sent);
//! ```

pub mod collaborators;
pub mod engine;
pub mod error;
pub mod model;

pub use collaborators::{
    AppealSubmitter, DefenseGenerator, NoopObserver, OrderDetailResolver, OrderSource,
    RunObserver,
};
pub use engine::{should_generate_defense, WorkflowEngine};
pub use error::{DetailError, FetchError, GenerationError, RangeError, SubmissionError};
pub use model::{
    AppealRecord, CurrentOrder, DateRange, ErrorRecord, FatalFailure, OrderDetail, RunSummary,
    Stage,
};
