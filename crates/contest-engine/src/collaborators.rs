//! Collaborator contracts consumed by the engine.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DetailError, FetchError, GenerationError, SubmissionError};
use crate::model::{AppealRecord, CurrentOrder, DateRange, ErrorRecord, OrderDetail, RunSummary};

/// Lists the orders currently eligible for refund contestation.
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Ordered order identifiers for `range`. Failure is fatal to the run.
    async fn fetch(&self, range: &DateRange) -> Result<Vec<String>, FetchError>;
}

/// Resolves the contestation-relevant fields of one order.
#[async_trait]
pub trait OrderDetailResolver: Send + Sync {
    async fn resolve(&self, order_id: &str) -> Result<OrderDetail, DetailError>;
}

/// Drafts rebuttal text for a refund claim.
///
/// Exactly one implementation is selected at startup and used for the whole
/// process lifetime.
#[async_trait]
pub trait DefenseGenerator: Send + Sync {
    /// Short strategy name for logs.
    fn name(&self) -> &'static str;

    async fn generate(
        &self,
        reason: &str,
        items: &str,
        image_ref: Option<&str>,
    ) -> Result<String, GenerationError>;
}

/// Submits a contestation through the case-management API.
#[async_trait]
pub trait AppealSubmitter: Send + Sync {
    async fn submit(&self, appeal: &AppealRecord) -> Result<(), SubmissionError>;
}

/// Hooks called by the engine at stage outcomes.
///
/// Observers see what happened; they cannot change the run. Every method
/// defaults to doing nothing. Hooks run inline on the engine task and the
/// next stage starts only after they return, so an observer that persists
/// an outcome has it on disk before the next order is touched.
pub trait RunObserver: Send + Sync {
    fn queue_populated(&self, _order_ids: &[String]) {}

    fn order_skipped(&self, _order_id: &str, _missing: &[&'static str]) {}

    fn appeal_sent(&self, _appeal: &AppealRecord) {}

    fn stage_failed(&self, _record: &ErrorRecord) {}

    /// An order that passed the gate finished generation and submission.
    ///
    /// `failure` is the error recorded for the order, if any; `order.defense`
    /// is absent when generation failed.
    fn contestation_finished(&self, _order: &CurrentOrder, _failure: Option<&ErrorRecord>) {}

    fn run_finished(&self, _summary: &RunSummary) {}
}

/// Fan-out: every observer sees every event, in list order.
impl RunObserver for Vec<Arc<dyn RunObserver>> {
    fn queue_populated(&self, order_ids: &[String]) {
        self.iter().for_each(|o| o.queue_populated(order_ids));
    }

    fn order_skipped(&self, order_id: &str, missing: &[&'static str]) {
        self.iter().for_each(|o| o.order_skipped(order_id, missing));
    }

    fn appeal_sent(&self, appeal: &AppealRecord) {
        self.iter().for_each(|o| o.appeal_sent(appeal));
    }

    fn stage_failed(&self, record: &ErrorRecord) {
        self.iter().for_each(|o| o.stage_failed(record));
    }

    fn contestation_finished(&self, order: &CurrentOrder, failure: Option<&ErrorRecord>) {
        self.iter()
            .for_each(|o| o.contestation_finished(order, failure));
    }

    fn run_finished(&self, summary: &RunSummary) {
        self.iter().for_each(|o| o.run_finished(summary));
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}
