//! Workflow engine: sequences the collaborators over the order queue.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::collaborators::{
    AppealSubmitter, DefenseGenerator, NoopObserver, OrderDetailResolver, OrderSource,
    RunObserver,
};
use crate::error::GenerationError;
use crate::model::{AppealRecord, DateRange, FatalFailure, RunSummary, Stage};

use super::gate::should_generate_defense;
use super::state::{EngineState, RunState};

/// Refund contestation workflow engine.
///
/// Orders are processed strictly one at a time. A failure in detail
/// resolution, generation or submission is recorded against that order and
/// the run moves on; only queue population can abort a run.
pub struct WorkflowEngine {
    source: Arc<dyn OrderSource>,
    resolver: Arc<dyn OrderDetailResolver>,
    generator: Arc<dyn DefenseGenerator>,
    submitter: Arc<dyn AppealSubmitter>,
    observer: Arc<dyn RunObserver>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl WorkflowEngine {
    /// Create an engine over the four collaborators.
    pub fn new(
        source: Arc<dyn OrderSource>,
        resolver: Arc<dyn OrderDetailResolver>,
        generator: Arc<dyn DefenseGenerator>,
        submitter: Arc<dyn AppealSubmitter>,
    ) -> Self {
        Self {
            source,
            resolver,
            generator,
            submitter,
            observer: Arc::new(NoopObserver),
            shutdown: None,
        }
    }

    /// Attach an observer notified at every stage outcome.
    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Stop the run at the next order boundary once `shutdown` reads `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    /// Run the pipeline over every order the source returns for `date_range`.
    ///
    /// Always returns a summary. A failed queue population is reported via
    /// [`RunSummary::fatal`] with zero orders seen.
    pub async fn run(&self, date_range: DateRange) -> RunSummary {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id, range = %date_range);
        self.drive(run_id, date_range).instrument(span).await
    }

    async fn drive(&self, run_id: Uuid, date_range: DateRange) -> RunSummary {
        let mut state = RunState::new(date_range);
        let mut cancelled = false;

        loop {
            debug!(state = %state.state, cursor = state.cursor(), "Engine transition");

            let next = match state.state {
                EngineState::Start => EngineState::PopulateQueue,
                EngineState::PopulateQueue => {
                    match self.source.fetch(state.date_range()).await {
                        Ok(queue) => {
                            info!(orders = queue.len(), "Order queue populated");
                            state.populate(queue);
                            self.observer.queue_populated(state.queue());
                            if state.is_exhausted() {
                                EngineState::Done
                            } else {
                                EngineState::ResolveDetail
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to fetch orders, aborting run");
                            let fatal = FatalFailure {
                                stage: Stage::FetchOrders,
                                message: e.to_string(),
                            };
                            let summary = state.into_summary(run_id, Some(fatal), false);
                            self.observer.run_finished(&summary);
                            return summary;
                        }
                    }
                }
                EngineState::ResolveDetail => {
                    if self.is_cancelled() {
                        info!(cursor = state.cursor(), "Shutdown requested, stopping run");
                        cancelled = true;
                        EngineState::Done
                    } else {
                        self.resolve_detail(&mut state).await
                    }
                }
                EngineState::Gate => self.gate(&mut state),
                EngineState::Generate => self.generate(&mut state).await,
                EngineState::Submit => self.submit(&mut state).await,
                EngineState::Advance => {
                    if state.advance() {
                        EngineState::Done
                    } else {
                        EngineState::ResolveDetail
                    }
                }
                EngineState::Done => break,
            };
            state.state = next;
        }

        let summary = state.into_summary(run_id, None, cancelled);
        info!(
            orders_seen = summary.orders_seen,
            appeals_sent = summary.appeals_sent,
            appeals_skipped = summary.appeals_skipped,
            errors = summary.errors.len(),
            cancelled = summary.cancelled,
            "Run finished"
        );
        self.observer.run_finished(&summary);
        summary
    }

    async fn resolve_detail(&self, state: &mut RunState) -> EngineState {
        let Some(current) = state.begin_order() else {
            return EngineState::Done;
        };
        let order_id = current.order_id.clone();
        debug!(order_id = %order_id, "Resolving order details");

        match self.resolver.resolve(&order_id).await {
            Ok(detail) => {
                if let Some(current) = state.current_mut() {
                    current.apply_detail(detail);
                }
                EngineState::Gate
            }
            Err(e) => {
                self.fail(state, Stage::GetOrderDetails, e.to_string());
                EngineState::Advance
            }
        }
    }

    fn gate(&self, state: &mut RunState) -> EngineState {
        let Some(current) = state.current() else {
            return EngineState::Advance;
        };
        if should_generate_defense(current) {
            return EngineState::Generate;
        }

        let order_id = current.order_id.clone();
        let missing = current.missing_fields();
        debug!(order_id = %order_id, missing = ?missing, "Order not eligible, skipping");
        self.observer.order_skipped(&order_id, &missing);
        state.record_skipped();
        EngineState::Advance
    }

    async fn generate(&self, state: &mut RunState) -> EngineState {
        let Some(current) = state.current() else {
            return EngineState::Advance;
        };
        let (Some(reason), Some(items)) = (current.reason.clone(), current.items.clone()) else {
            return EngineState::Advance;
        };
        let image_ref = current.image_ref.clone();
        debug!(
            order_id = %current.order_id,
            strategy = self.generator.name(),
            with_image = image_ref.is_some(),
            "Generating defense"
        );

        let result = self
            .generator
            .generate(&reason, &items, image_ref.as_deref())
            .await
            .and_then(|text| {
                if text.trim().is_empty() {
                    Err(GenerationError::EmptyResponse)
                } else {
                    Ok(text)
                }
            });

        match result {
            Ok(text) => {
                if let Some(current) = state.current_mut() {
                    current.defense = Some(text);
                }
                EngineState::Submit
            }
            Err(e) => {
                self.fail(state, Stage::GenerateDefense, e.to_string());
                self.finish_contestation(state, true);
                EngineState::Advance
            }
        }
    }

    async fn submit(&self, state: &mut RunState) -> EngineState {
        let appeal = match state.current() {
            Some(current) => match (&current.appeal_handle, &current.defense) {
                (Some(handle), Some(defense)) => AppealRecord {
                    order_id: current.order_id.clone(),
                    appeal_handle: handle.clone(),
                    defense: defense.clone(),
                },
                _ => return EngineState::Advance,
            },
            None => return EngineState::Advance,
        };

        let failed = match self.submitter.submit(&appeal).await {
            Ok(()) => {
                state.record_sent();
                info!(
                    order_id = %appeal.order_id,
                    appeals_sent = state.appeals_sent(),
                    "Appeal submitted"
                );
                self.observer.appeal_sent(&appeal);
                false
            }
            Err(e) => {
                self.fail(state, Stage::SubmitAppeal, e.to_string());
                true
            }
        };
        self.finish_contestation(state, failed);
        EngineState::Advance
    }

    fn finish_contestation(&self, state: &RunState, failed: bool) {
        if let Some(current) = state.current() {
            let failure = if failed { state.errors().last() } else { None };
            self.observer.contestation_finished(current, failure);
        }
    }

    fn fail(&self, state: &mut RunState, stage: Stage, message: String) {
        let record = state.record_error(stage, message);
        warn!(
            stage = %record.stage,
            order_id = %record.order_id,
            error = %record.message,
            "Stage failed, continuing with next order"
        );
        self.observer.stage_failed(record);
    }

    fn is_cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }
}
