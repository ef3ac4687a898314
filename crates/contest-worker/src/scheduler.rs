//! Cycle scheduler.
//!
//! Runs the workflow engine once per cycle and sleeps between cycles until
//! shutdown is requested.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use refund_contest_engine::{DateRange, RunObserver, RunSummary, WorkflowEngine};
use tokio::sync::watch;

use crate::client::{CaseApiClient, ChatCompletionsClient, LlmGenerator, ProviderKind};
use crate::config::ContestConfig;
use crate::journal::{CycleRecord, Journal};
use crate::ledger::{Ledger, LedgerFilteredSource, LedgerStats};

/// Date range used for each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleRange {
    /// The last `days_back` days up to the local date at cycle start.
    Rolling { days_back: u32 },
    Fixed(DateRange),
}

impl CycleRange {
    pub fn resolve(&self, today: NaiveDate) -> Result<DateRange> {
        match self {
            Self::Rolling { days_back } => {
                DateRange::last_days(*days_back, today).context("Invalid cycle date range")
            }
            Self::Fixed(range) => Ok(*range),
        }
    }
}

pub struct Scheduler {
    engine: WorkflowEngine,
    ledger: Arc<Ledger>,
    journal: Arc<Journal>,
    source: Arc<LedgerFilteredSource>,
    range: CycleRange,
    interval: Duration,
    cycles: AtomicU64,
}

impl Scheduler {
    pub fn new(
        engine: WorkflowEngine,
        ledger: Arc<Ledger>,
        journal: Arc<Journal>,
        source: Arc<LedgerFilteredSource>,
        range: CycleRange,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            ledger,
            journal,
            source,
            range,
            interval,
            cycles: AtomicU64::new(0),
        }
    }

    /// Wire the HTTP collaborators, the ledger, the journal and the engine
    /// from configuration.
    pub fn from_config(
        config: &ContestConfig,
        provider: ProviderKind,
        range: CycleRange,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let ledger = Arc::new(Ledger::open(&config.ledger_path)?);
        let journal = Arc::new(Journal::open(&config.log_dir)?);

        let cases = Arc::new(
            CaseApiClient::new(&config.base_api_url, config.api_token(), config.http_timeout())
                .with_page_size(config.page_size),
        );
        let source = Arc::new(LedgerFilteredSource::new(cases.clone(), ledger.clone()));

        let chat = ChatCompletionsClient::new(
            &config.llm_base_url(provider),
            &config.llm_api_key,
            &config.llm_model(provider),
            config.llm_timeout(),
        );
        let generator = Arc::new(LlmGenerator::for_provider(provider, chat));

        let observers: Vec<Arc<dyn RunObserver>> = vec![
            ledger.clone() as Arc<dyn RunObserver>,
            journal.clone() as Arc<dyn RunObserver>,
        ];
        let engine = WorkflowEngine::new(source.clone(), cases.clone(), generator, cases)
            .with_observer(Arc::new(observers))
            .with_shutdown(shutdown);

        tracing::info!(
            provider = %provider,
            model = %config.llm_model(provider),
            strategy = engine.generator_name(),
            ledger = %config.ledger_path.display(),
            log_dir = %config.log_dir.display(),
            "Scheduler configured"
        );

        Ok(Self::new(
            engine,
            ledger,
            journal,
            source,
            range,
            config.cycle_interval(),
        ))
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Run one cycle and log its summary.
    ///
    /// Errors only when the cycle's date range cannot be computed; a failed
    /// order fetch is reported in the summary.
    pub async fn run_cycle(&self) -> Result<RunSummary> {
        let started = Local::now();
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let range = self.range.resolve(started.date_naive())?;
        tracing::info!(cycle, range = %range, "Starting cycle");

        let summary = self.engine.run(range).await;
        self.log_cycle(cycle, started, &summary);
        Ok(summary)
    }

    /// Run cycles until `shutdown` reads `true`. A failed cycle is logged and
    /// the next one still runs.
    pub async fn run_forever(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.run_cycle().await {
                tracing::error!(error = %e, "Cycle failed");
            }

            if *shutdown.borrow() {
                break;
            }

            tracing::info!(seconds = self.interval.as_secs(), "Waiting for next cycle");
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// Log ledger totals; `moment` tags the line (startup, cycle, final).
    pub fn log_ledger_stats(&self, moment: &'static str) -> LedgerStats {
        let stats = self.ledger.stats();
        tracing::info!(
            moment,
            total_processed = stats.total_processed,
            successful = stats.successful,
            failed = stats.failed,
            processed_today = self.ledger.processed_today(Local::now().date_naive()),
            last_processed = ?stats.last_processed,
            "Ledger statistics"
        );
        stats
    }

    fn log_cycle(&self, cycle: u64, started: DateTime<Local>, summary: &RunSummary) {
        if let Some(fatal) = &summary.fatal {
            tracing::error!(
                run_id = %summary.run_id,
                stage = %fatal.stage,
                error = %fatal.message,
                "Cycle failed"
            );
        }

        let already_contested = self.source.last_filtered();
        tracing::info!(
            cycle,
            run_id = %summary.run_id,
            orders_found = summary.orders_seen,
            appeals_sent = summary.appeals_sent,
            skipped = summary.appeals_skipped,
            already_contested,
            errors = summary.errors.len(),
            cancelled = summary.cancelled,
            "Cycle summary"
        );

        for error in &summary.errors {
            tracing::warn!(run_id = %summary.run_id, "{}", error);
        }

        let record = CycleRecord {
            cycle,
            summary,
            already_contested,
        };
        if let Err(e) = self.journal.record_cycle(started, record) {
            tracing::warn!(error = %e, "Failed to write cycle record");
        }

        self.log_ledger_stats("cycle");
    }
}
