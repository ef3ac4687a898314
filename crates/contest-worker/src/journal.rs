//! Human-readable contestation journal.
//!
//! Appends one record per contestation to `contestations_<date>.txt` and one
//! record per cycle to `cycles_<date>.txt`, both dated by the local clock.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use refund_contest_engine::{CurrentOrder, ErrorRecord, RunObserver, RunSummary};

const RULE: &str = "======================================================================";

/// Totals for one scheduler cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleRecord<'a> {
    pub cycle: u64,
    pub summary: &'a RunSummary,
    pub already_contested: usize,
}

#[derive(Debug)]
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    /// Use `dir` for journal files, creating it if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn contestations_file(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("contestations_{}.txt", day.format("%Y-%m-%d")))
    }

    pub fn cycles_file(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("cycles_{}.txt", day.format("%Y-%m-%d")))
    }

    /// Append the record of one contestation.
    pub fn record_contestation(
        &self,
        at: DateTime<Local>,
        order: &CurrentOrder,
        failure: Option<&ErrorRecord>,
    ) -> Result<()> {
        let mut text = String::new();
        let _ = writeln!(text, "{RULE}");
        let _ = writeln!(text, "CONTESTATION {}", at.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(text, "{RULE}");
        let _ = writeln!(text, "Order: {}", order.order_id);
        let _ = writeln!(
            text,
            "Appeal handle: {}",
            order.appeal_handle.as_deref().unwrap_or("-")
        );
        match failure {
            Some(record) => {
                let _ = writeln!(text, "Outcome: FAILED at {}: {}", record.stage, record.message);
            }
            None => {
                let _ = writeln!(text, "Outcome: SENT");
            }
        }
        let _ = writeln!(text, "Reason: {}", order.reason.as_deref().unwrap_or("-"));
        let _ = writeln!(text, "Items: {}", order.items.as_deref().unwrap_or("-"));
        let _ = writeln!(
            text,
            "Evidence image: {}",
            order.image_ref.as_deref().unwrap_or("none")
        );
        let _ = writeln!(text, "Defense:");
        let _ = writeln!(text, "{}", order.defense.as_deref().unwrap_or("(not generated)"));
        let _ = writeln!(text);

        append(&self.contestations_file(at.date_naive()), &text)
    }

    /// Append the summary of one cycle.
    pub fn record_cycle(&self, at: DateTime<Local>, record: CycleRecord<'_>) -> Result<()> {
        let summary = record.summary;
        let mut text = String::new();
        let _ = writeln!(text, "{RULE}");
        let _ = writeln!(
            text,
            "CYCLE #{} {}",
            record.cycle,
            at.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(text, "{RULE}");
        let _ = writeln!(text, "Run: {}", summary.run_id);
        let _ = writeln!(text, "Range: {}", summary.date_range);
        let _ = writeln!(text, "Orders found: {}", summary.orders_seen);
        let _ = writeln!(text, "Appeals sent: {}", summary.appeals_sent);
        let _ = writeln!(text, "Skipped: {}", summary.appeals_skipped);
        let _ = writeln!(text, "Already contested: {}", record.already_contested);
        let _ = writeln!(text, "Errors: {}", summary.errors.len());
        for error in &summary.errors {
            let _ = writeln!(text, "  - {error}");
        }
        if let Some(fatal) = &summary.fatal {
            let _ = writeln!(text, "Fatal: [{}] {}", fatal.stage, fatal.message);
        }
        if summary.cancelled {
            let _ = writeln!(text, "Cancelled: yes");
        }
        let _ = writeln!(text);

        append(&self.cycles_file(at.date_naive()), &text)
    }
}

fn append(path: &Path, text: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

impl RunObserver for Journal {
    fn contestation_finished(&self, order: &CurrentOrder, failure: Option<&ErrorRecord>) {
        if let Err(e) = self.record_contestation(Local::now(), order, failure) {
            tracing::warn!(order_id = %order.order_id, error = %e, "Failed to write contestation record");
        }
    }
}
