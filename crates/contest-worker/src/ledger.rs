//! Processed-orders ledger.
//!
//! A JSON file recording every order the service attempted, so a continuous
//! service never contests the same order twice and can report totals.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use refund_contest_engine::{
    AppealRecord, DateRange, ErrorRecord, FetchError, OrderSource, RunObserver, Stage,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Sent,
    Failed,
}

/// One processed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub outcome: Outcome,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appeal_handle: Option<String>,

    /// Rebuttal text that was submitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defense: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    orders: BTreeMap<String, LedgerEntry>,
}

/// Totals over the whole ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub total_processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub last_processed: Option<DateTime<Utc>>,
}

/// File-backed ledger shared between the scheduler and the engine observer.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    file: Mutex<LedgerFile>,
}

impl Ledger {
    /// Open the ledger at `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read ledger {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse ledger {}", path.display()))?
        } else {
            LedgerFile::default()
        };

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, LedgerFile> {
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True when an appeal was already sent for the order.
    pub fn is_contested(&self, order_id: &str) -> bool {
        self.lock()
            .orders
            .get(order_id)
            .is_some_and(|entry| entry.outcome == Outcome::Sent)
    }

    pub fn entry(&self, order_id: &str) -> Option<LedgerEntry> {
        self.lock().orders.get(order_id).cloned()
    }

    pub fn record_sent(&self, appeal: &AppealRecord) {
        self.lock().orders.insert(
            appeal.order_id.clone(),
            LedgerEntry {
                outcome: Outcome::Sent,
                appeal_handle: Some(appeal.appeal_handle.clone()),
                defense: Some(appeal.defense.clone()),
                stage: None,
                message: None,
                processed_at: Utc::now(),
            },
        );
    }

    /// Record a failed attempt. A previously sent entry is kept.
    pub fn record_failure(&self, record: &ErrorRecord) {
        let mut file = self.lock();
        if file
            .orders
            .get(&record.order_id)
            .is_some_and(|entry| entry.outcome == Outcome::Sent)
        {
            return;
        }

        file.orders.insert(
            record.order_id.clone(),
            LedgerEntry {
                outcome: Outcome::Failed,
                appeal_handle: None,
                defense: None,
                stage: Some(record.stage),
                message: Some(record.message.clone()),
                processed_at: Utc::now(),
            },
        );
    }

    pub fn stats(&self) -> LedgerStats {
        let file = self.lock();
        let successful = file
            .orders
            .values()
            .filter(|entry| entry.outcome == Outcome::Sent)
            .count();

        LedgerStats {
            total_processed: file.orders.len(),
            successful,
            failed: file.orders.len() - successful,
            last_processed: file.orders.values().map(|entry| entry.processed_at).max(),
        }
    }

    /// Orders processed on the given local calendar day.
    pub fn processed_today(&self, today: NaiveDate) -> usize {
        self.lock()
            .orders
            .values()
            .filter(|entry| entry.processed_at.with_timezone(&Local).date_naive() == today)
            .count()
    }

    /// Write the ledger through a temporary file and rename it into place.
    pub fn save(&self) -> Result<()> {
        let json = {
            let file = self.lock();
            serde_json::to_string_pretty(&*file).context("Failed to serialize ledger")?
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn save_or_warn(&self) {
        if let Err(e) = self.save() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to save ledger");
        }
    }
}

impl RunObserver for Ledger {
    fn appeal_sent(&self, appeal: &AppealRecord) {
        self.record_sent(appeal);
        self.save_or_warn();
    }

    fn stage_failed(&self, record: &ErrorRecord) {
        self.record_failure(record);
        self.save_or_warn();
    }
}

/// Order source that drops orders the ledger already records as sent.
pub struct LedgerFilteredSource {
    inner: Arc<dyn OrderSource>,
    ledger: Arc<Ledger>,
    last_filtered: AtomicUsize,
}

impl LedgerFilteredSource {
    pub fn new(inner: Arc<dyn OrderSource>, ledger: Arc<Ledger>) -> Self {
        Self {
            inner,
            ledger,
            last_filtered: AtomicUsize::new(0),
        }
    }

    /// Orders removed by the most recent fetch.
    pub fn last_filtered(&self) -> usize {
        self.last_filtered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OrderSource for LedgerFilteredSource {
    async fn fetch(&self, range: &DateRange) -> Result<Vec<String>, FetchError> {
        self.last_filtered.store(0, Ordering::Relaxed);

        let order_ids = self.inner.fetch(range).await?;
        let total = order_ids.len();
        let pending: Vec<String> = order_ids
            .into_iter()
            .filter(|id| !self.ledger.is_contested(id))
            .collect();

        let filtered = total - pending.len();
        self.last_filtered.store(filtered, Ordering::Relaxed);
        if filtered > 0 {
            tracing::debug!(filtered, "Dropped already contested orders");
        }

        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn appeal(order_id: &str) -> AppealRecord {
        AppealRecord {
            order_id: order_id.to_string(),
            appeal_handle: format!("AP-{order_id}"),
            defense: "Delivered intact.".to_string(),
        }
    }

    fn failure(order_id: &str) -> ErrorRecord {
        ErrorRecord {
            stage: Stage::SubmitAppeal,
            order_id: order_id.to_string(),
            message: "rejected".to_string(),
        }
    }

    struct FixedSource(Vec<&'static str>);

    #[async_trait]
    impl OrderSource for FixedSource {
        async fn fetch(&self, _range: &DateRange) -> Result<Vec<String>, FetchError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("ledger.json")).unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.total_processed, 0);
        assert!(stats.last_processed.is_none());
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("processed_orders.json");

        let ledger = Ledger::open(&path).unwrap();
        ledger.record_sent(&appeal("A"));
        ledger.record_failure(&failure("B"));
        ledger.save().unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = Ledger::open(&path).unwrap();
        assert!(reopened.is_contested("A"));
        assert!(!reopened.is_contested("B"));

        let entry = reopened.entry("B").unwrap();
        assert_eq!(entry.outcome, Outcome::Failed);
        assert_eq!(entry.stage, Some(Stage::SubmitAppeal));
        assert_eq!(reopened.entry("A").unwrap().defense.as_deref(), Some("Delivered intact."));
    }

    #[test]
    fn test_failure_does_not_overwrite_sent() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("ledger.json")).unwrap();

        ledger.record_sent(&appeal("A"));
        ledger.record_failure(&failure("A"));
        assert!(ledger.is_contested("A"));
    }

    #[test]
    fn test_stats() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path().join("ledger.json")).unwrap();

        ledger.record_sent(&appeal("A"));
        ledger.record_sent(&appeal("B"));
        ledger.record_failure(&failure("C"));

        let stats = ledger.stats();
        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 1);
        assert!(stats.last_processed.is_some());
        assert_eq!(ledger.processed_today(Local::now().date_naive()), 3);
        assert_eq!(ledger.processed_today(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()), 0);
    }

    #[test]
    fn test_processed_today_uses_local_date() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let at = "2024-03-05T23:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let content = serde_json::json!({
            "orders": { "A": { "outcome": "sent", "processed_at": at } }
        });
        std::fs::write(&path, content.to_string()).unwrap();

        let ledger = Ledger::open(&path).unwrap();
        let local_day = at.with_timezone(&Local).date_naive();
        assert_eq!(ledger.processed_today(local_day), 1);
        assert_eq!(ledger.processed_today(local_day.succ_opt().unwrap()), 0);
        assert_eq!(ledger.processed_today(local_day.pred_opt().unwrap()), 0);
    }

    #[test]
    fn test_observer_persists_outcomes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let ledger = Ledger::open(&path).unwrap();

        ledger.appeal_sent(&appeal("A"));
        ledger.stage_failed(&failure("B"));

        let reopened = Ledger::open(&path).unwrap();
        assert_eq!(reopened.stats().total_processed, 2);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(Ledger::open(&path).is_err());
    }

    #[tokio::test]
    async fn test_filtered_source_drops_contested() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(Ledger::open(dir.path().join("ledger.json")).unwrap());
        ledger.record_sent(&appeal("B"));
        ledger.record_failure(&failure("C"));

        let source = LedgerFilteredSource::new(
            Arc::new(FixedSource(vec!["A", "B", "C"])),
            ledger.clone(),
        );
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let ids = source.fetch(&DateRange::new(day, day).unwrap()).await.unwrap();

        assert_eq!(ids, vec!["A", "C"]);
        assert_eq!(source.last_filtered(), 1);
    }
}
