//! Run state owned by the engine for the duration of one run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{CurrentOrder, DateRange, ErrorRecord, FatalFailure, RunSummary, Stage};

/// Pipeline position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Start,
    PopulateQueue,
    ResolveDetail,
    Gate,
    Generate,
    Submit,
    Advance,
    Done,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::PopulateQueue => write!(f, "populate_queue"),
            Self::ResolveDetail => write!(f, "resolve_detail"),
            Self::Gate => write!(f, "gate"),
            Self::Generate => write!(f, "generate"),
            Self::Submit => write!(f, "submit"),
            Self::Advance => write!(f, "advance"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Mutable state of one run.
///
/// `queue` is fixed once populated, `cursor` only moves forward and never
/// passes the end of the queue, and `errors` is append-only.
#[derive(Debug)]
pub struct RunState {
    pub state: EngineState,
    date_range: DateRange,
    queue: Vec<String>,
    cursor: usize,
    current: Option<CurrentOrder>,
    appeals_sent: usize,
    appeals_skipped: usize,
    errors: Vec<ErrorRecord>,
}

impl RunState {
    pub fn new(date_range: DateRange) -> Self {
        Self {
            state: EngineState::Start,
            date_range,
            queue: Vec::new(),
            cursor: 0,
            current: None,
            appeals_sent: 0,
            appeals_skipped: 0,
            errors: Vec::new(),
        }
    }

    pub fn date_range(&self) -> &DateRange {
        &self.date_range
    }

    /// Install the queue. Only the first call has any effect.
    pub fn populate(&mut self, queue: Vec<String>) {
        if self.state != EngineState::Start && self.state != EngineState::PopulateQueue {
            return;
        }
        self.queue = queue;
        self.cursor = 0;
    }

    pub fn queue(&self) -> &[String] {
        &self.queue
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.queue.len()
    }

    /// Clear `current` and start the record for the order at the cursor.
    pub fn begin_order(&mut self) -> Option<&mut CurrentOrder> {
        let order_id = self.queue.get(self.cursor)?;
        self.current = Some(CurrentOrder::new(order_id));
        self.current.as_mut()
    }

    pub fn current(&self) -> Option<&CurrentOrder> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut CurrentOrder> {
        self.current.as_mut()
    }

    /// Append an error for the current order and return it.
    pub fn record_error(&mut self, stage: Stage, message: String) -> &ErrorRecord {
        let order_id = self
            .current
            .as_ref()
            .map(|c| c.order_id.clone())
            .unwrap_or_default();
        self.errors.push(ErrorRecord {
            stage,
            order_id,
            message,
        });
        &self.errors[self.errors.len() - 1]
    }

    pub fn record_sent(&mut self) {
        self.appeals_sent += 1;
    }

    pub fn record_skipped(&mut self) {
        self.appeals_skipped += 1;
    }

    pub fn appeals_sent(&self) -> usize {
        self.appeals_sent
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    /// Move past the current order. Returns true when the queue is exhausted.
    pub fn advance(&mut self) -> bool {
        if self.cursor < self.queue.len() {
            self.cursor += 1;
        }
        self.current = None;
        self.is_exhausted()
    }

    /// Consume the state into the run's summary.
    pub fn into_summary(
        self,
        run_id: Uuid,
        fatal: Option<FatalFailure>,
        cancelled: bool,
    ) -> RunSummary {
        RunSummary {
            run_id,
            date_range: self.date_range,
            orders_seen: self.cursor,
            appeals_sent: self.appeals_sent,
            appeals_skipped: self.appeals_skipped,
            errors: self.errors,
            fatal,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range() -> DateRange {
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        DateRange::new(day, day).unwrap()
    }

    #[test]
    fn test_cursor_never_passes_queue_end() {
        let mut state = RunState::new(range());
        state.populate(vec!["A".to_string()]);

        assert!(!state.is_exhausted());
        assert!(state.advance());
        assert!(state.advance());
        assert_eq!(state.cursor(), 1);
    }

    #[test]
    fn test_queue_fixed_after_population() {
        let mut state = RunState::new(range());
        state.populate(vec!["A".to_string(), "B".to_string()]);
        state.state = EngineState::ResolveDetail;
        state.populate(vec!["Z".to_string()]);

        assert_eq!(state.queue(), &["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_begin_order_clears_previous_record() {
        let mut state = RunState::new(range());
        state.populate(vec!["A".to_string(), "B".to_string()]);

        let current = state.begin_order().unwrap();
        current.reason = Some("damaged".to_string());
        state.advance();

        let current = state.begin_order().unwrap();
        assert_eq!(current.order_id, "B");
        assert!(current.reason.is_none());
    }

    #[test]
    fn test_record_error_tags_current_order() {
        let mut state = RunState::new(range());
        state.populate(vec!["A".to_string()]);
        state.begin_order();

        let record = state.record_error(Stage::GenerateDefense, "quota".to_string());
        assert_eq!(record.order_id, "A");
        assert_eq!(record.stage, Stage::GenerateDefense);

        let summary = state.into_summary(Uuid::nil(), None, false);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.appeals_sent, 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(EngineState::PopulateQueue.to_string(), "populate_queue");
        assert_eq!(EngineState::Done.to_string(), "done");
    }
}
