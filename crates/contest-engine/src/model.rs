//! Data carried through a contestation run.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RangeError;

/// Wire format for dates sent to the case-management API.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Start/end bounds used once, when the queue is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::Inverted {
                start: start.format(DATE_FORMAT).to_string(),
                end: end.format(DATE_FORMAT).to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// The last `days_back` days up to and including `today`.
    pub fn last_days(days_back: u32, today: NaiveDate) -> Result<Self, RangeError> {
        let start = today
            .checked_sub_days(Days::new(u64::from(days_back)))
            .ok_or(RangeError::OutOfRange(days_back))?;
        Ok(Self { start, end: today })
    }

    pub fn start_param(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start_param(), self.end_param())
    }
}

/// Contestation-relevant fields of one order, as returned by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetail {
    /// Provider-assigned token; absent when the case is not contestable.
    pub appeal_handle: Option<String>,

    /// Claim reason given by the buyer.
    pub reason: Option<String>,

    /// Human-readable summary of the claimed items.
    pub items: Option<String>,

    /// Optional pointer to an evidence image.
    pub image_ref: Option<String>,
}

/// Working record for the order at the cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentOrder {
    pub order_id: String,
    pub appeal_handle: Option<String>,
    pub reason: Option<String>,
    pub items: Option<String>,
    pub image_ref: Option<String>,
    pub defense: Option<String>,
}

impl CurrentOrder {
    /// Fresh record for `order_id` with every downstream field absent.
    pub fn new(order_id: &str) -> Self {
        Self {
            order_id: order_id.to_string(),
            ..Default::default()
        }
    }

    /// Copy resolved fields in. Blank strings count as absent.
    pub fn apply_detail(&mut self, detail: OrderDetail) {
        self.appeal_handle = non_blank(detail.appeal_handle);
        self.reason = non_blank(detail.reason);
        self.items = non_blank(detail.items);
        self.image_ref = non_blank(detail.image_ref);
    }

    /// Names of the gate fields that are absent.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.appeal_handle.is_none() {
            missing.push("appeal_handle");
        }
        if self.reason.is_none() {
            missing.push("reason");
        }
        if self.items.is_none() {
            missing.push("items");
        }
        missing
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Request payload built immediately before submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppealRecord {
    pub order_id: String,
    pub appeal_handle: String,
    pub defense: String,
}

/// Pipeline stage, used to tag error records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Queue population. Failure here is fatal.
    FetchOrders,
    GetOrderDetails,
    GenerateDefense,
    SubmitAppeal,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchOrders => "fetch_orders",
            Self::GetOrderDetails => "get_order_details",
            Self::GenerateDefense => "generate_defense",
            Self::SubmitAppeal => "submit_appeal",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One non-fatal failure, isolated to one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub stage: Stage,
    pub order_id: String,
    pub message: String,
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.order_id, self.message)
    }
}

/// The failure that aborted a run before any order was processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalFailure {
    pub stage: Stage,
    pub message: String,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub date_range: DateRange,
    pub orders_seen: usize,
    pub appeals_sent: usize,
    /// Orders that failed the gate. Not errors.
    pub appeals_skipped: usize,
    pub errors: Vec<ErrorRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<FatalFailure>,
    #[serde(default)]
    pub cancelled: bool,
}

impl RunSummary {
    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }
}
