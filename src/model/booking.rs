use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, MarketResult};
use crate::model::ids::{AccountId, BookingId, JobId};
use crate::store::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

/// Delivery milestones in the only order they may be reached.
pub const MILESTONES: [BookingStatus; 5] = [
    BookingStatus::Pending,
    BookingStatus::Confirmed,
    BookingStatus::PickedUp,
    BookingStatus::InTransit,
    BookingStatus::Delivered,
];

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Delivered | BookingStatus::Cancelled)
    }

    fn milestone_index(self) -> Option<usize> {
        MILESTONES.iter().position(|s| *s == self)
    }

    /// The milestone that immediately follows this one.
    pub fn next(self) -> Option<BookingStatus> {
        let index = self.milestone_index()?;
        MILESTONES.get(index + 1).copied()
    }

    /// Completion fraction for progress displays, `None` once cancelled.
    pub fn progress(self) -> Option<f64> {
        let index = self.milestone_index()?;
        Some(index as f64 / (MILESTONES.len() - 1) as f64)
    }

    pub fn default_description(self) -> &'static str {
        match self {
            BookingStatus::Pending => "Your booking has been created.",
            BookingStatus::Confirmed => "Your booking has been confirmed.",
            BookingStatus::PickedUp => "Your items have been picked up from the origin location.",
            BookingStatus::InTransit => "Your items are in transit to the destination.",
            BookingStatus::Delivered => "Your items have been delivered.",
            BookingStatus::Cancelled => "Your booking has been cancelled.",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::PickedUp => "picked_up",
            BookingStatus::InTransit => "in_transit",
            BookingStatus::Delivered => "delivered",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingUpdate {
    pub status: BookingStatus,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub stars: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub job_id: JobId,
    pub customer_id: AccountId,
    pub provider_id: AccountId,
    pub price: Decimal,
    pub status: BookingStatus,
    pub estimated_delivery: Option<DateTime<Utc>>,
    tracking: Vec<TrackingUpdate>,
    pub review: Option<Review>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
}

impl Booking {
    pub fn new(
        job_id: JobId,
        customer_id: AccountId,
        provider_id: AccountId,
        price: Decimal,
        estimated_delivery: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: BookingId::generate(),
            job_id,
            customer_id,
            provider_id,
            price,
            status: BookingStatus::Pending,
            estimated_delivery,
            tracking: vec![TrackingUpdate {
                status: BookingStatus::Pending,
                timestamp: now,
                description: BookingStatus::Pending.default_description().to_string(),
            }],
            review: None,
            created_at: now,
            version: 0,
        }
    }

    /// Append-only history, oldest first.
    pub fn tracking(&self) -> &[TrackingUpdate] {
        &self.tracking
    }

    fn record(&mut self, status: BookingStatus, description: &str) -> TrackingUpdate {
        let description = match description.trim() {
            "" => status.default_description().to_string(),
            text => text.to_string(),
        };
        let update = TrackingUpdate {
            status,
            timestamp: Utc::now(),
            description,
        };
        self.status = status;
        self.tracking.push(update.clone());
        update
    }

    /// Step forward exactly one milestone.
    pub fn advance(&mut self, next: BookingStatus, description: &str) -> MarketResult<TrackingUpdate> {
        if self.status.next() != Some(next) {
            return Err(MarketError::booking_transition(self.status, next));
        }
        Ok(self.record(next, description))
    }

    pub fn cancel(&mut self, description: &str) -> MarketResult<TrackingUpdate> {
        if self.status.is_terminal() {
            return Err(MarketError::AlreadyTerminal {
                entity: "booking",
                id: self.id.to_string(),
                status: self.status.to_string(),
            });
        }
        Ok(self.record(BookingStatus::Cancelled, description))
    }

    pub fn progress(&self) -> Option<f64> {
        self.status.progress()
    }
}

impl Record for Booking {
    const KIND: &'static str = "booking";

    fn record_id(&self) -> String {
        self.id.to_string()
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn regenerate_id(&mut self) -> bool {
        self.id = BookingId::generate();
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingResponse {
    #[serde(flatten)]
    pub booking: Booking,
    pub progress: Option<f64>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        let progress = booking.progress();
        Self { booking, progress }
    }
}
