use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, MarketResult};
use crate::model::ids::{AccountId, BidId, BookingId, JobId, RequestId};
use crate::model::request::{
    ItemSize, ItemType, RequestType, Route, ServiceRequest, TimeWindow,
};
use crate::store::Record;

/// How a job gets a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Fixed price, first provider to accept wins.
    Instant,
    /// Providers bid, the customer picks one.
    Auction,
    /// Multi-stop route, accepted directly.
    Journey,
}

impl JobType {
    pub fn for_request(request: &ServiceRequest) -> Self {
        if request.route.is_multi_stop() {
            return JobType::Journey;
        }
        match request.request_type {
            RequestType::Fixed => JobType::Instant,
            RequestType::Bidding => JobType::Auction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Bidding,
    Assigned,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Open, Bidding | Assigned | Cancelled)
                | (Bidding, Assigned | Cancelled)
                | (Assigned, Completed | Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Open => "open",
            JobStatus::Bidding => "bidding",
            JobStatus::Assigned => "assigned",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider's offer on an auction job. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub provider_id: AccountId,
    pub provider_name: String,
    pub amount: Decimal,
    pub estimated_completion: DateTime<Utc>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BidOutcome {
    Active,
    Selected,
    NotSelected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub request_id: RequestId,
    pub customer_id: AccountId,
    pub customer_name: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub route: Route,
    pub item_type: ItemType,
    pub item_size: ItemSize,
    pub preferred_date: NaiveDate,
    pub preferred_time: TimeWindow,
    pub description: String,
    pub estimated_value: Decimal,
    pub distance_km: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub bids: Vec<Bid>,
    pub selected_bid: Option<BidId>,
    pub assigned_provider: Option<AccountId>,
    pub booking_id: Option<BookingId>,
    #[serde(default)]
    pub version: i64,
}

impl Job {
    pub fn from_request(request: &ServiceRequest, customer_name: &str) -> Self {
        Self {
            id: JobId::generate(),
            request_id: request.id.clone(),
            customer_id: request.owner.clone(),
            customer_name: customer_name.to_string(),
            job_type: JobType::for_request(request),
            status: JobStatus::Open,
            route: request.route.clone(),
            item_type: request.item_type,
            item_size: request.item_size,
            preferred_date: request.preferred_date,
            preferred_time: request.preferred_time,
            description: request.description.clone(),
            estimated_value: request.estimated_value,
            distance_km: request.distance_km,
            created_at: Utc::now(),
            bids: Vec::new(),
            selected_bid: None,
            assigned_provider: None,
            booking_id: None,
            version: 0,
        }
    }

    /// Move to `next`, enforcing the job transition table.
    pub fn transition(&mut self, next: JobStatus) -> MarketResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(MarketError::job_transition(self.status, next));
        }
        self.status = next;
        Ok(())
    }

    pub fn ensure_not_terminal(&self) -> MarketResult<()> {
        if self.status.is_terminal() {
            return Err(MarketError::AlreadyTerminal {
                entity: "job",
                id: self.id.to_string(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    pub fn bid(&self, bid_id: &BidId) -> Option<&Bid> {
        self.bids.iter().find(|b| &b.id == bid_id)
    }

    pub fn has_bid_from(&self, provider_id: &AccountId) -> bool {
        self.bids.iter().any(|b| &b.provider_id == provider_id)
    }

    pub fn bid_outcome(&self, bid_id: &BidId) -> Option<BidOutcome> {
        self.bid(bid_id)?;
        Some(match &self.selected_bid {
            Some(selected) if selected == bid_id => BidOutcome::Selected,
            Some(_) => BidOutcome::NotSelected,
            None if self.status == JobStatus::Cancelled => BidOutcome::NotSelected,
            None => BidOutcome::Active,
        })
    }

    fn matches_search(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        let hit = |s: &str| s.to_lowercase().contains(needle);
        hit(self.id.as_str())
            || self.route.addresses().into_iter().any(hit)
            || hit(self.item_type.as_str())
            || hit(&self.customer_name)
    }
}

impl Record for Job {
    const KIND: &'static str = "job";

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
        self.id = JobId::generate();
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardSort {
    #[default]
    Newest,
    ValueHigh,
    ValueLow,
    Closest,
}

/// Job board filter. Only jobs still looking for a provider are listed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardQuery {
    #[serde(rename = "type")]
    pub job_type: Option<JobType>,
    pub search: Option<String>,
    #[serde(default)]
    pub sort: BoardSort,
}

impl BoardQuery {
    pub fn apply(&self, jobs: Vec<Job>) -> Vec<Job> {
        let needle = self
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default();

        let mut listed: Vec<Job> = jobs
            .into_iter()
            .filter(|job| matches!(job.status, JobStatus::Open | JobStatus::Bidding))
            .filter(|job| self.job_type.map_or(true, |t| job.job_type == t))
            .filter(|job| job.matches_search(&needle))
            .collect();

        match self.sort {
            BoardSort::Newest => listed.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            BoardSort::ValueHigh => listed.sort_by(|a, b| b.estimated_value.cmp(&a.estimated_value)),
            BoardSort::ValueLow => listed.sort_by(|a, b| a.estimated_value.cmp(&b.estimated_value)),
            BoardSort::Closest => listed.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km)),
        }
        listed
    }
}
