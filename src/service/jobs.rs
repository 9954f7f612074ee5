//! Job lifecycle: posting, bidding, assignment, cancellation and completion.
//!
//! Every mutation of a job runs under that job's lock from [`JobLocks`] and is
//! written back with a version check, so two processes sharing a database
//! still agree on a single winner.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{MarketError, MarketResult};
use crate::locks::JobLocks;
use crate::model::account::{Actor, Role};
use crate::model::booking::{Booking, BookingStatus};
use crate::model::ids::{BidId, JobId, RequestId};
use crate::model::job::{Bid, BidOutcome, BoardQuery, Job, JobStatus, JobType};
use crate::service::Repos;
use crate::store::{Record, StoreError};

const BID_ATTEMPTS: u32 = 3;

/// A provider's bid together with how it turned out.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderBid {
    pub job_id: JobId,
    pub job_status: JobStatus,
    pub bid: Bid,
    pub outcome: BidOutcome,
}

pub struct JobEngine {
    repos: Repos,
    locks: Arc<JobLocks>,
}

impl JobEngine {
    pub fn new(repos: Repos, locks: Arc<JobLocks>) -> Self {
        Self { repos, locks }
    }

    /// Post a job for a service request. One job per request.
    pub async fn create_job(&self, actor: &Actor, request_id: &RequestId) -> MarketResult<Job> {
        let mut request = self.repos.request(request_id).await?;
        if request.owner != actor.account_id && !actor.is_admin() {
            return Err(MarketError::Unauthorized(
                "only the requesting customer can post this job".into(),
            ));
        }
        request.ensure_postable()?;

        let customer = self.repos.account(&request.owner).await?;
        let mut job = Job::from_request(&request, &customer.name);

        // Claim the request first; only the claimant goes on to store a job.
        request.job_id = Some(job.id.clone());
        match self.repos.requests.update(&mut request).await {
            Ok(()) => {}
            Err(StoreError::Conflict { .. }) => {
                self.repos.request(request_id).await?.ensure_postable()?;
                return Err(MarketError::ConcurrentModification {
                    entity: "service_request".into(),
                    id: request_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.repos.jobs.insert(&mut job).await {
            error!(request_id = %request.id, error = %e, "failed to store job, releasing request");
            request.job_id = None;
            if let Err(release) = self.repos.requests.update(&mut request).await {
                error!(request_id = %request.id, error = %release, "failed to release request");
            }
            return Err(e.into());
        }
        if request.job_id.as_ref() != Some(&job.id) {
            request.job_id = Some(job.id.clone());
            self.repos.requests.update(&mut request).await?;
        }

        info!(job_id = %job.id, job_type = ?job.job_type, customer_id = %job.customer_id, "job posted");
        Ok(job)
    }

    pub async fn submit_bid(
        &self,
        actor: &Actor,
        job_id: &JobId,
        amount: Decimal,
        estimated_completion: DateTime<Utc>,
        message: Option<String>,
    ) -> MarketResult<Bid> {
        let provider = self.repos.active_provider(actor).await?;
        if amount <= Decimal::ZERO {
            return Err(MarketError::validation("amount", "bid amount must be positive"));
        }
        let provider_name = match self.repos.providers.get(provider.id.as_str()).await? {
            Some(profile) => profile
                .display_name()
                .map(str::to_string)
                .unwrap_or_else(|| provider.name.clone()),
            None => provider.name.clone(),
        };
        let message = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());

        let _guard = self.locks.lock(job_id).await;
        let mut attempt = 1;
        loop {
            let mut job = self.repos.job(job_id).await?;
            let biddable = job.job_type == JobType::Auction
                && matches!(job.status, JobStatus::Open | JobStatus::Bidding);
            if !biddable {
                return Err(MarketError::JobNotBiddable {
                    job_id: job.id.to_string(),
                });
            }
            if job.has_bid_from(&provider.id) {
                return Err(MarketError::DuplicateBid {
                    job_id: job.id.to_string(),
                    provider_id: provider.id.to_string(),
                });
            }

            let mut bid_id = BidId::generate();
            while job.bid(&bid_id).is_some() {
                bid_id = BidId::generate();
            }
            let bid = Bid {
                id: bid_id,
                provider_id: provider.id.clone(),
                provider_name: provider_name.clone(),
                amount,
                estimated_completion,
                message: message.clone(),
                created_at: Utc::now(),
            };
            job.bids.push(bid.clone());
            if job.status == JobStatus::Open {
                job.transition(JobStatus::Bidding)?;
            }

            match self.repos.jobs.update(&mut job).await {
                Ok(()) => {
                    info!(job_id = %job.id, bid_id = %bid.id, provider_id = %provider.id, %amount, "bid placed");
                    return Ok(bid);
                }
                Err(StoreError::Conflict { .. }) if attempt < BID_ATTEMPTS => {
                    warn!(job_id = %job_id, attempt, "job changed while placing bid, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// The customer picks a bid. Creates the booking at the bid price.
    pub async fn select_bid(
        &self,
        actor: &Actor,
        job_id: &JobId,
        bid_id: &BidId,
    ) -> MarketResult<Booking> {
        let _guard = self.locks.lock(job_id).await;
        let mut job = self.repos.job(job_id).await?;
        if job.customer_id != actor.account_id && !actor.is_admin() {
            return Err(MarketError::Unauthorized(
                "only the job's customer can select a bid".into(),
            ));
        }
        if matches!(
            job.status,
            JobStatus::Assigned | JobStatus::Completed | JobStatus::Cancelled
        ) {
            return Err(MarketError::AlreadyTerminal {
                entity: "job",
                id: job.id.to_string(),
                status: job.status.to_string(),
            });
        }
        if job.job_type != JobType::Auction {
            return Err(MarketError::JobNotInSelectableState {
                job_id: job.id.to_string(),
            });
        }
        let bid = job.bid(bid_id).cloned().ok_or_else(|| MarketError::BidNotFound {
            job_id: job.id.to_string(),
            bid_id: bid_id.to_string(),
        })?;

        let mut booking = Booking::new(
            job.id.clone(),
            job.customer_id.clone(),
            bid.provider_id.clone(),
            bid.amount,
            Some(bid.estimated_completion),
        );
        let before = job.clone();
        job.transition(JobStatus::Assigned)?;
        job.selected_bid = Some(bid.id.clone());
        job.assigned_provider = Some(bid.provider_id.clone());
        job.booking_id = Some(booking.id.clone());

        self.repos.jobs.update(&mut job).await?;
        self.store_booking(&mut job, before, &mut booking).await?;

        info!(job_id = %job.id, bid_id = %bid.id, booking_id = %booking.id, price = %booking.price, "bid selected");
        Ok(booking)
    }

    pub async fn accept_instant(&self, actor: &Actor, job_id: &JobId) -> MarketResult<Booking> {
        self.accept_direct(actor, job_id, JobType::Instant).await
    }

    /// Apply to a multi-stop journey. Same race rules as instant jobs.
    pub async fn accept_journey(&self, actor: &Actor, job_id: &JobId) -> MarketResult<Booking> {
        self.accept_direct(actor, job_id, JobType::Journey).await
    }

    /// Accept whichever kind of direct job `job_id` is.
    pub async fn accept(&self, actor: &Actor, job_id: &JobId) -> MarketResult<Booking> {
        let job = self.repos.job(job_id).await?;
        match job.job_type {
            JobType::Journey => self.accept_journey(actor, job_id).await,
            _ => self.accept_instant(actor, job_id).await,
        }
    }

    async fn accept_direct(
        &self,
        actor: &Actor,
        job_id: &JobId,
        job_type: JobType,
    ) -> MarketResult<Booking> {
        let provider = self.repos.active_provider(actor).await?;

        let _guard = self.locks.lock(job_id).await;
        let mut job = self.repos.job(job_id).await?;
        if job.job_type != job_type {
            return Err(MarketError::JobNotInSelectableState {
                job_id: job.id.to_string(),
            });
        }
        match job.status {
            JobStatus::Open => {}
            JobStatus::Cancelled => job.ensure_not_terminal()?,
            _ => {
                return Err(MarketError::JobAlreadyAssigned {
                    job_id: job.id.to_string(),
                })
            }
        }

        let mut booking = Booking::new(
            job.id.clone(),
            job.customer_id.clone(),
            provider.id.clone(),
            job.estimated_value,
            None,
        );
        let before = job.clone();
        job.transition(JobStatus::Assigned)?;
        job.assigned_provider = Some(provider.id.clone());
        job.booking_id = Some(booking.id.clone());

        match self.repos.jobs.update(&mut job).await {
            Ok(()) => {}
            Err(StoreError::Conflict { .. }) => {
                warn!(job_id = %job_id, provider_id = %provider.id, "lost accept race");
                return Err(MarketError::JobAlreadyAssigned {
                    job_id: job_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }
        self.store_booking(&mut job, before, &mut booking).await?;

        info!(job_id = %job.id, provider_id = %provider.id, booking_id = %booking.id, ?job_type, "job accepted");
        Ok(booking)
    }

    /// Store the booking for a job that was just saved as assigned. When the
    /// booking cannot be stored the job is written back as it was.
    async fn store_booking(&self, job: &mut Job, before: Job, booking: &mut Booking) -> MarketResult<()> {
        if let Err(e) = self.repos.bookings.insert(booking).await {
            error!(job_id = %job.id, error = %e, "failed to store booking, reverting assignment");
            let mut restored = before;
            restored.set_version(job.version());
            if let Err(revert) = self.repos.jobs.update(&mut restored).await {
                error!(job_id = %job.id, error = %revert, "failed to revert assignment");
            }
            return Err(e.into());
        }
        // The booking id may have been redrawn on insert.
        if job.booking_id.as_ref() != Some(&booking.id) {
            job.booking_id = Some(booking.id.clone());
            self.repos.jobs.update(job).await?;
        }
        Ok(())
    }

    /// Cancel a job. The customer withdraws, the assigned provider backs out,
    /// or an admin intervenes.
    pub async fn cancel_job(&self, actor: &Actor, job_id: &JobId) -> MarketResult<Job> {
        let _guard = self.locks.lock(job_id).await;
        let mut job = self.repos.job(job_id).await?;
        let is_provider = job.assigned_provider.as_ref() == Some(&actor.account_id);
        let reason = if actor.is_admin() {
            "Cancelled by an administrator."
        } else if job.customer_id == actor.account_id {
            "Cancelled by the customer."
        } else if is_provider {
            "Cancelled by the provider."
        } else {
            return Err(MarketError::Unauthorized(
                "only the customer, the assigned provider or an admin can cancel".into(),
            ));
        };

        // Once delivered, only the customer's confirmation or an admin can
        // close the job.
        if !actor.is_admin() && job.status == JobStatus::Assigned {
            if let Some(booking_id) = &job.booking_id {
                let booking = self.repos.booking(booking_id).await?;
                if booking.status == BookingStatus::Delivered {
                    return Err(MarketError::job_transition(job.status, JobStatus::Cancelled));
                }
            }
        }

        cancel_locked(&self.repos, &mut job, reason).await?;
        Ok(job)
    }

    /// The customer confirms a delivered move.
    pub async fn confirm_completion(&self, actor: &Actor, job_id: &JobId) -> MarketResult<Job> {
        let _guard = self.locks.lock(job_id).await;
        let mut job = self.repos.job(job_id).await?;
        if job.customer_id != actor.account_id {
            return Err(MarketError::Unauthorized(
                "only the job's customer can confirm completion".into(),
            ));
        }
        job.ensure_not_terminal()?;
        if job.status != JobStatus::Assigned {
            return Err(MarketError::job_transition(job.status, JobStatus::Completed));
        }
        let booking_id = job
            .booking_id
            .clone()
            .ok_or_else(|| MarketError::job_transition(job.status, JobStatus::Completed))?;
        let booking = self.repos.booking(&booking_id).await?;
        if booking.status != BookingStatus::Delivered {
            return Err(MarketError::job_transition(job.status, JobStatus::Completed));
        }

        job.transition(JobStatus::Completed)?;
        self.repos.jobs.update(&mut job).await?;

        self.repos
            .providers
            .modify(booking.provider_id.as_str(), |profile| {
                profile.completed_bookings += 1
            })
            .await?;

        info!(job_id = %job.id, booking_id = %booking.id, "job completed");
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &JobId) -> MarketResult<Job> {
        self.repos.job(job_id).await
    }

    pub async fn list_board(&self, query: &BoardQuery) -> MarketResult<Vec<Job>> {
        Ok(query.apply(self.repos.jobs.list().await?))
    }

    pub async fn jobs_for_customer(&self, actor: &Actor) -> MarketResult<Vec<Job>> {
        let jobs = self.repos.jobs.list().await?;
        Ok(jobs
            .into_iter()
            .filter(|job| actor.is_admin() || job.customer_id == actor.account_id)
            .collect())
    }

    /// Bids the acting provider has placed, newest first.
    pub async fn bids_by_provider(&self, actor: &Actor) -> MarketResult<Vec<ProviderBid>> {
        if actor.role != Role::Provider {
            return Err(MarketError::Unauthorized("provider role required".into()));
        }
        let mut bids: Vec<ProviderBid> = self
            .repos
            .jobs
            .list()
            .await?
            .into_iter()
            .flat_map(|job| {
                job.bids
                    .iter()
                    .filter(|bid| bid.provider_id == actor.account_id)
                    .filter_map(|bid| {
                        Some(ProviderBid {
                            job_id: job.id.clone(),
                            job_status: job.status,
                            bid: bid.clone(),
                            outcome: job.bid_outcome(&bid.id)?,
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        bids.sort_by(|a, b| b.bid.created_at.cmp(&a.bid.created_at));
        Ok(bids)
    }
}

/// Cancel `job` and any live booking it has. The caller holds the job lock.
pub(crate) async fn cancel_locked(repos: &Repos, job: &mut Job, reason: &str) -> MarketResult<()> {
    job.ensure_not_terminal()?;
    job.transition(JobStatus::Cancelled)?;
    repos.jobs.update(job).await?;

    if let Some(booking_id) = &job.booking_id {
        let mut booking = repos.booking(booking_id).await?;
        if !booking.status.is_terminal() {
            booking.cancel(reason)?;
            repos.bookings.update(&mut booking).await?;
        }
    }

    info!(job_id = %job.id, reason, "job cancelled");
    Ok(())
}
