//! Bookings and their delivery tracking log.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::{MarketError, MarketResult};
use crate::locks::JobLocks;
use crate::model::account::{Actor, Role};
use crate::model::booking::{Booking, BookingResponse, BookingStatus, Review, TrackingUpdate};
use crate::model::ids::BookingId;
use crate::model::job::JobStatus;
use crate::service::jobs::cancel_locked;
use crate::service::Repos;

pub struct BookingLedger {
    repos: Repos,
    locks: Arc<JobLocks>,
}

impl BookingLedger {
    pub fn new(repos: Repos, locks: Arc<JobLocks>) -> Self {
        Self { repos, locks }
    }

    /// Record the next delivery milestone. Only the assigned provider (or an
    /// admin) moves a booking forward.
    pub async fn advance_status(
        &self,
        actor: &Actor,
        booking_id: &BookingId,
        status: BookingStatus,
        description: &str,
    ) -> MarketResult<TrackingUpdate> {
        let job_id = self.repos.booking(booking_id).await?.job_id;
        let _guard = self.locks.lock(&job_id).await;

        let mut booking = self.repos.booking(booking_id).await?;
        if booking.provider_id != actor.account_id && !actor.is_admin() {
            return Err(MarketError::Unauthorized(
                "only the assigned provider can update tracking".into(),
            ));
        }
        if booking.status.is_terminal() {
            return Err(MarketError::AlreadyTerminal {
                entity: "booking",
                id: booking.id.to_string(),
                status: booking.status.to_string(),
            });
        }

        let update = booking.advance(status, description)?;
        self.repos.bookings.update(&mut booking).await?;
        info!(booking_id = %booking.id, job_id = %booking.job_id, status = %update.status, "tracking updated");
        Ok(update)
    }

    /// Cancel a live booking together with its job.
    pub async fn cancel_booking(&self, actor: &Actor, booking_id: &BookingId) -> MarketResult<Booking> {
        let job_id = self.repos.booking(booking_id).await?.job_id;
        let _guard = self.locks.lock(&job_id).await;

        let mut booking = self.repos.booking(booking_id).await?;
        let reason = if actor.is_admin() {
            "Cancelled by an administrator."
        } else if booking.customer_id == actor.account_id {
            "Cancelled by the customer."
        } else if booking.provider_id == actor.account_id {
            "Cancelled by the provider."
        } else {
            return Err(MarketError::Unauthorized(
                "only the customer, the provider or an admin can cancel a booking".into(),
            ));
        };
        if booking.status.is_terminal() {
            return Err(MarketError::AlreadyTerminal {
                entity: "booking",
                id: booking.id.to_string(),
                status: booking.status.to_string(),
            });
        }

        let mut job = self.repos.job(&job_id).await?;
        if job.status.is_terminal() {
            booking.cancel(reason)?;
            self.repos.bookings.update(&mut booking).await?;
        } else {
            cancel_locked(&self.repos, &mut job, reason).await?;
            booking = self.repos.booking(booking_id).await?;
        }
        info!(booking_id = %booking.id, job_id = %job_id, "booking cancelled");
        Ok(booking)
    }

    pub async fn get(&self, actor: &Actor, booking_id: &BookingId) -> MarketResult<BookingResponse> {
        let booking = self.repos.booking(booking_id).await?;
        ensure_party(actor, &booking)?;
        Ok(booking.into())
    }

    /// Tracking log, oldest first.
    pub async fn tracking_history(
        &self,
        actor: &Actor,
        booking_id: &BookingId,
    ) -> MarketResult<Vec<TrackingUpdate>> {
        let booking = self.repos.booking(booking_id).await?;
        ensure_party(actor, &booking)?;
        Ok(booking.tracking().to_vec())
    }

    pub async fn review(
        &self,
        actor: &Actor,
        booking_id: &BookingId,
        stars: u8,
        comment: Option<String>,
    ) -> MarketResult<Booking> {
        if !(1..=5).contains(&stars) {
            return Err(MarketError::validation("stars", "rating must be between 1 and 5"));
        }
        let job_id = self.repos.booking(booking_id).await?.job_id;
        let _guard = self.locks.lock(&job_id).await;

        let mut booking = self.repos.booking(booking_id).await?;
        if booking.customer_id != actor.account_id {
            return Err(MarketError::Unauthorized(
                "only the customer can review a booking".into(),
            ));
        }
        let job = self.repos.job(&job_id).await?;
        if job.status != JobStatus::Completed {
            return Err(MarketError::InvalidRequest(
                "only completed jobs can be reviewed".into(),
            ));
        }
        if booking.review.is_some() {
            return Err(MarketError::AlreadyReviewed(booking.id.to_string()));
        }

        booking.review = Some(Review {
            stars,
            comment: comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            created_at: Utc::now(),
        });
        self.repos.bookings.update(&mut booking).await?;
        self.repos
            .providers
            .modify(booking.provider_id.as_str(), |profile| profile.add_rating(stars))
            .await?;

        info!(booking_id = %booking.id, provider_id = %booking.provider_id, stars, "booking reviewed");
        Ok(booking)
    }

    pub async fn bookings_for(&self, actor: &Actor) -> MarketResult<Vec<BookingResponse>> {
        let bookings = self.repos.bookings.list().await?;
        Ok(bookings
            .into_iter()
            .filter(|b| match actor.role {
                Role::Admin => true,
                Role::Provider => b.provider_id == actor.account_id,
                Role::User => b.customer_id == actor.account_id,
            })
            .map(BookingResponse::from)
            .collect())
    }
}

fn ensure_party(actor: &Actor, booking: &Booking) -> MarketResult<()> {
    if actor.is_admin()
        || booking.customer_id == actor.account_id
        || booking.provider_id == actor.account_id
    {
        Ok(())
    } else {
        Err(MarketError::Unauthorized("not a party to this booking".into()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal::Decimal;

    use super::*;
    use crate::config::Config;
    use crate::model::account::{Account, AccountStatus};
    use crate::model::ids::JobId;
    use crate::model::provider::ProviderProfile;
    use crate::model::request::{ItemSize, ItemType, ServiceRequestDraft, TimeWindow};
    use crate::service::Marketplace;
    use crate::store::{MemoryStore, Store};

    struct Fixture {
        market: Marketplace,
        customer: Actor,
        mover: Actor,
        job_id: JobId,
        booking: Booking,
    }

    async fn accepted() -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let market = Marketplace::new(store.clone(), &Config::default());
        let repos = Repos::new(store);

        let mut customer = Account::new(
            "Emily Johnson".into(),
            "emily@example.com",
            "5550001111".into(),
            "Secret1!x",
            Role::User,
        );
        repos.accounts.insert(&mut customer).await.unwrap();
        let mut mover = Account::new(
            "Swift Movers".into(),
            "swift@example.com",
            "5550002222".into(),
            "Secret1!x",
            Role::Provider,
        );
        mover.status = AccountStatus::Active;
        repos.accounts.insert(&mut mover).await.unwrap();
        repos
            .providers
            .insert(&mut ProviderProfile::new(mover.id.clone()))
            .await
            .unwrap();

        let draft = ServiceRequestDraft {
            pickup_location: Some("123 Main St".into()),
            dropoff_location: Some("456 Park Ave".into()),
            item_type: Some(ItemType::Appliances),
            item_size: Some(ItemSize::Large),
            preferred_date: NaiveDate::from_ymd_opt(2024, 7, 15),
            preferred_time: Some(TimeWindow {
                start: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
                end: None,
            }),
            estimated_value: Decimal::new(150, 0),
            ..Default::default()
        };
        let customer = customer.actor();
        let mover = mover.actor();
        let request = market.intake.submit(&customer, draft).await.unwrap();
        let job = market.jobs.create_job(&customer, &request.id).await.unwrap();
        let booking = market.jobs.accept_instant(&mover, &job.id).await.unwrap();
        Fixture {
            market,
            customer,
            mover,
            job_id: job.id,
            booking,
        }
    }

    async fn deliver(f: &Fixture) {
        for status in [
            BookingStatus::Confirmed,
            BookingStatus::PickedUp,
            BookingStatus::InTransit,
            BookingStatus::Delivered,
        ] {
            f.market
                .bookings
                .advance_status(&f.mover, &f.booking.id, status, "")
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn customers_cannot_advance_tracking() {
        let f = accepted().await;
        let err = f
            .market
            .bookings
            .advance_status(&f.customer, &f.booking.id, BookingStatus::Confirmed, "")
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn skipping_to_in_transit_fails() {
        let f = accepted().await;
        let err = f
            .market
            .bookings
            .advance_status(&f.mover, &f.booking.id, BookingStatus::InTransit, "")
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
        let history = f
            .market
            .bookings
            .tracking_history(&f.customer, &f.booking.id)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn cancelling_booking_cancels_job() {
        let f = accepted().await;
        f.market
            .bookings
            .advance_status(&f.mover, &f.booking.id, BookingStatus::Confirmed, "On our way soon")
            .await
            .unwrap();
        let cancelled = f
            .market
            .bookings
            .cancel_booking(&f.mover, &f.booking.id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.tracking().len(), 3);

        let job = f.market.jobs.get_job(&f.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);

        let view = f.market.bookings.get(&f.customer, &f.booking.id).await.unwrap();
        assert_eq!(view.progress, None);
    }

    #[tokio::test]
    async fn review_once_after_completion() {
        let f = accepted().await;
        let err = f
            .market
            .bookings
            .review(&f.customer, &f.booking.id, 5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidRequest(_)));

        deliver(&f).await;
        f.market
            .jobs
            .confirm_completion(&f.customer, &f.job_id)
            .await
            .unwrap();
        f.market
            .bookings
            .review(&f.customer, &f.booking.id, 4, Some("Careful and quick".into()))
            .await
            .unwrap();
        let err = f
            .market
            .bookings
            .review(&f.customer, &f.booking.id, 5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::AlreadyReviewed(_)));

        let profile = f.market.onboarding.profile(&f.mover.account_id).await.unwrap();
        assert_eq!(profile.review_count, 1);
        assert_eq!(profile.rating, 4.0);
        assert_eq!(profile.completed_bookings, 1);
    }

    #[tokio::test]
    async fn listings_are_scoped_to_the_parties() {
        let f = accepted().await;
        assert_eq!(f.market.bookings.bookings_for(&f.customer).await.unwrap().len(), 1);
        assert_eq!(f.market.bookings.bookings_for(&f.mover).await.unwrap().len(), 1);

        let stranger = Actor {
            account_id: "USR-99999999".into(),
            role: Role::User,
        };
        assert!(f.market.bookings.bookings_for(&stranger).await.unwrap().is_empty());
        let err = f
            .market
            .bookings
            .get(&stranger, &f.booking.id)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Unauthorized(_)));
    }
}
