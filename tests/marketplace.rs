mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::Barrier;

use movers::error::MarketError;
use movers::model::account::{AccountStatus, AccountType, Role};
use movers::model::booking::BookingStatus;
use movers::model::job::{JobStatus, JobType};
use movers::model::provider::{
    BusinessInfo, BusinessType, DocumentKind, OnboardingState, ServiceDetails, VehicleType,
};
use movers::model::request::{ItemType, RequestType, Stop};

use common::{active_provider, draft, market, sign_up, submitted_provider};

#[tokio::test]
async fn fixed_request_is_accepted_at_estimated_value() {
    let market = market();
    let (customer, _) = sign_up(&market, "emily@example.com", AccountType::User).await;
    let (mover, _) = active_provider(&market, "swift@example.com").await;
    assert_eq!(mover.role, Role::Provider);

    let request = market
        .intake
        .submit(&customer, draft(RequestType::Fixed, 120))
        .await
        .unwrap();
    let job = market.jobs.create_job(&customer, &request.id).await.unwrap();
    assert_eq!(job.job_type, JobType::Instant);
    assert_eq!(job.status, JobStatus::Open);

    let booking = market.jobs.accept_instant(&mover, &job.id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.price, Decimal::new(120, 0));
    assert_eq!(booking.provider_id, mover.account_id);

    let job = market.jobs.get_job(&job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Assigned);
    assert_eq!(job.booking_id.as_ref(), Some(&booking.id));
    assert!(job.bids.is_empty());

    let err = market.jobs.accept_instant(&mover, &job.id).await.unwrap_err();
    assert!(matches!(err, MarketError::JobAlreadyAssigned { .. }));
}

#[tokio::test]
async fn auction_books_the_selected_bid() {
    let market = market();
    let (customer, _) = sign_up(&market, "emily@example.com", AccountType::User).await;
    let (first, _) = active_provider(&market, "first@example.com").await;
    let (second, _) = active_provider(&market, "second@example.com").await;

    let request = market
        .intake
        .submit(&customer, draft(RequestType::Bidding, 180))
        .await
        .unwrap();
    let job = market.jobs.create_job(&customer, &request.id).await.unwrap();
    assert_eq!(job.job_type, JobType::Auction);

    let eta = Utc::now() + Duration::days(3);
    market
        .jobs
        .submit_bid(&first, &job.id, Decimal::new(200, 0), eta, None)
        .await
        .unwrap();
    assert_eq!(
        market.jobs.get_job(&job.id).await.unwrap().status,
        JobStatus::Bidding
    );
    let chosen = market
        .jobs
        .submit_bid(&second, &job.id, Decimal::new(205, 0), eta, Some("Two movers".into()))
        .await
        .unwrap();

    let booking = market
        .jobs
        .select_bid(&customer, &job.id, &chosen.id)
        .await
        .unwrap();
    assert_eq!(booking.price, Decimal::new(205, 0));
    assert_eq!(booking.provider_id, second.account_id);
    assert_eq!(booking.estimated_delivery, Some(eta));

    let job = market.jobs.get_job(&job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Assigned);
    assert_eq!(job.selected_bid.as_ref(), Some(&chosen.id));
    let amounts: Vec<Decimal> = job.bids.iter().map(|bid| bid.amount).collect();
    assert_eq!(amounts, [Decimal::new(200, 0), Decimal::new(205, 0)]);

    // A second selection is refused and books nothing.
    let err = market
        .jobs
        .select_bid(&customer, &job.id, &chosen.id)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::AlreadyTerminal { .. }));
    assert_eq!(market.bookings.bookings_for(&customer).await.unwrap().len(), 1);

    // Late bids bounce off an assigned job.
    let (late, _) = active_provider(&market, "late@example.com").await;
    let err = market
        .jobs
        .submit_bid(&late, &job.id, Decimal::new(150, 0), eta, None)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::JobNotBiddable { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_instant_accepts_have_one_winner() {
    let market = market();
    let (customer, _) = sign_up(&market, "emily@example.com", AccountType::User).await;
    let request = market
        .intake
        .submit(&customer, draft(RequestType::Fixed, 95))
        .await
        .unwrap();
    let job = market.jobs.create_job(&customer, &request.id).await.unwrap();

    let mut providers = Vec::new();
    for i in 0..6 {
        let (mover, _) = active_provider(&market, &format!("mover{}@example.com", i)).await;
        providers.push(mover);
    }

    let handles: Vec<_> = providers
        .into_iter()
        .map(|mover| {
            let market = market.clone();
            let job_id = job.id.clone();
            tokio::spawn(async move { market.jobs.accept_instant(&mover, &job_id).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(MarketError::JobAlreadyAssigned { .. }) => {}
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(winners, 1);

    let (admin, _) = common::admin(&market).await;
    assert_eq!(market.bookings.bookings_for(&admin).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_posts_of_one_request_store_one_job() {
    let market = market();
    let (customer, _) = sign_up(&market, "emily@example.com", AccountType::User).await;

    for _ in 0..25 {
        let request = market
            .intake
            .submit(&customer, draft(RequestType::Fixed, 60))
            .await
            .unwrap();
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let market = market.clone();
                let customer = customer.clone();
                let request_id = request.id.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    market.jobs.create_job(&customer, &request_id).await
                })
            })
            .collect();

        let mut posted = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(job) => posted.push(job.id),
                Err(MarketError::InvalidRequest(_))
                | Err(MarketError::ConcurrentModification { .. }) => {}
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        assert_eq!(posted.len(), 1);

        let stored: Vec<_> = market
            .jobs
            .jobs_for_customer(&customer)
            .await
            .unwrap()
            .into_iter()
            .filter(|job| job.request_id == request.id)
            .map(|job| job.id)
            .collect();
        assert_eq!(stored, posted);
        let request = market.intake.get(&customer, &request.id).await.unwrap();
        assert_eq!(request.job_id.as_ref(), Some(&posted[0]));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bids_are_all_kept() {
    let market = market();
    let (customer, _) = sign_up(&market, "emily@example.com", AccountType::User).await;
    let request = market
        .intake
        .submit(&customer, draft(RequestType::Bidding, 300))
        .await
        .unwrap();
    let job = market.jobs.create_job(&customer, &request.id).await.unwrap();

    let mut providers = Vec::new();
    for i in 0..5 {
        let (mover, _) = active_provider(&market, &format!("bidder{}@example.com", i)).await;
        providers.push(mover);
    }
    let handles: Vec<_> = providers
        .into_iter()
        .enumerate()
        .map(|(i, mover)| {
            let market = market.clone();
            let job_id = job.id.clone();
            tokio::spawn(async move {
                market
                    .jobs
                    .submit_bid(
                        &mover,
                        &job_id,
                        Decimal::new(250 + i as i64, 0),
                        Utc::now() + Duration::days(1),
                        None,
                    )
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let job = market.jobs.get_job(&job.id).await.unwrap();
    assert_eq!(job.bids.len(), 5);
    assert_eq!(job.status, JobStatus::Bidding);
}

#[tokio::test]
async fn providers_must_be_verified_before_working() {
    let market = market();
    let (customer, _) = sign_up(&market, "emily@example.com", AccountType::User).await;
    let (applicant, _) = sign_up(&market, "new@example.com", AccountType::Provider).await;
    let request = market
        .intake
        .submit(&customer, draft(RequestType::Fixed, 80))
        .await
        .unwrap();
    let job = market.jobs.create_job(&customer, &request.id).await.unwrap();

    let err = market.jobs.accept_instant(&applicant, &job.id).await.unwrap_err();
    assert!(matches!(err, MarketError::Unauthorized(_)));
}

#[tokio::test]
async fn admins_cannot_activate_unverified_providers() {
    let market = market();
    let (customer, _) = sign_up(&market, "emily@example.com", AccountType::User).await;
    let applicant = submitted_provider(&market, "new@example.com").await;
    let (admin, _) = common::admin(&market).await;

    let err = market
        .accounts
        .set_status(&admin, &applicant.account_id, AccountStatus::Active)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidOnboardingStep { .. }));

    let request = market
        .intake
        .submit(&customer, draft(RequestType::Bidding, 150))
        .await
        .unwrap();
    let job = market.jobs.create_job(&customer, &request.id).await.unwrap();
    let (applicant, _) = common::login(&market, "new@example.com").await;
    assert_eq!(applicant.role, Role::Provider);
    let err = market
        .jobs
        .submit_bid(&applicant, &job.id, Decimal::new(140, 0), Utc::now() + Duration::days(1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::Unauthorized(_)));

    // A verified provider can be suspended and brought back.
    let (mover, _) = active_provider(&market, "swift@example.com").await;
    market
        .accounts
        .set_status(&admin, &mover.account_id, AccountStatus::Inactive)
        .await
        .unwrap();
    let account = market
        .accounts
        .set_status(&admin, &mover.account_id, AccountStatus::Active)
        .await
        .unwrap();
    assert_eq!(account.status, AccountStatus::Active);
}

#[tokio::test]
async fn amended_requests_are_retired() {
    let market = market();
    let (customer, _) = sign_up(&market, "emily@example.com", AccountType::User).await;
    let first = market
        .intake
        .submit(&customer, draft(RequestType::Fixed, 100))
        .await
        .unwrap();
    let second = market
        .intake
        .amend(&customer, &first.id, draft(RequestType::Fixed, 110))
        .await
        .unwrap();

    let err = market.jobs.create_job(&customer, &first.id).await.unwrap_err();
    assert!(matches!(err, MarketError::InvalidRequest(_)));
    let job = market.jobs.create_job(&customer, &second.id).await.unwrap();

    // A posted request is frozen until its job is cancelled.
    let err = market
        .intake
        .amend(&customer, &second.id, draft(RequestType::Fixed, 120))
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidRequest(_)));

    market.jobs.cancel_job(&customer, &job.id).await.unwrap();
    let third = market
        .intake
        .amend(&customer, &second.id, draft(RequestType::Fixed, 120))
        .await
        .unwrap();
    let reposted = market.jobs.create_job(&customer, &third.id).await.unwrap();
    assert_eq!(reposted.estimated_value, Decimal::new(120, 0));

    let live: Vec<_> = market
        .jobs
        .jobs_for_customer(&customer)
        .await
        .unwrap()
        .into_iter()
        .filter(|job| !job.status.is_terminal())
        .collect();
    assert_eq!(live.len(), 1);
}

#[tokio::test]
async fn incomplete_onboarding_keeps_user_role() {
    let market = market();
    let (applicant, token) = sign_up(&market, "new@example.com", AccountType::Provider).await;
    market
        .onboarding
        .save_business_info(
            &applicant,
            BusinessInfo {
                business_name: "Half Done Moves".into(),
                business_type: BusinessType::Individual,
                bio: "Almost there.".into(),
            },
        )
        .await
        .unwrap();

    // Submitting from the wrong step is a step error, not a partial save.
    let err = market.onboarding.submit(&applicant, true).await.unwrap_err();
    assert!(matches!(err, MarketError::InvalidOnboardingStep { .. }));

    market
        .onboarding
        .save_service_details(
            &applicant,
            ServiceDetails {
                vehicle_type: VehicleType::Car,
                vehicle_plate: "HALF 1".into(),
                service_area: "Queens".into(),
                service_types: BTreeSet::from([ItemType::Boxes]),
            },
        )
        .await
        .unwrap();
    market
        .onboarding
        .attach_document(
            &applicant,
            DocumentKind::IdVerification,
            &common::document(DocumentKind::IdVerification),
        )
        .await
        .unwrap();

    let err = market.onboarding.submit(&applicant, true).await.unwrap_err();
    match err {
        MarketError::IncompleteSubmission { missing } => {
            assert_eq!(missing, ["vehicle_registration", "insurance"]);
        }
        other => panic!("unexpected error {other:?}"),
    }

    let actor = market.accounts.authenticate(&token).await.unwrap();
    assert_eq!(actor.role, Role::User);
    let profile = market.onboarding.profile(&applicant.account_id).await.unwrap();
    assert_eq!(profile.state, OnboardingState::Step3VerificationDocs);
}

#[tokio::test]
async fn booking_moves_forward_one_milestone_at_a_time() {
    let market = market();
    let (customer, _) = sign_up(&market, "emily@example.com", AccountType::User).await;
    let (mover, _) = active_provider(&market, "swift@example.com").await;
    let request = market
        .intake
        .submit(&customer, draft(RequestType::Fixed, 120))
        .await
        .unwrap();
    let job = market.jobs.create_job(&customer, &request.id).await.unwrap();
    let booking = market.jobs.accept_instant(&mover, &job.id).await.unwrap();

    let err = market
        .bookings
        .advance_status(&mover, &booking.id, BookingStatus::InTransit, "")
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidTransition { .. }));

    let update = market
        .bookings
        .advance_status(&mover, &booking.id, BookingStatus::Confirmed, "")
        .await
        .unwrap();
    assert_eq!(update.description, "Your booking has been confirmed.");

    let view = market.bookings.get(&customer, &booking.id).await.unwrap();
    assert_eq!(view.progress, Some(0.25));

    let history = market
        .bookings
        .tracking_history(&customer, &booking.id)
        .await
        .unwrap();
    let statuses: Vec<_> = history.iter().map(|u| u.status).collect();
    assert_eq!(statuses, [BookingStatus::Pending, BookingStatus::Confirmed]);
}

#[tokio::test]
async fn provider_cancellation_cascades_to_booking() {
    let market = market();
    let (customer, _) = sign_up(&market, "emily@example.com", AccountType::User).await;
    let (mover, _) = active_provider(&market, "swift@example.com").await;
    let request = market
        .intake
        .submit(&customer, draft(RequestType::Fixed, 120))
        .await
        .unwrap();
    let job = market.jobs.create_job(&customer, &request.id).await.unwrap();
    let booking = market.jobs.accept_instant(&mover, &job.id).await.unwrap();

    let job = market.jobs.cancel_job(&mover, &job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);

    let booking = market.bookings.get(&customer, &booking.id).await.unwrap();
    assert_eq!(booking.booking.status, BookingStatus::Cancelled);
    assert_eq!(booking.progress, None);

    let err = market
        .bookings
        .advance_status(&mover, &booking.booking.id, BookingStatus::Confirmed, "")
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::AlreadyTerminal { .. }));
}

#[tokio::test]
async fn delivered_jobs_wait_for_confirmation() {
    let market = market();
    let (customer, _) = sign_up(&market, "emily@example.com", AccountType::User).await;
    let (mover, _) = active_provider(&market, "swift@example.com").await;
    let request = market
        .intake
        .submit(&customer, draft(RequestType::Fixed, 120))
        .await
        .unwrap();
    let job = market.jobs.create_job(&customer, &request.id).await.unwrap();
    let booking = market.jobs.accept_instant(&mover, &job.id).await.unwrap();
    for status in [
        BookingStatus::Confirmed,
        BookingStatus::PickedUp,
        BookingStatus::InTransit,
        BookingStatus::Delivered,
    ] {
        market
            .bookings
            .advance_status(&mover, &booking.id, status, "")
            .await
            .unwrap();
    }

    for actor in [&mover, &customer] {
        let err = market.jobs.cancel_job(actor, &job.id).await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
    }

    let job = market.jobs.confirm_completion(&customer, &job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn multi_stop_requests_become_journeys() {
    let market = market();
    let (customer, _) = sign_up(&market, "emily@example.com", AccountType::User).await;
    let (mover, _) = active_provider(&market, "swift@example.com").await;

    let mut journey = draft(RequestType::Bidding, 150);
    journey.pickup_location = None;
    journey.dropoff_location = None;
    journey.stops = vec![
        Stop {
            pickup: "111 1st Ave".into(),
            dropoff: "222 2nd Ave".into(),
        },
        Stop {
            pickup: "222 2nd Ave".into(),
            dropoff: "333 3rd Ave".into(),
        },
    ];
    let request = market.intake.submit(&customer, journey).await.unwrap();
    let job = market.jobs.create_job(&customer, &request.id).await.unwrap();
    assert_eq!(job.job_type, JobType::Journey);

    let err = market
        .jobs
        .submit_bid(&mover, &job.id, Decimal::new(140, 0), Utc::now(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::JobNotBiddable { .. }));

    let booking = market.jobs.accept_journey(&mover, &job.id).await.unwrap();
    assert_eq!(booking.price, Decimal::new(150, 0));
}

#[tokio::test]
async fn full_move_updates_provider_stats() {
    let market = market();
    let (customer, _) = sign_up(&market, "emily@example.com", AccountType::User).await;
    let (mover, _) = active_provider(&market, "swift@example.com").await;
    let request = market
        .intake
        .submit(&customer, draft(RequestType::Fixed, 120))
        .await
        .unwrap();
    let job = market.jobs.create_job(&customer, &request.id).await.unwrap();
    let booking = market.jobs.accept_instant(&mover, &job.id).await.unwrap();

    for status in [
        BookingStatus::Confirmed,
        BookingStatus::PickedUp,
        BookingStatus::InTransit,
        BookingStatus::Delivered,
    ] {
        market
            .bookings
            .advance_status(&mover, &booking.id, status, "")
            .await
            .unwrap();
    }
    market.jobs.confirm_completion(&customer, &job.id).await.unwrap();
    market
        .bookings
        .review(&customer, &booking.id, 5, Some("Great crew".into()))
        .await
        .unwrap();

    let stats = market.onboarding.provider_stats(&mover.account_id).await.unwrap();
    assert_eq!(stats.earnings, Decimal::new(120, 0));
    assert_eq!(stats.completed_bookings, 1);
    assert_eq!(stats.pending_bookings, 0);
    assert_eq!(stats.rating, 5.0);
    assert_eq!(stats.review_count, 1);

    let (admin, _) = common::admin(&market).await;
    let overview = market.accounts.admin_stats(&admin).await.unwrap();
    assert_eq!(overview.total_revenue, Decimal::new(120, 0));
    assert_eq!(overview.active_providers, 1);
}
