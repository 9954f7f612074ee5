#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;

use movers::config::{AdminSeed, Config};
use movers::model::account::{AccountType, Actor, RegisterRequest};
use movers::model::provider::{
    Attachment, BusinessInfo, BusinessType, DocumentKind, ServiceDetails, VehicleType, Verdict,
};
use movers::model::request::{ItemSize, ItemType, RequestType, ServiceRequestDraft, TimeWindow};
use movers::service::Marketplace;
use movers::store::MemoryStore;

pub const PASSWORD: &str = "Secret1!x";

pub fn market() -> Marketplace {
    Marketplace::new(Arc::new(MemoryStore::new()), &Config::default())
}

pub fn registration(email: &str, account_type: AccountType) -> RegisterRequest {
    RegisterRequest {
        first_name: "Test".into(),
        last_name: "Account".into(),
        email: email.into(),
        phone: "5551234567".into(),
        password: PASSWORD.into(),
        confirm_password: PASSWORD.into(),
        account_type,
        terms_accepted: true,
    }
}

/// Register, log in and return the caller with its bearer token.
pub async fn sign_up(market: &Marketplace, email: &str, account_type: AccountType) -> (Actor, String) {
    market
        .accounts
        .register(registration(email, account_type))
        .await
        .unwrap();
    login(market, email).await
}

pub async fn login(market: &Marketplace, email: &str) -> (Actor, String) {
    let (session, _) = market.accounts.login(email, PASSWORD).await.unwrap();
    let actor = market.accounts.authenticate(&session.token).await.unwrap();
    (actor, session.token)
}

pub async fn admin(market: &Marketplace) -> (Actor, String) {
    market
        .accounts
        .seed_admin(&AdminSeed {
            email: "admin@movers.test".into(),
            password: PASSWORD.into(),
        })
        .await
        .unwrap();
    login(market, "admin@movers.test").await
}

pub fn document(kind: DocumentKind) -> Attachment {
    Attachment {
        file_name: format!("{}.pdf", kind.as_str()),
        content_type: "application/pdf".into(),
        content: format!("scan of {}", kind.as_str()).into_bytes(),
    }
}

/// Walk a new provider through all three onboarding steps and submit. The
/// documents are left unreviewed.
pub async fn submitted_provider(market: &Marketplace, email: &str) -> Actor {
    let (applicant, _) = sign_up(market, email, AccountType::Provider).await;
    market
        .onboarding
        .save_business_info(
            &applicant,
            BusinessInfo {
                business_name: format!("Movers {}", email),
                business_type: BusinessType::Individual,
                bio: "Local moves, no job too small.".into(),
            },
        )
        .await
        .unwrap();
    market
        .onboarding
        .save_service_details(
            &applicant,
            ServiceDetails {
                vehicle_type: VehicleType::Van,
                vehicle_plate: "MOV 42".into(),
                service_area: "Manhattan".into(),
                service_types: BTreeSet::from([ItemType::Furniture, ItemType::Boxes]),
            },
        )
        .await
        .unwrap();
    for kind in DocumentKind::REQUIRED {
        market
            .onboarding
            .attach_document(&applicant, kind, &document(kind))
            .await
            .unwrap();
    }
    market.onboarding.submit(&applicant, true).await.unwrap();
    applicant
}

/// Onboard a provider and have an admin verify every document. Returns the
/// provider, logged in with its upgraded role.
pub async fn active_provider(market: &Marketplace, email: &str) -> (Actor, String) {
    let applicant = submitted_provider(market, email).await;
    let (reviewer, _) = admin(market).await;
    for kind in DocumentKind::REQUIRED {
        market
            .onboarding
            .review_document(&reviewer, &applicant.account_id, kind, Verdict::Verified)
            .await
            .unwrap();
    }
    login(market, email).await
}

pub fn draft(request_type: RequestType, estimated_value: i64) -> ServiceRequestDraft {
    ServiceRequestDraft {
        pickup_location: Some("123 Main St, New York".into()),
        dropoff_location: Some("456 Park Ave, New York".into()),
        item_type: Some(ItemType::Furniture),
        item_size: Some(ItemSize::Large),
        preferred_date: NaiveDate::from_ymd_opt(2024, 7, 15),
        preferred_time: Some(TimeWindow {
            start: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            end: None,
        }),
        description: "Sofa and two armchairs".into(),
        request_type,
        estimated_value: Decimal::new(estimated_value, 0),
        distance_km: 4.5,
        ..Default::default()
    }
}
