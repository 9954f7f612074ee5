//! Provider verification: a three step wizard followed by an admin review
//! of the uploaded documents.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::error::{MarketError, MarketResult};
use crate::model::account::{AccountStatus, Actor, Role};
use crate::model::booking::BookingStatus;
use crate::model::ids::AccountId;
use crate::model::provider::{
    Attachment, BusinessInfo, DocumentKind, DocumentStatus, OnboardingState, ProviderProfile,
    ServiceDetails, Verdict, VerificationDocument,
};
use crate::service::Repos;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProviderStats {
    pub earnings: Decimal,
    pub completed_bookings: u32,
    pub pending_bookings: usize,
    pub rating: f64,
    pub review_count: u32,
}

pub struct Onboarding {
    repos: Repos,
}

impl Onboarding {
    pub fn new(repos: Repos) -> Self {
        Self { repos }
    }

    /// Create the onboarding record, or return the one already in progress.
    pub async fn start(&self, actor: &Actor) -> MarketResult<ProviderProfile> {
        let account = self.repos.account(&actor.account_id).await?;
        if account.role == Role::Admin {
            return Err(MarketError::Unauthorized(
                "admins cannot become providers".into(),
            ));
        }
        if account.role == Role::Provider && account.status == AccountStatus::Active {
            return Err(MarketError::InvalidRequest(
                "account is already an active provider".into(),
            ));
        }
        if let Some(profile) = self.repos.providers.get(account.id.as_str()).await? {
            return Ok(profile);
        }

        let mut profile = ProviderProfile::new(account.id.clone());
        self.repos.providers.insert(&mut profile).await?;
        info!(account_id = %account.id, "provider onboarding started");
        Ok(profile)
    }

    pub async fn save_business_info(
        &self,
        actor: &Actor,
        info: BusinessInfo,
    ) -> MarketResult<ProviderProfile> {
        let mut profile = self.repos.profile(&actor.account_id).await?;
        profile.state.require(OnboardingState::Step1BusinessInfo)?;
        info.validate()?;
        profile.business = Some(BusinessInfo {
            business_name: info.business_name.trim().to_string(),
            bio: info.bio.trim().to_string(),
            ..info
        });
        profile.state = OnboardingState::Step2ServiceDetails;
        self.repos.providers.update(&mut profile).await?;
        Ok(profile)
    }

    pub async fn save_service_details(
        &self,
        actor: &Actor,
        details: ServiceDetails,
    ) -> MarketResult<ProviderProfile> {
        let mut profile = self.repos.profile(&actor.account_id).await?;
        profile.state.require(OnboardingState::Step2ServiceDetails)?;
        details.validate()?;
        profile.service = Some(ServiceDetails {
            vehicle_plate: details.vehicle_plate.trim().to_uppercase(),
            service_area: details.service_area.trim().to_string(),
            ..details
        });
        profile.state = OnboardingState::Step3VerificationDocs;
        self.repos.providers.update(&mut profile).await?;
        Ok(profile)
    }

    /// One step back. Entered data is kept.
    pub async fn go_back(&self, actor: &Actor) -> MarketResult<ProviderProfile> {
        let mut profile = self.repos.profile(&actor.account_id).await?;
        profile.state = match profile.state {
            OnboardingState::Step3VerificationDocs => OnboardingState::Step2ServiceDetails,
            OnboardingState::Step2ServiceDetails => OnboardingState::Step1BusinessInfo,
            current => {
                return Err(MarketError::InvalidOnboardingStep {
                    current: current.to_string(),
                    expected: format!(
                        "{} or {}",
                        OnboardingState::Step2ServiceDetails,
                        OnboardingState::Step3VerificationDocs
                    ),
                })
            }
        };
        self.repos.providers.update(&mut profile).await?;
        Ok(profile)
    }

    pub async fn attach_document(
        &self,
        actor: &Actor,
        kind: DocumentKind,
        attachment: &Attachment,
    ) -> MarketResult<ProviderProfile> {
        let mut profile = self.repos.profile(&actor.account_id).await?;
        profile.state.require(OnboardingState::Step3VerificationDocs)?;
        let document = VerificationDocument::from_attachment(attachment)?;
        profile.documents.insert(kind, document);
        self.repos.providers.update(&mut profile).await?;
        Ok(profile)
    }

    /// Hand the application over for review. Nothing is written unless every
    /// document and the terms are in.
    pub async fn submit(&self, actor: &Actor, terms_accepted: bool) -> MarketResult<ProviderProfile> {
        let mut profile = self.repos.profile(&actor.account_id).await?;
        profile.state.require(OnboardingState::Step3VerificationDocs)?;
        let missing = profile.missing_for_submission(terms_accepted);
        if !missing.is_empty() {
            return Err(MarketError::IncompleteSubmission { missing });
        }

        profile.terms_accepted = true;
        profile.submitted_at = Some(Utc::now());
        profile.state = OnboardingState::PendingReview;
        self.repos.providers.update(&mut profile).await?;

        self.repos
            .accounts
            .modify(actor.account_id.as_str(), |account| {
                account.role = Role::Provider;
                account.status = AccountStatus::Pending;
            })
            .await?
            .ok_or_else(|| MarketError::not_found("account", &actor.account_id))?;

        info!(account_id = %actor.account_id, "provider application submitted");
        Ok(profile)
    }

    /// Admin verdict on one document. A rejection sends the whole profile
    /// back to the provider; three verified documents activate it.
    pub async fn review_document(
        &self,
        actor: &Actor,
        account_id: &AccountId,
        kind: DocumentKind,
        verdict: Verdict,
    ) -> MarketResult<ProviderProfile> {
        actor.require_admin()?;
        let mut profile = self.repos.profile(account_id).await?;
        if !matches!(
            profile.state,
            OnboardingState::PendingReview | OnboardingState::Rejected
        ) {
            return Err(MarketError::InvalidOnboardingStep {
                current: profile.state.to_string(),
                expected: OnboardingState::PendingReview.to_string(),
            });
        }
        let document = profile
            .documents
            .get_mut(&kind)
            .ok_or_else(|| MarketError::not_found("document", kind.as_str()))?;
        document.status = match verdict {
            Verdict::Verified => DocumentStatus::Verified,
            Verdict::Rejected => DocumentStatus::Rejected,
        };

        profile.state = if profile.has_rejected_document() {
            OnboardingState::Rejected
        } else if profile.all_documents_verified() {
            OnboardingState::Active
        } else {
            OnboardingState::PendingReview
        };
        self.repos.providers.update(&mut profile).await?;

        if profile.state == OnboardingState::Active {
            self.repos
                .accounts
                .modify(account_id.as_str(), |account| {
                    account.role = Role::Provider;
                    account.status = AccountStatus::Active;
                })
                .await?;
            info!(account_id = %account_id, "provider verified");
        }
        info!(account_id = %account_id, document = kind.as_str(), ?verdict, state = %profile.state, "document reviewed");
        Ok(profile)
    }

    /// Replace a rejected document.
    pub async fn resubmit_document(
        &self,
        actor: &Actor,
        kind: DocumentKind,
        attachment: &Attachment,
    ) -> MarketResult<ProviderProfile> {
        let mut profile = self.repos.profile(&actor.account_id).await?;
        profile.state.require(OnboardingState::Rejected)?;
        let document = VerificationDocument::from_attachment(attachment)?;
        profile.documents.insert(kind, document);
        if !profile.has_rejected_document() {
            profile.state = OnboardingState::PendingReview;
        }
        self.repos.providers.update(&mut profile).await?;
        Ok(profile)
    }

    pub async fn profile(&self, account_id: &AccountId) -> MarketResult<ProviderProfile> {
        self.repos.profile(account_id).await
    }

    pub async fn provider_stats(&self, account_id: &AccountId) -> MarketResult<ProviderStats> {
        let profile = self.repos.profile(account_id).await?;
        let bookings: Vec<_> = self
            .repos
            .bookings
            .list()
            .await?
            .into_iter()
            .filter(|b| &b.provider_id == account_id)
            .collect();

        Ok(ProviderStats {
            earnings: bookings
                .iter()
                .filter(|b| b.status == BookingStatus::Delivered)
                .map(|b| b.price)
                .sum(),
            completed_bookings: profile.completed_bookings,
            pending_bookings: bookings.iter().filter(|b| !b.status.is_terminal()).count(),
            rating: profile.rating,
            review_count: profile.review_count,
        })
    }
}
