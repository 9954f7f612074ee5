//! Marketplace operations. Each component owns one slice of the domain and
//! shares the same record repositories.

use std::sync::Arc;

use crate::config::Config;
use crate::error::{MarketError, MarketResult};
use crate::locks::JobLocks;
use crate::model::account::{Account, AccountStatus, Actor, Role};
use crate::model::booking::Booking;
use crate::model::ids::{AccountId, BookingId, JobId, RequestId};
use crate::model::job::Job;
use crate::model::provider::ProviderProfile;
use crate::model::request::ServiceRequest;
use crate::session::SessionStore;
use crate::store::{Repository, Store};

pub mod accounts;
pub mod bookings;
pub mod intake;
pub mod jobs;
pub mod onboarding;

pub use accounts::AccountDirectory;
pub use bookings::BookingLedger;
pub use intake::RequestIntake;
pub use jobs::JobEngine;
pub use onboarding::Onboarding;

#[derive(Clone)]
pub struct Repos {
    pub accounts: Repository<Account>,
    pub requests: Repository<ServiceRequest>,
    pub jobs: Repository<Job>,
    pub bookings: Repository<Booking>,
    pub providers: Repository<ProviderProfile>,
}

impl Repos {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            accounts: Repository::new(store.clone()),
            requests: Repository::new(store.clone()),
            jobs: Repository::new(store.clone()),
            bookings: Repository::new(store.clone()),
            providers: Repository::new(store),
        }
    }

    pub async fn account(&self, id: &AccountId) -> MarketResult<Account> {
        self.accounts
            .get(id.as_str())
            .await?
            .ok_or_else(|| MarketError::not_found("account", id))
    }

    pub async fn request(&self, id: &RequestId) -> MarketResult<ServiceRequest> {
        self.requests
            .get(id.as_str())
            .await?
            .ok_or_else(|| MarketError::not_found("service request", id))
    }

    pub async fn job(&self, id: &JobId) -> MarketResult<Job> {
        self.jobs
            .get(id.as_str())
            .await?
            .ok_or_else(|| MarketError::not_found("job", id))
    }

    pub async fn booking(&self, id: &BookingId) -> MarketResult<Booking> {
        self.bookings
            .get(id.as_str())
            .await?
            .ok_or_else(|| MarketError::not_found("booking", id))
    }

    pub async fn profile(&self, id: &AccountId) -> MarketResult<ProviderProfile> {
        self.providers
            .get(id.as_str())
            .await?
            .ok_or_else(|| MarketError::not_found("provider profile", id))
    }

    /// The acting account, which must be a provider cleared to take work.
    pub async fn active_provider(&self, actor: &Actor) -> MarketResult<Account> {
        if actor.role != Role::Provider {
            return Err(MarketError::Unauthorized("provider role required".into()));
        }
        let account = self.account(&actor.account_id).await?;
        if account.status != AccountStatus::Active {
            return Err(MarketError::Unauthorized(
                "provider account is not verified yet".into(),
            ));
        }
        Ok(account)
    }
}

/// Every marketplace component, wired to one store.
#[derive(Clone)]
pub struct Marketplace {
    pub accounts: Arc<AccountDirectory>,
    pub intake: Arc<RequestIntake>,
    pub jobs: Arc<JobEngine>,
    pub bookings: Arc<BookingLedger>,
    pub onboarding: Arc<Onboarding>,
}

impl Marketplace {
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        let repos = Repos::new(store);
        let locks = Arc::new(JobLocks::new());
        let sessions = Arc::new(SessionStore::new(config.session_ttl));
        Self {
            accounts: Arc::new(AccountDirectory::new(repos.clone(), sessions)),
            intake: Arc::new(RequestIntake::new(repos.clone())),
            jobs: Arc::new(JobEngine::new(repos.clone(), locks.clone())),
            bookings: Arc::new(BookingLedger::new(repos.clone(), locks)),
            onboarding: Arc::new(Onboarding::new(repos)),
        }
    }
}
