use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AdminSeed;
use crate::error::{MarketError, MarketResult};
use crate::model::account::{
    normalize_email, Account, AccountStatus, AccountType, Actor, RegisterRequest, Role,
    SettingsPatch,
};
use crate::model::booking::BookingStatus;
use crate::model::ids::AccountId;
use crate::model::provider::{OnboardingState, ProviderProfile};
use crate::service::Repos;
use crate::session::{Session, SessionStore};
use crate::store::StoreError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountFilter {
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdminStats {
    pub total_users: usize,
    pub total_providers: usize,
    pub active_users: usize,
    pub active_providers: usize,
    pub pending_providers: usize,
    pub total_bookings: usize,
    pub total_revenue: Decimal,
}

/// Accounts, credentials and sessions.
pub struct AccountDirectory {
    repos: Repos,
    sessions: Arc<SessionStore>,
}

impl AccountDirectory {
    pub fn new(repos: Repos, sessions: Arc<SessionStore>) -> Self {
        Self { repos, sessions }
    }

    pub async fn register(&self, form: RegisterRequest) -> MarketResult<Account> {
        form.validate()?;
        let email = normalize_email(&form.email);
        if self.repos.accounts.find_by_key(&email).await?.is_some() {
            return Err(MarketError::EmailTaken(email));
        }

        // Providers start as users and are upgraded when onboarding is submitted.
        let mut account = Account::new(
            form.full_name(),
            &email,
            form.phone.clone(),
            &form.password,
            Role::User,
        );
        match self.repos.accounts.insert(&mut account).await {
            Ok(()) => {}
            Err(StoreError::Duplicate { .. }) => return Err(MarketError::EmailTaken(email)),
            Err(e) => return Err(e.into()),
        }

        if form.account_type == AccountType::Provider {
            let mut profile = ProviderProfile::new(account.id.clone());
            self.repos.providers.insert(&mut profile).await?;
        }

        info!(account_id = %account.id, account_type = ?form.account_type, "account registered");
        Ok(account)
    }

    pub async fn login(&self, email: &str, password: &str) -> MarketResult<(Session, Account)> {
        let email = normalize_email(email);
        let Some(account) = self.repos.accounts.find_by_key(&email).await? else {
            warn!("login attempt for unknown email");
            return Err(MarketError::InvalidCredentials);
        };
        if !account.verify_password(password) {
            warn!(account_id = %account.id, "login attempt with wrong password");
            return Err(MarketError::InvalidCredentials);
        }
        if account.status == AccountStatus::Inactive {
            return Err(MarketError::Unauthorized("account is inactive".into()));
        }

        let session = self.sessions.create(account.id.clone()).await;
        info!(account_id = %account.id, "login successful");
        Ok((session, account))
    }

    pub async fn logout(&self, token: &str) -> bool {
        self.sessions.revoke(token).await
    }

    /// Resolve a bearer token into the acting account.
    pub async fn authenticate(&self, token: &str) -> MarketResult<Actor> {
        let session = self
            .sessions
            .resolve(token)
            .await
            .ok_or(MarketError::Unauthenticated)?;
        let account = self
            .repos
            .accounts
            .get(session.account_id.as_str())
            .await?
            .ok_or(MarketError::Unauthenticated)?;
        if account.status == AccountStatus::Inactive {
            return Err(MarketError::Unauthorized("account is inactive".into()));
        }
        Ok(account.actor())
    }

    pub async fn get(&self, actor: &Actor, id: &AccountId) -> MarketResult<Account> {
        if &actor.account_id != id && !actor.is_admin() {
            return Err(MarketError::Unauthorized("cannot view another account".into()));
        }
        self.repos.account(id).await
    }

    pub async fn update_settings(&self, actor: &Actor, patch: SettingsPatch) -> MarketResult<Account> {
        let mut account = self.repos.account(&actor.account_id).await?;
        account.settings.apply(patch);
        self.repos.accounts.update(&mut account).await?;
        Ok(account)
    }

    pub async fn update_contact(
        &self,
        actor: &Actor,
        name: Option<String>,
        phone: Option<String>,
    ) -> MarketResult<Account> {
        if let Some(name) = &name {
            if name.trim().is_empty() {
                return Err(MarketError::validation("name", "name must not be empty"));
            }
        }
        if let Some(phone) = &phone {
            if phone.len() != 10 || !phone.chars().all(|c| c.is_ascii_digit()) {
                return Err(MarketError::validation("phone", "phone number must be 10 digits"));
            }
        }

        let mut account = self.repos.account(&actor.account_id).await?;
        if let Some(name) = name {
            account.name = name.trim().to_string();
        }
        if let Some(phone) = phone {
            account.phone = phone;
        }
        self.repos.accounts.update(&mut account).await?;
        Ok(account)
    }

    /// Admin status change. Accounts are never deleted, only deactivated.
    /// A provider can only be (re)activated once its documents are verified.
    pub async fn set_status(
        &self,
        actor: &Actor,
        id: &AccountId,
        status: AccountStatus,
    ) -> MarketResult<Account> {
        actor.require_admin()?;
        let target = self.repos.account(id).await?;
        if target.role == Role::Provider && status == AccountStatus::Active {
            let profile = self.repos.profile(id).await?;
            if profile.state != OnboardingState::Active {
                return Err(MarketError::InvalidOnboardingStep {
                    current: profile.state.to_string(),
                    expected: OnboardingState::Active.to_string(),
                });
            }
        }
        let account = self
            .repos
            .accounts
            .modify(id.as_str(), |account| account.status = status)
            .await?
            .ok_or_else(|| MarketError::not_found("account", id))?;
        info!(account_id = %id, status = ?status, admin = %actor.account_id, "account status changed");
        Ok(account)
    }

    pub async fn list(&self, actor: &Actor, filter: &AccountFilter) -> MarketResult<Vec<Account>> {
        actor.require_admin()?;
        let needle = filter
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default();
        Ok(self
            .repos
            .accounts
            .list()
            .await?
            .into_iter()
            .filter(|a| filter.role.map_or(true, |r| a.role == r))
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .filter(|a| {
                needle.is_empty()
                    || a.name.to_lowercase().contains(&needle)
                    || a.email.contains(&needle)
                    || a.id.as_str().to_lowercase().contains(&needle)
            })
            .collect())
    }

    pub async fn admin_stats(&self, actor: &Actor) -> MarketResult<AdminStats> {
        actor.require_admin()?;
        let accounts = self.repos.accounts.list().await?;
        let profiles = self.repos.providers.list().await?;
        let bookings = self.repos.bookings.list().await?;

        let count = |role: Role, status: Option<AccountStatus>| {
            accounts
                .iter()
                .filter(|a| a.role == role && status.map_or(true, |s| a.status == s))
                .count()
        };

        Ok(AdminStats {
            total_users: count(Role::User, None),
            total_providers: count(Role::Provider, None),
            active_users: count(Role::User, Some(AccountStatus::Active)),
            active_providers: count(Role::Provider, Some(AccountStatus::Active)),
            pending_providers: profiles
                .iter()
                .filter(|p| p.state == OnboardingState::PendingReview)
                .count(),
            total_bookings: bookings.len(),
            total_revenue: bookings
                .iter()
                .filter(|b| b.status == BookingStatus::Delivered)
                .map(|b| b.price)
                .sum(),
        })
    }

    /// Make sure the configured admin account exists.
    pub async fn seed_admin(&self, seed: &AdminSeed) -> MarketResult<Account> {
        let email = normalize_email(&seed.email);
        if let Some(existing) = self.repos.accounts.find_by_key(&email).await? {
            return Ok(existing);
        }
        let mut admin = Account::new(
            "Administrator".to_string(),
            &email,
            String::new(),
            &seed.password,
            Role::Admin,
        );
        self.repos.accounts.insert(&mut admin).await?;
        info!(account_id = %admin.id, "admin account seeded");
        Ok(admin)
    }
}
