use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::model::ids::AccountId;
use crate::store::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Provider,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Inactive,
    Pending,
}

/// Who is performing an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub account_id: AccountId,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> MarketResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(MarketError::Unauthorized("admin role required".into()))
        }
    }
}

// Settings sections. A patch replaces each section it carries.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSettings {
    pub address: String,
    pub company: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceSettings {
    pub packing_service: bool,
    pub insurance_coverage: bool,
    pub preferred_vehicle: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub booking_confirmation: bool,
    pub driver_assigned: bool,
    pub eta_update: bool,
    pub payment_receipt: bool,
    pub promotions: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            booking_confirmation: true,
            driver_assigned: true,
            eta_update: true,
            payment_receipt: true,
            promotions: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecuritySettings {
    pub two_factor_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSettings {
    pub profile: ProfileSettings,
    pub preferences: PreferenceSettings,
    pub notifications: NotificationSettings,
    pub security: SecuritySettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub profile: Option<ProfileSettings>,
    pub preferences: Option<PreferenceSettings>,
    pub notifications: Option<NotificationSettings>,
    pub security: Option<SecuritySettings>,
}

impl AccountSettings {
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(profile) = patch.profile {
            self.profile = profile;
        }
        if let Some(preferences) = patch.preferences {
            self.preferences = preferences;
        }
        if let Some(notifications) = patch.notifications {
            self.notifications = notifications;
        }
        if let Some(security) = patch.security {
            self.security = security;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub phone: String,
    password_salt: String,
    password_digest: String,
    pub role: Role,
    pub status: AccountStatus,
    #[serde(default)]
    pub settings: AccountSettings,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Account {
    pub fn new(name: String, email: &str, phone: String, password: &str, role: Role) -> Self {
        let password_salt = Uuid::new_v4().simple().to_string();
        let password_digest = digest_password(&password_salt, password);
        Self {
            id: AccountId::generate(),
            name,
            email: normalize_email(email),
            phone,
            password_salt,
            password_digest,
            role,
            status: AccountStatus::Active,
            settings: AccountSettings::default(),
            created_at: Utc::now(),
            version: 0,
        }
    }

    pub fn verify_password(&self, password: &str) -> bool {
        digest_password(&self.password_salt, password) == self.password_digest
    }

    pub fn actor(&self) -> Actor {
        Actor {
            account_id: self.id.clone(),
            role: self.role,
        }
    }
}

impl Record for Account {
    const KIND: &'static str = "account";

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
        self.id = AccountId::generate();
        true
    }

    fn lookup_key(&self) -> Option<String> {
        Some(self.email.clone())
    }
}

/// Account as exposed to clients, without credentials.
#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    pub status: AccountStatus,
    pub settings: AccountSettings,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            name: account.name.clone(),
            email: account.email.clone(),
            phone: account.phone.clone(),
            role: account.role,
            status: account.status,
            settings: account.settings.clone(),
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    User,
    Provider,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub confirm_password: String,
    pub account_type: AccountType,
    pub terms_accepted: bool,
}

const PASSWORD_SPECIALS: &str = "@$!%*?&";

fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

impl RegisterRequest {
    pub fn validate(&self) -> MarketResult<()> {
        if self.first_name.trim().is_empty() {
            return Err(MarketError::validation("first_name", "first name is required"));
        }
        if self.last_name.trim().is_empty() {
            return Err(MarketError::validation("last_name", "last name is required"));
        }
        if !valid_email(self.email.trim()) {
            return Err(MarketError::validation("email", "invalid email address"));
        }
        if self.phone.len() != 10 || !self.phone.chars().all(|c| c.is_ascii_digit()) {
            return Err(MarketError::validation("phone", "phone number must be 10 digits"));
        }

        let password = &self.password;
        let strong = password.chars().count() >= 8
            && password.chars().any(|c| c.is_ascii_lowercase())
            && password.chars().any(|c| c.is_ascii_uppercase())
            && password.chars().any(|c| c.is_ascii_digit())
            && password.chars().any(|c| PASSWORD_SPECIALS.contains(c));
        if !strong {
            return Err(MarketError::validation(
                "password",
                "password needs 8+ characters with upper and lower case letters, a number and one of @$!%*?&",
            ));
        }
        if self.password != self.confirm_password {
            return Err(MarketError::validation("confirm_password", "passwords must match"));
        }
        if !self.terms_accepted {
            return Err(MarketError::validation("terms_accepted", "terms must be accepted"));
        }
        Ok(())
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}
