use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MarketError, MarketResult};
use crate::model::ids::AccountId;
use crate::model::request::ItemType;
use crate::store::Record;

pub const BIO_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingState {
    Step1BusinessInfo,
    Step2ServiceDetails,
    Step3VerificationDocs,
    PendingReview,
    Active,
    Rejected,
}

impl OnboardingState {
    pub fn as_str(self) -> &'static str {
        match self {
            OnboardingState::Step1BusinessInfo => "step1_business_info",
            OnboardingState::Step2ServiceDetails => "step2_service_details",
            OnboardingState::Step3VerificationDocs => "step3_verification_docs",
            OnboardingState::PendingReview => "pending_review",
            OnboardingState::Active => "active",
            OnboardingState::Rejected => "rejected",
        }
    }

    pub fn require(self, expected: OnboardingState) -> MarketResult<()> {
        if self == expected {
            Ok(())
        } else {
            Err(MarketError::InvalidOnboardingStep {
                current: self.to_string(),
                expected: expected.to_string(),
            })
        }
    }
}

impl fmt::Display for OnboardingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    Individual,
    Llc,
    Corporation,
    Partnership,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Car,
    Van,
    TruckSmall,
    TruckMedium,
    TruckLarge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessInfo {
    pub business_name: String,
    pub business_type: BusinessType,
    pub bio: String,
}

impl BusinessInfo {
    pub fn validate(&self) -> MarketResult<()> {
        if self.business_name.trim().is_empty() {
            return Err(MarketError::validation("business_name", "business name is required"));
        }
        if self.bio.trim().is_empty() {
            return Err(MarketError::validation("bio", "bio is required"));
        }
        if self.bio.chars().count() > BIO_MAX_CHARS {
            return Err(MarketError::validation(
                "bio",
                format!("bio must be {} characters or less", BIO_MAX_CHARS),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDetails {
    pub vehicle_type: VehicleType,
    pub vehicle_plate: String,
    pub service_area: String,
    pub service_types: BTreeSet<ItemType>,
}

impl ServiceDetails {
    pub fn validate(&self) -> MarketResult<()> {
        if self.vehicle_plate.trim().is_empty() {
            return Err(MarketError::validation("vehicle_plate", "vehicle plate number is required"));
        }
        if self.service_area.trim().is_empty() {
            return Err(MarketError::validation("service_area", "service area is required"));
        }
        if self.service_types.is_empty() {
            return Err(MarketError::validation("service_types", "select at least one service type"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    IdVerification,
    VehicleRegistration,
    Insurance,
}

impl DocumentKind {
    pub const REQUIRED: [DocumentKind; 3] = [
        DocumentKind::IdVerification,
        DocumentKind::VehicleRegistration,
        DocumentKind::Insurance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::IdVerification => "id_verification",
            DocumentKind::VehicleRegistration => "vehicle_registration",
            DocumentKind::Insurance => "insurance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Verified,
    Rejected,
}

/// Uploaded file as received from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// What is kept of an uploaded document: metadata and a content digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationDocument {
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
    pub status: DocumentStatus,
    pub uploaded_at: DateTime<Utc>,
}

impl VerificationDocument {
    pub fn from_attachment(attachment: &Attachment) -> MarketResult<Self> {
        if attachment.file_name.trim().is_empty() {
            return Err(MarketError::validation("file_name", "file name is required"));
        }
        if attachment.content.is_empty() {
            return Err(MarketError::validation("content", "document is empty"));
        }
        let sha256 = Sha256::digest(&attachment.content)
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        Ok(Self {
            file_name: attachment.file_name.trim().to_string(),
            content_type: attachment.content_type.clone(),
            size: attachment.content.len() as u64,
            sha256,
            status: DocumentStatus::Pending,
            uploaded_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub account_id: AccountId,
    pub state: OnboardingState,
    pub business: Option<BusinessInfo>,
    pub service: Option<ServiceDetails>,
    #[serde(default)]
    pub documents: BTreeMap<DocumentKind, VerificationDocument>,
    pub terms_accepted: bool,
    pub rating: f64,
    pub review_count: u32,
    pub completed_bookings: u32,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: i64,
}

impl ProviderProfile {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            state: OnboardingState::Step1BusinessInfo,
            business: None,
            service: None,
            documents: BTreeMap::new(),
            terms_accepted: false,
            rating: 0.0,
            review_count: 0,
            completed_bookings: 0,
            created_at: Utc::now(),
            submitted_at: None,
            version: 0,
        }
    }

    /// Everything still missing for a final submission.
    pub fn missing_for_submission(&self, terms_accepted: bool) -> Vec<String> {
        let mut missing: Vec<String> = DocumentKind::REQUIRED
            .iter()
            .filter(|kind| !self.documents.contains_key(*kind))
            .map(|kind| kind.as_str().to_string())
            .collect();
        if !terms_accepted {
            missing.push("terms_accepted".to_string());
        }
        missing
    }

    pub fn all_documents_verified(&self) -> bool {
        DocumentKind::REQUIRED.iter().all(|kind| {
            self.documents
                .get(kind)
                .map_or(false, |doc| doc.status == DocumentStatus::Verified)
        })
    }

    pub fn has_rejected_document(&self) -> bool {
        self.documents
            .values()
            .any(|doc| doc.status == DocumentStatus::Rejected)
    }

    /// Fold a new review into the running average.
    pub fn add_rating(&mut self, stars: u8) {
        let total = self.rating * self.review_count as f64 + stars as f64;
        self.review_count += 1;
        self.rating = total / self.review_count as f64;
    }

    pub fn display_name(&self) -> Option<&str> {
        self.business.as_ref().map(|b| b.business_name.as_str())
    }
}

impl Record for ProviderProfile {
    const KIND: &'static str = "provider_profile";

    fn record_id(&self) -> String {
        self.account_id.to_string()
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}
