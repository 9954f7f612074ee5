use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, MarketResult};
use crate::model::ids::{AccountId, JobId, RequestId};
use crate::store::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Moving,
    Furniture,
    Electronics,
    Boxes,
    Appliances,
    Specialty,
    Other,
}

impl ItemType {
    /// Full moves need to know about the property being moved out of.
    pub fn requires_property_details(self) -> bool {
        matches!(self, ItemType::Moving)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Moving => "moving",
            ItemType::Furniture => "furniture",
            ItemType::Electronics => "electronics",
            ItemType::Boxes => "boxes",
            ItemType::Appliances => "appliances",
            ItemType::Specialty => "specialty",
            ItemType::Other => "other",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSize {
    Small,
    Medium,
    Large,
    ExtraLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    House,
    Apartment,
    Office,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDetails {
    pub rooms: u32,
    pub floors: u32,
    pub property_type: PropertyType,
    pub has_elevator: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Fixed,
    Bidding,
}

impl Default for RequestType {
    fn default() -> Self {
        RequestType::Fixed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stop {
    pub pickup: String,
    pub dropoff: String,
}

/// Where the goods travel: one leg, or an ordered list of legs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Route {
    Single { pickup: String, dropoff: String },
    Stops { stops: Vec<Stop> },
}

impl Route {
    pub fn is_multi_stop(&self) -> bool {
        matches!(self, Route::Stops { .. })
    }

    /// Every address on the route, pickups before dropoffs per leg.
    pub fn addresses(&self) -> Vec<&str> {
        match self {
            Route::Single { pickup, dropoff } => vec![pickup.as_str(), dropoff.as_str()],
            Route::Stops { stops } => stops
                .iter()
                .flat_map(|s| [s.pickup.as_str(), s.dropoff.as_str()])
                .collect(),
        }
    }

    fn ensure_complete(&self) -> MarketResult<()> {
        match self {
            Route::Single { pickup, dropoff } => {
                if pickup.trim().is_empty() {
                    return Err(MarketError::InvalidRequest("pickup location is required".into()));
                }
                if dropoff.trim().is_empty() {
                    return Err(MarketError::InvalidRequest("dropoff location is required".into()));
                }
            }
            Route::Stops { stops } => {
                if stops.is_empty() {
                    return Err(MarketError::InvalidRequest("at least one stop is required".into()));
                }
                for (i, stop) in stops.iter().enumerate() {
                    if stop.pickup.trim().is_empty() || stop.dropoff.trim().is_empty() {
                        return Err(MarketError::InvalidRequest(format!(
                            "stop {} needs both a pickup and a dropoff",
                            i + 1
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: Option<NaiveTime>,
}

/// Customer input for a new service request. Everything is optional so
/// missing fields come back as validation errors instead of decode errors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceRequestDraft {
    pub pickup_location: Option<String>,
    pub dropoff_location: Option<String>,
    #[serde(default)]
    pub stops: Vec<Stop>,
    pub item_type: Option<ItemType>,
    pub item_size: Option<ItemSize>,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_time: Option<TimeWindow>,
    #[serde(default)]
    pub description: String,
    pub property: Option<PropertyDetails>,
    #[serde(default)]
    pub request_type: RequestType,
    #[serde(default)]
    pub estimated_value: Decimal,
    #[serde(default)]
    pub distance_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: RequestId,
    pub owner: AccountId,
    pub route: Route,
    pub item_type: ItemType,
    pub item_size: ItemSize,
    pub preferred_date: NaiveDate,
    pub preferred_time: TimeWindow,
    pub description: String,
    pub property: Option<PropertyDetails>,
    pub request_type: RequestType,
    pub estimated_value: Decimal,
    pub distance_km: f64,
    pub created_at: DateTime<Utc>,
    /// Set once a job has been derived; the request is frozen from then on.
    pub job_id: Option<JobId>,
    pub supersedes: Option<RequestId>,
    /// The amended copy that replaced this request.
    #[serde(default)]
    pub superseded_by: Option<RequestId>,
    #[serde(default)]
    pub version: i64,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ServiceRequestDraft {
    pub fn into_request(self, owner: AccountId) -> MarketResult<ServiceRequest> {
        let pickup = present(self.pickup_location);
        let dropoff = present(self.dropoff_location);

        let route = match (pickup, dropoff, self.stops.is_empty()) {
            (Some(_), _, false) | (_, Some(_), false) => {
                return Err(MarketError::InvalidRequest(
                    "give either a pickup/dropoff pair or stops, not both".into(),
                ))
            }
            (Some(pickup), Some(dropoff), true) => Route::Single { pickup, dropoff },
            (None, _, true) => {
                return Err(MarketError::InvalidRequest("pickup location is required".into()))
            }
            (_, None, true) => {
                return Err(MarketError::InvalidRequest("dropoff location is required".into()))
            }
            (None, None, false) => Route::Stops { stops: self.stops },
        };

        let item_type = self
            .item_type
            .ok_or_else(|| MarketError::InvalidRequest("item type is required".into()))?;
        let item_size = self
            .item_size
            .ok_or_else(|| MarketError::InvalidRequest("item size is required".into()))?;
        let preferred_date = self
            .preferred_date
            .ok_or_else(|| MarketError::InvalidRequest("preferred date is required".into()))?;
        let preferred_time = self
            .preferred_time
            .ok_or_else(|| MarketError::InvalidRequest("preferred time is required".into()))?;

        let property = if item_type.requires_property_details() {
            let details = self.property.ok_or_else(|| {
                MarketError::InvalidRequest(format!("{} requests need property details", item_type))
            })?;
            if details.rooms == 0 || details.floors == 0 {
                return Err(MarketError::validation(
                    "property",
                    "rooms and floors must be at least 1",
                ));
            }
            Some(details)
        } else {
            None
        };

        if self.estimated_value.is_sign_negative() {
            return Err(MarketError::validation("estimated_value", "must not be negative"));
        }
        if !self.distance_km.is_finite() || self.distance_km < 0.0 {
            return Err(MarketError::validation("distance_km", "must be a non-negative number"));
        }

        let request = ServiceRequest {
            id: RequestId::generate(),
            owner,
            route,
            item_type,
            item_size,
            preferred_date,
            preferred_time,
            description: self.description.trim().to_string(),
            property,
            request_type: self.request_type,
            estimated_value: self.estimated_value,
            distance_km: self.distance_km,
            created_at: Utc::now(),
            job_id: None,
            supersedes: None,
            superseded_by: None,
            version: 0,
        };
        request.ensure_complete()?;
        Ok(request)
    }
}

impl ServiceRequest {
    /// A request becomes a job once, and only while no amendment replaced it.
    pub fn ensure_postable(&self) -> MarketResult<()> {
        if let Some(job_id) = &self.job_id {
            return Err(MarketError::InvalidRequest(format!(
                "request {} already has job {}",
                self.id, job_id
            )));
        }
        if let Some(next) = &self.superseded_by {
            return Err(MarketError::InvalidRequest(format!(
                "request {} was amended by {}",
                self.id, next
            )));
        }
        self.ensure_complete()
    }

    /// Checks the fields a job cannot be posted without.
    pub fn ensure_complete(&self) -> MarketResult<()> {
        self.route.ensure_complete()?;
        if let Some(end) = self.preferred_time.end {
            if end < self.preferred_time.start {
                return Err(MarketError::InvalidRequest(
                    "preferred time window ends before it starts".into(),
                ));
            }
        }
        if self.item_type.requires_property_details() && self.property.is_none() {
            return Err(MarketError::InvalidRequest(format!(
                "{} requests need property details",
                self.item_type
            )));
        }
        Ok(())
    }
}

impl Record for ServiceRequest {
    const KIND: &'static str = "service_request";

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
        self.id = RequestId::generate();
        true
    }
}
