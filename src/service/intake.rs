use tracing::{error, info};

use crate::error::{MarketError, MarketResult};
use crate::model::account::{Actor, Role};
use crate::model::ids::RequestId;
use crate::model::job::JobStatus;
use crate::model::request::{ServiceRequest, ServiceRequestDraft};
use crate::service::Repos;
use crate::store::StoreError;

/// Customer service requests, validated before they can become jobs.
pub struct RequestIntake {
    repos: Repos,
}

impl RequestIntake {
    pub fn new(repos: Repos) -> Self {
        Self { repos }
    }

    pub async fn submit(&self, actor: &Actor, draft: ServiceRequestDraft) -> MarketResult<ServiceRequest> {
        if actor.role != Role::User {
            return Err(MarketError::Unauthorized(
                "only customers can request a move".into(),
            ));
        }
        let mut request = draft.into_request(actor.account_id.clone())?;
        self.repos.requests.insert(&mut request).await?;
        info!(request_id = %request.id, owner = %request.owner, item_type = %request.item_type, "service request submitted");
        Ok(request)
    }

    /// Replace a request with an edited copy. The old one stays for history
    /// but can no longer be posted. A request whose job is still live must
    /// have that job cancelled first.
    pub async fn amend(
        &self,
        actor: &Actor,
        request_id: &RequestId,
        draft: ServiceRequestDraft,
    ) -> MarketResult<ServiceRequest> {
        let mut previous = self.repos.request(request_id).await?;
        if previous.owner != actor.account_id {
            return Err(MarketError::Unauthorized(
                "only the owner can amend a request".into(),
            ));
        }
        if let Some(next) = &previous.superseded_by {
            return Err(MarketError::InvalidRequest(format!(
                "request {} was already amended by {}",
                previous.id, next
            )));
        }
        if let Some(job_id) = &previous.job_id {
            let job = self.repos.job(job_id).await?;
            if job.status != JobStatus::Cancelled {
                return Err(MarketError::InvalidRequest(format!(
                    "request {} has {} job {}, cancel it before amending",
                    previous.id, job.status, job.id
                )));
            }
        }
        let mut request = draft.into_request(actor.account_id.clone())?;
        request.supersedes = Some(previous.id.clone());

        // Retire the old request before its replacement exists.
        previous.superseded_by = Some(request.id.clone());
        match self.repos.requests.update(&mut previous).await {
            Ok(()) => {}
            Err(StoreError::Conflict { .. }) => {
                return Err(MarketError::ConcurrentModification {
                    entity: "service_request".into(),
                    id: previous.id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.repos.requests.insert(&mut request).await {
            error!(request_id = %previous.id, error = %e, "failed to store amendment, restoring request");
            previous.superseded_by = None;
            if let Err(restore) = self.repos.requests.update(&mut previous).await {
                error!(request_id = %previous.id, error = %restore, "failed to restore request");
            }
            return Err(e.into());
        }
        if previous.superseded_by.as_ref() != Some(&request.id) {
            previous.superseded_by = Some(request.id.clone());
            self.repos.requests.update(&mut previous).await?;
        }
        info!(request_id = %request.id, supersedes = %previous.id, "service request amended");
        Ok(request)
    }

    pub async fn get(&self, actor: &Actor, request_id: &RequestId) -> MarketResult<ServiceRequest> {
        let request = self.repos.request(request_id).await?;
        if request.owner != actor.account_id && !actor.is_admin() {
            return Err(MarketError::Unauthorized(
                "cannot view another customer's request".into(),
            ));
        }
        Ok(request)
    }

    pub async fn requests_for(&self, actor: &Actor) -> MarketResult<Vec<ServiceRequest>> {
        let requests = self.repos.requests.list().await?;
        Ok(requests
            .into_iter()
            .filter(|r| r.owner == actor.account_id)
            .collect())
    }
}
