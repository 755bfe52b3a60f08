// ── Pull-query collaborator ──

use async_trait::async_trait;
use beacon_api::IncidentClient;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CoreError;
use crate::filter::IncidentFilter;
use crate::model::IncidentRecord;
use crate::normalize::record_from_json;

/// Upper bound on pages fetched in one resync.
const MAX_PAGES: u32 = 50;

/// Produces an authoritative incident snapshot for a filter.
///
/// Implementations must honour `cancel` and return
/// [`CoreError::Aborted`] when it fires.
#[async_trait]
pub trait IncidentSource: Send + Sync {
    async fn fetch(
        &self,
        filter: &IncidentFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<IncidentRecord>, CoreError>;
}

/// [`IncidentSource`] backed by the incident list endpoint.
#[derive(Debug, Clone)]
pub struct HttpIncidentSource {
    client: IncidentClient,
    page_limit: u32,
}

impl HttpIncidentSource {
    pub fn new(client: IncidentClient, page_limit: u32) -> Self {
        Self {
            client,
            page_limit: page_limit.max(1),
        }
    }

    pub fn client(&self) -> &IncidentClient {
        &self.client
    }
}

#[async_trait]
impl IncidentSource for HttpIncidentSource {
    async fn fetch(
        &self,
        filter: &IncidentFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<IncidentRecord>, CoreError> {
        let mut query = filter.to_query();
        query.limit = self.page_limit;
        query.page = 1;

        let mut records = Vec::new();
        let mut skipped = 0usize;
        loop {
            let page = self.client.get_incidents(&query, cancel).await?;
            let fetched = page.data.len();
            for raw in &page.data {
                match record_from_json(raw) {
                    Some(record) => records.push(record),
                    None => skipped += 1,
                }
            }

            if fetched == 0 || query.page >= page.total_pages || query.page >= MAX_PAGES {
                break;
            }
            query.page += 1;
        }

        if skipped > 0 {
            debug!(skipped, "snapshot rows without identifier were dropped");
        }
        Ok(records)
    }
}
