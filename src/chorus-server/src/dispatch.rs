//! Single-provider search dispatch.

use chorus_core::models::{SearchKind, Track};
use chorus_core::provider::DispatchError;
use chorus_core::registry::ProviderRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct SearchDispatcher {
    registry: Arc<ProviderRegistry>,
}

impl SearchDispatcher {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Search one provider. Provider ordering is returned untouched.
    pub async fn search(
        &self,
        provider_id: &str,
        query: &str,
        page: u32,
        kind: SearchKind,
    ) -> Result<Vec<Track>, DispatchError> {
        let provider = self.registry.get(provider_id)?;
        let result = provider.search(query, page, kind).await;
        match &result {
            Ok(tracks) => tracing::debug!(
                provider_id,
                query,
                page,
                kind = %kind,
                hits = tracks.len(),
                "Search dispatched"
            ),
            Err(DispatchError::Upstream(error)) => {
                tracing::warn!(provider_id, query, %error, "Provider search failed")
            }
            Err(DispatchError::Capability(_)) => {}
        }
        result
    }
}
