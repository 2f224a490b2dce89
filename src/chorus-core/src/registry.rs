use crate::provider::{Capability, CapabilityError, Provider};

/// Read-only set of loaded providers, in load order.
///
/// Built once at startup and shared with every request handler; nothing
/// is added or replaced afterwards.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
}

impl ProviderRegistry {
    /// Later duplicates of an id are dropped.
    pub fn new(providers: impl IntoIterator<Item = Provider>) -> Self {
        let mut unique: Vec<Provider> = Vec::new();
        for provider in providers {
            if unique.iter().any(|p| p.id() == provider.id()) {
                tracing::warn!(provider_id = provider.id(), "Ignoring duplicate provider");
                continue;
            }
            unique.push(provider);
        }
        Self { providers: unique }
    }

    pub fn get(&self, id: &str) -> Result<&Provider, CapabilityError> {
        self.providers
            .iter()
            .find(|p| p.id() == id)
            .ok_or_else(|| CapabilityError::UnknownProvider { id: id.to_string() })
    }

    /// The provider, provided it declares `capability`.
    pub fn require(&self, id: &str, capability: Capability) -> Result<&Provider, CapabilityError> {
        let provider = self.get(id)?;
        if provider.supports(capability) {
            Ok(provider)
        } else {
            Err(CapabilityError::Unsupported {
                provider: id.to_string(),
                capability,
            })
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.id().to_string()).collect()
    }

    pub fn with_capability(&self, capability: Capability) -> impl Iterator<Item = &Provider> {
        self.providers.iter().filter(move |p| p.supports(capability))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
