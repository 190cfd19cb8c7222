//! Provider data structure passed to resources and data sources

use crate::api::Client;
use std::any::Any;
use std::sync::Arc;
use tfplug::types::Diagnostic;

#[derive(Clone)]
pub struct KibanaProviderData {
    pub client: Arc<Client>,
}

impl KibanaProviderData {
    pub fn new(client: Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Recover the provider data handed to a resource or data source configure call
    pub fn from_any(provider_data: Option<Arc<dyn Any + Send + Sync>>) -> Result<Self, Diagnostic> {
        let data = provider_data.ok_or_else(|| {
            Diagnostic::error(
                "No provider data",
                "No provider data was provided to the resource",
            )
        })?;
        data.downcast_ref::<KibanaProviderData>()
            .cloned()
            .ok_or_else(|| {
                Diagnostic::error(
                    "Invalid provider data",
                    "Failed to extract KibanaProviderData from provider data",
                )
            })
    }
}
