//! Actions and connectors API

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::error::ApiError;
use super::Client;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Connector {
    pub id: String,
    pub name: String,
    pub connector_type_id: String,
    /// Null for some preconfigured connectors
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
    #[serde(default)]
    pub is_preconfigured: bool,
    #[serde(default)]
    pub is_deprecated: bool,
    #[serde(default)]
    pub is_missing_secrets: bool,
    #[serde(default)]
    pub referenced_by_count: i64,
}

/// Request body for POST /api/actions/connector
#[derive(Debug, Serialize)]
pub struct CreateConnectorRequest {
    pub name: String,
    pub connector_type_id: String,
    pub config: HashMap<String, String>,
    pub secrets: HashMap<String, String>,
}

/// Request body for PUT /api/actions/connector/{id}; the type cannot change
#[derive(Debug, Serialize)]
pub struct UpdateConnectorRequest {
    pub name: String,
    pub config: HashMap<String, String>,
    pub secrets: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectorType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub enabled_in_config: bool,
    #[serde(default)]
    pub enabled_in_license: bool,
    #[serde(default)]
    pub minimum_license_required: String,
    #[serde(default)]
    pub supported_feature_ids: Vec<String>,
}

pub struct ConnectorsApi<'a> {
    client: &'a Client,
}

impl<'a> ConnectorsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn create(&self, request: &CreateConnectorRequest) -> Result<Connector, ApiError> {
        self.client.post("/api/actions/connector", request).await
    }

    /// None when the connector does not exist
    pub async fn get(&self, id: &str) -> Result<Option<Connector>, ApiError> {
        self.client.get_optional(&connector_path(id)).await
    }

    pub async fn update(
        &self,
        id: &str,
        request: &UpdateConnectorRequest,
    ) -> Result<Connector, ApiError> {
        self.client.put(&connector_path(id), request).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.client.delete(&connector_path(id)).await
    }

    pub async fn list_types(&self) -> Result<Vec<ConnectorType>, ApiError> {
        self.client.get("/api/actions/connector_types").await
    }
}

fn connector_path(id: &str) -> String {
    format!("/api/actions/connector/{}", urlencoding::encode(id))
}
