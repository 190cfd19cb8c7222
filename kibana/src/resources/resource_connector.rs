//! Connector resource implementation

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::import::import_state_passthrough_id;
use tfplug::plan_modifier::{RequiresReplaceIfChanged, UseStateForUnknown};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceSchemaRequest, ResourceSchemaResponse,
    ResourceWithConfigure, ResourceWithImportState, UpdateResourceRequest,
    UpdateResourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::StringLength;

use super::{api_error, created_state, not_configured, state_error, state_id};
use crate::api::{Client, Connector, CreateConnectorRequest, UpdateConnectorRequest};
use crate::provider_data::KibanaProviderData;

#[derive(Default)]
pub struct ConnectorResource {
    provider_data: Option<KibanaProviderData>,
}

impl ConnectorResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&Client, Diagnostic> {
        self.provider_data
            .as_ref()
            .map(|data| data.client.as_ref())
            .ok_or_else(not_configured)
    }
}

/// Connector fields as the user planned them
#[derive(Debug, Clone, PartialEq)]
struct ConnectorModel {
    name: String,
    connector_type_id: Option<String>,
    config: HashMap<String, String>,
    secrets: HashMap<String, String>,
}

impl ConnectorModel {
    fn from_value(value: &DynamicValue) -> Result<Self, Diagnostic> {
        let invalid = |name: &str| {
            let path = AttributePath::new(name);
            move |e: tfplug::TfplugError| {
                Diagnostic::error(format!("Invalid {}", path), e.to_string()).with_attribute(path)
            }
        };

        Ok(Self {
            name: value
                .get_string(&AttributePath::new("name"))
                .map_err(invalid("name"))?,
            connector_type_id: value
                .get_optional_string(&AttributePath::new("connector_type_id"))
                .map_err(invalid("connector_type_id"))?,
            config: value
                .get_string_map(&AttributePath::new("config"))
                .map_err(invalid("config"))?,
            secrets: value
                .get_string_map(&AttributePath::new("secrets"))
                .map_err(invalid("secrets"))?,
        })
    }
}

/// Kibana config values are arbitrary JSON; the attribute is a string map.
/// Nulls are dropped and non-strings kept as their JSON text. When the user
/// configured specific keys, only those are tracked.
fn config_strings(remote: Option<&Map<String, Value>>, previous: Option<&Dynamic>) -> Dynamic {
    let tracked = match previous {
        Some(Dynamic::Map(keys)) if !keys.is_empty() => Some(keys),
        _ => None,
    };

    let entries = remote
        .into_iter()
        .flatten()
        .filter(|(key, _)| tracked.map_or(true, |keys| keys.contains_key(*key)))
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key.clone(), s.clone())),
            other => Some((key.clone(), other.to_string())),
        });
    Dynamic::string_map(entries)
}

/// State for `connector`. Kibana never returns secrets, so they come from
/// the caller.
fn connector_state(
    connector: &Connector,
    previous: &DynamicValue,
    secrets: HashMap<String, String>,
) -> tfplug::Result<DynamicValue> {
    let mut state = DynamicValue::object();
    state.set_string(&AttributePath::new("id"), connector.id.clone())?;
    state.set_string(&AttributePath::new("name"), connector.name.clone())?;
    state.set_string(
        &AttributePath::new("connector_type_id"),
        connector.connector_type_id.clone(),
    )?;
    state.set_bool(
        &AttributePath::new("is_preconfigured"),
        connector.is_preconfigured,
    )?;
    state.set_bool(&AttributePath::new("is_deprecated"), connector.is_deprecated)?;
    state.set_bool(
        &AttributePath::new("is_missing_secrets"),
        connector.is_missing_secrets,
    )?;
    state.set_number(
        &AttributePath::new("referenced_by_count"),
        connector.referenced_by_count as f64,
    )?;
    state.set(
        &AttributePath::new("config"),
        config_strings(
            connector.config.as_ref(),
            previous.get(&AttributePath::new("config")),
        ),
    )?;
    state.set(&AttributePath::new("secrets"), Dynamic::string_map(secrets))?;
    Ok(state)
}

impl ConnectorResource {
    /// Fetch the connector and build its state; None when it no longer exists
    async fn read_state(
        &self,
        client: &Client,
        id: &str,
        previous: &DynamicValue,
        secrets: HashMap<String, String>,
    ) -> Result<Option<DynamicValue>, Diagnostic> {
        tracing::debug!("Connector ID: {}", id);
        let connector = match client.connectors().get(id).await {
            Ok(Some(connector)) => connector,
            Ok(None) => return Ok(None),
            Err(e) => return Err(api_error("Failed to read connector", &e)),
        };
        connector_state(&connector, previous, secrets)
            .map(Some)
            .map_err(state_error)
    }
}

#[async_trait]
impl Resource for ConnectorResource {
    fn type_name(&self) -> &str {
        "kibana_connector"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manages a Kibana alerting connector")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Connector ID assigned by Kibana")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Display name of the connector")
                    .required()
                    .validator(StringLength::at_least(1))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("connector_type_id", AttributeType::String)
                    .description("Connector type, e.g. .slack or .index; changing it recreates the connector")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .plan_modifier(RequiresReplaceIfChanged)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("is_preconfigured", AttributeType::Bool)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("is_deprecated", AttributeType::Bool)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("is_missing_secrets", AttributeType::Bool)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("referenced_by_count", AttributeType::Number)
                    .description("Number of saved objects referencing the connector")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("config", AttributeType::Map(Box::new(AttributeType::String)))
                    .description("Connector type specific configuration")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("secrets", AttributeType::Map(Box::new(AttributeType::String)))
                    .description("Connector type specific secrets; never read back from Kibana")
                    .optional()
                    .computed()
                    .sensitive()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .build();

        ResourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let failed = |diagnostic: Diagnostic| CreateResourceResponse {
            new_state: DynamicValue::null(),
            diagnostics: vec![diagnostic],
        };

        let client = match self.client() {
            Ok(client) => client,
            Err(diag) => return failed(diag),
        };
        let model = match ConnectorModel::from_value(&request.planned_state) {
            Ok(model) => model,
            Err(diag) => return failed(diag),
        };
        let Some(connector_type_id) = model.connector_type_id.clone() else {
            return failed(
                Diagnostic::error(
                    "Missing connector_type_id",
                    "connector_type_id is required when creating a connector",
                )
                .with_attribute(AttributePath::new("connector_type_id")),
            );
        };

        let create_request = CreateConnectorRequest {
            name: model.name.clone(),
            connector_type_id,
            config: model.config,
            secrets: model.secrets.clone(),
        };
        let connector = match client.connectors().create(&create_request).await {
            Ok(connector) => connector,
            Err(e) => return failed(api_error("Failed to create connector", &e)),
        };
        tracing::info!("Created connector {} ({}) successfully", connector.id, model.name);

        match self
            .read_state(client, &connector.id, &request.planned_state, model.secrets)
            .await
        {
            Ok(Some(new_state)) => CreateResourceResponse {
                new_state,
                diagnostics: vec![],
            },
            Ok(None) => CreateResourceResponse {
                new_state: created_state(&request.planned_state, &connector.id),
                diagnostics: vec![Diagnostic::error(
                    "Connector disappeared after create",
                    format!("Connector {} was created but could not be read back", connector.id),
                )],
            },
            Err(diag) => CreateResourceResponse {
                new_state: created_state(&request.planned_state, &connector.id),
                diagnostics: vec![diag],
            },
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let Some(id) = state_id(&request.current_state) else {
            return ReadResourceResponse {
                new_state: None,
                diagnostics: vec![],
            };
        };
        let client = match self.client() {
            Ok(client) => client,
            Err(diag) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![diag],
                }
            }
        };

        let secrets = request
            .current_state
            .get_string_map(&AttributePath::new("secrets"))
            .unwrap_or_default();

        match self
            .read_state(client, &id, &request.current_state, secrets)
            .await
        {
            Ok(Some(new_state)) => {
                tracing::info!("Read connector {} successfully", id);
                ReadResourceResponse {
                    new_state: Some(new_state),
                    diagnostics: vec![],
                }
            }
            Ok(None) => {
                tracing::warn!("Connector {} not found - removing from state", id);
                ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                }
            }
            Err(diag) => ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![diag],
            },
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let failed = |diagnostic: Diagnostic| UpdateResourceResponse {
            new_state: request.prior_state.clone(),
            diagnostics: vec![diagnostic],
        };

        let client = match self.client() {
            Ok(client) => client,
            Err(diag) => return failed(diag),
        };
        let Some(id) = state_id(&request.prior_state) else {
            return failed(Diagnostic::error(
                "Missing connector id",
                "The prior state has no connector id to update",
            ));
        };
        let model = match ConnectorModel::from_value(&request.planned_state) {
            Ok(model) => model,
            Err(diag) => return failed(diag),
        };

        let update_request = UpdateConnectorRequest {
            name: model.name.clone(),
            config: model.config,
            secrets: model.secrets.clone(),
        };
        if let Err(e) = client.connectors().update(&id, &update_request).await {
            return failed(api_error("Failed to update connector", &e));
        }
        tracing::info!("Updated connector {} ({}) successfully", id, model.name);

        match self
            .read_state(client, &id, &request.planned_state, model.secrets)
            .await
        {
            Ok(Some(new_state)) => UpdateResourceResponse {
                new_state,
                diagnostics: vec![],
            },
            Ok(None) => failed(Diagnostic::error(
                "Connector disappeared after update",
                format!("Connector {} was updated but could not be read back", id),
            )),
            Err(diag) => failed(diag),
        }
    }

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let Some(id) = state_id(&request.prior_state) else {
            return DeleteResourceResponse { diagnostics: vec![] };
        };
        let client = match self.client() {
            Ok(client) => client,
            Err(diag) => {
                return DeleteResourceResponse {
                    diagnostics: vec![diag],
                }
            }
        };

        tracing::debug!("Connector ID: {}", id);
        match client.connectors().delete(&id).await {
            Ok(()) => {
                tracing::info!("Deleted connector {} successfully", id);
                DeleteResourceResponse { diagnostics: vec![] }
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!("Connector {} not found - removing from state", id);
                DeleteResourceResponse { diagnostics: vec![] }
            }
            Err(e) => DeleteResourceResponse {
                diagnostics: vec![api_error("Failed to delete connector", &e)],
            },
        }
    }

    fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for ConnectorResource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        match KibanaProviderData::from_any(request.provider_data) {
            Ok(data) => {
                self.provider_data = Some(data);
                ConfigureResourceResponse { diagnostics: vec![] }
            }
            Err(diag) => ConfigureResourceResponse {
                diagnostics: vec![diag],
            },
        }
    }
}

#[async_trait]
impl ResourceWithImportState for ConnectorResource {
    async fn import_state(
        &self,
        ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse::default();
        import_state_passthrough_id(&ctx, AttributePath::new("id"), &request, &mut response);
        response
    }
}
