//! Connector types data source implementation

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceSchemaRequest,
    DataSourceSchemaResponse, DataSourceWithConfigure, ReadDataSourceRequest,
    ReadDataSourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};

use crate::api::ConnectorType;
use crate::provider_data::KibanaProviderData;
use crate::resources::{api_error, not_configured, state_error};

/// Kibana has a single connector type catalogue, so the id is fixed
const DATA_SOURCE_ID: &str = "0";

#[derive(Default)]
pub struct ConnectorTypesDataSource {
    provider_data: Option<KibanaProviderData>,
}

impl ConnectorTypesDataSource {
    pub fn new() -> Self {
        Self::default()
    }
}

fn connector_type_attribute() -> AttributeType {
    AttributeType::object([
        ("id", AttributeType::String),
        ("name", AttributeType::String),
        ("enabled", AttributeType::Bool),
        ("enabled_in_config", AttributeType::Bool),
        ("enabled_in_license", AttributeType::Bool),
        ("minimum_license_required", AttributeType::String),
        (
            "supported_feature_ids",
            AttributeType::List(Box::new(AttributeType::String)),
        ),
    ])
}

fn connector_type_value(connector_type: &ConnectorType) -> Dynamic {
    Dynamic::Map(
        [
            ("id", Dynamic::String(connector_type.id.clone())),
            ("name", Dynamic::String(connector_type.name.clone())),
            ("enabled", Dynamic::Bool(connector_type.enabled)),
            ("enabled_in_config", Dynamic::Bool(connector_type.enabled_in_config)),
            ("enabled_in_license", Dynamic::Bool(connector_type.enabled_in_license)),
            (
                "minimum_license_required",
                Dynamic::String(connector_type.minimum_license_required.clone()),
            ),
            (
                "supported_feature_ids",
                Dynamic::string_list(connector_type.supported_feature_ids.iter().cloned()),
            ),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect(),
    )
}

fn connector_types_state(types: &[ConnectorType]) -> Result<DynamicValue, Diagnostic> {
    let mut state = DynamicValue::object();
    state
        .set_string(&AttributePath::new("id"), DATA_SOURCE_ID.to_string())
        .and_then(|_| {
            state.set_list(
                &AttributePath::new("connector_types"),
                types.iter().map(connector_type_value).collect(),
            )
        })
        .map_err(state_error)?;
    Ok(state)
}

#[async_trait]
impl DataSource for ConnectorTypesDataSource {
    fn type_name(&self) -> &str {
        "kibana_connector_types"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Lists the connector types available in Kibana")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("The data source ID")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "connector_types",
                    AttributeType::List(Box::new(connector_type_attribute())),
                )
                .description("Every connector type with its enablement and license tier")
                .computed()
                .build(),
            )
            .build();

        DataSourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn read(&self, _ctx: Context, _request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let failed = |diagnostic: Diagnostic| ReadDataSourceResponse {
            state: DynamicValue::null(),
            diagnostics: vec![diagnostic],
        };

        let Some(provider_data) = &self.provider_data else {
            return failed(not_configured());
        };

        let types = match provider_data.client.connectors().list_types().await {
            Ok(types) => types,
            Err(e) => return failed(api_error("Failed to list connector types", &e)),
        };
        tracing::debug!("Read {} connector types", types.len());

        match connector_types_state(&types) {
            Ok(state) => ReadDataSourceResponse {
                state,
                diagnostics: vec![],
            },
            Err(diag) => failed(diag),
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for ConnectorTypesDataSource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        match KibanaProviderData::from_any(request.provider_data) {
            Ok(data) => {
                self.provider_data = Some(data);
                ConfigureDataSourceResponse { diagnostics: vec![] }
            }
            Err(diag) => ConfigureDataSourceResponse {
                diagnostics: vec![diag],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Client, ClientConfig};
    use mockito::Server;
    use serde_json::json;
    use tfplug::types::ClientCapabilities;

    fn read_request() -> ReadDataSourceRequest {
        ReadDataSourceRequest {
            type_name: "kibana_connector_types".to_string(),
            config: DynamicValue::object(),
            client_capabilities: ClientCapabilities::default(),
        }
    }

    #[tokio::test]
    async fn read_maps_every_connector_type() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/actions/connector_types")
            .with_body(
                json!([
                    {
                        "id": ".server-log",
                        "name": "Server log",
                        "enabled": true,
                        "enabled_in_config": true,
                        "enabled_in_license": true,
                        "minimum_license_required": "basic",
                        "supported_feature_ids": ["alerting", "siem"]
                    },
                    {
                        "id": ".jira",
                        "name": "Jira",
                        "enabled": false,
                        "enabled_in_config": true,
                        "enabled_in_license": false,
                        "minimum_license_required": "gold",
                        "supported_feature_ids": ["cases"]
                    }
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let client = Client::new(ClientConfig::new(&server.url())).unwrap();
        let data_source = ConnectorTypesDataSource {
            provider_data: Some(KibanaProviderData::new(client)),
        };
        let response = data_source.read(Context::new(), read_request()).await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert_eq!(response.state.get_string(&AttributePath::new("id")).unwrap(), "0");
        let jira = AttributePath::new("connector_types").index(1);
        assert_eq!(
            response
                .state
                .get_string(&jira.clone().attribute("minimum_license_required"))
                .unwrap(),
            "gold"
        );
        assert!(!response.state.get_bool(&jira.clone().attribute("enabled")).unwrap());
        assert_eq!(
            response
                .state
                .get_string_list(&AttributePath::new("connector_types").index(0).attribute("supported_feature_ids"))
                .unwrap(),
            vec!["alerting", "siem"]
        );
    }

    #[tokio::test]
    async fn read_without_configuration_fails() {
        let response = ConnectorTypesDataSource::new()
            .read(Context::new(), read_request())
            .await;
        assert_eq!(response.diagnostics[0].summary, "Provider not configured");
        assert!(response.state.is_null());
    }

    #[tokio::test]
    async fn read_reports_api_errors() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/actions/connector_types")
            .with_status(403)
            .with_body(r#"{"statusCode":403,"error":"Forbidden","message":"no access"}"#)
            .create_async()
            .await;

        let client = Client::new(ClientConfig::new(&server.url())).unwrap();
        let data_source = ConnectorTypesDataSource {
            provider_data: Some(KibanaProviderData::new(client)),
        };
        let response = data_source.read(Context::new(), read_request()).await;
        assert_eq!(response.diagnostics[0].summary, "Failed to list connector types");
        assert!(response.diagnostics[0].detail.contains("no access"));
    }

    #[tokio::test]
    async fn read_fails_when_the_types_endpoint_is_missing() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/actions/connector_types")
            .with_status(404)
            .with_body(r#"{"statusCode":404,"error":"Not Found","message":"Not Found"}"#)
            .create_async()
            .await;

        let client = Client::new(ClientConfig::new(&server.url())).unwrap();
        let data_source = ConnectorTypesDataSource {
            provider_data: Some(KibanaProviderData::new(client)),
        };
        let response = data_source.read(Context::new(), read_request()).await;
        assert!(tfplug::types::has_errors(&response.diagnostics));
        assert_eq!(response.diagnostics[0].summary, "Failed to list connector types");
        assert!(response.state.is_null());
    }
}
