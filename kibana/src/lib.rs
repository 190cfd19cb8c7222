pub mod api;
pub mod data_sources;
pub mod json;
pub mod provider_data;
pub mod resources;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::data_source::DataSourceWithConfigure;
use tfplug::defaults::EnvDefault;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory, Provider,
    ProviderMetadataRequest, ProviderMetadataResponse, ProviderSchemaRequest,
    ProviderSchemaResponse, ResourceFactory,
};
use tfplug::resource::ResourceWithConfigure;
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, DynamicValue};

use api::{Auth, Client, ClientConfig};
use data_sources::ConnectorTypesDataSource;
use provider_data::KibanaProviderData;
use resources::{AlertRuleResource, ConnectorResource};

#[derive(Default)]
pub struct KibanaProvider {
    provider_data: Option<KibanaProviderData>,
}

impl KibanaProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Config value, falling back to `env_var` when unset
fn string_setting(config: &DynamicValue, name: &str, env_var: &str) -> Option<String> {
    config
        .get_optional_string(&AttributePath::new(name))
        .ok()
        .flatten()
        .or_else(|| std::env::var(env_var).ok())
        .filter(|value| !value.is_empty())
}

fn bool_setting(config: &DynamicValue, name: &str, env_var: &str) -> bool {
    config
        .get_optional_bool(&AttributePath::new(name))
        .ok()
        .flatten()
        .or_else(|| {
            std::env::var(env_var)
                .ok()
                .and_then(|v| v.trim().parse::<bool>().ok())
        })
        .unwrap_or(false)
}

/// API key wins over basic credentials; basic needs both halves
fn auth_from(api_key: Option<String>, username: Option<String>, password: Option<String>) -> Auth {
    match (api_key, username, password) {
        (Some(key), _, _) => Auth::ApiKey(key),
        (None, Some(username), Some(password)) => Auth::Basic { username, password },
        _ => Auth::None,
    }
}

#[async_trait]
impl Provider for KibanaProvider {
    fn type_name(&self) -> &str {
        "kibana"
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ProviderMetadataRequest,
    ) -> ProviderMetadataResponse {
        ProviderMetadataResponse {
            type_name: "kibana".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    async fn schema(&self, _ctx: Context, _request: ProviderSchemaRequest) -> ProviderSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manages Kibana alerting connectors and rules")
            .attribute(
                AttributeBuilder::new("url", AttributeType::String)
                    .description("Kibana base URL, e.g. https://kibana.example.com:5601")
                    .optional()
                    .default(EnvDefault::without_fallback("KIBANA_URL"))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("username", AttributeType::String)
                    .description("Username for HTTP basic authentication")
                    .optional()
                    .default(EnvDefault::without_fallback("KIBANA_USERNAME"))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("password", AttributeType::String)
                    .description("Password for HTTP basic authentication")
                    .optional()
                    .sensitive()
                    .default(EnvDefault::without_fallback("KIBANA_PASSWORD"))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("api_key", AttributeType::String)
                    .description("Encoded API key; takes precedence over username and password")
                    .optional()
                    .sensitive()
                    .default(EnvDefault::without_fallback("KIBANA_API_KEY"))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("insecure", AttributeType::Bool)
                    .description("Skip TLS certificate verification (KIBANA_INSECURE)")
                    .optional()
                    .build(),
            )
            .build();

        ProviderSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        let failed = |diagnostic: Diagnostic| ConfigureProviderResponse {
            diagnostics: vec![diagnostic],
            provider_data: None,
        };
        let config = &request.config;

        let Some(url) = string_setting(config, "url", "KIBANA_URL") else {
            return failed(
                Diagnostic::error(
                    "url is required",
                    "Set url in the provider configuration or the KIBANA_URL environment variable",
                )
                .with_attribute(AttributePath::new("url")),
            );
        };
        let auth = auth_from(
            string_setting(config, "api_key", "KIBANA_API_KEY"),
            string_setting(config, "username", "KIBANA_USERNAME"),
            string_setting(config, "password", "KIBANA_PASSWORD"),
        );
        let insecure = bool_setting(config, "insecure", "KIBANA_INSECURE");
        tracing::debug!("Configuring Kibana client for {} (auth: {:?})", url, auth);

        let client_config = ClientConfig::new(&url)
            .with_auth(auth)
            .with_insecure(insecure);
        let client = match Client::new(client_config) {
            Ok(client) => client,
            Err(e) => {
                return failed(
                    Diagnostic::error("Failed to create API client", e.to_string())
                        .with_attribute(AttributePath::new("url")),
                )
            }
        };

        let data = KibanaProviderData::new(client);
        self.provider_data = Some(data.clone());
        tracing::info!("Kibana provider configured for {}", url);

        ConfigureProviderResponse {
            diagnostics: vec![],
            provider_data: Some(Arc::new(data)),
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut factories: HashMap<String, ResourceFactory> = HashMap::new();
        factories.insert(
            "kibana_connector".to_string(),
            Box::new(|| Box::new(ConnectorResource::new()) as Box<dyn ResourceWithConfigure>),
        );
        factories.insert(
            "kibana_alert_rule".to_string(),
            Box::new(|| Box::new(AlertRuleResource::new()) as Box<dyn ResourceWithConfigure>),
        );
        factories
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        let mut factories: HashMap<String, DataSourceFactory> = HashMap::new();
        factories.insert(
            "kibana_connector_types".to_string(),
            Box::new(|| {
                Box::new(ConnectorTypesDataSource::new()) as Box<dyn DataSourceWithConfigure>
            }),
        );
        factories
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tfplug::data_source::DataSource as _;
    use tfplug::resource::Resource as _;
    use tfplug::types::ClientCapabilities;

    const ENV_VARS: [&str; 5] = [
        "KIBANA_URL",
        "KIBANA_USERNAME",
        "KIBANA_PASSWORD",
        "KIBANA_API_KEY",
        "KIBANA_INSECURE",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    fn request(config: DynamicValue) -> ConfigureProviderRequest {
        ConfigureProviderRequest {
            terraform_version: "1.9.0".to_string(),
            config,
            client_capabilities: ClientCapabilities::default(),
        }
    }

    #[tokio::test]
    #[serial]
    async fn provider_configures_successfully_with_env_vars() {
        clear_env();
        std::env::set_var("KIBANA_URL", "https://localhost:5601");
        std::env::set_var("KIBANA_API_KEY", "c2VjcmV0");
        std::env::set_var("KIBANA_INSECURE", "true");

        let mut provider = KibanaProvider::new();
        let response = provider
            .configure(Context::new(), request(DynamicValue::object()))
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert!(response.provider_data.is_some());
        let data = provider.provider_data.as_ref().unwrap();
        assert_eq!(data.client.base_url(), "https://localhost:5601");

        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn config_values_take_precedence_over_env() {
        clear_env();
        std::env::set_var("KIBANA_URL", "ftp://ignored");

        let mut config = DynamicValue::object();
        config
            .set_string(&AttributePath::new("url"), "http://kibana:5601/".to_string())
            .unwrap();
        let mut provider = KibanaProvider::new();
        let response = provider.configure(Context::new(), request(config)).await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let data = provider.provider_data.as_ref().unwrap();
        assert_eq!(data.client.base_url(), "http://kibana:5601");

        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn provider_configure_requires_url() {
        clear_env();

        let mut provider = KibanaProvider::new();
        let response = provider
            .configure(Context::new(), request(DynamicValue::object()))
            .await;

        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0].summary.contains("url is required"));
        assert!(response.provider_data.is_none());
    }

    #[tokio::test]
    #[serial]
    async fn provider_configure_rejects_non_http_url() {
        clear_env();
        std::env::set_var("KIBANA_URL", "ftp://kibana");

        let mut provider = KibanaProvider::new();
        let response = provider
            .configure(Context::new(), request(DynamicValue::object()))
            .await;

        assert_eq!(response.diagnostics[0].summary, "Failed to create API client");
        assert!(provider.provider_data.is_none());

        clear_env();
    }

    #[test]
    fn api_key_wins_and_basic_needs_both_halves() {
        let some = |s: &str| Some(s.to_string());
        assert!(matches!(
            auth_from(some("key"), some("elastic"), some("changeme")),
            Auth::ApiKey(key) if key == "key"
        ));
        assert!(matches!(
            auth_from(None, some("elastic"), some("changeme")),
            Auth::Basic { .. }
        ));
        assert!(matches!(auth_from(None, some("elastic"), None), Auth::None));
        assert!(matches!(auth_from(None, None, None), Auth::None));
    }

    #[test]
    #[serial]
    fn insecure_env_is_parsed_leniently() {
        clear_env();
        std::env::set_var("KIBANA_INSECURE", " true ");
        assert!(bool_setting(&DynamicValue::object(), "insecure", "KIBANA_INSECURE"));
        std::env::set_var("KIBANA_INSECURE", "yes please");
        assert!(!bool_setting(&DynamicValue::object(), "insecure", "KIBANA_INSECURE"));
        clear_env();
    }

    #[test]
    fn metadata_reports_crate_version() {
        let provider = KibanaProvider::new();
        let metadata = tokio_test::block_on(provider.metadata(Context::new(), ProviderMetadataRequest));
        assert_eq!(metadata.type_name, "kibana");
        assert_eq!(metadata.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn factories_cover_every_type() {
        let provider = KibanaProvider::new();
        let resources = provider.resources();
        assert!(resources.contains_key("kibana_connector"));
        assert!(resources.contains_key("kibana_alert_rule"));
        for (name, factory) in &resources {
            assert_eq!(factory().type_name(), name);
        }

        let data_sources = provider.data_sources();
        assert_eq!(
            data_sources["kibana_connector_types"]().type_name(),
            "kibana_connector_types"
        );
    }

    #[test]
    fn schema_marks_credentials_sensitive() {
        let provider = KibanaProvider::new();
        let schema = tokio_test::block_on(provider.schema(Context::new(), ProviderSchemaRequest)).schema;
        assert!(schema.attribute("password").unwrap().sensitive);
        assert!(schema.attribute("api_key").unwrap().sensitive);
        assert!(!schema.attribute("url").unwrap().sensitive);
    }
}
