//! In-process lifecycle driver
//!
//! ProviderRuntime drives a Provider the way Terraform core does over the
//! plugin protocol: configure, validate, plan, apply, read, import and
//! data source reads. Each operation gets a fresh resource or data source
//! instance from the provider's factories, configured with the provider data.

use crate::context::Context;
use crate::data_source::{
    ConfigureDataSourceRequest, DataSource as _, DataSourceSchemaRequest, DataSourceWithConfigure,
    ReadDataSourceRequest, ReadDataSourceResponse, ValidateDataSourceConfigRequest,
};
use crate::defaults::{Default as _, DefaultRequest};
use crate::error::TfplugError;
use crate::plan::plan_resource_change;
use crate::provider::{
    ConfigureProviderRequest, Provider, ProviderMetadataRequest, ProviderMetadataResponse,
    ProviderSchemaRequest,
};
use crate::resource::{
    ConfigureResourceRequest, CreateResourceRequest, DeleteResourceRequest,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource as _, ResourceSchemaRequest, ResourceWithConfigure,
    ResourceWithImportState as _, UpdateResourceRequest,
    ValidateResourceConfigRequest,
};
use crate::schema::Schema;
use crate::types::{
    has_errors, AttributePath, ClientCapabilities, Diagnostic, Dynamic, DynamicValue,
};
use crate::validator::validate_config;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

pub struct PlanResourceChangeResponse {
    pub planned_state: DynamicValue,
    pub requires_replace: Vec<AttributePath>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ApplyResourceChangeResponse {
    /// Null after a successful delete
    pub new_state: DynamicValue,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ProviderRuntime<P: Provider> {
    provider: P,
    provider_data: Option<Arc<dyn Any + Send + Sync>>,
    configured: bool,
    terraform_version: String,
    timeout: Option<Duration>,
}

impl<P: Provider> ProviderRuntime<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            provider_data: None,
            configured: false,
            terraform_version: "1.9.0".to_string(),
            timeout: None,
        }
    }

    /// Cancel any single operation that runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_terraform_version(mut self, version: &str) -> Self {
        self.terraform_version = version.to_string();
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    fn context(&self) -> Context {
        match self.timeout {
            Some(timeout) => Context::new().with_timeout(timeout),
            None => Context::new(),
        }
    }

    pub async fn metadata(&self) -> ProviderMetadataResponse {
        self.provider
            .metadata(self.context(), ProviderMetadataRequest)
            .await
    }

    pub async fn provider_schema(&self) -> Result<Schema, Vec<Diagnostic>> {
        let response = self
            .provider
            .schema(self.context(), ProviderSchemaRequest)
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(response.schema)
    }

    pub async fn resource_schema(&self, type_name: &str) -> Result<Schema, Vec<Diagnostic>> {
        let resource = self.resource_instance(type_name).map_err(|d| vec![d])?;
        let response = resource
            .schema(self.context(), ResourceSchemaRequest)
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(response.schema)
    }

    pub async fn data_source_schema(&self, type_name: &str) -> Result<Schema, Vec<Diagnostic>> {
        let data_source = self.data_source_instance(type_name).map_err(|d| vec![d])?;
        let response = data_source
            .schema(self.context(), DataSourceSchemaRequest)
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(response.schema)
    }

    /// Validate the provider config against its schema (after defaults) and configure
    pub async fn configure(&mut self, config: DynamicValue) -> Vec<Diagnostic> {
        let schema = match self.provider_schema().await {
            Ok(schema) => schema,
            Err(diagnostics) => return diagnostics,
        };

        let config = apply_config_defaults(&schema, config);
        let mut diagnostics = validate_config(&schema, &config);
        if has_errors(&diagnostics) {
            return diagnostics;
        }

        let ctx = self.context();
        let request = ConfigureProviderRequest {
            terraform_version: self.terraform_version.clone(),
            config,
            client_capabilities: ClientCapabilities::default(),
        };
        let response = match ctx.run(self.provider.configure(ctx.clone(), request)).await {
            Ok(response) => response,
            Err(e) => {
                diagnostics.push(error_diagnostic("Provider configuration failed", &e));
                return diagnostics;
            }
        };

        diagnostics.extend(response.diagnostics);
        if !has_errors(&diagnostics) {
            self.provider_data = response.provider_data;
            self.configured = true;
            tracing::debug!(provider = self.provider.type_name(), "provider configured");
        }
        diagnostics
    }

    pub async fn validate_resource_config(
        &self,
        type_name: &str,
        config: &DynamicValue,
    ) -> Vec<Diagnostic> {
        let resource = match self.resource_instance(type_name) {
            Ok(resource) => resource,
            Err(diagnostic) => return vec![diagnostic],
        };
        let schema = match resource
            .schema(self.context(), ResourceSchemaRequest)
            .await
        {
            response if has_errors(&response.diagnostics) => return response.diagnostics,
            response => response.schema,
        };

        let mut diagnostics = validate_config(&schema, config);
        if has_errors(&diagnostics) {
            return diagnostics;
        }

        let response = resource
            .validate(
                self.context(),
                ValidateResourceConfigRequest {
                    type_name: type_name.to_string(),
                    config: config.clone(),
                    client_capabilities: ClientCapabilities::default(),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        diagnostics
    }

    /// Validate `config` and plan the change from `prior_state`.
    /// A null config plans a destroy; a null prior state plans a create.
    pub async fn plan_resource_change(
        &self,
        type_name: &str,
        prior_state: &DynamicValue,
        config: &DynamicValue,
    ) -> PlanResourceChangeResponse {
        let mut diagnostics = Vec::new();
        if !config.is_null() {
            diagnostics = self.validate_resource_config(type_name, config).await;
            if has_errors(&diagnostics) {
                return PlanResourceChangeResponse {
                    planned_state: prior_state.clone(),
                    requires_replace: Vec::new(),
                    diagnostics,
                };
            }
        }

        let schema = match self.resource_schema(type_name).await {
            Ok(schema) => schema,
            Err(schema_diagnostics) => {
                diagnostics.extend(schema_diagnostics);
                return PlanResourceChangeResponse {
                    planned_state: prior_state.clone(),
                    requires_replace: Vec::new(),
                    diagnostics,
                };
            }
        };

        let planned = plan_resource_change(&schema, prior_state, config);
        tracing::debug!(
            type_name = %type_name,
            has_changes = planned.has_changes(prior_state),
            requires_replace = planned.requires_replace.len(),
            "planned resource change"
        );
        diagnostics.extend(planned.diagnostics);

        PlanResourceChangeResponse {
            planned_state: planned.planned_state,
            requires_replace: planned.requires_replace,
            diagnostics,
        }
    }

    /// Apply a planned change: create when the prior state is null, delete
    /// when the planned state is null, update otherwise
    pub async fn apply_resource_change(
        &self,
        type_name: &str,
        prior_state: &DynamicValue,
        planned_state: &DynamicValue,
        config: &DynamicValue,
    ) -> ApplyResourceChangeResponse {
        let ctx = self.context();
        let resource = match self.configured_resource(&ctx, type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                return ApplyResourceChangeResponse {
                    new_state: prior_state.clone(),
                    diagnostics,
                }
            }
        };

        match (prior_state.is_null(), planned_state.is_null()) {
            (true, true) => ApplyResourceChangeResponse {
                new_state: DynamicValue::null(),
                diagnostics: Vec::new(),
            },
            (true, false) => {
                let request = CreateResourceRequest {
                    type_name: type_name.to_string(),
                    planned_state: planned_state.clone(),
                    config: config.clone(),
                };
                match ctx.run(resource.create(ctx.clone(), request)).await {
                    // a failed create may still report an object that exists
                    Ok(response) if has_errors(&response.diagnostics) => {
                        ApplyResourceChangeResponse {
                            new_state: response.new_state,
                            diagnostics: response.diagnostics,
                        }
                    }
                    Ok(response) => checked_new_state(response.new_state, response.diagnostics),
                    Err(e) => ApplyResourceChangeResponse {
                        new_state: DynamicValue::null(),
                        diagnostics: vec![error_diagnostic("Create failed", &e)],
                    },
                }
            }
            (false, true) => {
                let request = DeleteResourceRequest {
                    type_name: type_name.to_string(),
                    prior_state: prior_state.clone(),
                };
                match ctx.run(resource.delete(ctx.clone(), request)).await {
                    Ok(response) if has_errors(&response.diagnostics) => {
                        ApplyResourceChangeResponse {
                            new_state: prior_state.clone(),
                            diagnostics: response.diagnostics,
                        }
                    }
                    Ok(response) => ApplyResourceChangeResponse {
                        new_state: DynamicValue::null(),
                        diagnostics: response.diagnostics,
                    },
                    Err(e) => ApplyResourceChangeResponse {
                        new_state: prior_state.clone(),
                        diagnostics: vec![error_diagnostic("Delete failed", &e)],
                    },
                }
            }
            (false, false) => {
                let request = UpdateResourceRequest {
                    type_name: type_name.to_string(),
                    prior_state: prior_state.clone(),
                    planned_state: planned_state.clone(),
                    config: config.clone(),
                };
                match ctx.run(resource.update(ctx.clone(), request)).await {
                    Ok(response) if has_errors(&response.diagnostics) => {
                        ApplyResourceChangeResponse {
                            new_state: prior_state.clone(),
                            diagnostics: response.diagnostics,
                        }
                    }
                    Ok(response) => checked_new_state(response.new_state, response.diagnostics),
                    Err(e) => ApplyResourceChangeResponse {
                        new_state: prior_state.clone(),
                        diagnostics: vec![error_diagnostic("Update failed", &e)],
                    },
                }
            }
        }
    }

    /// Refresh `current_state`; a None new_state means the object is gone
    pub async fn read_resource(
        &self,
        type_name: &str,
        current_state: &DynamicValue,
    ) -> ReadResourceResponse {
        let ctx = self.context();
        let resource = match self.configured_resource(&ctx, type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                return ReadResourceResponse {
                    new_state: Some(current_state.clone()),
                    diagnostics,
                }
            }
        };

        let request = ReadResourceRequest {
            type_name: type_name.to_string(),
            current_state: current_state.clone(),
            client_capabilities: ClientCapabilities::default(),
        };
        match ctx.run(resource.read(ctx.clone(), request)).await {
            Ok(response) => response,
            Err(e) => ReadResourceResponse {
                new_state: Some(current_state.clone()),
                diagnostics: vec![error_diagnostic("Read failed", &e)],
            },
        }
    }

    /// Import by id, then read each imported object to fill in its state
    pub async fn import_resource_state(
        &self,
        type_name: &str,
        id: &str,
    ) -> ImportResourceStateResponse {
        let ctx = self.context();
        let resource = match self.configured_resource(&ctx, type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                return ImportResourceStateResponse {
                    imported_resources: Vec::new(),
                    diagnostics,
                }
            }
        };

        let Some(importer) = resource.as_import_state() else {
            return ImportResourceStateResponse {
                imported_resources: Vec::new(),
                diagnostics: vec![error_diagnostic(
                    "Import failed",
                    &TfplugError::ImportNotSupported(type_name.to_string()),
                )],
            };
        };

        let request = ImportResourceStateRequest {
            type_name: type_name.to_string(),
            id: id.to_string(),
            client_capabilities: ClientCapabilities::default(),
        };
        let mut response = match ctx.run(importer.import_state(ctx.clone(), request)).await {
            Ok(response) => response,
            Err(e) => {
                return ImportResourceStateResponse {
                    imported_resources: Vec::new(),
                    diagnostics: vec![error_diagnostic("Import failed", &e)],
                }
            }
        };
        if has_errors(&response.diagnostics) {
            response.imported_resources.clear();
            return response;
        }

        let mut imported = Vec::with_capacity(response.imported_resources.len());
        for mut resource_state in response.imported_resources {
            let read = self
                .read_resource(&resource_state.type_name, &resource_state.state)
                .await;
            response.diagnostics.extend(read.diagnostics);
            match read.new_state {
                Some(state) => {
                    resource_state.state = state;
                    imported.push(resource_state);
                }
                None => response.diagnostics.push(Diagnostic::error(
                    "Cannot import non-existent remote object",
                    format!(
                        "While attempting to import an existing object to {}, the provider detected that no object exists with the given id {}",
                        type_name, id
                    ),
                )),
            }
        }
        if has_errors(&response.diagnostics) {
            imported.clear();
        }
        response.imported_resources = imported;
        response
    }

    pub async fn read_data_source(
        &self,
        type_name: &str,
        config: &DynamicValue,
    ) -> ReadDataSourceResponse {
        let ctx = self.context();
        let failed = |diagnostics| ReadDataSourceResponse {
            state: DynamicValue::null(),
            diagnostics,
        };

        if !self.configured {
            return failed(vec![error_diagnostic(
                "Data source read failed",
                &TfplugError::ProviderNotConfigured,
            )]);
        }
        let mut data_source = match self.data_source_instance(type_name) {
            Ok(data_source) => data_source,
            Err(diagnostic) => return failed(vec![diagnostic]),
        };

        let schema = data_source
            .schema(ctx.clone(), DataSourceSchemaRequest)
            .await;
        if has_errors(&schema.diagnostics) {
            return failed(schema.diagnostics);
        }
        let mut diagnostics = validate_config(&schema.schema, config);
        if has_errors(&diagnostics) {
            return failed(diagnostics);
        }
        let validation = data_source
            .validate(
                ctx.clone(),
                ValidateDataSourceConfigRequest {
                    type_name: type_name.to_string(),
                    config: config.clone(),
                },
            )
            .await;
        diagnostics.extend(validation.diagnostics);
        if has_errors(&diagnostics) {
            return failed(diagnostics);
        }

        let configured = data_source
            .configure(
                ctx.clone(),
                ConfigureDataSourceRequest {
                    provider_data: self.provider_data.clone(),
                },
            )
            .await;
        diagnostics.extend(configured.diagnostics);
        if has_errors(&diagnostics) {
            return failed(diagnostics);
        }

        let request = ReadDataSourceRequest {
            type_name: type_name.to_string(),
            config: config.clone(),
            client_capabilities: ClientCapabilities::default(),
        };
        match ctx.run(data_source.read(ctx.clone(), request)).await {
            Ok(mut response) => {
                diagnostics.append(&mut response.diagnostics);
                response.diagnostics = diagnostics;
                response
            }
            Err(e) => {
                diagnostics.push(error_diagnostic("Data source read failed", &e));
                failed(diagnostics)
            }
        }
    }

    fn resource_instance(
        &self,
        type_name: &str,
    ) -> Result<Box<dyn ResourceWithConfigure>, Diagnostic> {
        self.provider
            .resources()
            .get(type_name)
            .map(|factory| factory())
            .ok_or_else(|| {
                error_diagnostic(
                    "Unknown resource type",
                    &TfplugError::ResourceNotFound(type_name.to_string()),
                )
            })
    }

    fn data_source_instance(
        &self,
        type_name: &str,
    ) -> Result<Box<dyn DataSourceWithConfigure>, Diagnostic> {
        self.provider
            .data_sources()
            .get(type_name)
            .map(|factory| factory())
            .ok_or_else(|| {
                error_diagnostic(
                    "Unknown data source type",
                    &TfplugError::DataSourceNotFound(type_name.to_string()),
                )
            })
    }

    async fn configured_resource(
        &self,
        ctx: &Context,
        type_name: &str,
    ) -> Result<Box<dyn ResourceWithConfigure>, Vec<Diagnostic>> {
        if !self.configured {
            return Err(vec![error_diagnostic(
                "Resource operation failed",
                &TfplugError::ProviderNotConfigured,
            )]);
        }
        let mut resource = self.resource_instance(type_name).map_err(|d| vec![d])?;
        let response = resource
            .configure(
                ctx.clone(),
                ConfigureResourceRequest {
                    provider_data: self.provider_data.clone(),
                },
            )
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(resource)
    }
}

/// Fill null optional attributes that carry a default
fn apply_config_defaults(schema: &Schema, mut config: DynamicValue) -> DynamicValue {
    if config.is_null() {
        config = DynamicValue::object();
    }
    for attr in &schema.block.attributes {
        let Some(default) = attr.default.as_ref().filter(|_| attr.optional) else {
            continue;
        };
        let path = AttributePath::new(&attr.name);
        if config.get(&path).map_or(true, Dynamic::is_null) {
            let value = default
                .default_value(DefaultRequest {
                    attribute_path: path.clone(),
                })
                .value;
            if let Err(e) = config.set(&path, value) {
                tracing::warn!(attribute = %attr.name, "failed to apply default: {}", e);
            }
        }
    }
    config
}

/// Terraform rejects applied state that still contains unknown values
fn checked_new_state(
    new_state: DynamicValue,
    mut diagnostics: Vec<Diagnostic>,
) -> ApplyResourceChangeResponse {
    if contains_unknown(&new_state.value) {
        diagnostics.push(Diagnostic::error(
            "Provider returned invalid result object after apply",
            "The new state contains unknown values; all attributes must be known after apply",
        ));
    }
    ApplyResourceChangeResponse {
        new_state,
        diagnostics,
    }
}

fn contains_unknown(value: &Dynamic) -> bool {
    match value {
        Dynamic::Unknown => true,
        Dynamic::List(items) => items.iter().any(contains_unknown),
        Dynamic::Map(entries) => entries.values().any(contains_unknown),
        _ => false,
    }
}

fn error_diagnostic(summary: &str, error: &TfplugError) -> Diagnostic {
    Diagnostic::error(summary, error.to_string())
}
