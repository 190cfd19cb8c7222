//! Alert rule resource implementation

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
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
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::{MapEntryPattern, StringLength, StringOneOf};

use super::actions::{
    deflate_actions, flatten_actions, from_dynamic_list, reconcile_params, to_dynamic_list,
    ActionParamsJson, ActionRecord, SuppressEquivalentActionParams,
};
use super::{api_error, created_state, list_or_null, not_configured, state_error, state_id};
use crate::api::{AlertRule, Client, CreateRuleRequest, Schedule, UpdateRuleRequest};
use crate::json::{semantic_eq, RawJson, SuppressEquivalentJson, ValidJson};
use crate::provider_data::KibanaProviderData;

pub const NOTIFY_WHEN_VALUES: [&str; 3] =
    ["onActionGroupChange", "onActiveAlert", "onThrottleInterval"];

/// Schedule intervals Kibana accepts, e.g. 30s, 5m, 1h, 1d
fn interval_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]+[smhd]$").expect("Invalid Regex"))
}

#[derive(Default)]
pub struct AlertRuleResource {
    provider_data: Option<KibanaProviderData>,
}

impl AlertRuleResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&Client, Diagnostic> {
        self.provider_data
            .as_ref()
            .map(|data| data.client.as_ref())
            .ok_or_else(not_configured)
    }

    fn schema_definition() -> Schema {
        let schedule = AttributeBuilder::new("schedule", AttributeType::Map(Box::new(AttributeType::String)))
            .description("When the rule runs; a map with a single `interval` key such as 1m")
            .required()
            .validator(MapEntryPattern::new(
                "interval",
                interval_pattern().clone(),
                "a duration such as 10s, 5m, 1h or 1d",
            ));

        SchemaBuilder::new()
            .version(0)
            .description("Manages a Kibana alerting rule")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Rule ID assigned by Kibana")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("A name to reference and search")
                    .required()
                    .validator(StringLength::at_least(1))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("tags", AttributeType::List(Box::new(AttributeType::String)))
                    .description("Keywords to reference and search")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("rule_type_id", AttributeType::String)
                    .description("The rule type to run; changing it recreates the rule")
                    .required()
                    .plan_modifier(RequiresReplaceIfChanged)
                    .build(),
            )
            .attribute(schedule.build())
            .attribute(
                AttributeBuilder::new("throttle", AttributeType::String)
                    .description("How often the rule may fire the same actions, e.g. 10m")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("notify_when", AttributeType::String)
                    .description("When actions run: onActionGroupChange, onActiveAlert or onThrottleInterval")
                    .required()
                    .validator(StringOneOf::new(NOTIFY_WHEN_VALUES))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("enabled", AttributeType::Bool)
                    .description("Whether the rule runs on its schedule")
                    .optional()
                    .computed()
                    .default(StaticDefault::bool(true))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("consumer", AttributeType::String)
                    .description("The application that owns the rule; changing it recreates the rule")
                    .required()
                    .plan_modifier(RequiresReplaceIfChanged)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("params", AttributeType::String)
                    .description("Rule type parameters as a JSON document")
                    .required()
                    .validator(ValidJson)
                    .plan_modifier(SuppressEquivalentJson)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("actions", AttributeType::List(Box::new(ActionRecord::attribute_type())))
                    .description("Actions to run; each has a connector id, an action group and JSON params")
                    .optional()
                    .validator(ActionParamsJson)
                    .plan_modifier(SuppressEquivalentActionParams)
                    .build(),
            )
            .build()
    }
}

/// Rule fields as the user planned them
#[derive(Debug, Clone, PartialEq)]
struct AlertRuleModel {
    name: String,
    tags: Vec<String>,
    rule_type_id: String,
    consumer: String,
    schedule: Schedule,
    throttle: Option<String>,
    notify_when: String,
    enabled: bool,
    params: String,
    actions: Vec<ActionRecord>,
}

impl AlertRuleModel {
    fn from_value(value: &DynamicValue) -> Result<Self, Diagnostic> {
        let invalid = |name: &str| {
            let path = AttributePath::new(name);
            move |e: tfplug::TfplugError| {
                Diagnostic::error(format!("Invalid {}", path), e.to_string()).with_attribute(path)
            }
        };
        let required = |name: &str| {
            value
                .get_string(&AttributePath::new(name))
                .map_err(invalid(name))
        };

        let schedule = value
            .get_string_map(&AttributePath::new("schedule"))
            .map_err(invalid("schedule"))?;
        let interval = schedule.get("interval").cloned().ok_or_else(|| {
            Diagnostic::error("Invalid schedule", "schedule must contain 'interval'")
                .with_attribute(AttributePath::new("schedule"))
        })?;

        let actions_path = AttributePath::new("actions");
        let actions = from_dynamic_list(value.get(&actions_path), &actions_path).map_err(|e| {
            Diagnostic::error("Invalid actions", e.to_string()).with_attribute(actions_path.clone())
        })?;

        Ok(Self {
            name: required("name")?,
            tags: value
                .get_string_list(&AttributePath::new("tags"))
                .map_err(invalid("tags"))?,
            rule_type_id: required("rule_type_id")?,
            consumer: required("consumer")?,
            schedule: Schedule { interval },
            throttle: value
                .get_optional_string(&AttributePath::new("throttle"))
                .map_err(invalid("throttle"))?,
            notify_when: required("notify_when")?,
            enabled: value
                .get_optional_bool(&AttributePath::new("enabled"))
                .map_err(invalid("enabled"))?
                .unwrap_or(true),
            params: required("params")?,
            actions,
        })
    }

    fn create_request(&self) -> CreateRuleRequest {
        CreateRuleRequest {
            name: self.name.clone(),
            tags: self.tags.clone(),
            rule_type_id: self.rule_type_id.clone(),
            consumer: self.consumer.clone(),
            schedule: self.schedule.clone(),
            throttle: self.throttle.clone(),
            notify_when: self.notify_when.clone(),
            enabled: self.enabled,
            params: RawJson::new(self.params.clone()),
            actions: deflate_actions(&self.actions),
        }
    }

    fn update_request(&self) -> UpdateRuleRequest {
        UpdateRuleRequest {
            name: self.name.clone(),
            tags: self.tags.clone(),
            schedule: self.schedule.clone(),
            throttle: self.throttle.clone(),
            notify_when: self.notify_when.clone(),
            params: RawJson::new(self.params.clone()),
            actions: deflate_actions(&self.actions),
        }
    }
}

/// State for `rule`. Where `previous` holds the same JSON document as the
/// remote, its text is kept.
fn rule_state(rule: &AlertRule, previous: &DynamicValue) -> Result<DynamicValue, Diagnostic> {
    let params = rule
        .params
        .parse()
        .and_then(|value| serde_json::to_string(&value))
        .map_err(|e| Diagnostic::error("Invalid rule params from Kibana", e.to_string()))?;
    let params = match previous.get_optional_string(&AttributePath::new("params")) {
        Ok(Some(prior)) if semantic_eq(&prior, &params) => prior,
        _ => params,
    };

    let actions_path = AttributePath::new("actions");
    let remote_actions = flatten_actions(&rule.actions)
        .map_err(|e| Diagnostic::error("Invalid rule actions from Kibana", e.to_string()))?;
    let previous_actions = from_dynamic_list(previous.get(&actions_path), &actions_path)
        .unwrap_or_default();
    let actions = reconcile_params(&previous_actions, remote_actions);

    let mut state = DynamicValue::object();
    let build = |state: &mut DynamicValue| -> tfplug::Result<()> {
        state.set_string(&AttributePath::new("id"), rule.id.clone())?;
        state.set_string(&AttributePath::new("name"), rule.name.clone())?;
        state.set(
            &AttributePath::new("tags"),
            list_or_null(
                rule.tags.iter().cloned().map(Dynamic::String).collect(),
                previous.get(&AttributePath::new("tags")),
            ),
        )?;
        state.set_string(&AttributePath::new("rule_type_id"), rule.rule_type_id.clone())?;
        state.set_string(&AttributePath::new("consumer"), rule.consumer.clone())?;
        state.set(
            &AttributePath::new("schedule"),
            Dynamic::string_map([("interval", rule.schedule.interval.as_str())]),
        )?;
        match &rule.throttle {
            Some(throttle) => state.set_string(&AttributePath::new("throttle"), throttle.clone())?,
            None => state.set_null(&AttributePath::new("throttle"))?,
        }
        match &rule.notify_when {
            Some(notify_when) => {
                state.set_string(&AttributePath::new("notify_when"), notify_when.clone())?
            }
            None => state.set_null(&AttributePath::new("notify_when"))?,
        }
        state.set_bool(&AttributePath::new("enabled"), rule.enabled)?;
        state.set_string(&AttributePath::new("params"), params.clone())?;
        let actions = match to_dynamic_list(&actions) {
            Dynamic::List(items) => list_or_null(items, previous.get(&actions_path)),
            other => other,
        };
        state.set(&actions_path, actions)?;
        Ok(())
    };
    build(&mut state).map_err(state_error)?;
    Ok(state)
}

impl AlertRuleResource {
    /// Fetch the rule and build its state; None when it no longer exists
    async fn read_state(
        &self,
        client: &Client,
        id: &str,
        previous: &DynamicValue,
    ) -> Result<Option<DynamicValue>, Diagnostic> {
        tracing::debug!("AlertRule ID: {}", id);
        match client.alert_rules().get(id).await {
            Ok(Some(rule)) => rule_state(&rule, previous).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(api_error("Failed to read alert rule", &e)),
        }
    }
}

#[async_trait]
impl Resource for AlertRuleResource {
    fn type_name(&self) -> &str {
        "kibana_alert_rule"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: Self::schema_definition(),
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
        let model = match AlertRuleModel::from_value(&request.planned_state) {
            Ok(model) => model,
            Err(diag) => return failed(diag),
        };

        let rule = match client.alert_rules().create(&model.create_request()).await {
            Ok(rule) => rule,
            Err(e) => return failed(api_error("Failed to create alert rule", &e)),
        };
        tracing::info!("Created alert rule {} ({}) successfully", rule.id, rule.name);

        match self.read_state(client, &rule.id, &request.planned_state).await {
            Ok(Some(new_state)) => CreateResourceResponse {
                new_state,
                diagnostics: vec![],
            },
            Ok(None) => CreateResourceResponse {
                new_state: created_state(&request.planned_state, &rule.id),
                diagnostics: vec![Diagnostic::error(
                    "Alert rule disappeared after create",
                    format!("Alert rule {} was created but could not be read back", rule.id),
                )],
            },
            Err(diag) => CreateResourceResponse {
                new_state: created_state(&request.planned_state, &rule.id),
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

        match self.read_state(client, &id, &request.current_state).await {
            Ok(Some(new_state)) => {
                tracing::info!("Read alert rule {} successfully", id);
                ReadResourceResponse {
                    new_state: Some(new_state),
                    diagnostics: vec![],
                }
            }
            Ok(None) => {
                tracing::warn!("AlertRule {} not found - removing from state", id);
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
                "Missing alert rule id",
                "The prior state has no alert rule id to update",
            ));
        };
        let model = match AlertRuleModel::from_value(&request.planned_state) {
            Ok(model) => model,
            Err(diag) => return failed(diag),
        };

        if let Err(e) = client.alert_rules().update(&id, &model.update_request()).await {
            return failed(api_error("Failed to update alert rule", &e));
        }

        let was_enabled = request
            .prior_state
            .get_optional_bool(&AttributePath::new("enabled"))
            .ok()
            .flatten();
        if was_enabled != Some(model.enabled) {
            let toggled = if model.enabled {
                client.alert_rules().enable(&id).await
            } else {
                client.alert_rules().disable(&id).await
            };
            if let Err(e) = toggled {
                return failed(api_error(
                    if model.enabled {
                        "Failed to enable alert rule"
                    } else {
                        "Failed to disable alert rule"
                    },
                    &e,
                ));
            }
        }
        tracing::info!("Updated alert rule {} ({}) successfully", id, model.name);

        match self.read_state(client, &id, &request.planned_state).await {
            Ok(Some(new_state)) => UpdateResourceResponse {
                new_state,
                diagnostics: vec![],
            },
            Ok(None) => failed(Diagnostic::error(
                "Alert rule disappeared after update",
                format!("Alert rule {} was updated but could not be read back", id),
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

        tracing::debug!("AlertRule ID: {}", id);
        match client.alert_rules().delete(&id).await {
            Ok(()) => {
                tracing::info!("Deleted alert rule {} successfully", id);
                DeleteResourceResponse { diagnostics: vec![] }
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!("AlertRule {} not found - removing from state", id);
                DeleteResourceResponse { diagnostics: vec![] }
            }
            Err(e) => DeleteResourceResponse {
                diagnostics: vec![api_error("Failed to delete alert rule", &e)],
            },
        }
    }

    fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for AlertRuleResource {
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
impl ResourceWithImportState for AlertRuleResource {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ClientConfig, RuleAction};
    use mockito::{Matcher, Server};
    use serde_json::json;
    use tfplug::types::ClientCapabilities;
    use tfplug::validator::validate_config;

    fn configured(server: &Server) -> AlertRuleResource {
        let client = Client::new(ClientConfig::new(&server.url())).unwrap();
        AlertRuleResource {
            provider_data: Some(KibanaProviderData::new(client)),
        }
    }

    fn rule_json(enabled: bool) -> String {
        json!({
            "id": "r1",
            "name": "cpu high",
            "tags": [],
            "rule_type_id": ".index-threshold",
            "consumer": "alerts",
            "schedule": {"interval": "1m"},
            "throttle": null,
            "notify_when": "onActiveAlert",
            "enabled": enabled,
            "params": {"threshold": [90], "aggType": "avg"},
            "actions": [{"id": "c1", "group": "threshold met", "params": {"message": "hi"}}]
        })
        .to_string()
    }

    fn config(enabled: Option<bool>) -> DynamicValue {
        let mut config = DynamicValue::object();
        let set = |config: &mut DynamicValue, name: &str, value: Dynamic| {
            config.set(&AttributePath::new(name), value).unwrap()
        };
        set(&mut config, "name", Dynamic::String("cpu high".to_string()));
        set(&mut config, "rule_type_id", Dynamic::String(".index-threshold".to_string()));
        set(&mut config, "consumer", Dynamic::String("alerts".to_string()));
        set(&mut config, "schedule", Dynamic::string_map([("interval", "1m")]));
        set(&mut config, "notify_when", Dynamic::String("onActiveAlert".to_string()));
        set(
            &mut config,
            "params",
            Dynamic::String(r#"{ "aggType": "avg", "threshold": [90] }"#.to_string()),
        );
        set(
            &mut config,
            "actions",
            to_dynamic_list(&[ActionRecord {
                id: "c1".to_string(),
                group: "threshold met".to_string(),
                params: r#"{"message": "hi"}"#.to_string(),
            }]),
        );
        if let Some(enabled) = enabled {
            set(&mut config, "enabled", Dynamic::Bool(enabled));
        }
        config
    }

    fn state_with_id(id: &str) -> DynamicValue {
        let mut state = DynamicValue::object();
        state.set_string(&AttributePath::new("id"), id.to_string()).unwrap();
        state
    }

    #[test]
    fn schema_validates_notify_when_schedule_and_params() {
        let schema = AlertRuleResource::schema_definition();
        assert!(validate_config(&schema, &config(None)).is_empty());

        let mut bad = config(None);
        bad.set_string(&AttributePath::new("notify_when"), "sometimes".to_string())
            .unwrap();
        bad.set(&AttributePath::new("schedule"), Dynamic::string_map([("interval", "1 minute")]))
            .unwrap();
        bad.set_string(&AttributePath::new("params"), "{".to_string())
            .unwrap();
        let diagnostics = validate_config(&schema, &bad);
        let summaries: Vec<_> = diagnostics.iter().map(|d| d.summary.as_str()).collect();
        assert!(summaries.contains(&"Invalid value for notify_when"), "{:?}", summaries);
        assert!(summaries.iter().any(|s| s.starts_with("schedule[\"interval\"]")), "{:?}", summaries);
        assert!(summaries.contains(&"params must be valid JSON"), "{:?}", summaries);
    }

    #[test]
    fn model_reads_planned_values() {
        let model = AlertRuleModel::from_value(&config(Some(false))).unwrap();
        assert_eq!(model.schedule.interval, "1m");
        assert!(!model.enabled);
        assert!(model.tags.is_empty());
        assert!(model.throttle.is_none());
        assert_eq!(model.actions.len(), 1);

        let request = model.update_request();
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("rule_type_id").is_none());
        assert!(body.get("enabled").is_none());
        assert_eq!(body["actions"][0]["params"], json!({"message": "hi"}));
    }

    #[test]
    fn model_requires_interval() {
        let mut value = config(None);
        value
            .set(&AttributePath::new("schedule"), Dynamic::string_map([("every", "1m")]))
            .unwrap();
        let err = AlertRuleModel::from_value(&value).unwrap_err();
        assert_eq!(err.summary, "Invalid schedule");
    }

    #[test]
    fn rule_state_keeps_equivalent_params_text() {
        let rule: AlertRule = serde_json::from_str(&rule_json(true)).unwrap();
        let previous = config(None);
        let state = rule_state(&rule, &previous).unwrap();

        assert_eq!(
            state.get_string(&AttributePath::new("params")).unwrap(),
            r#"{ "aggType": "avg", "threshold": [90] }"#
        );
        let actions = from_dynamic_list(
            state.get(&AttributePath::new("actions")),
            &AttributePath::new("actions"),
        )
        .unwrap();
        assert_eq!(actions[0].params, r#"{"message": "hi"}"#);
        // Kibana returns [] for unset tags
        assert_eq!(state.get(&AttributePath::new("tags")), Some(&Dynamic::Null));
        assert_eq!(state.get(&AttributePath::new("throttle")), Some(&Dynamic::Null));
    }

    #[test]
    fn rule_state_compacts_params_without_history() {
        let rule: AlertRule = serde_json::from_str(&rule_json(true)).unwrap();
        let state = rule_state(&rule, &state_with_id("r1")).unwrap();
        assert_eq!(
            state.get_string(&AttributePath::new("params")).unwrap(),
            r#"{"aggType":"avg","threshold":[90]}"#
        );
    }

    #[test]
    fn interval_pattern_accepts_kibana_durations() {
        for interval in ["1m", "30s", "12h", "7d"] {
            assert!(interval_pattern().is_match(interval), "{}", interval);
        }
        for interval in ["1 minute", "m", "5", "1w", "-1m", ""] {
            assert!(!interval_pattern().is_match(interval), "{}", interval);
        }
    }

    #[tokio::test]
    async fn create_posts_rule_and_reads_back() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", "/api/alerting/rule")
            .match_body(Matcher::PartialJson(json!({
                "name": "cpu high",
                "enabled": true,
                "params": {"aggType": "avg", "threshold": [90]},
                "actions": [{"id": "c1", "group": "threshold met", "params": {"message": "hi"}}]
            })))
            .with_body(rule_json(true))
            .create_async()
            .await;
        let read = server
            .mock("GET", "/api/alerting/rule/r1")
            .with_body(rule_json(true))
            .create_async()
            .await;

        let resource = configured(&server);
        let mut plan = config(None);
        plan.set_bool(&AttributePath::new("enabled"), true).unwrap();
        plan.set(&AttributePath::new("id"), Dynamic::Unknown).unwrap();
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "kibana_alert_rule".to_string(),
                    planned_state: plan.clone(),
                    config: config(None),
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("id")).unwrap(),
            "r1"
        );
        create.assert_async().await;
        read.assert_async().await;
    }

    #[tokio::test]
    async fn rule_missing_after_create_stays_in_state() {
        let mut server = Server::new_async().await;
        let _create = server
            .mock("POST", "/api/alerting/rule")
            .with_body(rule_json(true))
            .create_async()
            .await;
        let _read = server
            .mock("GET", "/api/alerting/rule/r1")
            .with_status(404)
            .create_async()
            .await;

        let resource = configured(&server);
        let mut plan = config(None);
        plan.set_bool(&AttributePath::new("enabled"), true).unwrap();
        plan.set(&AttributePath::new("id"), Dynamic::Unknown).unwrap();
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "kibana_alert_rule".to_string(),
                    planned_state: plan,
                    config: config(None),
                },
            )
            .await;

        assert_eq!(
            response.diagnostics[0].summary,
            "Alert rule disappeared after create"
        );
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("id")).unwrap(),
            "r1"
        );
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("name")).unwrap(),
            "cpu high"
        );
    }

    #[tokio::test]
    async fn update_disables_rule_when_enabled_flips() {
        let mut server = Server::new_async().await;
        let update = server
            .mock("PUT", "/api/alerting/rule/r1")
            .with_body(rule_json(true))
            .create_async()
            .await;
        let disable = server
            .mock("POST", "/api/alerting/rule/r1/_disable")
            .with_status(204)
            .create_async()
            .await;
        let enable = server
            .mock("POST", "/api/alerting/rule/r1/_enable")
            .expect(0)
            .create_async()
            .await;
        let read = server
            .mock("GET", "/api/alerting/rule/r1")
            .with_body(rule_json(false))
            .create_async()
            .await;

        let resource = configured(&server);
        let mut prior = config(Some(true));
        prior.set_string(&AttributePath::new("id"), "r1".to_string()).unwrap();
        let mut planned = config(Some(false));
        planned.set_string(&AttributePath::new("id"), "r1".to_string()).unwrap();

        let response = resource
            .update(
                Context::new(),
                UpdateResourceRequest {
                    type_name: "kibana_alert_rule".to_string(),
                    prior_state: prior,
                    planned_state: planned,
                    config: config(Some(false)),
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert!(!response
            .new_state
            .get_bool(&AttributePath::new("enabled"))
            .unwrap());
        update.assert_async().await;
        disable.assert_async().await;
        enable.assert_async().await;
        read.assert_async().await;
    }

    #[tokio::test]
    async fn update_without_enabled_change_skips_toggle() {
        let mut server = Server::new_async().await;
        let _update = server
            .mock("PUT", "/api/alerting/rule/r1")
            .with_body(rule_json(true))
            .create_async()
            .await;
        let toggles = server
            .mock("POST", Matcher::Regex(r"^/api/alerting/rule/r1/_(en|dis)able$".to_string()))
            .expect(0)
            .create_async()
            .await;
        let _read = server
            .mock("GET", "/api/alerting/rule/r1")
            .with_body(rule_json(true))
            .create_async()
            .await;

        let resource = configured(&server);
        let mut prior = config(Some(true));
        prior.set_string(&AttributePath::new("id"), "r1".to_string()).unwrap();
        let mut planned = config(Some(true));
        planned.set_string(&AttributePath::new("id"), "r1".to_string()).unwrap();
        planned.set_string(&AttributePath::new("name"), "cpu very high".to_string()).unwrap();

        let response = resource
            .update(
                Context::new(),
                UpdateResourceRequest {
                    type_name: "kibana_alert_rule".to_string(),
                    prior_state: prior,
                    planned_state: planned.clone(),
                    config: planned,
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        toggles.assert_async().await;
    }

    #[tokio::test]
    async fn update_failure_keeps_prior_state() {
        let mut server = Server::new_async().await;
        let _update = server
            .mock("PUT", "/api/alerting/rule/r1")
            .with_status(400)
            .with_body(r#"{"statusCode":400,"error":"Bad Request","message":"bad params"}"#)
            .create_async()
            .await;

        let resource = configured(&server);
        let mut prior = config(Some(true));
        prior.set_string(&AttributePath::new("id"), "r1".to_string()).unwrap();
        let response = resource
            .update(
                Context::new(),
                UpdateResourceRequest {
                    type_name: "kibana_alert_rule".to_string(),
                    prior_state: prior.clone(),
                    planned_state: prior.clone(),
                    config: prior.clone(),
                },
            )
            .await;

        assert_eq!(response.new_state, prior);
        assert_eq!(response.diagnostics[0].summary, "Failed to update alert rule");
    }

    #[tokio::test]
    async fn read_of_missing_rule_clears_state() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/alerting/rule/gone")
            .with_status(404)
            .create_async()
            .await;

        let resource = configured(&server);
        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "kibana_alert_rule".to_string(),
                    current_state: state_with_id("gone"),
                    client_capabilities: ClientCapabilities::default(),
                },
            )
            .await;

        assert!(response.new_state.is_none());
        assert!(response.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn delete_of_missing_rule_succeeds() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/api/alerting/rule/gone")
            .with_status(404)
            .create_async()
            .await;

        let resource = configured(&server);
        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "kibana_alert_rule".to_string(),
                    prior_state: state_with_id("gone"),
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
        mock.assert_async().await;
    }

    #[test]
    fn deflated_model_actions_match_records() {
        let model = AlertRuleModel::from_value(&config(None)).unwrap();
        assert_eq!(
            model.create_request().actions,
            vec![RuleAction {
                id: "c1".to_string(),
                group: "threshold met".to_string(),
                params: RawJson::new(r#"{"message": "hi"}"#),
            }]
        );
    }
}
