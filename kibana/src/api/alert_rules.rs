//! Alerting rules API

use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::Client;
use crate::json::RawJson;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub interval: String,
}

/// One action fired by a rule: a connector id, the action group that
/// triggers it and the connector params as raw JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    pub id: String,
    #[serde(default)]
    pub group: String,
    pub params: RawJson,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub rule_type_id: String,
    pub consumer: String,
    pub schedule: Schedule,
    #[serde(default)]
    pub throttle: Option<String>,
    #[serde(default)]
    pub notify_when: Option<String>,
    pub enabled: bool,
    pub params: RawJson,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
}

/// Request body for POST /api/alerting/rule
#[derive(Debug, Clone, Serialize)]
pub struct CreateRuleRequest {
    pub name: String,
    pub tags: Vec<String>,
    pub rule_type_id: String,
    pub consumer: String,
    pub schedule: Schedule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle: Option<String>,
    pub notify_when: String,
    pub enabled: bool,
    pub params: RawJson,
    pub actions: Vec<RuleAction>,
}

/// Request body for PUT /api/alerting/rule/{id}.
/// Type, consumer and enablement are not updatable through this call.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateRuleRequest {
    pub name: String,
    pub tags: Vec<String>,
    pub schedule: Schedule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle: Option<String>,
    pub notify_when: String,
    pub params: RawJson,
    pub actions: Vec<RuleAction>,
}

pub struct AlertRulesApi<'a> {
    client: &'a Client,
}

impl<'a> AlertRulesApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn create(&self, request: &CreateRuleRequest) -> Result<AlertRule, ApiError> {
        self.client.post("/api/alerting/rule", request).await
    }

    /// None when the rule does not exist
    pub async fn get(&self, id: &str) -> Result<Option<AlertRule>, ApiError> {
        self.client.get_optional(&rule_path(id)).await
    }

    pub async fn update(&self, id: &str, request: &UpdateRuleRequest) -> Result<AlertRule, ApiError> {
        self.client.put(&rule_path(id), request).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.client.delete(&rule_path(id)).await
    }

    pub async fn enable(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .post_empty(&format!("{}/_enable", rule_path(id)))
            .await
    }

    pub async fn disable(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .post_empty(&format!("{}/_disable", rule_path(id)))
            .await
    }
}

fn rule_path(id: &str) -> String {
    format!("/api/alerting/rule/{}", urlencoding::encode(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ClientConfig;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client_for(server: &Server) -> Client {
        Client::new(ClientConfig::new(&server.url())).unwrap()
    }

    fn rule_body() -> serde_json::Value {
        json!({
            "id": "r1",
            "name": "cpu high",
            "tags": ["infra"],
            "rule_type_id": ".index-threshold",
            "consumer": "alerts",
            "schedule": {"interval": "1m"},
            "throttle": null,
            "notify_when": "onActionGroupChange",
            "enabled": true,
            "params": {"threshold": [90], "aggType": "avg"},
            "actions": [{
                "id": "c1",
                "group": "threshold met",
                "params": {"level": "info", "message": "{{context.message}}"},
                "connector_type_id": ".server-log"
            }],
            "execution_status": {"status": "pending"}
        })
    }

    #[tokio::test]
    async fn create_embeds_raw_params() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/alerting/rule")
            .match_body(Matcher::Json(json!({
                "name": "cpu high",
                "tags": ["infra"],
                "rule_type_id": ".index-threshold",
                "consumer": "alerts",
                "schedule": {"interval": "1m"},
                "notify_when": "onActionGroupChange",
                "enabled": true,
                "params": {"aggType": "avg", "threshold": [90]},
                "actions": [{
                    "id": "c1",
                    "group": "threshold met",
                    "params": {"level": "info", "message": "{{context.message}}"}
                }]
            })))
            .with_body(rule_body().to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let rule = client
            .alert_rules()
            .create(&CreateRuleRequest {
                name: "cpu high".to_string(),
                tags: vec!["infra".to_string()],
                rule_type_id: ".index-threshold".to_string(),
                consumer: "alerts".to_string(),
                schedule: Schedule {
                    interval: "1m".to_string(),
                },
                throttle: None,
                notify_when: "onActionGroupChange".to_string(),
                enabled: true,
                params: RawJson::new(r#"{"aggType":"avg","threshold":[90]}"#),
                actions: vec![RuleAction {
                    id: "c1".to_string(),
                    group: "threshold met".to_string(),
                    params: RawJson::new(r#"{"level":"info","message":"{{context.message}}"}"#),
                }],
            })
            .await
            .unwrap();

        assert_eq!(rule.id, "r1");
        assert_eq!(rule.actions.len(), 1);
        assert!(rule.throttle.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn malformed_params_fail_before_sending() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/alerting/rule")
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .alert_rules()
            .create(&CreateRuleRequest {
                name: "broken".to_string(),
                tags: Vec::new(),
                rule_type_id: ".index-threshold".to_string(),
                consumer: "alerts".to_string(),
                schedule: Schedule {
                    interval: "1m".to_string(),
                },
                throttle: None,
                notify_when: "onActiveAlert".to_string(),
                enabled: true,
                params: RawJson::new("{}"),
                actions: vec![RuleAction {
                    id: "c1".to_string(),
                    group: "default".to_string(),
                    params: RawJson::new("{not json"),
                }],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Encode(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn enable_and_disable_hit_their_endpoints() {
        let mut server = Server::new_async().await;
        let enable = server
            .mock("POST", "/api/alerting/rule/r1/_enable")
            .match_header("kbn-xsrf", "true")
            .with_status(204)
            .create_async()
            .await;
        let disable = server
            .mock("POST", "/api/alerting/rule/r1/_disable")
            .with_status(204)
            .create_async()
            .await;

        let client = client_for(&server);
        client.alert_rules().enable("r1").await.unwrap();
        client.alert_rules().disable("r1").await.unwrap();

        enable.assert_async().await;
        disable.assert_async().await;
    }

    #[tokio::test]
    async fn get_parses_actions_and_ignores_extra_fields() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/alerting/rule/r1")
            .with_body(rule_body().to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let rule = client.alert_rules().get("r1").await.unwrap().unwrap();
        assert_eq!(rule.schedule.interval, "1m");
        assert_eq!(rule.notify_when.as_deref(), Some("onActionGroupChange"));
        assert_eq!(
            rule.actions[0].params.parse().unwrap(),
            json!({"level": "info", "message": "{{context.message}}"})
        );
    }
}
