//! Conversion between rule actions and the flat `actions` attribute
//!
//! In Terraform each action is an object of three strings; `params` holds
//! JSON text. On the wire it is a nested JSON document.

use std::collections::HashMap;
use thiserror::Error;
use tfplug::plan_modifier::{PlanModifier, PlanModifyRequest, PlanModifyResponse};
use tfplug::schema::AttributeType;
use tfplug::types::{AttributePath, Diagnostic, Dynamic};
use tfplug::validator::Validator;

use crate::api::RuleAction;
use crate::json::{semantic_eq, RawJson, ValidJson};

#[derive(Debug, Error)]
pub enum ActionsError {
    #[error("failed to marshal action {index}: {source}")]
    Marshal {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid action at {path}: {message}")]
    InvalidRecord { path: String, message: String },
}

/// One element of the `actions` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub id: String,
    pub group: String,
    pub params: String,
}

impl ActionRecord {
    /// Element type of the `actions` list
    pub fn attribute_type() -> AttributeType {
        AttributeType::object([
            ("id", AttributeType::String),
            ("group", AttributeType::String),
            ("params", AttributeType::String),
        ])
    }

    pub fn from_dynamic(value: &Dynamic, path: &AttributePath) -> Result<Self, ActionsError> {
        let entries = value.as_map().ok_or_else(|| ActionsError::InvalidRecord {
            path: path.to_string(),
            message: format!("expected an object, got {}", value.type_name()),
        })?;

        let field = |name: &str| -> Result<String, ActionsError> {
            match entries.get(name) {
                Some(Dynamic::String(s)) => Ok(s.clone()),
                Some(other) => Err(ActionsError::InvalidRecord {
                    path: path.clone().attribute(name).to_string(),
                    message: format!("expected a string, got {}", other.type_name()),
                }),
                None => Err(ActionsError::InvalidRecord {
                    path: path.clone().attribute(name).to_string(),
                    message: "missing required field".to_string(),
                }),
            }
        };

        Ok(Self {
            id: field("id")?,
            group: field("group")?,
            params: field("params")?,
        })
    }

    pub fn to_dynamic(&self) -> Dynamic {
        Dynamic::string_map([
            ("id", self.id.as_str()),
            ("group", self.group.as_str()),
            ("params", self.params.as_str()),
        ])
    }
}

/// Read the `actions` attribute; absent or null is an empty list
pub fn from_dynamic_list(
    value: Option<&Dynamic>,
    path: &AttributePath,
) -> Result<Vec<ActionRecord>, ActionsError> {
    match value {
        None | Some(Dynamic::Null) => Ok(Vec::new()),
        Some(Dynamic::List(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| ActionRecord::from_dynamic(item, &path.clone().index(i as i64)))
            .collect(),
        Some(other) => Err(ActionsError::InvalidRecord {
            path: path.to_string(),
            message: format!("expected a list, got {}", other.type_name()),
        }),
    }
}

pub fn to_dynamic_list(records: &[ActionRecord]) -> Dynamic {
    Dynamic::List(records.iter().map(ActionRecord::to_dynamic).collect())
}

/// Records to API actions, order preserved. Params text is carried as is;
/// malformed JSON fails when the request body is encoded.
pub fn deflate_actions(records: &[ActionRecord]) -> Vec<RuleAction> {
    records
        .iter()
        .map(|record| RuleAction {
            id: record.id.clone(),
            group: record.group.clone(),
            params: RawJson::new(record.params.clone()),
        })
        .collect()
}

/// API actions to records, params re-encoded as compact JSON text
pub fn flatten_actions(actions: &[RuleAction]) -> Result<Vec<ActionRecord>, ActionsError> {
    actions
        .iter()
        .enumerate()
        .map(|(index, action)| {
            let params = action
                .params
                .parse()
                .and_then(|value| serde_json::to_string(&value))
                .map_err(|source| ActionsError::Marshal { index, source })?;
            Ok(ActionRecord {
                id: action.id.clone(),
                group: action.group.clone(),
                params,
            })
        })
        .collect()
}

/// Keep previously known params text where the remote document is the same,
/// so refreshes do not rewrite formatting the user chose
pub fn reconcile_params(previous: &[ActionRecord], mut remote: Vec<ActionRecord>) -> Vec<ActionRecord> {
    for (record, prior) in remote.iter_mut().zip(previous) {
        if record.params != prior.params && semantic_eq(&prior.params, &record.params) {
            record.params = prior.params.clone();
        }
    }
    remote
}

/// Per-element JSON diff suppression for the `actions[*].params` strings
pub struct SuppressEquivalentActionParams;

impl PlanModifier for SuppressEquivalentActionParams {
    fn description(&self) -> String {
        "ignores JSON formatting changes in action params".to_string()
    }

    fn modify_plan(&self, request: PlanModifyRequest) -> PlanModifyResponse {
        let (Dynamic::List(prior), Dynamic::List(planned)) = (&request.state, &request.plan) else {
            return PlanModifyResponse::unchanged(request);
        };

        let plan_value = Dynamic::List(
            planned
                .iter()
                .zip(prior.iter().map(Some).chain(std::iter::repeat(None)))
                .map(|(planned, prior)| match (planned, prior) {
                    (Dynamic::Map(planned), Some(Dynamic::Map(prior))) => {
                        Dynamic::Map(keep_equivalent_params(planned, prior))
                    }
                    (planned, _) => planned.clone(),
                })
                .collect(),
        );

        PlanModifyResponse {
            plan_value,
            requires_replace: false,
            diagnostics: Vec::new(),
        }
    }
}

fn keep_equivalent_params(
    planned: &HashMap<String, Dynamic>,
    prior: &HashMap<String, Dynamic>,
) -> HashMap<String, Dynamic> {
    let mut element = planned.clone();
    if let (Some(Dynamic::String(new)), Some(Dynamic::String(old))) =
        (planned.get("params"), prior.get("params"))
    {
        if new != old && semantic_eq(old, new) {
            element.insert("params".to_string(), Dynamic::String(old.clone()));
        }
    }
    element
}

/// Every action's `params` must be a JSON document
pub struct ActionParamsJson;

impl Validator for ActionParamsJson {
    fn description(&self) -> String {
        "action params must be valid JSON".to_string()
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath, diagnostics: &mut Vec<Diagnostic>) {
        let Some(items) = value.as_list() else {
            return;
        };
        for (i, item) in items.iter().enumerate() {
            if let Some(Dynamic::String(params)) = item.as_map().and_then(|m| m.get("params")) {
                ValidJson::check(params, &path.clone().index(i as i64).attribute("params"), diagnostics);
            }
        }
    }
}
