pub mod actions;
pub mod resource_alert_rule;
pub mod resource_connector;

pub use resource_alert_rule::AlertRuleResource;
pub use resource_connector::ConnectorResource;

use crate::api::ApiError;
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::TfplugError;

pub(crate) fn not_configured() -> Diagnostic {
    Diagnostic::error(
        "Provider not configured",
        "Provider data was not properly configured",
    )
}

pub(crate) fn api_error(summary: &str, e: &ApiError) -> Diagnostic {
    Diagnostic::error(summary, format!("API error: {}", e))
}

pub(crate) fn state_error(e: TfplugError) -> Diagnostic {
    Diagnostic::error("Failed to build state", e.to_string())
}

/// The remote id recorded in state, if any
pub(crate) fn state_id(state: &DynamicValue) -> Option<String> {
    state
        .get_optional_string(&AttributePath::new("id"))
        .ok()
        .flatten()
        .filter(|id| !id.is_empty())
}

/// State for an object that was created but could not be read back: the
/// plan with its id filled in and unknown values cleared, so the object
/// stays tracked instead of leaking
pub(crate) fn created_state(planned: &DynamicValue, id: &str) -> DynamicValue {
    let mut state = DynamicValue::new(clear_unknown(planned.value.clone()));
    if let Err(e) = state.set_string(&AttributePath::new("id"), id.to_string()) {
        tracing::warn!("failed to record id {} after create: {}", id, e);
    }
    state
}

fn clear_unknown(value: Dynamic) -> Dynamic {
    match value {
        Dynamic::Unknown => Dynamic::Null,
        Dynamic::List(items) => Dynamic::List(items.into_iter().map(clear_unknown).collect()),
        Dynamic::Map(entries) => Dynamic::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key, clear_unknown(value)))
                .collect(),
        ),
        other => other,
    }
}

/// Kibana answers an empty list for unset optional lists; keep them null
/// unless state already holds a list
pub(crate) fn list_or_null(items: Vec<Dynamic>, previous: Option<&Dynamic>) -> Dynamic {
    match previous {
        _ if !items.is_empty() => Dynamic::List(items),
        Some(Dynamic::List(_)) => Dynamic::List(items),
        _ => Dynamic::Null,
    }
}
