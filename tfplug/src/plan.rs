//! Schema-driven planning
//!
//! Builds the planned state for a resource from its prior state and config:
//! 1. config values win; computed attributes fall back to the prior value
//! 2. defaults fill optional attributes that are null in config
//! 3. plan modifiers run per attribute
//! 4. on update, computed attributes not set by config become unknown and
//!    their modifiers run again (so UseStateForUnknown can restore them)

use crate::defaults::{Default as _, DefaultRequest};
use crate::plan_modifier::{values_equal, PlanModifier as _, PlanModifyRequest};
use crate::schema::{Attribute, Schema};
use crate::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub planned_state: DynamicValue,
    pub requires_replace: Vec<AttributePath>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PlannedChange {
    /// True when applying the plan would change anything
    pub fn has_changes(&self, prior_state: &DynamicValue) -> bool {
        !values_equal(&prior_state.value, &self.planned_state.value)
    }
}

pub fn plan_resource_change(
    schema: &Schema,
    prior_state: &DynamicValue,
    config: &DynamicValue,
) -> PlannedChange {
    if config.is_null() {
        return PlannedChange {
            planned_state: DynamicValue::null(),
            requires_replace: Vec::new(),
            diagnostics: Vec::new(),
        };
    }

    let is_create = prior_state.is_null();
    let mut planned = HashMap::new();
    let mut defaulted = Vec::new();

    for attr in &schema.block.attributes {
        let path = AttributePath::new(&attr.name);
        let config_value = lookup(config, &path);
        let prior_value = lookup(prior_state, &path);

        let value = if !config_value.is_null() {
            config_value
        } else if let Some(default) = attr.default.as_ref().filter(|_| attr.optional) {
            defaulted.push(attr.name.clone());
            default
                .default_value(DefaultRequest {
                    attribute_path: path,
                })
                .value
        } else if attr.computed {
            if prior_value.is_null() {
                Dynamic::Unknown
            } else {
                prior_value
            }
        } else {
            Dynamic::Null
        };
        planned.insert(attr.name.clone(), value);
    }

    let mut requires_replace = Vec::new();
    let mut diagnostics = Vec::new();

    for attr in &schema.block.attributes {
        run_modifiers(
            attr,
            prior_state,
            config,
            &mut planned,
            (!is_create).then_some(&mut requires_replace),
            &mut diagnostics,
        );
    }

    let prior_matches = values_equal(&prior_state.value, &Dynamic::Map(planned.clone()));
    if !is_create && !prior_matches {
        for attr in &schema.block.attributes {
            let path = AttributePath::new(&attr.name);
            if attr.computed
                && lookup(config, &path).is_null()
                && !defaulted.contains(&attr.name)
            {
                planned.insert(attr.name.clone(), Dynamic::Unknown);
                run_modifiers(
                    attr,
                    prior_state,
                    config,
                    &mut planned,
                    Some(&mut requires_replace),
                    &mut diagnostics,
                );
            }
        }
    }

    PlannedChange {
        planned_state: DynamicValue::new(Dynamic::Map(planned)),
        requires_replace,
        diagnostics,
    }
}

fn run_modifiers(
    attr: &Attribute,
    prior_state: &DynamicValue,
    config: &DynamicValue,
    planned: &mut HashMap<String, Dynamic>,
    mut requires_replace: Option<&mut Vec<AttributePath>>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let path = AttributePath::new(&attr.name);
    let state_value = lookup(prior_state, &path);
    let config_value = lookup(config, &path);
    let mut plan_value = planned.get(&attr.name).cloned().unwrap_or(Dynamic::Null);

    for modifier in &attr.plan_modifiers {
        let response = modifier.modify_plan(PlanModifyRequest {
            state: state_value.clone(),
            plan: plan_value,
            config: config_value.clone(),
            attribute_path: path.clone(),
        });
        plan_value = response.plan_value;
        diagnostics.extend(response.diagnostics);

        if response.requires_replace {
            if let Some(paths) = requires_replace.as_deref_mut() {
                if !paths.contains(&path) {
                    paths.push(path.clone());
                }
            }
        }
    }

    planned.insert(attr.name.clone(), plan_value);
}

fn lookup(value: &DynamicValue, path: &AttributePath) -> Dynamic {
    value.get(path).cloned().unwrap_or(Dynamic::Null)
}
