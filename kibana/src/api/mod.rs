//! Kibana REST API client

pub mod alert_rules;
pub mod client;
pub mod connectors;
pub mod error;

pub use alert_rules::{AlertRule, CreateRuleRequest, RuleAction, Schedule, UpdateRuleRequest};
pub use client::{Auth, Client, ClientConfig};
pub use connectors::{Connector, ConnectorType, CreateConnectorRequest, UpdateConnectorRequest};
pub use error::ApiError;
