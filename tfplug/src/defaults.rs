//! Default value providers for attributes
//!
//! Defaults are evaluated during planning for optional attributes that are
//! null in configuration.
//!
//! ```no_run
//! use tfplug::schema::{AttributeBuilder, AttributeType};
//! use tfplug::defaults::{StaticDefault, EnvDefault};
//!
//! let enabled = AttributeBuilder::new("enabled", AttributeType::Bool)
//!     .optional()
//!     .computed()
//!     .default(StaticDefault::bool(true))
//!     .build();
//!
//! let space = AttributeBuilder::new("space_id", AttributeType::String)
//!     .optional()
//!     .computed()
//!     .default(EnvDefault::new("KIBANA_SPACE", "default"))
//!     .build();
//! ```

use crate::types::{AttributePath, Dynamic};
use std::env;

/// Default provides default values for optional attributes
/// Called when the attribute is null in configuration
pub trait Default: Send + Sync {
    fn description(&self) -> String;
    fn default_value(&self, request: DefaultRequest) -> DefaultResponse;
}

pub struct DefaultRequest {
    pub attribute_path: AttributePath,
}

pub struct DefaultResponse {
    pub value: Dynamic,
}

/// StaticDefault provides a static default value
pub struct StaticDefault {
    value: Dynamic,
}

impl StaticDefault {
    pub fn new(value: Dynamic) -> Self {
        Self { value }
    }

    pub fn string(value: &str) -> Self {
        Self::new(Dynamic::String(value.to_string()))
    }

    pub fn number(value: f64) -> Self {
        Self::new(Dynamic::Number(value))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(Dynamic::Bool(value))
    }
}

impl Default for StaticDefault {
    fn description(&self) -> String {
        format!("static default value: {:?}", self.value)
    }

    fn default_value(&self, _request: DefaultRequest) -> DefaultResponse {
        DefaultResponse {
            value: self.value.clone(),
        }
    }
}

/// EnvDefault gets the default value from an environment variable
pub struct EnvDefault {
    env_var: String,
    fallback: Option<String>,
}

impl EnvDefault {
    pub fn new(env_var: &str, fallback: &str) -> Self {
        Self {
            env_var: env_var.to_string(),
            fallback: Some(fallback.to_string()),
        }
    }

    /// Environment variable default that stays null when the variable is unset
    pub fn without_fallback(env_var: &str) -> Self {
        Self {
            env_var: env_var.to_string(),
            fallback: None,
        }
    }
}

impl Default for EnvDefault {
    fn description(&self) -> String {
        match &self.fallback {
            Some(fallback) => format!(
                "default from environment variable {} (fallback: {})",
                self.env_var, fallback
            ),
            None => format!("default from environment variable {}", self.env_var),
        }
    }

    fn default_value(&self, _request: DefaultRequest) -> DefaultResponse {
        let value = match env::var(&self.env_var) {
            Ok(val) => Dynamic::String(val),
            Err(_) => match &self.fallback {
                Some(fallback) => Dynamic::String(fallback.clone()),
                None => Dynamic::Null,
            },
        };

        DefaultResponse { value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn request() -> DefaultRequest {
        DefaultRequest {
            attribute_path: AttributePath::new("test"),
        }
    }

    #[test]
    fn static_default_returns_value() {
        assert_eq!(
            StaticDefault::bool(true).default_value(request()).value,
            Dynamic::Bool(true)
        );
        assert_eq!(
            StaticDefault::string("default").default_value(request()).value,
            Dynamic::String("default".to_string())
        );
        assert_eq!(
            StaticDefault::number(30.0).default_value(request()).value,
            Dynamic::Number(30.0)
        );
    }

    #[test]
    #[serial]
    fn env_default_reads_variable() {
        env::set_var("TFPLUG_TEST_DEFAULT", "from-env");
        let value = EnvDefault::new("TFPLUG_TEST_DEFAULT", "fallback")
            .default_value(request())
            .value;
        env::remove_var("TFPLUG_TEST_DEFAULT");

        assert_eq!(value, Dynamic::String("from-env".to_string()));
    }

    #[test]
    #[serial]
    fn env_default_uses_fallback_when_unset() {
        env::remove_var("TFPLUG_TEST_DEFAULT");
        let value = EnvDefault::new("TFPLUG_TEST_DEFAULT", "fallback")
            .default_value(request())
            .value;
        assert_eq!(value, Dynamic::String("fallback".to_string()));

        let value = EnvDefault::without_fallback("TFPLUG_TEST_DEFAULT")
            .default_value(request())
            .value;
        assert_eq!(value, Dynamic::Null);
    }
}
