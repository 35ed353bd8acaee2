//! Agent configuration loading.
//!
//! Hierarchical sources, later entries override earlier ones:
//! 1. Type defaults
//! 2. Configuration file named by the `AGENT_CONFIG_PATH` environment variable
//! 3. Environment variables with the `AGENT__` prefix

use std::collections::HashMap;
use std::env;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::HTTP_REQUEST_METHOD_KEY;
use crate::constants::URL_FORMAT_KEY;
use crate::errors::Result;

/// Raw `http-service` section:
/// `conf-id -> { comma-separated motan methods -> { option -> value } }`.
///
/// Recognized options are `URL_FORMAT` (at most one `%s` placeholder) and
/// `HTTP_REQUEST_METHOD` (`GET` or `POST`); the reserved method key
/// `http_default_motan_method` acts as the per-conf fallback.
pub type HttpServiceConf = HashMap<String, HashMap<String, HashMap<String, String>>>;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AgentConfig {
    /// Per-service outbound HTTP call configuration
    #[serde(default, rename = "http-service")]
    pub http_service: HttpServiceConf,
}

impl AgentConfig {
    /// Loads configuration from hierarchical sources without validation.
    /// Callers should run [`validate`](Self::validate) before use.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder();
        if let Ok(path) = env::var("AGENT_CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&path));
        }
        let merged = builder
            .add_source(Environment::with_prefix("AGENT").separator("__"))
            .build()?;
        Ok(merged.try_deserialize()?)
    }

    /// Validates the `http-service` section option values.
    pub fn validate(self) -> Result<Self> {
        for (conf_id, methods) in &self.http_service {
            for options in methods.values() {
                if let Some(format) = options.get(URL_FORMAT_KEY) {
                    if format.matches("%s").count() > 1 {
                        return Err(ConfigError::Message(format!(
                            "http-service conf {conf_id}: URL_FORMAT accepts at most one %s placeholder, got {format}"
                        ))
                        .into());
                    }
                }
                if let Some(method) = options.get(HTTP_REQUEST_METHOD_KEY) {
                    if method != "GET" && method != "POST" {
                        return Err(ConfigError::Message(format!(
                            "http-service conf {conf_id}: unsupported HTTP_REQUEST_METHOD {method}"
                        ))
                        .into());
                    }
                }
            }
        }
        Ok(self)
    }

    /// Expands comma-separated method keys into a per-method lookup table.
    /// The fallback key expands like any other method name.
    pub fn expanded_http_service(&self) -> HashMap<String, HashMap<String, HashMap<String, String>>> {
        let mut expanded = HashMap::new();
        for (conf_id, methods) in &self.http_service {
            let mut srv_conf: HashMap<String, HashMap<String, String>> = HashMap::new();
            for (method_list, options) in methods {
                for method in method_list.split(',').map(str::trim).filter(|m| !m.is_empty()) {
                    srv_conf.insert(method.to_string(), options.clone());
                }
            }
            expanded.insert(conf_id.clone(), srv_conf);
        }
        expanded
    }
}
