use std::collections::HashMap;

use crate::config::AgentConfig;

/// Global agent context handed to providers at wiring time. Carries the
/// loaded configuration; providers read their `http-service` section from
/// here during initialization.
#[derive(Debug, Default)]
pub struct Context {
    pub config: AgentConfig,
}

impl Context {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// The raw `http-service` section for one conf id, when present.
    pub fn http_service_conf(
        &self,
        conf_id: &str,
    ) -> Option<&HashMap<String, HashMap<String, String>>> {
        self.config.http_service.get(conf_id)
    }
}
