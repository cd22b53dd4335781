//! Agent configuration.
//!
//! Configuration is resolved in this order:
//!
//! 1. a file passed with [`AgentConfigBuilder::with_config_file`]
//! 2. the file named by `SNMP_SUBAGENT_CONFIG_FILE`
//! 3. built-in defaults
//!
//! Then overrides from `SNMP_SUBAGENT_CONFIG_OVERRIDE` are applied, followed
//! by overrides set on the builder. Files and override values are JSON5.
//!
//! ```text
//! export SNMP_SUBAGENT_CONFIG_OVERRIDE='poll_interval_ms=50;byte_order="little"'
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};

use crate::Builder;
use crate::error::{AgentError, Result};
use crate::wire::{DEFAULT_MAX_OCTETS, Endianness, WireCodec};

pub const CONFIG_FILE_ENV: &str = "SNMP_SUBAGENT_CONFIG_FILE";
pub const CONFIG_OVERRIDE_ENV: &str = "SNMP_SUBAGENT_CONFIG_OVERRIDE";

/// Number of readiness polls before `wait_ready` gives up.
pub const DEFAULT_READY_POLL_ATTEMPTS: u32 = 1000;

/// Runtime settings of a subagent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Name announced to the master agent.
    pub agent_name: String,
    /// Master agent endpoint handed to the bridge.
    pub master_address: String,
    /// Interval between cooperative bridge polls.
    pub poll_interval_ms: u64,
    pub ready_poll_attempts: u32,
    pub ready_poll_interval_ms: u64,
    /// Byte order of fixed-width payloads exchanged with the bridge.
    pub byte_order: Endianness,
    /// Longest octet string accepted in a write.
    pub max_octets: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_name: "snmp-subagent".to_string(),
            master_address: "tcp:localhost:705".to_string(),
            poll_interval_ms: 100,
            ready_poll_attempts: DEFAULT_READY_POLL_ATTEMPTS,
            ready_poll_interval_ms: 1,
            byte_order: Endianness::Big,
            max_octets: DEFAULT_MAX_OCTETS,
        }
    }
}

impl AgentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    pub fn codec(&self) -> WireCodec {
        WireCodec::new(self.byte_order, self.max_octets)
    }

    /// Reject settings the worker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.agent_name.is_empty() {
            return Err(AgentError::Config("agent_name must not be empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(AgentError::Config("poll_interval_ms must be positive".into()));
        }
        if self.ready_poll_attempts == 0 {
            return Err(AgentError::Config("ready_poll_attempts must be positive".into()));
        }
        if self.max_octets == 0 {
            return Err(AgentError::Config("max_octets must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct AgentConfigBuilder {
    config_file: Option<PathBuf>,
    config_overrides: Vec<(String, Json)>,
}

impl AgentConfigBuilder {
    /// Load configuration from a JSON5 file
    pub fn with_config_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Add a configuration override, e.g. `("poll_interval_ms", json!(50))`
    pub fn with_json<K: Into<String>>(mut self, key: K, value: Json) -> Self {
        self.config_overrides.push((key.into(), value));
        self
    }

    pub fn with_agent_name<S: Into<String>>(self, name: S) -> Self {
        self.with_json("agent_name", json!(name.into()))
    }

    pub fn with_master_address<S: Into<String>>(self, address: S) -> Self {
        self.with_json("master_address", json!(address.into()))
    }

    pub fn with_poll_interval(self, interval: Duration) -> Self {
        self.with_json("poll_interval_ms", json!(interval.as_millis() as u64))
    }

    pub fn with_ready_polling(self, attempts: u32, interval: Duration) -> Self {
        self.with_json("ready_poll_attempts", json!(attempts))
            .with_json("ready_poll_interval_ms", json!(interval.as_millis() as u64))
    }

    pub fn with_byte_order(self, order: Endianness) -> Self {
        let name = match order {
            Endianness::Big => "big",
            Endianness::Little => "little",
        };
        self.with_json("byte_order", json!(name))
    }

    /// Parse overrides from the environment.
    ///
    /// Expected format: `key1=value1;key2=value2` with JSON5 values.
    fn env_overrides() -> Result<Vec<(String, Json)>> {
        let Ok(overrides_str) = std::env::var(CONFIG_OVERRIDE_ENV) else {
            return Ok(Vec::new());
        };
        tracing::debug!(
            "Applying config overrides from {}: {}",
            CONFIG_OVERRIDE_ENV,
            overrides_str
        );
        parse_overrides(&overrides_str)
    }
}

/// Parse `key=value;key=value` override text.
pub fn parse_overrides(text: &str) -> Result<Vec<(String, Json)>> {
    let mut overrides = Vec::new();
    for pair in text.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((key, value)) = pair.split_once('=') else {
            return Err(AgentError::Config(format!(
                "Invalid override format: '{}'. Expected 'key=value'",
                pair
            )));
        };
        let (key, value) = (key.trim(), value.trim());
        let json_value = json5::from_str::<Json>(value).map_err(|e| {
            AgentError::Config(format!(
                "Failed to parse override value for key '{}': {} (value: {})",
                key, e, value
            ))
        })?;
        tracing::debug!("Override: {} = {}", key, json_value);
        overrides.push((key.to_string(), json_value));
    }
    Ok(overrides)
}

/// Insert `value` at a `/`-separated key path.
fn insert_path(root: &mut Json, key: &str, value: Json) -> Result<()> {
    let mut current = root;
    let mut parts = key.split('/').filter(|p| !p.is_empty()).peekable();
    while let Some(part) = parts.next() {
        let Some(object) = current.as_object_mut() else {
            return Err(AgentError::Config(format!(
                "Cannot apply override '{}': '{}' is not an object",
                key, part
            )));
        };
        if parts.peek().is_none() {
            object.insert(part.to_string(), value);
            return Ok(());
        }
        current = object
            .entry(part.to_string())
            .or_insert_with(|| Json::Object(Map::new()));
    }
    Err(AgentError::Config("empty override key".into()))
}

impl Builder for AgentConfigBuilder {
    type Output = AgentConfig;

    fn build(self) -> Result<AgentConfig> {
        let path = self
            .config_file
            .clone()
            .or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from));

        let mut document = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    AgentError::Config(format!("Failed to read config file {:?}: {}", path, e))
                })?;
                json5::from_str::<Json>(&text).map_err(|e| {
                    AgentError::Config(format!("Failed to parse config file {:?}: {}", path, e))
                })?
            }
            None => Json::Object(Map::new()),
        };

        let mut overrides = Self::env_overrides()?;
        overrides.extend(self.config_overrides);
        for (key, value) in overrides {
            insert_path(&mut document, &key, value)?;
        }

        let config: AgentConfig = serde_json::from_value(document)
            .map_err(|e| AgentError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}
