use std::sync::Arc;

use serde::Deserialize;

use broker_api::ClientOptions;

use crate::{ConfigError, DefaultMarshaler, JsonEnvelopeMarshaler, Marshaler};

/// Encoding strategy selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarshalerKind {
    /// uuid and metadata as native properties, payload untouched.
    #[default]
    Default,
    /// Whole envelope serialized as JSON into the payload.
    #[serde(alias = "json")]
    JsonEnvelope,
}

impl MarshalerKind {
    pub fn build(self) -> Arc<dyn Marshaler> {
        match self {
            MarshalerKind::Default => Arc::new(DefaultMarshaler),
            MarshalerKind::JsonEnvelope => Arc::new(JsonEnvelopeMarshaler),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublisherConfig {
    #[serde(default)]
    pub client: ClientOptions,
    #[serde(default)]
    pub marshaler: MarshalerKind,
}

impl PublisherConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read { path: path.to_string(), source: e })?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse { path: path.to_string(), source: e })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::Parse { path: "<inline>".to_string(), source: e })
    }
}
