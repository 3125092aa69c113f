use broker_api::BrokerError;

#[derive(Debug, thiserror::Error)]
pub enum MarshalError {
    #[error("metadata {key} is reserved for the message uuid")]
    ReservedKey { key: &'static str },

    #[error("envelope encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("envelope payload: {0}")]
    Payload(#[from] base64::DecodeError),
}

#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("marshal: {0}")]
    Marshal(#[from] MarshalError),

    #[error("create producer ({topic}): {source}")]
    ProducerCreation { topic: String, source: BrokerError },

    #[error("send ({topic}, message {message_uuid}): {source}")]
    Send { topic: String, message_uuid: String, source: BrokerError },

    #[error("message {message_uuid} cancelled before send completed")]
    Cancelled { message_uuid: String },

    #[error("message {message_uuid} deadline exceeded")]
    DeadlineExceeded { message_uuid: String },

    #[error("publisher is closed")]
    Closed,

    #[error("close client: {0}")]
    Close(#[source] BrokerError),

    #[error("connect: {0}")]
    Connect(#[source] BrokerError),
}

impl PublisherError {
    /// Underlying broker error, if this failure came from the broker client.
    pub fn broker_error(&self) -> Option<&BrokerError> {
        match self {
            PublisherError::ProducerCreation { source, .. }
            | PublisherError::Send { source, .. }
            | PublisherError::Close(source)
            | PublisherError::Connect(source) => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config read '{path}': {source}")]
    Read { path: String, source: std::io::Error },

    #[error("config parse '{path}': {source}")]
    Parse { path: String, source: toml::de::Error },
}
