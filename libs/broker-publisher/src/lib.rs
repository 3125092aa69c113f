//! Publishes broker-agnostic [`Message`](broker_api::Message)s through a
//! [`BrokerClient`](broker_api::BrokerClient), opening one producer per topic
//! on demand and encoding every message with a pluggable [`Marshaler`].

pub mod config;
pub mod error;
pub mod marshal;
mod publisher;

pub use config::{MarshalerKind, PublisherConfig};
pub use error::{ConfigError, MarshalError, PublisherError};
pub use marshal::{
    DefaultMarshaler, JsonEnvelopeMarshaler, Marshaler, MarshalerUnmarshaler, Unmarshaler,
    UUID_HEADER_KEY,
};
pub use publisher::Publisher;
