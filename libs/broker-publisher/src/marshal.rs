use std::collections::HashMap;

use base64::Engine;
use serde::{Deserialize, Serialize};

use broker_api::{BrokerMessage, Message, Metadata};

use crate::MarshalError;

/// Property key carrying the message uuid in the native message.
pub const UUID_HEADER_KEY: &str = "_watermill_message_uuid";

// ════════════════════════════════════════════════════════════════
//  Marshaling capability
// ════════════════════════════════════════════════════════════════

/// Turns a generic [`Message`] into the broker's native message.
pub trait Marshaler: Send + Sync {
    fn marshal(&self, topic: &str, message: &Message) -> Result<BrokerMessage, MarshalError>;
}

/// Turns a native message back into a generic [`Message`].
pub trait Unmarshaler: Send + Sync {
    fn unmarshal(&self, message: &BrokerMessage) -> Result<Message, MarshalError>;
}

/// Both directions of one encoding strategy.
pub trait MarshalerUnmarshaler: Marshaler + Unmarshaler {}

impl<T: Marshaler + Unmarshaler> MarshalerUnmarshaler for T {}

fn check_reserved(message: &Message) -> Result<(), MarshalError> {
    if message.metadata.contains(UUID_HEADER_KEY) {
        return Err(MarshalError::ReservedKey { key: UUID_HEADER_KEY });
    }
    Ok(())
}

// ════════════════════════════════════════════════════════════════
//  DefaultMarshaler: uuid + metadata as properties
// ════════════════════════════════════════════════════════════════

/// Payload goes through untouched; the uuid and every metadata entry
/// become native properties.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMarshaler;

impl Marshaler for DefaultMarshaler {
    fn marshal(&self, _topic: &str, message: &Message) -> Result<BrokerMessage, MarshalError> {
        check_reserved(message)?;

        let mut properties = HashMap::with_capacity(message.metadata.len() + 1);
        properties.insert(UUID_HEADER_KEY.to_string(), message.uuid().to_string());
        for (key, value) in message.metadata.iter() {
            properties.insert(key.to_string(), value.to_string());
        }

        Ok(BrokerMessage::new(message.payload().clone(), properties))
    }
}

impl Unmarshaler for DefaultMarshaler {
    /// A missing uuid property yields an empty uuid, so messages produced
    /// by other clients can still be read.
    fn unmarshal(&self, native: &BrokerMessage) -> Result<Message, MarshalError> {
        let mut uuid = String::new();
        let mut metadata = Metadata::with_capacity(native.properties.len());

        for (key, value) in &native.properties {
            if key == UUID_HEADER_KEY {
                uuid = value.clone();
            } else {
                metadata.set(key.as_str(), value.as_str());
            }
        }

        Ok(Message::new(uuid, native.payload.clone()).with_metadata(metadata))
    }
}

// ════════════════════════════════════════════════════════════════
//  JsonEnvelopeMarshaler: whole message serialized into the payload
// ════════════════════════════════════════════════════════════════

#[derive(Serialize, Deserialize)]
struct Envelope {
    uuid: String,
    #[serde(default)]
    metadata: Metadata,
    /// Base64 of the raw payload.
    payload: String,
}

/// Serializes the whole envelope (uuid, metadata, payload) as JSON into
/// the native payload. Only the uuid is duplicated as a property.
///
/// For consumers that expect one self-describing blob per message.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEnvelopeMarshaler;

impl Marshaler for JsonEnvelopeMarshaler {
    fn marshal(&self, _topic: &str, message: &Message) -> Result<BrokerMessage, MarshalError> {
        check_reserved(message)?;

        let envelope = Envelope {
            uuid: message.uuid().to_string(),
            metadata: message.metadata.clone(),
            payload: base64::engine::general_purpose::STANDARD.encode(message.payload()),
        };
        let bytes = serde_json::to_vec(&envelope)?;

        let properties = HashMap::from([(UUID_HEADER_KEY.to_string(), message.uuid().to_string())]);
        Ok(BrokerMessage::new(bytes, properties))
    }
}

impl Unmarshaler for JsonEnvelopeMarshaler {
    fn unmarshal(&self, native: &BrokerMessage) -> Result<Message, MarshalError> {
        let envelope: Envelope = serde_json::from_slice(&native.payload)?;
        let payload = base64::engine::general_purpose::STANDARD.decode(envelope.payload)?;
        Ok(Message::new(envelope.uuid, payload).with_metadata(envelope.metadata))
    }
}
