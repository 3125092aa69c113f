//! Types shared between the publisher and broker client implementations:
//! the generic message envelope, the native broker message and the
//! capability traits a broker client has to provide.

pub mod broker;
pub mod error;
pub mod message;

pub use broker::{BrokerClient, ClientFactory, ClientOptions, Producer, ProducerOptions};
pub use error::{BrokerError, BrokerErrorKind};
pub use message::{BrokerMessage, Message, MessageContext, Metadata, Receipt};
