/// Category of a broker error. Lets the publisher and its callers tell
/// a rejected producer apart from a failed send without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerErrorKind {
    /// Could not reach or authenticate against the broker.
    Connection,
    /// Broker refused to open a producer for a topic.
    ProducerCreation,
    /// Transport or acknowledgement failure while sending.
    Send,
    /// Client or producer is already closed.
    Closed,
    /// Anything else reported by the client.
    Other,
}

impl std::fmt::Display for BrokerErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerErrorKind::Connection => f.write_str("connection"),
            BrokerErrorKind::ProducerCreation => f.write_str("producer creation"),
            BrokerErrorKind::Send => f.write_str("send"),
            BrokerErrorKind::Closed => f.write_str("closed"),
            BrokerErrorKind::Other => f.write_str("other"),
        }
    }
}

/// Error returned by every broker capability method.
///
/// Carries a `BrokerErrorKind` and the client's own message, unchanged.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerError {
    kind: BrokerErrorKind,
    message: String,
}

impl BrokerError {
    pub fn new(kind: BrokerErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(BrokerErrorKind::Connection, msg)
    }

    pub fn producer_creation(msg: impl Into<String>) -> Self {
        Self::new(BrokerErrorKind::ProducerCreation, msg)
    }

    pub fn send(msg: impl Into<String>) -> Self {
        Self::new(BrokerErrorKind::Send, msg)
    }

    pub fn closed(msg: impl Into<String>) -> Self {
        Self::new(BrokerErrorKind::Closed, msg)
    }

    pub fn kind(&self) -> BrokerErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BrokerError {}
