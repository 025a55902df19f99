use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Announced to everyone else when a socket joins the hub.
pub const JOINED_NOTICE: &str = "/A new socket has connected";

/// Announced to the remaining sockets when one leaves or is evicted.
pub const LEFT_NOTICE: &str = "/A socket has disconnected";

/// An encoded envelope, shared between every recipient of one broadcast.
pub type Payload = Arc<str>;

/// Minimal wire wrapper exchanged with clients.
///
/// Every field is optional on the wire. `recipient` is carried along but the
/// hub never routes on it: delivery is always to everyone (or everyone but
/// the sender).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Envelope {
    /// A system notice: content only, no sender.
    pub fn notice(text: &str) -> Self {
        Self {
            content: Some(text.to_string()),
            ..Self::default()
        }
    }

    /// Wraps a frame read from `sender`'s socket for relaying.
    ///
    /// Clients may send either plain text or an envelope of their own. A frame
    /// only counts as an envelope when it carries `content`; then its
    /// `content` and `recipient` are kept. Anything else, including JSON of
    /// some other shape, is relayed verbatim as `content`. `sender` is always
    /// stamped by the hub so clients cannot impersonate each other.
    pub fn relayed(sender: &str, frame: &str) -> Self {
        let (recipient, content) = match Self::decode(frame) {
            Ok(inbound) if inbound.content.is_some() => (inbound.recipient, inbound.content),
            _ => (None, Some(frame.to_string())),
        };
        Self {
            sender: Some(sender.to_string()),
            recipient,
            content,
        }
    }

    pub fn encode(&self) -> serde_json::Result<Payload> {
        serde_json::to_string(self).map(Payload::from)
    }

    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
