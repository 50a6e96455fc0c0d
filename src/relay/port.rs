//! Origin-stamped message ports between browsing contexts.
//!
//! A [`MessagePort`] is the headless stand-in for `window.postMessage`: a
//! FIFO, unidirectional-per-side pipe whose deliveries arrive stamped with
//! the sender's [`Origin`]. The stamp is applied by the transport, not the
//! sender's payload, so a peer cannot forge it; origin checks in the
//! bridges rely on that. [`InProcessPort::pair`] wires two ends together
//! over unbounded channels for in-process sessions and tests.

use std::error::Error;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use url::Url;

/// A web origin in serialized form (`scheme://host[:port]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    /// Wrap an already-serialized origin string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The origin of a URL, ASCII-serialized the way the browser would
    /// report it (default ports omitted).
    pub fn of_url(url: &Url) -> Self {
        Self(url.origin().ascii_serialization())
    }

    /// Serialized form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Url> for Origin {
    fn from(url: &Url) -> Self {
        Self::of_url(url)
    }
}

/// A delivery: the raw payload plus the transport-stamped sender origin.
#[derive(Debug, Clone)]
pub struct PostedMessage {
    /// Origin of the sending context.
    pub origin: Origin,
    /// Raw JSON payload, not yet validated as an envelope.
    pub payload: Value,
}

/// Why a send failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortError {
    /// The peer context is gone; the message can never be delivered.
    PeerClosed,
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer context closed"),
        }
    }
}

impl Error for PortError {}

/// One end of a cross-context message pipe.
#[async_trait]
pub trait MessagePort: Send {
    /// Deliver a payload to the peer, stamped with this side's origin.
    fn post(&self, payload: Value) -> Result<(), PortError>;

    /// Next delivery, in send order. `None` once the peer is gone and the
    /// queue is drained.
    async fn recv(&mut self) -> Option<PostedMessage>;

    /// The origin this side stamps on its deliveries.
    fn local_origin(&self) -> &Origin;
}

/// In-process [`MessagePort`] backed by a pair of unbounded channels.
#[derive(Debug)]
pub struct InProcessPort {
    local_origin: Origin,
    to_peer: UnboundedSender<PostedMessage>,
    from_peer: UnboundedReceiver<PostedMessage>,
}

impl InProcessPort {
    /// Two connected ends. Messages posted on the first end arrive on the
    /// second stamped `first_origin`, and vice versa.
    pub fn pair(first_origin: Origin, second_origin: Origin) -> (Self, Self) {
        let (to_second, from_first) = mpsc::unbounded_channel();
        let (to_first, from_second) = mpsc::unbounded_channel();
        (
            Self {
                local_origin: first_origin,
                to_peer: to_second,
                from_peer: from_second,
            },
            Self {
                local_origin: second_origin,
                to_peer: to_first,
                from_peer: from_first,
            },
        )
    }
}

#[async_trait]
impl MessagePort for InProcessPort {
    fn post(&self, payload: Value) -> Result<(), PortError> {
        self.to_peer
            .send(PostedMessage {
                origin: self.local_origin.clone(),
                payload,
            })
            .map_err(|_| PortError::PeerClosed)
    }

    async fn recv(&mut self) -> Option<PostedMessage> {
        self.from_peer.recv().await
    }

    fn local_origin(&self) -> &Origin {
        &self.local_origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_pair_stamps_sender_origin() {
        let (lms_end, mut content_end) = InProcessPort::pair(
            Origin::new("https://lms.example"),
            Origin::new("https://content.example"),
        );
        lms_end.post(json!({"hello": 1})).unwrap();
        let delivery = content_end.recv().await.unwrap();
        assert_eq!(delivery.origin, Origin::new("https://lms.example"));
        assert_eq!(delivery.payload, json!({"hello": 1}));
    }

    #[tokio::test]
    async fn test_deliveries_keep_fifo_order() {
        let (a, mut b) = InProcessPort::pair(Origin::new("a://x"), Origin::new("b://y"));
        for n in 0..5 {
            a.post(json!(n)).unwrap();
        }
        for n in 0..5 {
            assert_eq!(b.recv().await.unwrap().payload, json!(n));
        }
    }

    #[tokio::test]
    async fn test_post_to_dropped_peer_fails() {
        let (a, b) = InProcessPort::pair(Origin::new("a://x"), Origin::new("b://y"));
        drop(b);
        assert_eq!(a.post(json!("gone")), Err(PortError::PeerClosed));
    }

    #[test]
    fn test_origin_of_url_drops_default_port() {
        let url = Url::parse("https://lms.example:443/course/view.php?id=7").unwrap();
        assert_eq!(Origin::of_url(&url).as_str(), "https://lms.example");
        let url = Url::parse("http://localhost:8080/scorm/index.html").unwrap();
        assert_eq!(Origin::of_url(&url).as_str(), "http://localhost:8080");
    }
}
