//! # Transport Abstraction
//!
//! The single primitive that moves an encoded command out of this zone.
//!
//! ## Philosophy
//!
//! - **String-Oriented**: The transport knows nothing about commands, paths
//!   or callbacks. It moves opaque strings.
//! - **Fire-and-Forget**: `send` enqueues and returns. Whatever the other side
//!   says back arrives later as an ordinary inbound message.
//! - **FIFO per Direction**: Messages from A to B are delivered in send order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::runtime::Runtime;

/// Errors that occur at the transport layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The other zone is gone or was never attached.
    ConnectionLost(String),
    /// Generic I/O or internal transport failure.
    Io(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A mechanism to hand an encoded command to the other zone.
///
/// This trait is object-safe (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync + 'static {
    /// Sends a payload without waiting for any reply.
    ///
    /// # invariants
    /// - Must not interpret the payload.
    /// - Must preserve the order of successive sends.
    fn send(&self, payload: &str) -> Result<()>;
}

/// The transport of a runtime with no peer attached. Every send fails.
pub struct Disconnected;

impl Transport for Disconnected {
    fn send(&self, _payload: &str) -> Result<()> {
        Err(Error::ConnectionLost("no transport attached".into()))
    }
}

/// Sending half of an in-process link between two zones.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl Transport for ChannelTransport {
    fn send(&self, payload: &str) -> Result<()> {
        self.tx
            .send(payload.to_string())
            .map_err(|_| Error::ConnectionLost("Channel closed".into()))
    }
}

/// Receiving half of an in-process link.
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<String>,
}

impl Inbox {
    /// Delivers every message already queued, in order, and returns how many
    /// were delivered. Messages queued while draining are delivered too.
    pub fn drain(&mut self, rt: &Runtime) -> usize {
        let mut delivered = 0;
        while let Ok(msg) = self.rx.try_recv() {
            rt.receive(&msg);
            delivered += 1;
        }
        delivered
    }

    /// Pumps messages into `rt` one at a time until every sender is dropped.
    pub async fn run(mut self, rt: Arc<Runtime>) {
        while let Some(msg) = self.rx.recv().await {
            rt.receive(&msg);
        }
        debug!(zone = %rt.zone(), "inbox closed");
    }
}

/// One end of a link: the transport to give to a runtime, and the inbox that
/// receives what the other end sends.
pub struct Endpoint {
    pub transport: Arc<dyn Transport>,
    pub inbox: Inbox,
}

/// Creates two endpoints connected to each other.
///
/// Messages sent on `a.transport` arrive in `b.inbox` and vice versa.
pub fn pair() -> (Endpoint, Endpoint) {
    let (tx_a, rx_a) = mpsc::unbounded_channel();
    let (tx_b, rx_b) = mpsc::unbounded_channel();

    let a = Endpoint {
        transport: Arc::new(ChannelTransport { tx: tx_a }),
        inbox: Inbox { rx: rx_b },
    };

    let b = Endpoint {
        transport: Arc::new(ChannelTransport { tx: tx_b }),
        inbox: Inbox { rx: rx_a },
    };

    (a, b)
}
