//! Transport-only event fanout.
//!
//! `PubChan`/`SubChan` deliver `EventEnvelope`s to live subscribers. This
//! layer does no persistence; the Event Store is the durable side, and the
//! driver/executor write to both independently.

use tokio::sync::broadcast;

use crate::events::EventEnvelope;

const FANOUT_BUFFER: usize = 1024;

/// The publish half of a dialog's event channel.
pub struct PubChan {
    sender: broadcast::Sender<EventEnvelope>,
}

impl PubChan {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FANOUT_BUFFER);
        Self { sender }
    }

    pub fn write(&self, event: EventEnvelope) {
        // No subscribers is not an error: broadcast::send returns Err only
        // when there are zero receivers, which is the normal "nobody is
        // watching this dialog right now" case.
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn subscribe(&self) -> SubChan {
        SubChan {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for PubChan {
    fn default() -> Self {
        Self::new()
    }
}

/// A per-reader view onto a `PubChan`.
pub struct SubChan {
    receiver: broadcast::Receiver<EventEnvelope>,
}

/// Result of a single `SubChan::read`.
pub enum ReadResult {
    Event(EventEnvelope),
    /// The publisher side has lagged this subscriber; some events were
    /// skipped. Callers should fall back to a replay from the Event Store.
    Lagged(u64),
    /// The channel was closed (publisher dropped). Acts as end-of-stream.
    Closed,
}

impl SubChan {
    /// Yields the next event, or an end-of-stream/lag sentinel.
    pub async fn read(&mut self) -> ReadResult {
        match self.receiver.recv().await {
            Ok(event) => ReadResult::Event(event),
            Err(broadcast::error::RecvError::Lagged(n)) => ReadResult::Lagged(n),
            Err(broadcast::error::RecvError::Closed) => ReadResult::Closed,
        }
    }

    /// Detaches this subscriber; dropping the value is equivalent.
    pub fn cancel(self) {
        drop(self);
    }
}

pub fn create_pub_chan() -> PubChan {
    PubChan::new()
}

pub fn create_sub_chan(pub_chan: &PubChan) -> SubChan {
    pub_chan.subscribe()
}
