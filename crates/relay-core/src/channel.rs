//! Ordered hand-off of stream items from one run task to one stream controller.

use tokio::sync::mpsc;

use crate::item::StreamItem;

/// Creates the channel for one client stream.
///
/// The channel is unbounded so the producer never waits on the consumer.
pub fn channel() -> (ItemSender, ItemReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ItemSender { tx }, ItemReceiver { rx })
}

/// Producer half. Not `Clone`: each stream has exactly one producer.
#[derive(Debug)]
pub struct ItemSender {
    tx: mpsc::UnboundedSender<StreamItem>,
}

impl ItemSender {
    /// Enqueues an item without suspending.
    ///
    /// Returns `false` when the consumer is gone; the item is dropped.
    pub fn push(&self, item: StreamItem) -> bool {
        self.tx.send(item).is_ok()
    }

    /// Returns true once the consumer closed or dropped its half.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct ItemReceiver {
    rx: mpsc::UnboundedReceiver<StreamItem>,
}

impl ItemReceiver {
    /// Waits for the next item in push order.
    ///
    /// Returns `None` once the producer is gone and every queued item was
    /// taken.
    pub async fn pop(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }

    /// Closes the channel; later pushes are dropped.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
