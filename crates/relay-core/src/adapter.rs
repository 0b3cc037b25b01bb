//! Translation of engine events into queued stream items.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::channel::ItemSender;
use crate::event::{EngineEvent, ToolOutput};
use crate::item::StreamItem;

/// Receiver of engine events for one run.
///
/// Engines call `emit` from inside their own execution context, so
/// implementations must return promptly and must not fail.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Maps one engine event to the items forwarded for it.
///
/// Text deltas are forwarded as given: the same delta twice yields the same
/// fragment twice. Tool outputs other than logs produce nothing.
pub fn adapt(event: EngineEvent) -> Vec<StreamItem> {
    match event {
        EngineEvent::TextCreated => vec![StreamItem::role_marker()],
        EngineEvent::TextDelta { value } => vec![StreamItem::TextFragment { text: value }],
        EngineEvent::ToolCallCreated { kind } => vec![StreamItem::ToolInvocationStarted { kind }],
        EngineEvent::ToolCallDelta { outputs, .. } => outputs
            .into_iter()
            .filter_map(|output| match output {
                ToolOutput::Logs { logs } => Some(StreamItem::ToolOutputFragment { text: logs }),
                ToolOutput::Image { .. } | ToolOutput::Unknown => None,
            })
            .collect(),
    }
}

/// Event sink that pushes adapted items onto a stream channel.
pub struct EventAdapter {
    sender: ItemSender,
    dropped: AtomicU64,
}

impl EventAdapter {
    pub fn new(sender: ItemSender) -> Self {
        Self {
            sender,
            dropped: AtomicU64::new(0),
        }
    }

    /// Number of items dropped because the consumer was already gone.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn push(&self, item: StreamItem) {
        let kind = item.kind();
        if self.sender.push(item) {
            trace!(item = kind, "stream item queued");
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl EventSink for EventAdapter {
    fn emit(&self, event: EngineEvent) {
        for item in adapt(event) {
            self.push(item);
        }
    }
}
