// Client event emitter
//
// Thin writer over a pluggable sink. The emitter owns the closed flag: once
// the sink reports the client gone (or `close` is called) every further emit
// is a silent no-op, so a turn that keeps running after a disconnect never
// panics the transport. Mirrors the guarded-enqueue discipline of the
// original service's response writer.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::ClientEvent;

/// Destination for serialized event frames
///
/// `send` returns false when the client is gone; the emitter then stops
/// trying.
pub trait EventSink: Send + Sync {
    /// Deliver one serialized frame; false means the sink is closed
    fn send(&self, frame: String) -> bool;
}

/// Sink backed by an unbounded channel, for server transports and tests
#[derive(Debug)]
pub struct ChannelSink(pub mpsc::UnboundedSender<String>);

impl EventSink for ChannelSink {
    fn send(&self, frame: String) -> bool {
        self.0.send(frame).is_ok()
    }
}

/// Serializes client events and writes them to the sink
pub struct EventEmitter {
    sink: Box<dyn EventSink>,
    closed: AtomicBool,
}

impl EventEmitter {
    /// Create an emitter over a sink
    pub fn new(sink: Box<dyn EventSink>) -> Self {
        Self { sink, closed: AtomicBool::new(false) }
    }

    /// Create an emitter over a channel, returning the receiving half
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(Box::new(ChannelSink(tx))), rx)
    }

    /// Emit one event as a single JSON frame
    ///
    /// No-op once closed. Serialization failure closes the emitter rather
    /// than sending a half-written frame.
    pub fn emit(&self, event: &ClientEvent) {
        if self.closed.load(Ordering::Acquire) {
            debug!("emit after close dropped");
            return;
        }
        match serde_json::to_string(event) {
            Ok(frame) => {
                if !self.sink.send(frame) {
                    debug!("sink closed, suppressing further emits");
                    self.closed.store(true, Ordering::Release);
                }
            }
            Err(e) => {
                warn!(error = %e, "event serialization failed");
                self.closed.store(true, Ordering::Release);
            }
        }
    }

    /// Close the emitter; idempotent
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether the emitter has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_serializes_one_frame_per_event() {
        let (emitter, mut rx) = EventEmitter::channel();

        emitter.emit(&ClientEvent::Text { content: "hello".to_string() });
        emitter.emit(&ClientEvent::Text { content: "world".to_string() });

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first, r#"{"type":"text","content":"hello"}"#);
        assert_eq!(second, r#"{"type":"text","content":"world"}"#);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_after_close_is_noop() {
        let (emitter, mut rx) = EventEmitter::channel();

        emitter.close();
        emitter.emit(&ClientEvent::Text { content: "dropped".to_string() });

        assert!(emitter.is_closed());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (emitter, _rx) = EventEmitter::channel();
        emitter.close();
        emitter.close();
        assert!(emitter.is_closed());
    }

    #[test]
    fn test_dead_sink_closes_emitter() {
        let (emitter, rx) = EventEmitter::channel();
        drop(rx);

        emitter.emit(&ClientEvent::Text { content: "gone".to_string() });
        assert!(emitter.is_closed());
    }
}
