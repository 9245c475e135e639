//! Latest-reading mailbox between the classifier and gesture clients
//!
//! The classifier publishes every detection. Poll clients take the pending
//! reading (and clear it, so one detection answers at most one poll), and
//! clear it outright when they start listening; stream clients get every
//! reading as it is published.

use assent_core::gesture::GestureReading;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug)]
pub struct GestureFeed {
    pending: Mutex<Option<GestureReading>>,
    stream: broadcast::Sender<GestureReading>,
}

impl Default for GestureFeed {
    fn default() -> Self {
        Self::new(32)
    }
}

impl GestureFeed {
    pub fn new(stream_capacity: usize) -> Self {
        let (stream, _) = broadcast::channel(stream_capacity.max(1));
        Self {
            pending: Mutex::new(None),
            stream,
        }
    }

    /// Record a reading. Only detections are kept for pollers; everything is
    /// forwarded to stream subscribers.
    pub fn publish(&self, reading: GestureReading) {
        if reading.accepted().is_some() {
            debug!("Gesture published: {:?}", reading.gesture);
            *self.pending.lock() = Some(reading.clone());
        }
        // No subscribers is fine
        let _ = self.stream.send(reading);
    }

    /// Take the pending detection, or an empty reading when there is none
    pub fn take(&self) -> GestureReading {
        self.pending.lock().take().unwrap_or_default()
    }

    /// Drop the pending detection without reading it
    pub fn clear(&self) {
        if self.pending.lock().take().is_some() {
            debug!("Pending gesture discarded");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GestureReading> {
        self.stream.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assent_core::gesture::Gesture;

    #[test]
    fn test_take_clears_pending() {
        let feed = GestureFeed::default();
        assert_eq!(feed.take(), GestureReading::none());

        feed.publish(GestureReading::detected(Gesture::Yes));
        assert_eq!(feed.take().accepted(), Some(Gesture::Yes));
        assert_eq!(feed.take(), GestureReading::none());
    }

    #[test]
    fn test_clear_drops_earlier_detection_only() {
        let feed = GestureFeed::default();
        feed.publish(GestureReading::detected(Gesture::Yes));
        feed.clear();
        assert_eq!(feed.take(), GestureReading::none());

        feed.publish(GestureReading::detected(Gesture::No));
        assert_eq!(feed.take().accepted(), Some(Gesture::No));
    }

    #[test]
    fn test_non_detections_do_not_overwrite() {
        let feed = GestureFeed::default();
        feed.publish(GestureReading::detected(Gesture::No));
        feed.publish(GestureReading::none());
        assert_eq!(feed.take().accepted(), Some(Gesture::No));
    }

    #[tokio::test]
    async fn test_subscribers_see_every_reading() {
        let feed = GestureFeed::default();
        let mut rx = feed.subscribe();
        feed.publish(GestureReading::none());
        feed.publish(GestureReading::detected(Gesture::Yes));
        assert_eq!(rx.recv().await.unwrap(), GestureReading::none());
        assert_eq!(rx.recv().await.unwrap().accepted(), Some(Gesture::Yes));
    }
}
