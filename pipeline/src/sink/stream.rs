//! Fan-out of the MJPEG stream to HTTP viewers.
//!
//! Every viewer owns a bounded queue. Publishing never blocks: a full queue
//! drops that frame for that viewer only, and a viewer that keeps falling
//! behind is disconnected. New viewers only see frames published after they
//! subscribe.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use bytes::Bytes;
use frame_enhance_common::config::StreamConfig;
use frame_enhance_common::frame::TimestampedFrame;
use futures_util::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::{multipart, FrameSink, SinkError, SinkStatus};
use crate::encode::encode_jpeg;

struct Viewer {
    id: u64,
    tx: mpsc::Sender<Bytes>,
    /// Consecutive frames dropped because the queue was full.
    dropped: u32,
}

/// Result of one [`StreamHub::publish`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
    pub disconnected: usize,
}

pub struct StreamHub {
    viewers: Mutex<Vec<Viewer>>,
    next_id: AtomicU64,
    queue: usize,
    max_dropped: u32,
}

impl StreamHub {
    pub fn new(queue: usize, max_dropped: u32) -> Arc<Self> {
        Arc::new(Self {
            viewers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            queue: queue.max(1),
            max_dropped,
        })
    }

    pub fn from_config(config: &StreamConfig) -> Arc<Self> {
        Self::new(config.viewer_queue, config.max_dropped_frames)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Viewer>> {
        self.viewers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach a new viewer.
    pub fn subscribe(self: &Arc<Self>) -> ViewerStream {
        let (tx, rx) = mpsc::channel(self.queue);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let count = {
            let mut viewers = self.lock();
            viewers.push(Viewer { id, tx, dropped: 0 });
            viewers.len()
        };
        info!(viewer = id, viewers = count, "viewer attached");
        ViewerStream {
            id,
            rx,
            hub: Arc::downgrade(self),
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.lock().len()
    }

    pub fn has_viewers(&self) -> bool {
        !self.lock().is_empty()
    }

    /// Offer one part to every viewer without waiting on any of them.
    pub fn publish(&self, part: Bytes) -> PublishReport {
        let mut report = PublishReport::default();
        let max_dropped = self.max_dropped;
        self.lock().retain_mut(|viewer| match viewer.tx.try_send(part.clone()) {
            Ok(()) => {
                viewer.dropped = 0;
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                viewer.dropped += 1;
                report.dropped += 1;
                if viewer.dropped > max_dropped {
                    warn!(viewer = viewer.id, dropped = viewer.dropped, "viewer too slow, disconnecting");
                    report.disconnected += 1;
                    false
                } else {
                    true
                }
            }
            Err(TrySendError::Closed(_)) => {
                debug!(viewer = viewer.id, "viewer went away");
                report.disconnected += 1;
                false
            }
        });
        report
    }

    fn remove(&self, id: u64) {
        let mut viewers = self.lock();
        let before = viewers.len();
        viewers.retain(|viewer| viewer.id != id);
        if viewers.len() != before {
            info!(viewer = id, viewers = viewers.len(), "viewer detached");
        }
    }

    /// Disconnect every viewer; their streams end after draining.
    pub fn close(&self) {
        let closed = std::mem::take(&mut *self.lock());
        if !closed.is_empty() {
            info!(viewers = closed.len(), "stream hub closed");
        }
    }
}

/// One viewer's view of the stream: multipart parts in publish order.
/// Dropping it detaches the viewer.
pub struct ViewerStream {
    id: u64,
    rx: mpsc::Receiver<Bytes>,
    hub: Weak<StreamHub>,
}

impl ViewerStream {
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Stream for ViewerStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ViewerStream {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}

/// Encodes frames for the hub. Encoding is skipped while nobody watches.
pub struct StreamSink {
    hub: Arc<StreamHub>,
    quality: u8,
}

impl StreamSink {
    pub fn new(hub: Arc<StreamHub>, quality: u8) -> Self {
        Self { hub, quality }
    }
}

impl FrameSink for StreamSink {
    fn deliver(&mut self, frame: &TimestampedFrame) -> Result<SinkStatus, SinkError> {
        if !self.hub.has_viewers() {
            return Ok(SinkStatus::Continue);
        }
        let jpeg = encode_jpeg(frame.image(), self.quality)?;
        let report = self.hub.publish(multipart::encode_part(&jpeg));
        debug!(
            seq = frame.seq(),
            bytes = jpeg.len(),
            delivered = report.delivered,
            dropped = report.dropped,
            "frame published"
        );
        Ok(SinkStatus::Continue)
    }

    fn close(&mut self) {
        self.hub.close();
    }

    fn name(&self) -> &str {
        "stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_enhance_common::frame::FrameImage;
    use futures_util::StreamExt;
    use image::{Rgb, RgbImage};
    use std::time::{Duration, Instant};

    fn frame(seq: u64) -> TimestampedFrame {
        let rgb = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, seq as u8]));
        TimestampedFrame::new(FrameImage::Rgb(rgb), 0, seq)
    }

    #[tokio::test]
    async fn viewers_see_only_future_frames() {
        let hub = StreamHub::new(8, 4);
        hub.publish(Bytes::from_static(b"before"));
        let mut viewer = hub.subscribe();
        hub.publish(Bytes::from_static(b"after"));
        assert_eq!(viewer.recv().await, Some(Bytes::from_static(b"after")));
    }

    #[tokio::test]
    async fn dropping_viewer_detaches() {
        let hub = StreamHub::new(2, 4);
        let viewer = hub.subscribe();
        assert_eq!(hub.viewer_count(), 1);
        drop(viewer);
        assert_eq!(hub.viewer_count(), 0);
    }

    #[tokio::test]
    async fn slow_viewer_is_isolated_then_disconnected() {
        let hub = StreamHub::new(2, 3);
        let mut healthy = hub.subscribe();
        let _stalled = hub.subscribe();

        let mut worst = Duration::ZERO;
        for i in 0..10u8 {
            let started = Instant::now();
            hub.publish(Bytes::from(vec![i]));
            worst = worst.max(started.elapsed());
            assert_eq!(healthy.recv().await, Some(Bytes::from(vec![i])));
        }
        // Publishing never waits on the stalled viewer.
        assert!(worst < Duration::from_millis(50), "publish took {worst:?}");
        // Two queued, then more than three consecutive drops.
        assert_eq!(hub.viewer_count(), 1);
    }

    #[tokio::test]
    async fn closed_hub_ends_streams() {
        let hub = StreamHub::new(4, 4);
        let mut viewer = hub.subscribe();
        hub.publish(Bytes::from_static(b"last"));
        hub.close();
        assert_eq!(viewer.next().await, Some(Bytes::from_static(b"last")));
        assert_eq!(viewer.next().await, None);
    }

    #[tokio::test]
    async fn sink_skips_encoding_without_viewers() {
        let hub = StreamHub::new(4, 4);
        let mut sink = StreamSink::new(Arc::clone(&hub), 80);
        assert_eq!(sink.deliver(&frame(0)).unwrap(), SinkStatus::Continue);

        let mut viewer = hub.subscribe();
        sink.deliver(&frame(1)).unwrap();
        let part = viewer.recv().await.unwrap();
        let header_end = part.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        let header = std::str::from_utf8(&part[..header_end]).unwrap();
        let body = &part[header_end..part.len() - 2];
        assert!(header.starts_with("--frame\r\nContent-Type: image/jpeg\r\n"));
        assert!(header.contains(&format!("Content-Length: {}\r\n", body.len())));
        assert_eq!(&body[..2], &[0xFF, 0xD8]);
        assert_eq!(&part[part.len() - 2..], b"\r\n");
    }

    #[tokio::test]
    async fn bad_quality_surfaces_as_sink_error() {
        let hub = StreamHub::new(4, 4);
        let _viewer = hub.subscribe();
        let mut sink = StreamSink::new(hub, 0);
        assert!(matches!(sink.deliver(&frame(0)), Err(SinkError::Encode(_))));
    }
}
