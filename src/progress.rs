//! Typed progress events for the composition pipeline.
//!
//! Inject an [`Arc<dyn ProgressSink>`] via
//! [`crate::config::ComposerConfigBuilder::progress`] to observe each phase
//! as it runs. Plain closures implement [`ProgressSink`], and
//! [`ChannelProgress`] forwards events into a tokio channel exposed as a
//! `Stream` for callers that prefer message passing.
//!
//! # Example
//!
//! ```rust
//! use report_composer::{ComposerConfig, ProgressEvent, ProgressSink};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! let pages = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&pages);
//! let sink = move |event: ProgressEvent| {
//!     if let ProgressEvent::PageRendered { .. } = event {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     }
//! };
//!
//! let config = ComposerConfig::builder()
//!     .progress(Arc::new(sink) as Arc<dyn ProgressSink>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Pipeline phase an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Ingest,
    Aggregate,
    Capture,
    Layout,
    Render,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Ingest => "ingest",
            Phase::Aggregate => "aggregate",
            Phase::Capture => "capture",
            Phase::Layout => "layout",
            Phase::Render => "render",
        };
        f.write_str(s)
    }
}

/// One observable step of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A phase begins; `total` is the number of items it will process.
    PhaseStarted { phase: Phase, total: usize },
    /// A spreadsheet was accepted.
    TableIngested { table: String, rows: usize },
    /// Question columns were tallied.
    QuestionsAggregated { questions: usize },
    /// One chart finished (1-based `index`).
    ChartCaptured { index: usize, total: usize },
    /// One chart failed and was replaced by a placeholder.
    ChartFailed {
        index: usize,
        total: usize,
        error: String,
    },
    /// A capture batch finished after a newer one started and was dropped.
    CaptureDiscarded { epoch: u64, current: u64 },
    /// The page plan is ready.
    LayoutPlanned { pages: usize },
    /// An image slot degraded to a placeholder.
    ImageDegraded { reference: String, error: String },
    /// One output page was written (1-based `page`).
    PageRendered { page: usize, total: usize },
    /// A phase finished.
    PhaseCompleted { phase: Phase },
}

/// Receives [`ProgressEvent`]s.
///
/// Implementations must be `Send + Sync`; chart capture reports from the
/// async task driving it while image fetches run concurrently.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Discards every event. Used when no sink is configured.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events into an unbounded tokio channel.
///
/// Sending never blocks; events emitted after the receiver is dropped are
/// discarded.
#[derive(Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    /// Create a sink and the stream that yields its events.
    pub fn channel() -> (Self, UnboundedReceiverStream<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, UnboundedReceiverStream::new(rx))
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Type stored in [`crate::config::ComposerConfig`].
pub type ProgressHandle = Arc<dyn ProgressSink>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_stream::StreamExt;

    #[test]
    fn noop_sink_accepts_everything() {
        let sink = NoopProgress;
        sink.emit(ProgressEvent::PhaseStarted {
            phase: Phase::Capture,
            total: 3,
        });
        sink.emit(ProgressEvent::PhaseCompleted {
            phase: Phase::Capture,
        });
    }

    #[test]
    fn closure_sink_receives_events() {
        let failures = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&failures);
        let sink: ProgressHandle = Arc::new(move |e: ProgressEvent| {
            if matches!(e, ProgressEvent::ChartFailed { .. }) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        sink.emit(ProgressEvent::ChartCaptured { index: 1, total: 2 });
        sink.emit(ProgressEvent::ChartFailed {
            index: 2,
            total: 2,
            error: "boom".into(),
        });
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn channel_sink_streams_in_order() {
        let (sink, mut stream) = ChannelProgress::channel();
        sink.emit(ProgressEvent::LayoutPlanned { pages: 8 });
        sink.emit(ProgressEvent::PageRendered { page: 1, total: 8 });
        drop(sink);

        let mut collected = Vec::new();
        while let Some(e) = stream.next().await {
            collected.push(e);
        }
        assert_eq!(
            collected,
            vec![
                ProgressEvent::LayoutPlanned { pages: 8 },
                ProgressEvent::PageRendered { page: 1, total: 8 },
            ]
        );
    }

    #[test]
    fn events_serialise_with_tag() {
        let json = serde_json::to_string(&ProgressEvent::PhaseStarted {
            phase: Phase::Render,
            total: 4,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"phase_started","phase":"render","total":4}"#);
    }
}
