//! Chart capture: aggregates → one [`ChartArtifact`] each, in order.
//!
//! Capture is strictly sequential. Before each chart the orchestrator waits
//! the configured settle delay, then rasterises both views on a blocking
//! thread. A rasterizer error or panic only affects its own chart: the slot
//! becomes a placeholder carrying an [`ArtifactError::CaptureFailure`] and the
//! batch moves on. Questions without responses are not rasterised at all.

use crate::error::ArtifactError;
use crate::model::{ChartArtifact, ChartContent, QuestionAggregate};
use crate::pipeline::chart::{ChartRasterizer, ChartSpec, ChartView};
use crate::progress::{Phase, ProgressEvent, ProgressSink};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Knobs for one capture batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    pub settle_delay: Duration,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            width: 640,
            height: 400,
        }
    }
}

/// Capture every aggregate, returning exactly one artifact per aggregate.
pub async fn capture_charts(
    aggregates: &[QuestionAggregate],
    rasterizer: Arc<dyn ChartRasterizer>,
    options: &CaptureOptions,
    progress: &dyn ProgressSink,
) -> Vec<ChartArtifact> {
    let total = aggregates.len();
    info!("Capturing {} charts", total);
    progress.emit(ProgressEvent::PhaseStarted {
        phase: Phase::Capture,
        total,
    });

    let mut artifacts = Vec::with_capacity(total);
    for (index, aggregate) in aggregates.iter().enumerate() {
        let content = capture_one(index, aggregate, &rasterizer, options).await;

        match &content {
            ChartContent::Placeholder { error } => {
                warn!("{}", error);
                progress.emit(ProgressEvent::ChartFailed {
                    index: index + 1,
                    total,
                    error: error.to_string(),
                });
            }
            _ => progress.emit(ProgressEvent::ChartCaptured {
                index: index + 1,
                total,
            }),
        }

        artifacts.push(ChartArtifact {
            index,
            title: aggregate.question_label.clone(),
            content,
        });
    }

    let failed = artifacts.iter().filter(|a| a.is_placeholder()).count();
    info!("Captured {}/{} charts ({} placeholders)", total - failed, total, failed);
    progress.emit(ProgressEvent::PhaseCompleted {
        phase: Phase::Capture,
    });
    artifacts
}

async fn capture_one(
    index: usize,
    aggregate: &QuestionAggregate,
    rasterizer: &Arc<dyn ChartRasterizer>,
    options: &CaptureOptions,
) -> ChartContent {
    if aggregate.response_counts.is_empty() {
        debug!("Chart {} '{}' has no responses", index, aggregate.question_label);
        return ChartContent::NoResponses;
    }

    if !options.settle_delay.is_zero() {
        tokio::time::sleep(options.settle_delay).await;
    }

    let distribution = ChartSpec::from_aggregate(
        index,
        aggregate,
        ChartView::Distribution,
        options.width,
        options.height,
    );
    let proportion = ChartSpec {
        view: ChartView::Proportion,
        ..distribution.clone()
    };
    let rasterizer = Arc::clone(rasterizer);

    let result = tokio::task::spawn_blocking(move || {
        let distribution = rasterizer.rasterize(&distribution)?;
        let proportion = rasterizer.rasterize(&proportion)?;
        Ok::<_, String>((distribution, proportion))
    })
    .await
    .map_err(|e| format!("rasterizer task panicked: {e}"))
    .and_then(|r| r);

    match result {
        Ok((distribution, proportion)) => {
            debug!(
                "Chart {} rasterised: {} + {} bytes",
                index,
                distribution.len(),
                proportion.len()
            );
            ChartContent::Rendered {
                distribution,
                proportion,
            }
        }
        Err(detail) => ChartContent::Placeholder {
            error: ArtifactError::CaptureFailure {
                index,
                title: aggregate.question_label.clone(),
                detail,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResponseCounts;
    use crate::progress::NoopProgress;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedRasterizer;

    impl ChartRasterizer for FixedRasterizer {
        fn rasterize(&self, chart: &ChartSpec) -> Result<Vec<u8>, String> {
            Ok(vec![chart.index as u8, chart.view as u8])
        }
    }

    struct FailOn(usize);

    impl ChartRasterizer for FailOn {
        fn rasterize(&self, chart: &ChartSpec) -> Result<Vec<u8>, String> {
            if chart.index == self.0 {
                Err("render surface unavailable".into())
            } else {
                Ok(vec![1])
            }
        }
    }

    struct PanicOn(usize);

    impl ChartRasterizer for PanicOn {
        fn rasterize(&self, chart: &ChartSpec) -> Result<Vec<u8>, String> {
            if chart.index == self.0 {
                panic!("rasterizer bug");
            }
            Ok(vec![1])
        }
    }

    struct Counting(AtomicUsize);

    impl ChartRasterizer for Counting {
        fn rasterize(&self, _chart: &ChartSpec) -> Result<Vec<u8>, String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0])
        }
    }

    fn aggregate(label: &str, answers: &[&str]) -> QuestionAggregate {
        let mut counts = ResponseCounts::new();
        for a in answers {
            counts.record(a);
        }
        QuestionAggregate {
            question_label: label.into(),
            response_counts: counts,
        }
    }

    fn fast() -> CaptureOptions {
        CaptureOptions {
            settle_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn failure_on_second_of_three_becomes_placeholder() {
        let aggs = vec![
            aggregate("Q1?", &["Yes"]),
            aggregate("Q2?", &["No"]),
            aggregate("Q3?", &["Maybe"]),
        ];
        let artifacts = capture_charts(&aggs, Arc::new(FailOn(1)), &fast(), &NoopProgress).await;
        assert_eq!(artifacts.len(), 3);
        assert!(artifacts[0].is_rendered());
        assert!(artifacts[2].is_rendered());
        match &artifacts[1].content {
            ChartContent::Placeholder {
                error: ArtifactError::CaptureFailure { index, detail, .. },
            } => {
                assert_eq!(*index, 1);
                assert!(detail.contains("unavailable"));
            }
            other => panic!("expected placeholder, got {other:?}"),
        }
        let indices: Vec<_> = artifacts.iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn rasterizer_panic_is_contained() {
        let aggs = vec![aggregate("Q1?", &["Yes"]), aggregate("Q2?", &["No"])];
        let artifacts = capture_charts(&aggs, Arc::new(PanicOn(0)), &fast(), &NoopProgress).await;
        assert!(artifacts[0].is_placeholder());
        assert!(artifacts[1].is_rendered());
    }

    #[tokio::test]
    async fn empty_aggregate_is_not_rasterised() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let aggs = vec![aggregate("Anything else?", &[]), aggregate("Q?", &["A"])];
        let artifacts = capture_charts(
            &aggs,
            Arc::clone(&counter) as Arc<dyn ChartRasterizer>,
            &fast(),
            &NoopProgress,
        )
        .await;
        assert_eq!(artifacts[0].content, ChartContent::NoResponses);
        assert!(artifacts[1].is_rendered());
        // two views for the one answered question
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn both_views_are_captured() {
        let aggs = vec![aggregate("Q?", &["A", "B"])];
        let artifacts =
            capture_charts(&aggs, Arc::new(FixedRasterizer), &fast(), &NoopProgress).await;
        assert_eq!(
            artifacts[0].content,
            ChartContent::Rendered {
                distribution: vec![0, ChartView::Distribution as u8],
                proportion: vec![0, ChartView::Proportion as u8],
            }
        );
    }

    #[tokio::test]
    async fn progress_reports_each_chart() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        let sink = move |e: ProgressEvent| sink_events.lock().unwrap().push(e);
        let aggs = vec![aggregate("Q1?", &["Yes"]), aggregate("Q2?", &["No"])];
        capture_charts(&aggs, Arc::new(FailOn(1)), &fast(), &sink).await;

        let events = events.lock().unwrap();
        assert_eq!(
            events.first(),
            Some(&ProgressEvent::PhaseStarted {
                phase: Phase::Capture,
                total: 2
            })
        );
        assert!(events.contains(&ProgressEvent::ChartCaptured { index: 1, total: 2 }));
        assert!(events
            .iter()
            .any(|e| matches!(e, ProgressEvent::ChartFailed { index: 2, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn settle_delay_precedes_each_capture() {
        let aggs = vec![aggregate("Q1?", &["Yes"]), aggregate("Q2?", &["No"])];
        let options = CaptureOptions {
            settle_delay: Duration::from_millis(500),
            ..Default::default()
        };
        let start = tokio::time::Instant::now();
        capture_charts(&aggs, Arc::new(FixedRasterizer), &options, &NoopProgress).await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }
}
