use crate::analysis::{AnalysisResult, AnnotatedImage, FeedbackTone, PostureMetrics};

pub const NO_IMAGE_CAPTURED_MESSAGE: &str = "No image captured from webcam.";

/// What a presenter observes: whether detection runs, and the latest completed cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionState {
    pub running: bool,
    pub feedback: Vec<String>,
    pub annotated_image: Option<AnnotatedImage>,
    pub metrics: Option<PostureMetrics>,
    cycle: u64,
}

impl DetectionState {
    /// Sequence number of the cycle currently shown, 0 before any cycle completed.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn tones(&self) -> Vec<FeedbackTone> {
        self.feedback
            .iter()
            .map(|message| FeedbackTone::of(message))
            .collect()
    }

    /// Replaces feedback, image and metrics with `result`, unless a later cycle is already shown.
    pub(crate) fn apply(&mut self, cycle: u64, result: &AnalysisResult) -> bool {
        if cycle <= self.cycle {
            tracing::debug!(
                cycle,
                shown = self.cycle,
                "Discarding stale analysis result"
            );
            return false;
        }
        self.cycle = cycle;
        self.feedback = result.feedback();
        self.annotated_image = result.annotated_image().cloned();
        self.metrics = result.metrics();
        true
    }
}

pub(crate) fn no_frame_result() -> AnalysisResult {
    AnalysisResult::Feedback {
        feedback: vec![NO_IMAGE_CAPTURED_MESSAGE.to_string()],
        annotated_image: None,
        metrics: None,
    }
}
