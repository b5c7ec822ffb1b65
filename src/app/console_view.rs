use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::analysis::FeedbackTone;
use crate::detection::DetectionState;

/// A headless presenter that logs every state change.
#[derive(Debug, Default)]
pub struct ConsoleView {
    last_cycle: u64,
    was_running: bool,
}

impl ConsoleView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders a state into log lines, or nothing when neither the cycle nor the run flag moved.
    pub fn render(&mut self, state: &DetectionState) -> Vec<String> {
        if state.cycle() == self.last_cycle && state.running == self.was_running {
            return Vec::new();
        }
        self.last_cycle = state.cycle();
        self.was_running = state.running;

        let mut header = format!(
            "[{}] cycle {}",
            if state.running { "analyzing" } else { "idle" },
            state.cycle()
        );
        if let Some(metrics) = state.metrics {
            if let Some(score) = metrics.posture_score {
                header.push_str(&format!(" | score {score}"));
            }
            if let Some(angle) = metrics.neck_angle {
                header.push_str(&format!(" | neck {angle:.1}°"));
            }
        }
        header.push_str(match state.annotated_image {
            Some(_) => " | annotated image ready",
            None => " | no annotated image",
        });

        let mut lines = vec![header];
        if state.feedback.is_empty() {
            lines.push("  No feedback available".to_string());
        }
        for (message, tone) in state.feedback.iter().zip(state.tones()) {
            let marker = match tone {
                FeedbackTone::Positive => '+',
                FeedbackTone::Corrective => '!',
            };
            lines.push(format!("  {marker} {message}"));
        }
        lines
    }

    pub async fn run(
        mut self,
        mut state_rx: watch::Receiver<DetectionState>,
        cancel_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = state_rx.borrow_and_update().clone();
                    for line in self.render(&state) {
                        tracing::info!("{}", line);
                    }
                }
            }
        }
        tracing::debug!("Console view stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisResult, AnnotatedImage, PostureMetrics};

    fn state_after(result: AnalysisResult) -> DetectionState {
        let mut state = DetectionState::default();
        state.running = true;
        state.apply(1, &result);
        state
    }

    #[test]
    fn renders_metrics_and_toned_feedback() {
        let state = state_after(AnalysisResult::Feedback {
            feedback: vec![
                "Good posture!".to_string(),
                "Forward head posture detected".to_string(),
            ],
            annotated_image: Some(AnnotatedImage::from_base64("QUJD")),
            metrics: Some(PostureMetrics {
                posture_score: Some(72),
                neck_angle: Some(141.3),
            }),
        });

        let lines = ConsoleView::new().render(&state);
        assert_eq!(
            lines,
            vec![
                "[analyzing] cycle 1 | score 72 | neck 141.3° | annotated image ready".to_string(),
                "  + Good posture!".to_string(),
                "  ! Forward head posture detected".to_string(),
            ]
        );
    }

    #[test]
    fn unchanged_state_renders_nothing() {
        let state = state_after(AnalysisResult::request_failed(None));
        let mut view = ConsoleView::new();
        assert!(!view.render(&state).is_empty());
        assert!(view.render(&state).is_empty());
    }

    #[test]
    fn idle_state_without_feedback() {
        let mut state = DetectionState::default();
        state.running = true;
        let mut view = ConsoleView::new();
        view.render(&state);
        state.running = false;
        assert_eq!(
            view.render(&state),
            vec![
                "[idle] cycle 0 | no annotated image".to_string(),
                "  No feedback available".to_string(),
            ]
        );
    }
}
