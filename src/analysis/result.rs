use base64::{Engine as _, engine::general_purpose::STANDARD};

pub const UNEXPECTED_FORMAT_MESSAGE: &str = "Unexpected response format from server.";
pub const BACKEND_UNREACHABLE_MESSAGE: &str =
    "Failed to connect to the backend. Please ensure it is running.";

/// An annotated still returned by the analysis service, tagged for direct display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedImage {
    data_url: String,
}

impl AnnotatedImage {
    pub const DATA_URL_PREFIX: &'static str = "data:image/jpeg;base64,";

    /// Wraps a bare base64 JPEG payload.
    pub fn from_base64(payload: &str) -> Self {
        Self {
            data_url: format!("{}{}", Self::DATA_URL_PREFIX, payload),
        }
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn base64(&self) -> &str {
        &self.data_url[Self::DATA_URL_PREFIX.len()..]
    }

    /// Decodes the JPEG bytes, for presenters that draw the image themselves.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.base64())
    }
}

/// Supplementary numbers the service reports alongside its feedback.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PostureMetrics {
    /// 0 to 100, higher is better.
    pub posture_score: Option<u8>,
    /// Ear, shoulder and hip angle in degrees.
    pub neck_angle: Option<f64>,
}

impl PostureMetrics {
    pub fn is_empty(&self) -> bool {
        self.posture_score.is_none() && self.neck_angle.is_none()
    }
}

/// The normalized outcome of one analysis request.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    Feedback {
        feedback: Vec<String>,
        annotated_image: Option<AnnotatedImage>,
        metrics: Option<PostureMetrics>,
    },
    Error {
        error: String,
    },
}

impl AnalysisResult {
    pub fn unexpected_format() -> Self {
        Self::Feedback {
            feedback: vec![UNEXPECTED_FORMAT_MESSAGE.to_string()],
            annotated_image: None,
            metrics: None,
        }
    }

    /// A failed request: the service's own message when it sent one, otherwise the generic
    /// fallback.
    pub fn request_failed(message: Option<String>) -> Self {
        Self::Error {
            error: message.unwrap_or_else(|| BACKEND_UNREACHABLE_MESSAGE.to_string()),
        }
    }

    /// The messages to show. An error renders as a single message.
    pub fn feedback(&self) -> Vec<String> {
        match self {
            Self::Feedback { feedback, .. } => feedback.clone(),
            Self::Error { error } => vec![error.clone()],
        }
    }

    pub fn annotated_image(&self) -> Option<&AnnotatedImage> {
        match self {
            Self::Feedback {
                annotated_image, ..
            } => annotated_image.as_ref(),
            Self::Error { .. } => None,
        }
    }

    pub fn metrics(&self) -> Option<PostureMetrics> {
        match self {
            Self::Feedback { metrics, .. } => *metrics,
            Self::Error { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// How a presenter should colour a feedback message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackTone {
    Positive,
    Corrective,
}

impl FeedbackTone {
    pub fn of(message: &str) -> Self {
        if message.contains("Good") {
            Self::Positive
        } else {
            Self::Corrective
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotated_image_is_prefixed_for_display() {
        let image = AnnotatedImage::from_base64("aGVsbG8=");
        assert_eq!(image.data_url(), "data:image/jpeg;base64,aGVsbG8=");
        assert_eq!(image.base64(), "aGVsbG8=");
        assert_eq!(image.decode().unwrap(), b"hello");
    }

    #[test]
    fn error_result_renders_as_single_message_without_image() {
        let result = AnalysisResult::Error {
            error: "Face not detected".to_string(),
        };
        assert_eq!(result.feedback(), vec!["Face not detected".to_string()]);
        assert!(result.annotated_image().is_none());
        assert!(result.is_error());
    }

    #[test]
    fn request_failure_without_message_uses_fallback() {
        assert_eq!(
            AnalysisResult::request_failed(None).feedback(),
            vec![BACKEND_UNREACHABLE_MESSAGE.to_string()]
        );
        assert_eq!(
            AnalysisResult::request_failed(Some("No image provided".into())).feedback(),
            vec!["No image provided".to_string()]
        );
    }

    #[test]
    fn tone_follows_good_keyword() {
        assert_eq!(FeedbackTone::of("Good posture!"), FeedbackTone::Positive);
        assert_eq!(
            FeedbackTone::of("Forward head posture detected (neck angle: 140.2°)"),
            FeedbackTone::Corrective
        );
    }
}
