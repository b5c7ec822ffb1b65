use serde::Deserialize;
use serde_json::Value;

use crate::analysis::result::{AnalysisResult, AnnotatedImage, PostureMetrics};

/// The three response shapes the analysis service can produce on success.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    Feedback {
        feedback: Vec<String>,
        annotated_image: Option<String>,
        metrics: PostureMetrics,
    },
    Error(String),
    Malformed,
}

#[derive(Debug, Default, Deserialize)]
struct WireAngles {
    #[serde(default)]
    neck: Option<f64>,
}

impl ResponseShape {
    /// Decodes a 2xx body. Bodies that are not JSON objects are malformed.
    pub fn decode(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                tracing::debug!("Response body is not JSON: {}", e);
                Self::Malformed
            }
        }
    }

    pub fn from_value(value: &Value) -> Self {
        if let Some(feedback) = feedback_list(value) {
            return Self::Feedback {
                feedback,
                annotated_image: non_empty_str(value, "annotated_image").map(str::to_string),
                metrics: metrics(value),
            };
        }
        match error_message(value) {
            Some(error) => Self::Error(error),
            None => Self::Malformed,
        }
    }
}

impl From<ResponseShape> for AnalysisResult {
    fn from(shape: ResponseShape) -> Self {
        match shape {
            ResponseShape::Feedback {
                feedback,
                annotated_image,
                metrics,
            } => AnalysisResult::Feedback {
                feedback,
                annotated_image: annotated_image.as_deref().map(AnnotatedImage::from_base64),
                metrics: (!metrics.is_empty()).then_some(metrics),
            },
            ResponseShape::Error(error) => AnalysisResult::Error { error },
            ResponseShape::Malformed => AnalysisResult::unexpected_format(),
        }
    }
}

/// The `error` string of an error-response body, if it carries one.
pub fn error_body_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| error_message(&value))
}

// Only an array made entirely of strings counts as a feedback list.
fn feedback_list(value: &Value) -> Option<Vec<String>> {
    value
        .get("feedback")?
        .as_array()?
        .iter()
        .map(|entry| entry.as_str().map(str::to_string))
        .collect()
}

fn error_message(value: &Value) -> Option<String> {
    non_empty_str(value, "error").map(str::to_string)
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key)?.as_str().filter(|s| !s.is_empty())
}

fn metrics(value: &Value) -> PostureMetrics {
    let posture_score = value
        .get("posture_score")
        .and_then(Value::as_f64)
        .map(|score| score.clamp(0.0, 100.0).round() as u8);
    let neck_angle = value
        .get("angles")
        .and_then(|angles| serde_json::from_value::<WireAngles>(angles.clone()).ok())
        .and_then(|angles| angles.neck);
    PostureMetrics {
        posture_score,
        neck_angle,
    }
}
