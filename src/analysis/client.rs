use std::time::{Duration, Instant};

use async_trait::async_trait;
use tower::ServiceExt;

use crate::analysis::response::{ResponseShape, error_body_message};
use crate::analysis::result::AnalysisResult;
use crate::analysis::transport::{AnalyzeRequest, Transport, classify, http_transport};
use crate::common::Frame;
use crate::error::AnalysisError;

pub const ANALYZE_PATH: &str = "/analyze";

/// Turns one encoded frame into a normalized analysis result.
#[async_trait]
pub trait PostureAnalyzer: Send + Sync {
    async fn analyze(&self, frame: Frame) -> AnalysisResult;
}

/// Talks to the remote posture-analysis service over HTTP.
#[derive(Clone)]
pub struct AnalysisClient {
    endpoint: String,
    transport: Transport,
}

impl AnalysisClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, AnalysisError> {
        let endpoint = endpoint_for(base_url);
        let transport = http_transport(endpoint.clone(), request_timeout)?;
        Ok(Self {
            endpoint,
            transport,
        })
    }

    /// Uses a caller-supplied transport in place of HTTP.
    pub fn with_transport(base_url: &str, transport: Transport) -> Self {
        Self {
            endpoint: endpoint_for(base_url),
            transport,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, frame: &Frame) -> Result<Vec<u8>, AnalysisError> {
        let request = AnalyzeRequest {
            image: frame.to_data_url(),
        };
        let reply = self
            .transport
            .clone()
            .oneshot(request)
            .await
            .map_err(classify)?;
        if !reply.is_success() {
            return Err(AnalysisError::Status {
                status: reply.status,
                body: reply.body,
            });
        }
        Ok(reply.body)
    }
}

#[async_trait]
impl PostureAnalyzer for AnalysisClient {
    async fn analyze(&self, frame: Frame) -> AnalysisResult {
        let started = Instant::now();
        match self.post(&frame).await {
            Ok(body) => {
                let result = AnalysisResult::from(ResponseShape::decode(&body));
                tracing::debug!(
                    frame_id = %frame.frame_id(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = result.is_error(),
                    "Analysis completed"
                );
                result
            }
            Err(e) => {
                tracing::warn!(
                    frame_id = %frame.frame_id(),
                    endpoint = %self.endpoint,
                    "Analysis request failed: {}",
                    e
                );
                let message = match &e {
                    AnalysisError::Status { body, .. } => error_body_message(body),
                    _ => None,
                };
                AnalysisResult::request_failed(message)
            }
        }
    }
}

fn endpoint_for(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), ANALYZE_PATH)
}
