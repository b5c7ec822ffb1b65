use std::pin::Pin;
use std::time::Duration;

use futures::Future;
use futures::task::{Context, Poll};
use serde::Serialize;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Service, ServiceBuilder};

use crate::error::AnalysisError;

/// JSON body of `POST /analyze`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest {
    pub image: String,
}

/// Status and body of a completed HTTP exchange, whatever the status.
#[derive(Debug, Clone)]
pub struct RawReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Shared by concurrently running cycles.
pub type Transport = BoxCloneSyncService<AnalyzeRequest, RawReply, BoxError>;

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: String, connect_timeout: Duration) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| AnalysisError::Client(e.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

impl Service<AnalyzeRequest> for HttpTransport {
    type Response = RawReply;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AnalyzeRequest) -> Self::Future {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();

        Box::pin(async move {
            let response = client.post(&endpoint).json(&req).send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?.to_vec();
            Ok::<_, BoxError>(RawReply { status, body })
        })
    }
}

/// The HTTP transport wrapped in a per-request timeout.
pub fn http_transport(endpoint: String, timeout: Duration) -> Result<Transport, AnalysisError> {
    let service = ServiceBuilder::new()
        .layer(TimeoutLayer::new(timeout))
        .service(HttpTransport::new(endpoint, timeout)?);
    Ok(BoxCloneSyncService::new(service))
}

/// Classifies a transport failure.
pub fn classify(error: BoxError) -> AnalysisError {
    if error.is::<tower::timeout::error::Elapsed>() {
        return AnalysisError::Timeout;
    }
    match error.downcast::<reqwest::Error>() {
        Ok(e) if e.is_timeout() => AnalysisError::Timeout,
        Ok(e) => AnalysisError::Transport(e.to_string()),
        Err(other) => AnalysisError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::http::{StatusCode, header};
    use axum::routing::post;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    type Received = Arc<Mutex<Option<serde_json::Value>>>;

    // An analysis endpoint that answers with a canned reply and keeps the JSON it was sent.
    async fn analysis_server(status: StatusCode, reply: &'static str) -> (String, Received) {
        let received: Received = Arc::new(Mutex::new(None));
        let seen = received.clone();
        let app = Router::new().route(
            "/analyze",
            post(move |Json(body): Json<serde_json::Value>| async move {
                *seen.lock().unwrap() = Some(body);
                (status, [(header::CONTENT_TYPE, "application/json")], reply)
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/analyze"), received)
    }

    #[tokio::test]
    async fn http_transport_posts_json_and_keeps_error_status() {
        let (endpoint, received) =
            analysis_server(StatusCode::BAD_REQUEST, r#"{"error": "No image provided"}"#).await;
        let transport = http_transport(endpoint, Duration::from_secs(5)).unwrap();

        let reply = transport
            .oneshot(AnalyzeRequest {
                image: "data:image/jpeg;base64,AAAA".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(reply.status, 400);
        assert!(!reply.is_success());
        assert_eq!(reply.body, br#"{"error": "No image provided"}"#.to_vec());

        let sent = received.lock().unwrap().take().expect("request body");
        assert_eq!(sent["image"], "data:image/jpeg;base64,AAAA");
    }

    #[tokio::test]
    async fn http_transport_reports_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport =
            http_transport(format!("http://{addr}/analyze"), Duration::from_secs(5)).unwrap();
        let error = transport
            .oneshot(AnalyzeRequest {
                image: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(classify(error), AnalysisError::Transport(_)));
    }

    #[test]
    fn transport_is_shareable_across_threads() {
        fn assert_shareable<T: Clone + Send + Sync + 'static>() {}
        assert_shareable::<Transport>();
    }
    #[test]
    fn elapsed_is_classified_as_timeout() {
        let error: BoxError = Box::new(tower::timeout::error::Elapsed::new());
        assert!(matches!(classify(error), AnalysisError::Timeout));
    }

    #[test]
    fn other_errors_are_transport_failures() {
        let error: BoxError = "connection refused".into();
        match classify(error) {
            AnalysisError::Transport(message) => assert_eq!(message, "connection refused"),
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn success_range_is_2xx() {
        let reply = |status| RawReply {
            status,
            body: Vec::new(),
        };
        assert!(reply(200).is_success());
        assert!(reply(204).is_success());
        assert!(!reply(400).is_success());
        assert!(!reply(500).is_success());
    }
}
