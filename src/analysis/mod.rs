pub mod client;
pub mod response;
pub mod result;
pub mod transport;

pub use client::{AnalysisClient, PostureAnalyzer};
pub use response::ResponseShape;
pub use result::{AnalysisResult, AnnotatedImage, FeedbackTone, PostureMetrics};
