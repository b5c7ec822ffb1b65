pub mod analysis;
pub mod app;
pub mod capture;
pub mod common;
pub mod config;
pub mod detection;
pub mod error;

pub use analysis::{AnalysisClient, AnalysisResult, AnnotatedImage, PostureAnalyzer};
pub use capture::{CameraFeed, CameraFrameSource, FrameSource, StillFrameSource};
pub use common::Frame;
pub use config::Settings;
pub use detection::{DetectionLoop, DetectionState};
pub use error::{AnalysisError, AppError, CaptureError, ConfigError, DetectionError};
