use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),
    #[error("Capture Error: {0}")]
    Capture(#[from] CaptureError),
    #[error("Analysis Error: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("Detection Error: {0}")]
    Detection(#[from] DetectionError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid setting {0}: {1}")]
    Invalid(&'static str, String),
}

// Camera and frame encoding errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to open camera device {device:?}: {source}")]
    Open {
        device: String,
        source: std::io::Error,
    },
    #[error("Failed to read frame: {0}")]
    Read(std::io::Error),
    #[error("Frame size {width}x{height} is too large")]
    FrameSize { width: u32, height: u32 },
    #[error("Frame buffer of {0} bytes does not match the configured geometry")]
    Geometry(usize),
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Failed to load still image: {0}")]
    Still(std::io::Error),
}

// Never crosses the cycle boundary; folded into an AnalysisResult by the client.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Request to analysis service failed: {0}")]
    Transport(String),
    #[error("Analysis request timed out")]
    Timeout,
    #[error("Analysis service returned status {status}")]
    Status { status: u16, body: Vec<u8> },
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DetectionError {
    #[error("The detection session has been torn down.")]
    TornDown,
    #[error("Detection loop is missing its {0}")]
    MissingComponent(&'static str),
    #[error("Polling period must be greater than zero")]
    InvalidPeriod,
    #[error("Detection loop must be built inside a tokio runtime")]
    NoRuntime,
}
