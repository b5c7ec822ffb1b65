use std::path::Path;
use std::sync::Mutex;

use crate::capture::camera_feed::CameraFeed;
use crate::common::Frame;
use crate::error::CaptureError;

/// Produces the current camera frame on demand.
pub trait FrameSource: Send + Sync {
    /// Returns `None` when the device is not ready or no frame could be produced.
    fn capture(&self) -> Option<Frame>;

    /// Frees the underlying device. Called once when the session ends.
    fn release(&self) {}
}

/// Encodes the newest image of a running [`CameraFeed`] as a JPEG still.
pub struct CameraFrameSource {
    feed: Mutex<Option<CameraFeed>>,
    jpeg_quality: u8,
}

impl CameraFrameSource {
    pub fn new(feed: CameraFeed, jpeg_quality: u8) -> Self {
        Self {
            feed: Mutex::new(Some(feed)),
            jpeg_quality,
        }
    }
}

impl FrameSource for CameraFrameSource {
    fn capture(&self) -> Option<Frame> {
        let image = match self.feed.lock() {
            Ok(guard) => guard.as_ref()?.latest()?,
            Err(poisoned) => poisoned.into_inner().as_ref()?.latest()?,
        };
        match Frame::encode_jpeg(&image, self.jpeg_quality) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::warn!("Dropping frame: {}", e);
                None
            }
        }
    }

    fn release(&self) {
        let feed = match self.feed.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(mut feed) = feed {
            tracing::info!("Releasing camera feed {}", feed.id());
            feed.stop();
        }
    }
}

/// Serves one fixed frame, or nothing at all.
pub struct StillFrameSource {
    frame: Option<Frame>,
}

impl StillFrameSource {
    pub fn new(frame: Frame) -> Self {
        Self { frame: Some(frame) }
    }

    /// A source whose device never becomes ready.
    pub fn unavailable() -> Self {
        Self { frame: None }
    }

    pub fn from_jpeg_file(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let data = std::fs::read(path.as_ref()).map_err(CaptureError::Still)?;
        Ok(Self::new(Frame::jpeg(data)))
    }
}

impl FrameSource for StillFrameSource {
    fn capture(&self) -> Option<Frame> {
        // An empty payload is never handed to the analyzer.
        self.frame.clone().filter(|frame| !frame.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::device::CameraDevice;
    use image::DynamicImage;
    use std::time::Duration;

    struct GrayDevice;

    impl CameraDevice for GrayDevice {
        fn next_frame(&mut self) -> Result<Option<DynamicImage>, CaptureError> {
            std::thread::sleep(Duration::from_millis(2));
            Ok(Some(DynamicImage::new_rgb8(8, 8)))
        }

        fn name(&self) -> &str {
            "gray"
        }
    }

    #[test]
    fn still_source_serves_its_frame() {
        let source = StillFrameSource::new(Frame::jpeg(vec![1, 2, 3]));
        let frame = source.capture().expect("frame");
        assert_eq!(frame.data(), &[1, 2, 3]);
    }

    #[test]
    fn still_source_never_serves_empty_payloads() {
        assert!(StillFrameSource::new(Frame::jpeg(Vec::new())).capture().is_none());
        assert!(StillFrameSource::unavailable().capture().is_none());
    }

    #[test]
    fn missing_still_file_is_an_error() {
        let result = StillFrameSource::from_jpeg_file("/nonexistent/still.jpg");
        assert!(matches!(result, Err(CaptureError::Still(_))));
    }

    #[tokio::test]
    async fn camera_source_encodes_latest_image_until_released() {
        let feed = CameraFeed::new(Box::new(GrayDevice));
        let mut rx = feed.subscribe();
        let source = CameraFrameSource::new(feed, 75);
        rx.wait_for(|latest| latest.is_some()).await.expect("frame");

        let frame = source.capture().expect("camera frame");
        assert_eq!(frame.mime(), "image/jpeg");

        source.release();
        assert!(source.capture().is_none());
        // Releasing twice is harmless.
        source.release();
    }
}
