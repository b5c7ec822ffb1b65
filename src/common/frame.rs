use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::CaptureError;

pub const JPEG_MIME: &str = "image/jpeg";

/// An encoded still captured for a single analysis cycle.
#[derive(Clone, Debug)]
pub struct Frame {
    frame_id: Uuid,
    data: Arc<Vec<u8>>,
    mime: &'static str,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(data: Vec<u8>, mime: &'static str, captured_at: DateTime<Utc>) -> Self {
        Self {
            frame_id: Uuid::new_v4(),
            data: Arc::new(data),
            mime,
            captured_at,
        }
    }

    pub fn jpeg(data: Vec<u8>) -> Self {
        Self::new(data, JPEG_MIME, Utc::now())
    }

    /// Encodes a decoded camera image as a JPEG still.
    pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Self, CaptureError> {
        let mut buffer = Vec::new();
        let rgb = image.to_rgb8();
        JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(&rgb)?;
        Ok(Self::jpeg(buffer))
    }

    pub fn frame_id(&self) -> Uuid {
        self.frame_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `data:<mime>;base64,<payload>`, the form the analysis endpoint expects.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(self.data.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn solid_image() -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(
            16,
            16,
            Rgb([1, 2, 3]),
        ))
    }

    #[test]
    fn cloning_frame_shares_payload() {
        let f1 = Frame::jpeg(vec![0xff, 0xd8, 0xff]);
        let f2 = f1.clone();
        assert!(Arc::ptr_eq(&f1.data, &f2.data));
        assert_eq!(f1.frame_id(), f2.frame_id());
    }

    #[test]
    fn data_url_carries_mime_and_base64_payload() {
        let frame = Frame::jpeg(b"hello".to_vec());
        assert_eq!(frame.to_data_url(), "data:image/jpeg;base64,aGVsbG8=");
    }

    #[test]
    fn encoded_frame_is_a_jpeg() {
        let frame = Frame::encode_jpeg(&solid_image(), 80).expect("encode");
        assert_eq!(frame.mime(), JPEG_MIME);
        assert!(frame.data().starts_with(&[0xff, 0xd8]));
        assert!(!frame.is_empty());
    }
}
