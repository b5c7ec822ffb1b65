pub mod camera_feed;
pub mod device;
pub mod frame_source;

pub use camera_feed::CameraFeed;
pub use device::{CameraDevice, FfmpegDevice, Interrupter, TestPatternDevice, open_device};
pub use frame_source::{CameraFrameSource, FrameSource, StillFrameSource};
