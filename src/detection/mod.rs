pub mod detection_loop;
pub mod state;

pub use detection_loop::{DEFAULT_PERIOD, DetectionLoop, DetectionLoopBuilder};
pub use state::{DetectionState, NO_IMAGE_CAPTURED_MESSAGE};
