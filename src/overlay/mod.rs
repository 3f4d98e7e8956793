//! Preview overlay: face boxes, confidence labels and the status indicator.

pub mod canvas;
pub mod status;

pub use canvas::{parse_hex_color, OverlayCanvas, OverlayError, OverlayShape, OverlayStyle, Rgba};
pub use status::DetectionStatus;
