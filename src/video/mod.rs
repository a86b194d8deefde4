#[cfg(feature = "desktop")]
pub mod capture;
pub mod source;
pub mod timecode;

#[cfg(feature = "desktop")]
pub use capture::OpenCvSource;
pub use source::{Frame, FrameSource, StaticSource, VideoInfo};
pub use timecode::{format_frame_time, format_seconds};
